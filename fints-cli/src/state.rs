use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub fn fints_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".fints"))
}

pub fn ensure_fints_home() -> Result<PathBuf> {
    let dir = fints_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Everything worth keeping across program runs, per bank connection: the
/// customer system id handed out by synchronization and the last bank
/// parameter data. Holds no credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Snapshot {
    pub customer_system_id: Option<String>,
    pub bank_parameters: String,
    pub updated_at_utc: Option<String>,
}

pub fn snapshot_path(bank_code: &str, login_id: &str) -> Result<PathBuf> {
    let dir = ensure_fints_home()?.join(bank_code);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir.join(format!("{login_id}.json")))
}

pub fn write_snapshot(bank_code: &str, login_id: &str, snapshot: &Snapshot) -> Result<()> {
    let p = snapshot_path(bank_code, login_id)?;
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(&p, json).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn read_snapshot(bank_code: &str, login_id: &str) -> Result<Snapshot> {
    let p = snapshot_path(bank_code, login_id)?;
    if !p.exists() {
        return Ok(Snapshot::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    Ok(serde_json::from_str(&s)?)
}
