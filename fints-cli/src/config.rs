use anyhow::{Context, Result, bail};
use fints_core::{BankParameters, ConnectionContext, DialogState, HbciVersion};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::fints_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub connection: ConnectionSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSection {
    pub url: String,
    /// 220 or 300.
    pub version: u32,
    pub login_id: String,
    /// Leave out to be prompted at startup.
    pub pin: Option<String>,
    pub account_holder: String,
    pub account_number: String,
    pub bank_code: String,
    pub bank_code_headquarters: Option<String>,
    pub iban: String,
    pub bic: String,
    #[serde(default = "default_product_id")]
    pub product_id: String,
    #[serde(default = "default_product_version")]
    pub product_version: String,
}

fn default_product_id() -> String {
    "9FA6681DEC0CF3046BFC2F8A6".to_string()
}

fn default_product_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub fn config_path() -> Result<PathBuf> {
    Ok(fints_home()?.join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        bail!(
            "no config at {} (create it with a [connection] section)",
            path.display()
        );
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(toml::from_str(&s).context("parse config.toml")?)
}

impl Config {
    /// Build the connection context, prompting for the PIN when the config
    /// leaves it out.
    pub fn into_context(self) -> Result<ConnectionContext> {
        let c = self.connection;
        let version = HbciVersion::try_from(c.version).context("config version")?;
        let pin = match c.pin {
            Some(pin) => pin,
            None => prompt("PIN: ")?,
        };
        let ctx = ConnectionContext {
            url: c.url,
            version,
            login_id: c.login_id,
            pin,
            account_holder: c.account_holder,
            account_number: c.account_number,
            bank_code: c.bank_code,
            bank_code_headquarters: c.bank_code_headquarters,
            iban: c.iban,
            bic: c.bic,
            customer_system_id: None,
            product_id: c.product_id,
            product_version: c.product_version,
            bpd: BankParameters::default(),
            dialog: DialogState::new(),
            tan_processes: Vec::new(),
        };
        ctx.validate()?;
        Ok(ctx)
    }
}

pub fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("read stdin")?;
    Ok(line.trim().to_string())
}
