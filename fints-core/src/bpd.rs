//! Bank parameter data (BPD): the bank-wide capability snapshot delivered
//! during synchronization. Parsed fresh from every sync response; a caller
//! may feed a cached snapshot back in as a substitute, but the core never
//! trusts stale state on its own.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::segment;

/// One second-factor procedure the bank offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TanProcess {
    /// Numeric process id, e.g. "911".
    pub number: String,
    /// Display name, e.g. "chipTAN optisch".
    pub name: String,
}

/// Bank-wide capability data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankParameters {
    /// Raw BPD slice as received, retained for re-parsing and caching.
    pub raw: String,
    /// Transaction codes that require a TAN (from HIPINS), e.g. ("HKCCS", true).
    pub tan_required: Vec<(String, bool)>,
    /// Supported CAMT schemes (from HICAZS), e.g. "camt.052.001.02".
    pub camt_schemes: Vec<String>,
}

impl BankParameters {
    /// Parse the BPD slice of a response. Tolerates a completely empty
    /// input: a bank that sends no BPD simply yields empty tables.
    pub fn parse(raw: &str) -> Self {
        let mut params = BankParameters {
            raw: raw.to_string(),
            ..Default::default()
        };

        for seg in segment::split_segments(raw) {
            if seg.starts_with("HIPINS") {
                params.tan_required = parse_tan_requirements(&seg);
            }
            if seg.starts_with("HICAZS") {
                params.camt_schemes = parse_camt_schemes(&seg);
            }
        }

        params
    }

    /// Whether the given transaction code (e.g. "HKKAZ") needs a TAN.
    /// Unknown codes default to false, matching a bank that lists nothing.
    pub fn is_tan_required(&self, code: &str) -> bool {
        self.tan_required
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, required)| *required)
            .unwrap_or(false)
    }

    /// Rebuild the TAN process list for the given allowed mode numbers by
    /// matching them against the HITANS procedure table. Mode "999"
    /// (single-step PIN/TAN) carries no display name and is skipped.
    pub fn tan_processes_for(&self, allowed: &[String]) -> Vec<TanProcess> {
        let mut list = Vec::new();
        for process in allowed {
            if process == "999" {
                continue;
            }
            // BPD entries look like `944:2:SECUREGO:` or `920:2:smsTAN:`;
            // the name sits two subfields after the process number, with a
            // second candidate one further along in some dialects.
            let pattern = format!("{process}:.*?:.*?:(?P<name>.*?):.*?:(?P<name2>.*?):");
            let Ok(rx) = Regex::new(&pattern) else {
                continue;
            };
            for caps in rx.captures_iter(&self.raw) {
                let name2 = caps.name("name2").map(|m| m.as_str()).unwrap_or("");
                let name = if name2.parse::<u32>().is_ok() {
                    caps.name("name").map(|m| m.as_str()).unwrap_or("")
                } else {
                    name2
                };
                if !name.is_empty() {
                    list.push(TanProcess {
                        number: process.clone(),
                        name: name.to_string(),
                    });
                }
            }
        }
        list
    }
}

fn parse_tan_requirements(hipins: &str) -> Vec<(String, bool)> {
    let rx = Regex::new(r"(HK[A-Z]{3}):([JN])").expect("static pattern");
    rx.captures_iter(hipins)
        .map(|caps| (caps[1].to_string(), &caps[2] == "J"))
        .collect()
}

fn parse_camt_schemes(hicazs: &str) -> Vec<String> {
    let rx = Regex::new(r"camt\.\d{3}\.\d{3}\.\d{2}").expect("static pattern");
    rx.find_iter(hicazs).map(|m| m.as_str().to_string()).collect()
}
