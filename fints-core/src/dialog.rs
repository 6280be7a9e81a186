//! Per-dialog negotiated state. Reset at the start of every new dialog,
//! then populated from bank responses; once populated a field is
//! authoritative for all later segments in the same dialog.

use serde::{Deserialize, Serialize};

/// SEPA pain.001 schema variant negotiated via HISPAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PainVersion {
    #[serde(rename = "pain.001.001.03")]
    V00100103,
    #[serde(rename = "pain.001.002.03")]
    V00100203,
    #[serde(rename = "pain.001.003.03")]
    V00100303,
}

impl PainVersion {
    /// URN used in HKCCS/HKCSE/HKCCM segments, with `:` pre-escaped.
    pub fn urn(&self) -> &'static str {
        match self {
            PainVersion::V00100103 => "urn?:iso?:std?:iso?:20022?:tech?:xsd?:pain.001.001.03",
            PainVersion::V00100203 => "urn?:iso?:std?:iso?:20022?:tech?:xsd?:pain.001.002.03",
            PainVersion::V00100303 => "urn?:iso?:std?:iso?:20022?:tech?:xsd?:pain.001.003.03",
        }
    }

    pub fn schema_id(&self) -> &'static str {
        match self {
            PainVersion::V00100103 => "pain.001.001.03",
            PainVersion::V00100203 => "pain.001.002.03",
            PainVersion::V00100303 => "pain.001.003.03",
        }
    }
}

/// Compatibility fallbacks applied when the bank never advertises a value.
/// Some banks (e.g. Postbank) omit the statement segment version from their
/// parameter data; others advertise a pain schema this client does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogFallbacks {
    pub statement_version: u32,
    pub pain_version: PainVersion,
}

impl Default for DialogFallbacks {
    fn default() -> Self {
        Self {
            statement_version: 5,
            pain_version: PainVersion::V00100303,
        }
    }
}

/// Mutable per-dialog state. Field names follow the segment that populates
/// them on the wire so log output and FinTS documentation line up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogState {
    /// Dialog id assigned by the bank (HNHBK); "0" before the first response.
    pub dialog_id: String,
    /// Running message counter for the next request (HNHBS + 1).
    pub message_number: String,
    /// Customer system id (HISYN); "0" until synchronized.
    pub system_id: String,
    /// Active TAN security mode, e.g. "911" (HIRMS).
    pub security_mode: Option<String>,
    /// All modes the bank currently allows, semicolon-joined (HIRMS set).
    pub allowed_modes: Vec<String>,
    /// Challenge reference of a pending TAN (HITAN).
    pub tan_challenge_ref: Option<String>,
    /// Negotiated TAN segment selector, `version+process`, e.g. "6+4" (HITANS).
    pub tan_selector: Option<String>,
    /// Selected TAN medium name (HITAB), e.g. a phone alias.
    pub tan_medium: Option<String>,
    /// Negotiated HKSAL segment version (HISALS).
    pub balance_version: Option<u32>,
    /// Raw HISALS parameter segment, kept for diagnostics.
    pub balance_params: Option<String>,
    /// Negotiated HKKAZ segment version (highest advertised).
    pub statement_version: Option<u32>,
    /// Negotiated SEPA pain schema (HISPAS).
    pub pain_version: Option<PainVersion>,
    /// Compatibility fallbacks, overridable by the caller.
    pub fallbacks: DialogFallbacks,
}

impl DialogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state for a new dialog. Keeps the caller-configured fallbacks.
    pub fn reset(&mut self) {
        let fallbacks = self.fallbacks;
        *self = Self::default();
        self.fallbacks = fallbacks;
    }

    /// Dialog id to put in the next message header; "0" opens a new dialog.
    pub fn dialog_id_or_new(&self) -> &str {
        if self.dialog_id.is_empty() { "0" } else { &self.dialog_id }
    }

    /// Message number for the next request, defaulting to 1 for a fresh
    /// dialog.
    pub fn message_number_or_first(&self) -> &str {
        if self.message_number.is_empty() { "1" } else { &self.message_number }
    }

    /// System id for the security headers; "0" before synchronization.
    pub fn system_id_or_zero(&self) -> &str {
        if self.system_id.is_empty() { "0" } else { &self.system_id }
    }

    pub fn statement_version_or_fallback(&self) -> u32 {
        self.statement_version.unwrap_or(self.fallbacks.statement_version)
    }

    pub fn pain_version_or_fallback(&self) -> PainVersion {
        self.pain_version.unwrap_or(self.fallbacks.pain_version)
    }

    /// Enumerated field dump for diagnostics. Explicit on purpose: the set
    /// of fields is part of the debugging contract, not discovered at
    /// runtime.
    pub fn as_pairs(&self) -> Vec<(&'static str, String)> {
        fn opt(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }
        vec![
            ("dialog_id", self.dialog_id.clone()),
            ("message_number", self.message_number.clone()),
            ("system_id", self.system_id.clone()),
            ("security_mode", opt(&self.security_mode)),
            ("allowed_modes", self.allowed_modes.join(";")),
            ("tan_challenge_ref", opt(&self.tan_challenge_ref)),
            ("tan_selector", opt(&self.tan_selector)),
            ("tan_medium", opt(&self.tan_medium)),
            (
                "balance_version",
                self.balance_version.map(|v| v.to_string()).unwrap_or_default(),
            ),
            (
                "statement_version",
                self.statement_version.map(|v| v.to_string()).unwrap_or_default(),
            ),
            (
                "pain_version",
                self.pain_version.map(|v| v.schema_id().to_string()).unwrap_or_default(),
            ),
        ]
    }
}
