//! Long-lived connection context, one per bank connection. Owned by the
//! calling application; every operation borrows it mutably for the duration
//! of the exchange, which also serializes all round trips per connection.

use serde::{Deserialize, Serialize};

use crate::bpd::{BankParameters, TanProcess};
use crate::dialog::DialogState;
use crate::envelope::HbciVersion;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionContext {
    /// FinTS endpoint of the bank, e.g. "https://banking-by1.example.de/fints30".
    pub url: String,
    /// Protocol version, 220 or 300.
    pub version: HbciVersion,
    /// Logon id / username.
    pub login_id: String,
    /// Logon PIN. Never logged in cleartext.
    pub pin: String,
    /// Name of the account holder (used by SEPA payload builders).
    pub account_holder: String,
    /// Domestic account number.
    pub account_number: String,
    /// Bank code (BLZ) of the account.
    pub bank_code: String,
    /// Bank code of the institute's headquarters, when it differs (e.g.
    /// Hypovereinsbank). Used in the security headers instead of `bank_code`.
    pub bank_code_headquarters: Option<String>,
    pub iban: String,
    pub bic: String,
    /// Customer system id obtained by synchronization, persisted across
    /// sessions by the caller.
    pub customer_system_id: Option<String>,
    /// Product registration sent in HKVVB.
    pub product_id: String,
    pub product_version: String,

    /// Current bank capability data.
    #[serde(skip)]
    pub bpd: BankParameters,
    /// Current per-dialog state.
    #[serde(skip)]
    pub dialog: DialogState,
    /// TAN processes currently on offer, rebuilt whenever the bank reports
    /// its allowed security modes.
    #[serde(skip)]
    pub tan_processes: Vec<TanProcess>,
}

impl ConnectionContext {
    /// Bank code to use in the message security headers.
    pub fn primary_bank_code(&self) -> &str {
        self.bank_code_headquarters.as_deref().unwrap_or(&self.bank_code)
    }

    /// Check the fields every exchange needs. Raised before any network
    /// call so a misconfigured context never reaches the bank.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.url.is_empty() {
            return Err(ProtocolError::MissingField("url"));
        }
        if self.login_id.is_empty() {
            return Err(ProtocolError::MissingField("login_id"));
        }
        if self.pin.is_empty() {
            return Err(ProtocolError::MissingField("pin"));
        }
        if self.bank_code.is_empty() {
            return Err(ProtocolError::MissingField("bank_code"));
        }
        Ok(())
    }

    /// Drop all per-dialog state, e.g. when switching to another bank
    /// connection or opening a fresh dialog.
    pub fn reset_dialog(&mut self) {
        self.dialog.reset();
        self.tan_processes.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_context() -> ConnectionContext {
        ConnectionContext {
            url: "https://fints.test/fints30".into(),
            version: HbciVersion::V300,
            login_id: "760794644".into(),
            pin: "1234".into(),
            account_holder: "Erika Mustermann".into(),
            account_number: "760794644".into(),
            bank_code: "76550000".into(),
            bank_code_headquarters: None,
            iban: "DE07765500000760794644".into(),
            bic: "BYLADEM1ANS".into(),
            customer_system_id: None,
            product_id: "9FA6681DEC0CF3046BFC2F8A6".into(),
            product_version: "0.1".into(),
            bpd: BankParameters::default(),
            dialog: DialogState::new(),
            tan_processes: Vec::new(),
        }
    }

    #[test]
    fn test_primary_bank_code_prefers_headquarters() {
        let mut ctx = test_context();
        assert_eq!(ctx.primary_bank_code(), "76550000");
        ctx.bank_code_headquarters = Some("70020270".into());
        assert_eq!(ctx.primary_bank_code(), "70020270");
    }

    #[test]
    fn test_deserialize_from_config_json() {
        let json = r#"{
            "url": "https://fints.test/fints30",
            "version": 300,
            "login_id": "760794644",
            "pin": "1234",
            "account_holder": "Erika Mustermann",
            "account_number": "760794644",
            "bank_code": "76550000",
            "bank_code_headquarters": null,
            "iban": "DE07765500000760794644",
            "bic": "BYLADEM1ANS",
            "customer_system_id": "4711",
            "product_id": "9FA6681DEC0CF3046BFC2F8A6",
            "product_version": "0.1"
        }"#;
        let ctx: ConnectionContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.version, HbciVersion::V300);
        assert_eq!(ctx.customer_system_id.as_deref(), Some("4711"));
        assert!(ctx.bpd.raw.is_empty());
    }

    #[test]
    fn test_deserialize_rejects_unknown_version() {
        let json = r#"{
            "url": "u", "version": 250, "login_id": "l", "pin": "p",
            "account_holder": "a", "account_number": "n", "bank_code": "b",
            "bank_code_headquarters": null, "iban": "i", "bic": "c",
            "customer_system_id": null, "product_id": "x", "product_version": "y"
        }"#;
        assert!(serde_json::from_str::<ConnectionContext>(json).is_err());
    }

    #[test]
    fn test_validate_flags_missing_fields() {
        let mut ctx = test_context();
        ctx.pin.clear();
        assert!(matches!(
            ctx.validate(),
            Err(ProtocolError::MissingField("pin"))
        ));
    }
}
