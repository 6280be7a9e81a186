//! Business operations, one module per job family. Each operation builds
//! its segments from the negotiated dialog state, sends them through the
//! session and keeps its typed payload for the caller.

pub mod balance;
pub mod collect;
pub mod init;
pub mod standing_order;
pub mod statement;
pub mod sync;
pub mod tan;
pub mod transfer;

use fints_core::{ConnectionContext, DialogResult, challenge_reference, challenge_text};

use crate::challenge::TanChallenge;
use crate::machine::StepOutcome;
use crate::session::Session;

/// Append the HKTAN order segment when the bank's parameter data says the
/// job needs a TAN. The layout depends on the negotiated HITANS selector
/// and on whether a TAN medium was chosen.
pub(crate) fn attach_tan_request(
    ctx: &ConnectionContext,
    code: &str,
    segments: &mut Vec<String>,
) {
    if !ctx.bpd.is_tan_required(code) {
        return;
    }
    let number = 2 + segments.len() as u32 + 1;
    let selector = ctx.dialog.tan_selector.as_deref().unwrap_or("6+4");
    let segment = match ctx.dialog.tan_medium.as_deref() {
        None => {
            if selector.starts_with("6+4") {
                format!("HKTAN:{number}:{selector}+{code}'")
            } else {
                format!("HKTAN:{number}:{selector}+'")
            }
        }
        Some(medium) => {
            if selector.starts_with("3+4") {
                format!("HKTAN:{number}:{selector}++++++++{medium}'")
            } else if selector.starts_with("4+4") {
                format!("HKTAN:{number}:{selector}+++++++++{medium}'")
            } else if selector.starts_with("5+4") {
                format!("HKTAN:{number}:{selector}+++++++++++{medium}'")
            } else {
                format!("HKTAN:{number}:{selector}+{code}+++++++++{medium}'")
            }
        }
    };
    segments.push(segment);
}

/// Turn a classified result into the step outcome: a pending challenge
/// becomes [`StepOutcome::ScaRequired`] with its reference remembered for
/// the confirmation round, everything else settles as done.
pub(crate) fn step_outcome(session: &mut Session, result: DialogResult) -> StepOutcome {
    if !result.is_sca_required() {
        return StepOutcome::Done(result);
    }
    let reference = challenge_reference(result.raw()).unwrap_or_default();
    let ctx = session.context_mut();
    ctx.dialog.tan_challenge_ref = Some(reference.clone());
    let challenge = TanChallenge {
        reference,
        text: challenge_text(result.raw()),
        medium: ctx.dialog.tan_medium.clone(),
        processes: ctx.tan_processes.clone(),
    };
    StepOutcome::ScaRequired { challenge, result }
}

/// Account addressing for jobs that speak both dialects: `IBAN:BIC` from
/// the given segment version on, domestic account number before.
pub(crate) fn account_address(ctx: &ConnectionContext, version: u32, iban_from: u32) -> String {
    if version >= iban_from {
        format!("{}:{}", ctx.iban, ctx.bic)
    } else {
        format!("{}::280:{}", ctx.account_number, ctx.bank_code)
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use async_trait::async_trait;
    use fints_core::{ConnectionContext, DialogState, HbciVersion};
    use std::sync::Mutex;

    use crate::error::ClientError;
    use crate::session::Session;
    use crate::transport::Exchange;

    /// Scripted transport: returns canned response bodies in order and
    /// records every request for assertions.
    pub struct ScriptedExchange {
        responses: Mutex<Vec<String>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl ScriptedExchange {
        pub fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().map(String::from).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Exchange for ScriptedExchange {
        async fn exchange(&self, _url: &str, message: &str) -> Result<String, ClientError> {
            self.requests.lock().unwrap().push(message.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ClientError::Step("no scripted response left".into()))
        }
    }

    pub fn test_context() -> ConnectionContext {
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
            bpd: Default::default(),
            dialog: DialogState::new(),
            tan_processes: Vec::new(),
        }
    }

    /// Session over a scripted transport. The transport is shared so the
    /// test can inspect the recorded requests afterwards.
    pub fn scripted_session(responses: Vec<&str>) -> (Session, std::sync::Arc<ScriptedExchange>) {
        let exchange = std::sync::Arc::new(ScriptedExchange::new(responses));
        let session = Session::new(test_context(), Box::new(SharedExchange(exchange.clone())));
        (session, exchange)
    }

    pub struct SharedExchange(pub std::sync::Arc<ScriptedExchange>);

    #[async_trait]
    impl Exchange for SharedExchange {
        async fn exchange(&self, url: &str, message: &str) -> Result<String, ClientError> {
            self.0.exchange(url, message).await
        }
    }
}
