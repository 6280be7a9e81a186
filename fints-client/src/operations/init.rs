//! Dialog initialization (HKIDN/HKVVB). Under strong customer
//! authentication the bank may already demand a TAN here, before any
//! business segment is accepted.

use async_trait::async_trait;
use fints_core::HbciVersion;
use tracing::info;

use crate::error::ClientError;
use crate::machine::{Operation, StepOutcome};
use crate::operations::sync::SyncOperation;
use crate::operations::{step_outcome, tan};
use crate::session::Session;

pub struct InitOperation;

#[async_trait]
impl Operation for InitOperation {
    fn name(&self) -> &'static str {
        "dialog initialization"
    }

    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError> {
        // Banks reject an init without a customer system id, so acquire one
        // in a synchronization dialog of its own first.
        if session.context().customer_system_id.is_none() {
            info!("no customer system id yet, synchronizing first");
            match SyncOperation.execute(session).await? {
                StepOutcome::Done(result) if result.is_success() => {
                    session.end_dialog().await?;
                }
                outcome => return Ok(outcome),
            }
        }

        let ctx = session.context_mut();
        if ctx.dialog.system_id.is_empty() {
            if let Some(id) = &ctx.customer_system_id {
                ctx.dialog.system_id = id.clone();
            }
        }

        let ctx = session.context();
        let v = match ctx.version {
            HbciVersion::V220 => 2,
            HbciVersion::V300 => 3,
        };
        let segments = vec![
            format!(
                "HKIDN:3:2+280:{}+{}+{}+1'",
                ctx.primary_bank_code(),
                ctx.login_id,
                ctx.dialog.system_id_or_zero()
            ),
            format!(
                "HKVVB:4:{v}+0+0+0+{}+{}'",
                ctx.product_id, ctx.product_version
            ),
        ];
        let result = session.send(&segments, None).await?;
        Ok(step_outcome(session, result))
    }

    async fn confirm(
        &mut self,
        session: &mut Session,
        tan_value: &str,
    ) -> Result<StepOutcome, ClientError> {
        let result = tan::confirm(session, tan_value).await?;
        Ok(StepOutcome::Done(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{StaticTanSource, TanSource};
    use crate::machine::{Transaction, TransactionState};
    use crate::operations::testkit::scripted_session;
    use std::sync::Mutex;

    const INIT_SCA_RESPONSE: &str = "HNHBK:1:3+000000000310+300+DIALOG5+1+DIALOG5:1'\
HIRMG:2:2+0010::Nachricht entgegengenommen.'\
HIRMS:3:2:4+0030::Auftrag empfangen - Sicherheitsfreigabe erforderlich'\
HITAN:4:6:4+4++4937569850050021+Bitte Auftrag in Ihrer App freigeben'\
HNHBS:5:1+1'";

    const TAN_OK_RESPONSE: &str = "HNHBK:1:3+000000000180+300+DIALOG5+2+DIALOG5:2'\
HIRMG:2:2+0010::Nachricht entgegengenommen.'\
HIRMS:3:2:3+0020::Auftrag ausgef\u{fc}hrt.'\
HNHBS:4:1+2'";

    struct RecordingTanSource {
        tan: Option<String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TanSource for RecordingTanSource {
        async fn provide(
            &self,
            challenge: &crate::challenge::TanChallenge,
        ) -> Result<Option<String>, ClientError> {
            self.seen.lock().unwrap().push(challenge.reference.clone());
            Ok(self.tan.clone())
        }
    }

    #[tokio::test]
    async fn test_init_confirms_pending_challenge() {
        let (mut session, exchange) =
            scripted_session(vec![INIT_SCA_RESPONSE, TAN_OK_RESPONSE]);
        session.context_mut().customer_system_id = Some("SYSID42".into());
        session.context_mut().dialog.tan_selector = Some("6+4".into());
        session.context_mut().dialog.security_mode = Some("911".into());

        let source = RecordingTanSource {
            tan: Some("482936".into()),
            seen: Mutex::new(Vec::new()),
        };
        let mut tx = Transaction::new(Box::new(InitOperation));
        let state = tx.run(&mut session, &source).await.unwrap();

        assert_eq!(state, TransactionState::Finished);
        assert_eq!(source.seen.lock().unwrap()[0], "4937569850050021");

        let requests = exchange.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].contains("HKTAN:3:6+2++++4937569850050021+N'"));
        assert!(requests[1].contains(":482936'"));
        // challenge answered, reference cleared
        assert!(session.context().dialog.tan_challenge_ref.is_none());
    }

    #[tokio::test]
    async fn test_declined_challenge_cancels_and_closes_dialog() {
        const END_RESPONSE: &str = "HNHBK:1:3+000000000150+300+DIALOG5+2+DIALOG5:2'\
HIRMG:2:2+0100::Dialog beendet.'\
HNHBS:3:1+2'";
        let (mut session, exchange) = scripted_session(vec![INIT_SCA_RESPONSE, END_RESPONSE]);
        session.context_mut().customer_system_id = Some("SYSID42".into());
        session.context_mut().dialog.security_mode = Some("911".into());

        let mut tx = Transaction::new(Box::new(InitOperation));
        let state = tx
            .run(&mut session, &StaticTanSource(None))
            .await
            .unwrap();

        assert_eq!(state, TransactionState::Cancelled);
        let requests = exchange.requests.lock().unwrap();
        assert!(requests[1].contains("HKEND:3:1+DIALOG5'"));
        // dialog state dropped after the close
        assert!(session.context().dialog.dialog_id.is_empty());
    }

    #[tokio::test]
    async fn test_init_synchronizes_when_system_id_missing() {
        const SYNC_RESPONSE: &str = "HNHBK:1:3+000000000260+300+DIALOG9+1+DIALOG9:1'\
HIRMG:2:2+0010::Nachricht entgegengenommen.'\
HIRMS:3:2:3+3920::Zugelassene Verfahren:911'\
HISYN:4:4:5+SYSID42'\
HNHBS:5:1+1'";
        const END_RESPONSE: &str = "HNHBK:1:3+000000000150+300+DIALOG9+2+DIALOG9:2'\
HIRMG:2:2+0100::Dialog beendet.'\
HNHBS:3:1+2'";
        const INIT_OK_RESPONSE: &str = "HNHBK:1:3+000000000180+300+DIALOG10+1+DIALOG10:1'\
HIRMG:2:2+0010::Nachricht entgegengenommen.'\
HIRMS:3:2:3+0020::Auftrag ausgef\u{fc}hrt.'\
HNHBS:4:1+1'";

        let (mut session, exchange) =
            scripted_session(vec![SYNC_RESPONSE, END_RESPONSE, INIT_OK_RESPONSE]);
        let mut tx = Transaction::new(Box::new(InitOperation));
        let state = tx.run(&mut session, &StaticTanSource(None)).await.unwrap();

        assert_eq!(state, TransactionState::Finished);
        assert_eq!(
            session.context().customer_system_id.as_deref(),
            Some("SYSID42")
        );

        let requests = exchange.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].contains("HKSYN:5:3+0'"));
        assert!(requests[1].contains("HKEND:3:1+DIALOG9'"));
        // the business dialog identifies with the acquired system id
        assert!(requests[2].contains("HKIDN:3:2+280:76550000+760794644+SYSID42+1'"));
    }
}
