//! Synchronization dialog: identifies the customer and asks the bank for a
//! customer system id plus its parameter data.

use async_trait::async_trait;
use fints_core::HbciVersion;
use tracing::info;

use crate::error::ClientError;
use crate::machine::{Operation, StepOutcome};
use crate::session::Session;

pub struct SyncOperation;

#[async_trait]
impl Operation for SyncOperation {
    fn name(&self) -> &'static str {
        "synchronization"
    }

    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError> {
        let ctx = session.context();
        let v = match ctx.version {
            HbciVersion::V220 => 2,
            HbciVersion::V300 => 3,
        };
        let segments = vec![
            format!(
                "HKIDN:3:2+280:{}+{}+0+1'",
                ctx.primary_bank_code(),
                ctx.login_id
            ),
            format!(
                "HKVVB:4:{v}+0+0+0+{}+{}'",
                ctx.product_id, ctx.product_version
            ),
            format!("HKSYN:5:{v}+0'"),
        ];
        let result = session.send(&segments, None).await?;
        if result.is_success() {
            let ctx = session.context_mut();
            ctx.customer_system_id = Some(ctx.dialog.system_id.clone());
            info!(system_id = %ctx.dialog.system_id, "synchronized");
        }
        Ok(StepOutcome::Done(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::NoTanSource;
    use crate::machine::{Transaction, TransactionState};
    use crate::operations::testkit::scripted_session;

    const SYNC_RESPONSE: &str = "HNHBK:1:3+000000000420+300+DIALOG77+1+DIALOG77:1'\
HIRMG:2:2+0010::Nachricht entgegengenommen.'\
HIRMS:3:2:3+3920::Zugelassene Verfahren:911:920'\
HISYN:4:4:5+SYSID42'\
HIBPA:5:3:3+12+280+Testbank+1+1+300'\
HIPINS:6:1:4+1+1+0+5:5:6:USERID:CUSTID:HKSAL:N:HKKAZ:N:HKCCS:J'\
HNHBS:7:1+1'";

    #[tokio::test]
    async fn test_sync_assigns_system_id_and_mode() {
        let (mut session, exchange) = scripted_session(vec![SYNC_RESPONSE]);
        let mut tx = Transaction::new(Box::new(SyncOperation));
        let state = tx.run(&mut session, &NoTanSource).await.unwrap();

        assert_eq!(state, TransactionState::Finished);
        let ctx = session.context();
        assert_eq!(ctx.dialog.system_id, "SYSID42");
        assert_eq!(ctx.customer_system_id.as_deref(), Some("SYSID42"));
        assert_eq!(ctx.dialog.security_mode.as_deref(), Some("911"));
        assert_eq!(ctx.dialog.dialog_id, "DIALOG77");
        assert!(ctx.bpd.is_tan_required("HKCCS"));

        let requests = exchange.requests.lock().unwrap();
        let sent = &requests[0];
        assert!(sent.contains("HKIDN:3:2+280:76550000+760794644+0+1'"));
        assert!(sent.contains("HKSYN:5:3+0'"));
        assert!(sent.contains("HNHBS:7:1+1'"));
    }

    #[tokio::test]
    async fn test_terminal_transaction_is_idempotent() {
        let (mut session, exchange) = scripted_session(vec![SYNC_RESPONSE]);
        let mut tx = Transaction::new(Box::new(SyncOperation));
        tx.run(&mut session, &NoTanSource).await.unwrap();
        // second run consumes no further scripted response
        let state = tx.run(&mut session, &NoTanSource).await.unwrap();
        assert_eq!(state, TransactionState::Finished);
        assert_eq!(exchange.requests.lock().unwrap().len(), 1);
    }
}
