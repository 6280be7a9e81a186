//! SEPA credit transfers: immediate and terminated, single and
//! collective. The order travels as a pain.001 document inside a binary
//! field; the schema variant is the one negotiated via HISPAS.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::ClientError;
use crate::machine::{Operation, StepOutcome};
use crate::operations::{attach_tan_request, step_outcome, tan};
use crate::sepa::{self, Payment};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// HKCCS, executed as soon as possible.
    Immediate,
    /// HKCSE, executed at the given date.
    Terminated(NaiveDate),
    /// HKCCM, several positions in one order.
    CollectiveImmediate,
    /// HKCME, several positions at the given date.
    CollectiveTerminated(NaiveDate),
}

impl TransferKind {
    fn code(&self) -> &'static str {
        match self {
            TransferKind::Immediate => "HKCCS",
            TransferKind::Terminated(_) => "HKCSE",
            TransferKind::CollectiveImmediate => "HKCCM",
            TransferKind::CollectiveTerminated(_) => "HKCME",
        }
    }

    fn execution_date(&self) -> Option<NaiveDate> {
        match self {
            TransferKind::Terminated(date) | TransferKind::CollectiveTerminated(date) => {
                Some(*date)
            }
            _ => None,
        }
    }

    fn is_collective(&self) -> bool {
        matches!(
            self,
            TransferKind::CollectiveImmediate | TransferKind::CollectiveTerminated(_)
        )
    }
}

pub struct TransferOperation {
    kind: TransferKind,
    payments: Vec<Payment>,
}

impl TransferOperation {
    pub fn single(kind: TransferKind, payment: Payment) -> Self {
        Self {
            kind,
            payments: vec![payment],
        }
    }

    pub fn collective(kind: TransferKind, payments: Vec<Payment>) -> Self {
        Self { kind, payments }
    }

    fn order_segment(&self, session: &Session) -> String {
        let ctx = session.context();
        let pain = ctx.dialog.pain_version_or_fallback();
        let xml = sepa::credit_transfer(
            pain.schema_id(),
            &ctx.account_holder,
            &ctx.iban,
            &ctx.bic,
            &self.payments,
            self.kind.execution_date(),
        );
        let code = self.kind.code();
        if self.kind.is_collective() {
            let total: f64 = self.payments.iter().map(|p| p.amount).sum();
            format!(
                "{code}:3:1+{}:{}+{}:EUR++{}+@{}@{xml}'",
                ctx.iban,
                ctx.bic,
                sepa::format_wire_amount(total),
                pain.urn(),
                xml.chars().count(),
            )
        } else {
            format!(
                "{code}:3:1+{}:{}+{}+@{}@{xml}'",
                ctx.iban,
                ctx.bic,
                pain.urn(),
                xml.chars().count(),
            )
        }
    }
}

#[async_trait]
impl Operation for TransferOperation {
    fn name(&self) -> &'static str {
        "credit transfer"
    }

    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError> {
        if self.payments.is_empty() {
            return Err(ClientError::Step("transfer without positions".into()));
        }
        let mut segments = vec![self.order_segment(session)];
        attach_tan_request(session.context(), self.kind.code(), &mut segments);
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
