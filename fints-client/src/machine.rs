//! Transaction state machine. Every business operation runs inside a
//! [`Transaction`] that tracks its lifecycle and handles the SCA detour;
//! [`CompositeRunner`] chains dependent operations, advancing only while
//! each one finishes cleanly.

use async_trait::async_trait;
use fints_core::DialogResult;
use tracing::{info, warn};

use crate::challenge::{TanChallenge, TanSource};
use crate::error::ClientError;
use crate::session::Session;

/// Lifecycle of one operation. Finished, Cancelled and Error are terminal;
/// driving a terminal transaction again is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotStarted,
    Running,
    /// The bank demands a TAN before executing the order.
    ScaRequired,
    Finished,
    /// The caller declined the challenge; the dialog was closed.
    Cancelled,
    Error,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Finished | TransactionState::Cancelled | TransactionState::Error
        )
    }
}

/// What one exchange step produced.
pub enum StepOutcome {
    Done(DialogResult),
    ScaRequired {
        challenge: TanChallenge,
        result: DialogResult,
    },
}

/// One bank job: builds its segments, sends them, parses its payload.
/// Implementations keep their typed output internally; callers read it
/// back off the concrete type once the transaction finished.
#[async_trait]
pub trait Operation: Send {
    fn name(&self) -> &'static str;

    /// First exchange with the bank.
    async fn execute(&mut self, session: &mut Session) -> Result<StepOutcome, ClientError>;

    /// Second exchange answering a pending TAN challenge. Only called
    /// after `execute` reported [`StepOutcome::ScaRequired`].
    async fn confirm(
        &mut self,
        _session: &mut Session,
        _tan: &str,
    ) -> Result<StepOutcome, ClientError> {
        Err(ClientError::Step(format!(
            "{} has no pending challenge to confirm",
            self.name()
        )))
    }
}

pub struct Transaction {
    op: Box<dyn Operation>,
    state: TransactionState,
    result: Option<DialogResult>,
}

impl Transaction {
    pub fn new(op: Box<dyn Operation>) -> Self {
        Self {
            op,
            state: TransactionState::NotStarted,
            result: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Classified result of the last exchange, once one happened.
    pub fn result(&self) -> Option<&DialogResult> {
        self.result.as_ref()
    }

    /// Drive the operation to a terminal state. A challenge from the bank
    /// is answered through `tan_source`; a declined challenge cancels the
    /// order and closes the dialog.
    pub async fn run(
        &mut self,
        session: &mut Session,
        tan_source: &dyn TanSource,
    ) -> Result<TransactionState, ClientError> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        self.state = TransactionState::Running;
        info!(operation = self.op.name(), "transaction started");

        let outcome = match self.op.execute(session).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.state = TransactionState::Error;
                return Err(err);
            }
        };

        match outcome {
            StepOutcome::Done(result) => self.settle(result),
            StepOutcome::ScaRequired { challenge, result } => {
                self.state = TransactionState::ScaRequired;
                self.result = Some(result);
                let answer = match tan_source.provide(&challenge).await {
                    Ok(answer) => answer,
                    Err(err) => {
                        self.state = TransactionState::Error;
                        return Err(err);
                    }
                };
                match answer {
                    Some(tan) => {
                        self.state = TransactionState::Running;
                        match self.op.confirm(session, &tan).await {
                            Ok(StepOutcome::Done(result)) => self.settle(result),
                            Ok(StepOutcome::ScaRequired { .. }) => {
                                self.state = TransactionState::Error;
                                return Err(ClientError::Step(format!(
                                    "{} demanded a second challenge after confirmation",
                                    self.op.name()
                                )));
                            }
                            Err(err) => {
                                self.state = TransactionState::Error;
                                return Err(err);
                            }
                        }
                    }
                    None => {
                        warn!(operation = self.op.name(), "challenge declined, cancelling");
                        session.end_dialog().await?;
                        self.state = TransactionState::Cancelled;
                    }
                }
            }
        }

        info!(operation = self.op.name(), state = ?self.state, "transaction settled");
        Ok(self.state)
    }

    fn settle(&mut self, result: DialogResult) {
        self.state = if result.is_success() {
            TransactionState::Finished
        } else {
            TransactionState::Error
        };
        self.result = Some(result);
    }
}

/// Drive a borrowed operation through the same SCA detour as
/// [`Transaction::run`], without boxing it, so the caller keeps access to
/// the operation's typed payload afterwards. Returns `None` when the
/// challenge was declined and the order cancelled.
pub async fn drive(
    op: &mut dyn Operation,
    session: &mut Session,
    tan_source: &dyn TanSource,
) -> Result<Option<DialogResult>, ClientError> {
    match op.execute(session).await? {
        StepOutcome::Done(result) => Ok(Some(result)),
        StepOutcome::ScaRequired { challenge, .. } => {
            match tan_source.provide(&challenge).await? {
                Some(tan) => match op.confirm(session, &tan).await? {
                    StepOutcome::Done(result) => Ok(Some(result)),
                    StepOutcome::ScaRequired { .. } => Err(ClientError::Step(format!(
                        "{} demanded a second challenge after confirmation",
                        op.name()
                    ))),
                },
                None => {
                    warn!(operation = op.name(), "challenge declined, cancelling");
                    session.end_dialog().await?;
                    Ok(None)
                }
            }
        }
    }
}

/// Runs a chain of dependent operations, e.g. dialog init followed by the
/// actual job. Stops at the first transaction that does not finish.
pub struct CompositeRunner {
    steps: Vec<Transaction>,
}

impl CompositeRunner {
    pub fn new(ops: Vec<Box<dyn Operation>>) -> Self {
        Self {
            steps: ops.into_iter().map(Transaction::new).collect(),
        }
    }

    pub async fn run(
        &mut self,
        session: &mut Session,
        tan_source: &dyn TanSource,
    ) -> Result<TransactionState, ClientError> {
        let mut last = TransactionState::Finished;
        for tx in &mut self.steps {
            last = tx.run(session, tan_source).await?;
            if last != TransactionState::Finished {
                break;
            }
        }
        Ok(last)
    }

    pub fn steps(&self) -> &[Transaction] {
        &self.steps
    }

    /// Result of the last transaction that ran.
    pub fn last_result(&self) -> Option<&DialogResult> {
        self.steps
            .iter()
            .rev()
            .find_map(|tx| tx.result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::NoTanSource;
    use crate::operations::balance::BalanceOperation;
    use crate::operations::sync::SyncOperation;
    use crate::operations::testkit::scripted_session;

    const SYNC_RESPONSE: &str = "HNHBK:1:3+000000000260+300+DIALOG77+1+DIALOG77:1'\
HIRMG:2:2+0010::Nachricht entgegengenommen.'\
HIRMS:3:2:3+3920::Zugelassene Verfahren:911'\
HISYN:4:4:5+SYSID42'\
HNHBS:5:1+1'";

    const BALANCE_RESPONSE: &str = "HNHBK:1:3+000000000230+300+DIALOG77+2+DIALOG77:2'\
HIRMG:2:2+0010::Nachricht entgegengenommen.'\
HIRMS:3:2:3+0020::Der Auftrag wurde ausgef\u{fc}hrt.'\
HISAL:4:5:3+760794644::280:76550000+Girokonto+EUR+C:1234,56:EUR:20260829'\
HNHBS:5:1+2'";

    const REJECTED_RESPONSE: &str = "HNHBK:1:3+000000000170+300+DIALOG8+1+DIALOG8:1'\
HIRMG:2:2+9050::Teilweise fehlerhaft.'\
HIRMS:3:2:3+9210::Auftrag abgelehnt.'\
HNHBS:4:1+1'";

    fn sync_then_balance() -> CompositeRunner {
        CompositeRunner::new(vec![
            Box::new(SyncOperation),
            Box::new(BalanceOperation::new()),
        ])
    }

    #[tokio::test]
    async fn test_composite_runs_chain_in_order() {
        let (mut session, exchange) =
            scripted_session(vec![SYNC_RESPONSE, BALANCE_RESPONSE]);
        let mut runner = sync_then_balance();
        let state = runner.run(&mut session, &NoTanSource).await.unwrap();

        assert_eq!(state, TransactionState::Finished);
        assert!(
            runner
                .steps()
                .iter()
                .all(|tx| tx.state() == TransactionState::Finished)
        );
        // the last result belongs to the balance step, not the sync
        assert!(runner.last_result().unwrap().raw().contains("HISAL"));

        let requests = exchange.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("HKSYN:5:3+0'"));
        assert!(requests[1].contains("HKSAL:3:5+760794644::280:76550000+N'"));
    }

    #[tokio::test]
    async fn test_drive_hands_back_rejected_result() {
        let (mut session, _exchange) = scripted_session(vec![REJECTED_RESPONSE]);
        let mut op = BalanceOperation::new();
        let result = drive(&mut op, &mut session, &NoTanSource)
            .await
            .unwrap()
            .unwrap();
        // callers print the bank's own code/text pairs from this
        assert!(!result.is_success());
        assert!(result.error_summary().contains("9210: Auftrag abgelehnt."));
        assert!(op.balance().is_none());
    }

    #[tokio::test]
    async fn test_composite_halts_on_rejected_step() {
        let (mut session, exchange) = scripted_session(vec![REJECTED_RESPONSE]);
        let mut runner = sync_then_balance();
        let state = runner.run(&mut session, &NoTanSource).await.unwrap();

        assert_eq!(state, TransactionState::Error);
        assert_eq!(runner.steps()[0].state(), TransactionState::Error);
        // the chain stops before the balance step ever runs
        assert_eq!(runner.steps()[1].state(), TransactionState::NotStarted);
        assert!(runner.last_result().unwrap().error_summary().contains("9210"));
        assert_eq!(exchange.requests.lock().unwrap().len(), 1);
    }
}
