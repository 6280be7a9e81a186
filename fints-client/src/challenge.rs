//! TAN challenge hand-off between the protocol machinery and whoever can
//! actually answer a second-factor prompt.

use async_trait::async_trait;
use fints_core::TanProcess;

use crate::error::ClientError;

/// A pending second-factor challenge, surfaced to the caller.
#[derive(Debug, Clone, Default)]
pub struct TanChallenge {
    /// Bank-issued reference the answer must quote.
    pub reference: String,
    /// Challenge text for display, e.g. "Bitte bestätigen Sie in Ihrer App".
    pub text: Option<String>,
    /// Selected TAN medium, when one was chosen.
    pub medium: Option<String>,
    /// Procedures the bank offers, for display alongside the prompt.
    pub processes: Vec<TanProcess>,
}

/// Supplies the TAN for a pending challenge. Returning `Ok(None)` declines
/// the challenge and cancels the order.
#[async_trait]
pub trait TanSource: Send + Sync {
    async fn provide(&self, challenge: &TanChallenge) -> Result<Option<String>, ClientError>;
}

/// Fixed answer, for decoupled flows and tests.
pub struct StaticTanSource(pub Option<String>);

#[async_trait]
impl TanSource for StaticTanSource {
    async fn provide(&self, _challenge: &TanChallenge) -> Result<Option<String>, ClientError> {
        Ok(self.0.clone())
    }
}

/// Declines every challenge. Appropriate for operations that are never
/// expected to need one.
pub struct NoTanSource;

#[async_trait]
impl TanSource for NoTanSource {
    async fn provide(&self, _challenge: &TanChallenge) -> Result<Option<String>, ClientError> {
        Ok(None)
    }
}
