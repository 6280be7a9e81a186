use fints_core::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the client layer. Wire and dialog failures come in
/// through [`ProtocolError`]; everything transport-shaped lives here.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bank endpoint returned HTTP status {0}")]
    Http(u16),

    #[error("response body is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The bank rejected the order; carries the joined 9xxx messages.
    #[error("bank reported: {0}")]
    Bank(String),

    /// A transaction was driven out of order, e.g. a confirmation without
    /// a pending challenge.
    #[error("invalid transaction step: {0}")]
    Step(String),
}
