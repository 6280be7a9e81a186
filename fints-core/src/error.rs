use thiserror::Error;

/// Errors raised by the protocol core, grouped by the stage that produces
/// them. Bank-reported business failures are *not* errors; they travel as
/// non-success [`crate::DialogResult`]s with the bank's own codes.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The context names an HBCI version this client does not speak.
    /// Raised before any network call.
    #[error("unsupported HBCI version {0}, expected 220 or 300")]
    UnsupportedVersion(u32),

    /// A required connection field is empty.
    #[error("missing required connection field: {0}")]
    MissingField(&'static str),

    /// The caller insisted on a TAN mode the bank no longer offers.
    #[error("TAN mode {selected} not offered by bank, allowed: {allowed}")]
    TanModeMismatch { selected: String, allowed: String },

    /// Classification hit something the response grammar does not allow.
    /// Distinct from a bank-reported error so a broken response is never
    /// mistaken for a clean failure.
    #[error("software error while parsing bank response: {0}")]
    Software(String),
}
