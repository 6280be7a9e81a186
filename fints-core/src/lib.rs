//! fints-core: Wire codec, dialog state and response classification for
//! the FinTS/HBCI PIN/TAN protocol

pub mod bpd;
pub mod context;
pub mod dialog;
pub mod envelope;
pub mod error;
pub mod response;
pub mod segment;

pub use bpd::{BankParameters, TanProcess};
pub use context::ConnectionContext;
pub use dialog::{DialogFallbacks, DialogState, PainVersion};
pub use envelope::{HbciVersion, assemble_request, assemble_request_with};
pub use error::ProtocolError;
pub use response::{
    BankMessage, CONTINUATION_CODE, DialogResult, SCA_CODE, TAN_MODES_CODE, challenge_reference,
    challenge_text, classify, continuation_cursor, parse_result_messages,
};
pub use segment::{SegmentBuilder, escape, extract_between, split_segments, unescape};
