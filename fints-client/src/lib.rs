//! fints-client: Sessions, transaction state machine and banking
//! operations on top of the fints-core wire codec

pub mod challenge;
pub mod error;
pub mod machine;
pub mod operations;
pub mod sepa;
pub mod session;
pub mod transport;

pub use challenge::{NoTanSource, StaticTanSource, TanChallenge, TanSource};
pub use error::ClientError;
pub use machine::{CompositeRunner, Operation, StepOutcome, Transaction, TransactionState, drive};
pub use sepa::{Mandate, Payment};
pub use session::Session;
pub use transport::{Exchange, HttpTransport};
