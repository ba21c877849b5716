//! # longform-generator
//!
//! Continuation-bounded streamed generation: keep asking a provider to
//! continue until it signals completion or the round budget runs out.
//!
//! ## Pieces
//!
//! - [`budget`]: immutable per-session limits and control tokens
//! - [`window`]: sliding-window prompt construction
//! - [`sentinel`]: stripping and detecting control tokens in streamed text
//! - [`retry`]: per-round retry policy for transient failures
//! - [`session`]: caller-owned session state and round records
//! - [`sink`]: display sinks and round-level events
//! - [`generator`]: the round loop itself
//! - [`artifact`]: naming the finished document
//! - [`prompt`]: learning-material instruction templates

pub mod artifact;
pub mod budget;
pub mod generator;
pub mod prompt;
pub mod retry;
pub mod sentinel;
pub mod session;
pub mod sink;
pub mod window;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use artifact::Artifact;
pub use budget::SessionBudget;
pub use generator::{ContinuationGenerator, Generation, GenerationFailure, Termination};
pub use prompt::{Level, MaterialRequest};
pub use retry::RetryPolicy;
pub use session::{RoundRecord, RoundSignal, Session, SessionId, Transcript};
pub use sink::{DisplaySink, GenerationEvent, NullSink};
