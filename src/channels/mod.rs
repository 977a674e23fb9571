//! Transports between users and the agent core.
//!
//! The core speaks `Event` in and `Reply` out; a channel owns everything
//! transport-specific on either side of that.

pub mod repl;

pub use repl::ReplChannel;
