//! Long-lived interactive shells.
//!
//! A [`Session`] keeps one shell process open and runs [`Batch`]es of
//! command lines through it in submission order. Each batch is followed by
//! marker lines on stdout and stderr so the session knows exactly when it
//! finished and with which exit code.

pub mod batch;
pub mod builder;
pub mod dispatch;
pub mod outcome;
pub mod reader;
pub mod session;
pub mod watchdog;

pub use batch::{Batch, BatchResult, LineHandler};
pub use builder::Builder;
pub use dispatch::{Dispatcher, InlineDispatcher, ThreadDispatcher, TokioDispatcher};
pub use outcome::{codes, Outcome};
pub use session::{open_sessions, LineListener, Phase, Session, SessionHandle};
