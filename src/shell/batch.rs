//! Command batches and the marker-echo protocol.
//!
//! Every batch written to the shell is followed by two echo lines carrying a
//! marker unique to that batch:
//!
//! ```text
//! <command line 1>
//! <command line N>
//! echo <marker> $?
//! echo <marker> >&2
//! ```
//!
//! The first reports the exit status of the last command on stdout, the
//! second proves stderr has been drained up to the same point. A batch is
//! complete once both marker lines have been read back.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::ports::IdGenerator;

use super::outcome::Outcome;

/// Result handed to a batch's result callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Caller-supplied tag of the batch.
    pub tag: i32,
    /// How the batch ended.
    pub outcome: Outcome,
    /// Collected output lines (stdout, plus stderr if requested).
    pub output: Vec<String>,
}

/// Receives output of a streaming batch as it arrives.
///
/// Called from reader threads (or the configured dispatcher); keep the work
/// short, as the reader does not continue until the call returns.
pub trait LineHandler: Send + Sync {
    /// Called for each output line of the batch.
    fn on_line(&self, line: &str);

    /// Called once when the batch ends.
    fn on_result(&self, tag: i32, outcome: Outcome);
}

/// Boxed one-shot result callback.
pub type ResultCallback = Box<dyn FnOnce(BatchResult) + Send>;

/// Where a batch's results go.
#[derive(Default)]
pub enum BatchSink {
    /// Nobody is listening; output is discarded.
    #[default]
    None,
    /// Output is buffered and delivered in one [`BatchResult`].
    Result(ResultCallback),
    /// Output is streamed line by line and never buffered.
    Lines(Arc<dyn LineHandler>),
}

impl BatchSink {
    /// Returns `true` if output must be kept for a final result.
    #[must_use]
    pub fn wants_buffer(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Returns the streaming handler, if any.
    #[must_use]
    pub fn line_handler(&self) -> Option<&Arc<dyn LineHandler>> {
        match self {
            Self::Lines(handler) => Some(handler),
            _ => None,
        }
    }
}

impl fmt::Debug for BatchSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Result(_) => f.write_str("Result(..)"),
            Self::Lines(_) => f.write_str("Lines(..)"),
        }
    }
}

/// A set of command lines submitted together and completed as a unit.
#[derive(Debug)]
pub struct Batch {
    /// Command lines, written to the shell in order.
    pub lines: Vec<String>,
    /// Caller-supplied tag, echoed back in the result.
    pub tag: i32,
    /// Result destination.
    pub sink: BatchSink,
}

impl Batch {
    /// Creates a batch whose output is discarded.
    pub fn new<I, S>(lines: I, tag: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { lines: lines.into_iter().map(Into::into).collect(), tag, sink: BatchSink::None }
    }

    /// Delivers buffered output to `callback` once the batch ends.
    #[must_use]
    pub fn on_result(mut self, callback: impl FnOnce(BatchResult) + Send + 'static) -> Self {
        self.sink = BatchSink::Result(Box::new(callback));
        self
    }

    /// Streams output to `handler` without buffering.
    #[must_use]
    pub fn on_lines(mut self, handler: Arc<dyn LineHandler>) -> Self {
        self.sink = BatchSink::Lines(handler);
        self
    }

    /// Returns `true` if there is nothing to write to the shell.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Builds the exact text written to the shell's input for one batch.
#[must_use]
pub fn encode(lines: &[String], marker: &str) -> String {
    let mut script = String::new();
    for line in lines {
        script.push_str(line);
        script.push('\n');
    }
    script.push_str(&format!("echo {marker} $?\n"));
    script.push_str(&format!("echo {marker} >&2\n"));
    script
}

/// Returns `true` if `line` is the echo of `marker`.
#[must_use]
pub fn is_marker(line: &str, marker: &str) -> bool {
    line.starts_with(marker)
}

/// Parses the exit status from a stdout marker line (`<marker> <status>`).
#[must_use]
pub fn parse_exit_code(line: &str, marker: &str) -> Option<i32> {
    line.get(marker.len() + 1..).and_then(|rest| rest.trim().parse().ok())
}

/// Produces per-batch markers: a random identifier plus a counter.
///
/// The counter keeps markers distinct even if the random part repeats.
pub struct MarkerGenerator {
    id_gen: Arc<dyn IdGenerator>,
    counter: AtomicU32,
}

impl MarkerGenerator {
    /// Creates a generator drawing randomness from `id_gen`.
    #[must_use]
    pub fn new(id_gen: Arc<dyn IdGenerator>) -> Self {
        Self { id_gen, counter: AtomicU32::new(0) }
    }

    /// Returns the next marker.
    pub fn next_marker(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        format!("{}-{n:08x}", self.id_gen.generate_id())
    }
}
