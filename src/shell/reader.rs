//! Line readers draining a child's output pipes.
//!
//! A shell blocks once its stdout or stderr pipe buffer fills, so each pipe
//! gets a dedicated thread that reads continuously and hands every line to
//! a sink before reading the next one.

use std::io::{BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl Stream {
    /// Short suffix used in thread names and log lines.
    #[must_use]
    pub fn indicator(self) -> char {
        match self {
            Self::Stdout => '-',
            Self::Stderr => '*',
        }
    }
}

/// Event produced by a [`LineReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A complete line, without its terminator.
    Line(String),
    /// The stream ended (EOF or read error). Always the last event.
    Closed,
}

/// Background thread reading one stream line by line.
pub struct LineReader {
    handle: Option<JoinHandle<()>>,
}

impl LineReader {
    /// Starts reading `stream` on a new thread named after `label`.
    ///
    /// `sink` runs on the reader thread for every line and once more with
    /// [`StreamEvent::Closed`]. It must not block on anything that waits for
    /// this reader to make progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be created.
    pub fn spawn<F>(
        label: &str,
        stream: Box<dyn Read + Send>,
        mut sink: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(StreamEvent) + Send + 'static,
    {
        let handle = thread::Builder::new().name(format!("reader {label}")).spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        sink(StreamEvent::Line(decode_line(&buf)));
                    }
                }
            }
            // Drop the pipe before reporting closure.
            drop(reader);
            sink(StreamEvent::Closed);
        })?;
        Ok(Self { handle: Some(handle) })
    }

    /// Waits for the reader thread to finish.
    ///
    /// Does nothing when called from the reader thread itself.
    pub fn join(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        let _ = handle.join();
    }

    /// Returns `true` if the reader thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.handle {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }
}

fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
