//! Host delivery primitives

use std::io::Write;

use crossbeam::channel::{Receiver, Sender};
use tracing::warn;

/// The host's delivery primitive, called once per encoded result in delivery order
pub trait ResultSink: Send + Sync + 'static {
    fn deliver(&self, result_text: String);
}

/// Forwards encoded results into a crossbeam channel
///
/// Useful for hosts that consume results on their own thread.
#[derive(Debug, Clone)]
pub struct ChannelResultSink {
    sender: Sender<String>,
}

impl ChannelResultSink {
    /// Unbounded sink plus the receiving end for the host
    pub fn unbounded() -> (Self, Receiver<String>) {
        let (sender, receiver) = crossbeam::channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl ResultSink for ChannelResultSink {
    fn deliver(&self, result_text: String) {
        if self.sender.send(result_text).is_err() {
            warn!("Result receiver dropped; discarding delivery");
        }
    }
}

/// Writes one result per line to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutResultSink;

impl ResultSink for StdoutResultSink {
    fn deliver(&self, result_text: String) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{result_text}").and_then(|_| stdout.flush()) {
            warn!(error = %e, "Failed to write result to stdout");
        }
    }
}

impl<F> ResultSink for F
where
    F: Fn(String) + Send + Sync + 'static,
{
    fn deliver(&self, result_text: String) {
        self(result_text)
    }
}
