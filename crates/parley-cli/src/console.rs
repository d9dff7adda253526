//! Console presentation of received messages.

use parking_lot::Mutex;
use parley_core::{DeliveryError, Listener, Received};
use std::io::{self, Write};

/// Prints every received message as `[<owner>'s chat session] <sender>: '<text>'`.
pub struct ConsoleListener {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleListener {
    /// Listener writing to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Listener writing to `out`.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Listener for ConsoleListener {
    fn on_message(&self, owner: &str, record: &Received) -> Result<(), DeliveryError> {
        let mut out = self.out.lock();
        writeln!(out, "[{owner}'s chat session] {record}")
            .and_then(|()| out.flush())
            .map_err(|e| DeliveryError::Internal(e.to_string()))
    }
}
