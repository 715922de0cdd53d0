//! Scripted transport for tests

use std::collections::VecDeque;

use bytes::Bytes;

use super::{CardTransport, TransportError};

/// Transport that replays scripted responses and records every command
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    /// Scripted outcomes, consumed in order
    pub responses: VecDeque<Result<Bytes, TransportError>>,
    /// Commands that were sent
    pub commands: Vec<Bytes>,
    /// Whether the transport is connected
    pub connected: bool,
    /// Number of times the link was opened
    pub opens: usize,
}

impl MockTransport {
    /// Create a new mock transport with the given responses
    pub fn new(responses: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            responses: responses.into_iter().map(Ok).collect(),
            ..Self::default()
        }
    }

    /// Queue a successful exchange
    pub fn push_response(&mut self, response: impl Into<Bytes>) -> &mut Self {
        self.responses.push_back(Ok(response.into()));
        self
    }

    /// Queue a transport failure
    pub fn push_error(&mut self, error: TransportError) -> &mut Self {
        self.responses.push_back(Err(error));
        self
    }
}

impl CardTransport for MockTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        self.opens += 1;
        Ok(())
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::Connection);
        }

        self.commands.push(Bytes::copy_from_slice(command));

        match self.responses.pop_front() {
            Some(Err(error)) => {
                if error.is_retriable() {
                    self.connected = false;
                }
                Err(error)
            }
            Some(response) => response,
            None => Err(TransportError::other("no scripted response")),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
    }
}
