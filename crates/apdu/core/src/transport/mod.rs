//! Transport traits for communicating with cards
//!
//! A transport moves raw frames over the proximity link, one exchange at a time.

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for basic card transports
///
/// A transport is responsible for sending and receiving raw bytes. It has no
/// knowledge of command structure, encryption or retry policy.
pub trait CardTransport: Send + fmt::Debug {
    /// Establish the link to a card
    fn open(&mut self) -> Result<(), TransportError>;

    /// Send raw command bytes to the card and return the response bytes
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;

    /// Tear down the link
    fn close(&mut self);

    /// Drop and re-establish the link
    fn reset(&mut self) -> Result<(), TransportError> {
        self.close();
        self.open()
    }
}
