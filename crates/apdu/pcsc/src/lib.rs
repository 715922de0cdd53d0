//! PC/SC reader transport for contactless wallet cards
//!
//! This crate implements [`CardTransport`](cardwallet_apdu_core::CardTransport) on top
//! of the PC/SC API, so any contactless reader the system exposes can carry a card
//! session.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use cardwallet_apdu_core::CardTransport;
//! use cardwallet_apdu_transport_pcsc::PcscDeviceManager;
//!
//! let manager = PcscDeviceManager::new()?;
//!
//! let readers = manager.list_readers()?;
//! let Some(reader) = readers.iter().find(|r| r.has_card()) else {
//!     println!("No card found");
//!     return Ok(());
//! };
//!
//! let mut transport = manager.open_reader(reader.name())?;
//! transport.open()?;
//! println!("Connected to {}", transport.reader_name());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use config::PcscConfig;
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::{CardPresence, PcscReader};
pub use transport::PcscTransport;
