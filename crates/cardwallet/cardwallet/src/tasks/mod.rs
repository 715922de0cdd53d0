//! Composite operations built from several commands

mod derive;
mod preflight_read;

pub use derive::{DeriveWalletPublicKeyTask, DeriveWalletPublicKeysTask};
pub use preflight_read::{PreflightReadFilter, PreflightReadTask};
