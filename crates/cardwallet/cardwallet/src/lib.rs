//! Session and command layer for contactless wallet cards
//!
//! A [`CardSession`] talks to one card over any
//! [`CardTransport`](cardwallet_apdu_core::CardTransport). It reads the card
//! before running dependent commands, negotiates payload encryption, waits out
//! security delays and re-establishes a dropped link.
//!
//! ```no_run
//! # use cardwallet::{CardSession, CheckWalletCommand, Config};
//! # use cardwallet_apdu_core::CardTransport;
//! # fn run<T: CardTransport>(transport: T, key: bytes::Bytes) -> cardwallet::Result<()> {
//! let mut session = CardSession::new(transport, Config::default());
//! let proof = session.start(CheckWalletCommand::new(key))?;
//! println!("card {} holds the wallet key", proof.card_id);
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod card;
pub mod commands;
mod config;
mod crypto;
mod environment;
mod error;
pub mod session;
pub mod tasks;

pub use card::{
    BackupRawStatus, BackupStatus, Card, CardSettings, CardStatus, CardWallet, EllipticCurve,
    ExtendedPublicKey, FirmwareType, FirmwareVersion, InvalidFirmwareVersion, UnknownCurve,
    WalletIndex, WalletStatus,
};
pub use commands::{
    AttestWalletKeyCommand, AttestWalletKeyResponse, BackupCard, CardCommand, CheckWalletCommand,
    CheckWalletResponse, ConfirmationMode, CreateWalletCommand, CreateWalletResponse,
    LinkOriginCardCommand, LinkOriginCardResponse, LinkableOriginCard, OpenSessionCommand,
    OpenSessionResponse, PreflightReadMode, PurgeWalletCommand, PurgeWalletResponse, ReadCommand,
    ReadWalletCommand, ReadWalletResponse, ReadWalletsListCommand, ReadWalletsListResponse,
    SignHashesCommand, SignHashesResponse,
};
pub use config::{CardFilter, Config, ItemFilter};
pub use crypto::{CryptoProvider, KeyPair, SoftwareCrypto};
pub use environment::{SessionEnvironment, UserCode, UserCodeType};
pub use error::{Error, ErrorCategory, Result};
pub use session::{
    CancellationToken, CardSession, CardSessionRunnable, PreflightFilterFactory, SessionState,
    UserCodeProvider,
};
pub use tasks::{
    DeriveWalletPublicKeyTask, DeriveWalletPublicKeysTask, PreflightReadFilter, PreflightReadTask,
};

pub use coins_bip32::path::DerivationPath;
