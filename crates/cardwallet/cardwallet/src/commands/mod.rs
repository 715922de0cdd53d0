//! Command protocol and the concrete card commands
//!
//! Every command goes through the same lifecycle, driven by
//! [`CardSession`](crate::CardSession):
//!
//! 1. [`perform_pre_check`](CardCommand::perform_pre_check) against the current card
//! 2. [`prepare`](CardCommand::prepare), e.g. drawing a fresh challenge
//! 3. [`serialize`](CardCommand::serialize) into a frame
//! 4. transmit, with security delay and reconnect handling in the session
//! 5. [`deserialize`](CardCommand::deserialize) the response
//! 6. [`verify`](CardCommand::verify) any proof in it
//! 7. [`apply`](CardCommand::apply) the response to the environment
//!
//! Only the last step mutates the environment.

mod attest_wallet_key;
mod check_wallet;
mod create_wallet;
mod link_origin_card;
mod open_session;
mod purge_wallet;
mod read;
mod read_wallet;
mod read_wallets_list;
mod sign_hashes;

use std::fmt;

pub use attest_wallet_key::{AttestWalletKeyCommand, AttestWalletKeyResponse, ConfirmationMode};
use bytes::Bytes;
use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag, TlvDecoder};
pub use check_wallet::{CheckWalletCommand, CheckWalletResponse};
pub use create_wallet::{CreateWalletCommand, CreateWalletResponse};
pub use link_origin_card::{
    BackupCard, LinkOriginCardCommand, LinkOriginCardResponse, LinkableOriginCard,
};
pub use open_session::{OpenSessionCommand, OpenSessionResponse};
pub use purge_wallet::{PurgeWalletCommand, PurgeWalletResponse};
pub use read::ReadCommand;
pub use read_wallet::{ReadWalletCommand, ReadWalletResponse};
pub use read_wallets_list::{ReadWalletsListCommand, ReadWalletsListResponse};
use serde::{Deserialize, Serialize};
pub use sign_hashes::{SignHashesCommand, SignHashesResponse};

use crate::{
    Card, CardWallet, CryptoProvider, Error, Result, SessionEnvironment, WalletIndex,
    environment::UserCodeType,
};

/// What must be known about the card before a command may run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreflightReadMode {
    /// Nothing; the command reads the card itself
    None,
    /// The base card read
    ReadCardOnly,
    /// The card and its wallet list
    FullCardRead,
    /// The card and one wallet
    #[serde(skip)]
    ReadWallet(Bytes),
}

impl PreflightReadMode {
    /// Whether `card` already satisfies this mode
    pub fn is_satisfied_by(&self, card: Option<&Card>) -> bool {
        match (self, card) {
            (Self::None, _) => true,
            (_, None) => false,
            (Self::ReadCardOnly, Some(_)) => true,
            (Self::FullCardRead, Some(card)) => card.is_fully_read(),
            (Self::ReadWallet(key), Some(card)) => card
                .wallet(&WalletIndex::PublicKey(key.clone()))
                .is_some(),
        }
    }
}

/// The contract every card command implements
pub trait CardCommand: fmt::Debug {
    /// Decoded response
    type Response: fmt::Debug;

    /// Instruction sent in the frame header
    const INSTRUCTION: Instruction;

    /// Card state the session must read before running this command
    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::FullCardRead
    }

    /// Whether the access code must be known before sending
    fn requires_access_code(&self) -> bool {
        true
    }

    /// Whether the passcode must be known before sending
    fn requires_passcode(&self) -> bool {
        false
    }

    /// Whether the payload follows the session encryption
    fn is_encrypted(&self) -> bool {
        true
    }

    /// Reject an ineligible card before anything is sent
    fn perform_pre_check(&self, _card: &Card) -> Result<()> {
        Ok(())
    }

    /// Draw random values or signatures the request needs
    ///
    /// Runs at the start of every run; frames resent within that run carry the same values.
    fn prepare(
        &mut self,
        _environment: &SessionEnvironment,
        _crypto: &dyn CryptoProvider,
    ) -> Result<()> {
        Ok(())
    }

    /// Build the plain request frame
    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu>;

    /// Decode a successful, decrypted response
    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response>;

    /// Check proofs carried by the response
    fn verify(
        &self,
        _environment: &SessionEnvironment,
        _response: &Self::Response,
        _crypto: &dyn CryptoProvider,
    ) -> Result<()> {
        Ok(())
    }

    /// Update the environment with a verified response
    fn apply(
        &self,
        _environment: &mut SessionEnvironment,
        _response: &Self::Response,
    ) -> Result<()> {
        Ok(())
    }
}

/// Frame with the given payload for `C`
pub(crate) const fn apdu<C: CardCommand>(data: Bytes) -> CommandApdu {
    CommandApdu::new(C::INSTRUCTION, data)
}

pub(crate) fn access_code(environment: &SessionEnvironment) -> Result<&[u8; 32]> {
    environment.user_code_hash(UserCodeType::AccessCode)
}

pub(crate) fn passcode(environment: &SessionEnvironment) -> Result<&[u8; 32]> {
    environment.user_code_hash(UserCodeType::Passcode)
}

/// Decode the card id and reject one that differs from the session card
pub(crate) fn decode_card_id(
    environment: &SessionEnvironment,
    decoder: &TlvDecoder,
) -> Result<String> {
    let card_id: String = decoder.decode(Tag::CardId)?;
    if let Some(card) = &environment.card {
        if !card.card_id.eq_ignore_ascii_case(&card_id) {
            tracing::warn!(
                expected = %card.card_id,
                actual = %card_id,
                "Response from another card"
            );
            return Err(Error::WrongCardNumber {
                expected: card.card_id.clone(),
                actual: card_id,
            });
        }
    }
    Ok(card_id)
}

/// Wallet addressed by `index` on the session card
pub(crate) fn find_wallet<'a>(card: &'a Card, index: &WalletIndex) -> Result<&'a CardWallet> {
    card.wallet(index).ok_or(Error::WalletNotFound)
}

/// Fresh challenge unless one was supplied
pub(crate) fn challenge_or_random(
    supplied: Option<&Bytes>,
    crypto: &dyn CryptoProvider,
) -> Result<Bytes> {
    match supplied {
        Some(challenge) if challenge.is_empty() => Err(Error::InvalidArgument("empty challenge")),
        Some(challenge) => Ok(challenge.clone()),
        None => Ok(crypto.random_bytes(CHALLENGE_LEN)),
    }
}

/// Length of generated challenges
pub const CHALLENGE_LEN: usize = 16;
