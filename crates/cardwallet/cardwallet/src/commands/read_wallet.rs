use bytes::{Bytes, BytesMut};
use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag, TlvBuilder};
use coins_bip32::path::DerivationPath;
use serde::Serialize;

use super::{CardCommand, PreflightReadMode, access_code, apdu, decode_card_id};
use crate::{CardWallet, Result, SessionEnvironment, WalletIndex, card::hex_bytes};

/// Reads one wallet, or a key derived from it when a path is given
#[derive(Debug, Clone)]
pub struct ReadWalletCommand {
    index: WalletIndex,
    path: Option<DerivationPath>,
}

/// Wallet reported by the card
///
/// With a derivation path, `wallet.public_key` is the derived key and
/// `chain_code` its chain code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadWalletResponse {
    /// Card that answered
    pub card_id: String,
    /// Wallet as read; holds the child key when a path was given
    pub wallet: CardWallet,
    /// Chain code of a derived key
    #[serde(with = "hex_bytes::option")]
    pub chain_code: Option<Bytes>,
}

impl ReadWalletCommand {
    /// Read the wallet addressed by `index`
    pub fn new(index: impl Into<WalletIndex>) -> Self {
        Self {
            index: index.into(),
            path: None,
        }
    }

    /// Read the child key at `path` instead of the wallet key
    pub fn with_path(mut self, path: DerivationPath) -> Self {
        self.path = Some(path);
        self
    }

    /// Wallet this command reads
    pub const fn index(&self) -> &WalletIndex {
        &self.index
    }
}

pub(crate) fn derivation_path_to_bytes(path: &DerivationPath) -> Bytes {
    path.iter()
        .fold(BytesMut::new(), |mut bytes, component| {
            bytes.extend_from_slice(&component.to_be_bytes());
            bytes
        })
        .freeze()
}

/// Append the tag addressing `index`
pub(crate) fn append_wallet_index(builder: TlvBuilder, index: &WalletIndex) -> Result<TlvBuilder> {
    Ok(match index {
        WalletIndex::Index(index) => builder.append(Tag::WalletIndex, *index)?,
        WalletIndex::PublicKey(key) => builder.append(Tag::WalletPublicKey, key)?,
    })
}

impl CardCommand for ReadWalletCommand {
    type Response = ReadWalletResponse;

    const INSTRUCTION: Instruction = Instruction::ReadWallet;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = environment.card()?;
        let builder = environment
            .tlv_builder()
            .append(Tag::Pin, access_code(environment)?)?
            .append(Tag::CardId, &card.card_id)?;
        let builder = append_wallet_index(builder, &self.index)?
            .append_optional(Tag::WalletHdPath, self.path.as_ref().map(derivation_path_to_bytes))?;

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.tlv()?;
        let card_id = decode_card_id(environment, &decoder)?;
        let index = match &self.index {
            WalletIndex::Index(index) => Some(*index),
            WalletIndex::PublicKey(_) => None,
        };

        Ok(ReadWalletResponse {
            card_id,
            wallet: CardWallet::decode(&decoder, index)?,
            chain_code: decoder.decode_optional(Tag::WalletHdChain)?,
        })
    }

    fn apply(&self, environment: &mut SessionEnvironment, response: &Self::Response) -> Result<()> {
        // A derived key is not a wallet of its own.
        if self.path.is_none() {
            environment.card_mut()?.upsert_wallet(response.wallet.clone());
        }
        Ok(())
    }
}
