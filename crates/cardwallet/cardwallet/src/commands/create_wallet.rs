use bytes::Bytes;
use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag};
use serde::Serialize;
use tracing::info;

use super::{CardCommand, access_code, apdu, decode_card_id, passcode};
use crate::{
    Card, CardSettings, CardStatus, CardWallet, CryptoProvider, EllipticCurve, Error, Result,
    SessionEnvironment, WalletIndex, WalletStatus, card::hex_bytes,
};

/// Generates a wallet key in an empty slot
#[derive(Debug, Clone)]
pub struct CreateWalletCommand {
    curve: EllipticCurve,
    index: Option<u32>,
    settings: Option<CardSettings>,
    slot: Option<u32>,
}

/// Result of wallet creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletResponse {
    /// Card that answered
    pub card_id: String,
    /// Status of the slot after creation
    pub status: CardStatus,
    /// Slot of the new wallet
    pub index: u32,
    /// Public key of the new wallet
    #[serde(with = "hex_bytes")]
    pub public_key: Bytes,
}

impl CreateWalletCommand {
    /// Create a wallet on `curve` in the first empty slot
    pub const fn new(curve: EllipticCurve) -> Self {
        Self {
            curve,
            index: None,
            settings: None,
            slot: None,
        }
    }

    /// Use a specific slot
    pub const fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Wallet settings mask
    pub const fn with_settings(mut self, settings: CardSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    fn slot(&self) -> Result<u32> {
        self.slot.ok_or(Error::MissingContext("wallet slot"))
    }
}

impl CardCommand for CreateWalletCommand {
    type Response = CreateWalletResponse;

    const INSTRUCTION: Instruction = Instruction::CreateWallet;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.status == CardStatus::NotPersonalized {
            return Err(Error::NotPersonalized);
        }

        if !card.firmware_version.is_multi_wallet() {
            if card.status == CardStatus::Loaded {
                return Err(Error::WalletAlreadyCreated);
            }
            return Ok(());
        }

        match self.index {
            Some(index) if index >= card.slot_count() => {
                Err(Error::InvalidArgument("wallet index out of range"))
            }
            Some(index) => match card.wallet(&WalletIndex::Index(index)) {
                Some(wallet) if wallet.is_created() => Err(Error::WalletAlreadyCreated),
                _ => Ok(()),
            },
            None if card.first_empty_slot().is_none() => Err(Error::MaxWalletsCreated),
            None => Ok(()),
        }
    }

    fn prepare(
        &mut self,
        environment: &SessionEnvironment,
        _crypto: &dyn CryptoProvider,
    ) -> Result<()> {
        let card = environment.card()?;
        self.slot = match self.index {
            Some(index) => Some(index),
            None if card.firmware_version.is_multi_wallet() => {
                Some(card.first_empty_slot().ok_or(Error::MaxWalletsCreated)?)
            }
            None => Some(0),
        };
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = environment.card()?;
        let mut builder = environment
            .tlv_builder()
            .append(Tag::Pin, access_code(environment)?)?
            .append(Tag::Pin2, passcode(environment)?)?
            .append(Tag::CardId, &card.card_id)?;

        if card.firmware_version.is_multi_wallet() {
            builder = builder.append(Tag::WalletIndex, self.slot()?)?;
        }

        let builder = builder
            .append(Tag::CurveId, self.curve)?
            .append_optional(Tag::SettingsMask, self.settings.map(CardSettings::mask))?
            .append_optional(Tag::Cvc, environment.cvc.as_deref().map(str::as_bytes))?;

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.tlv()?;
        Ok(CreateWalletResponse {
            card_id: decode_card_id(environment, &decoder)?,
            status: CardStatus::try_from(decoder.decode::<u8>(Tag::Status)?)?,
            index: decoder.decode_optional(Tag::WalletIndex)?.map_or_else(|| self.slot(), Ok)?,
            public_key: decoder.decode(Tag::WalletPublicKey)?,
        })
    }

    fn apply(&self, environment: &mut SessionEnvironment, response: &Self::Response) -> Result<()> {
        if response.status != CardStatus::Loaded {
            return Ok(());
        }

        let card = environment.card_mut()?;
        if !card.firmware_version.is_multi_wallet() {
            card.status = CardStatus::Loaded;
        }
        card.upsert_wallet(CardWallet {
            status: WalletStatus::Loaded,
            curve: Some(self.curve),
            settings: self.settings,
            public_key: Some(response.public_key.clone()),
            signed_hashes: Some(0),
            ..CardWallet::empty(response.index)
        });
        info!(index = response.index, curve = %self.curve, "Wallet created");
        Ok(())
    }
}
