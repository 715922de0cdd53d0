use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag};
use serde::Serialize;
use tracing::info;

use super::{CardCommand, access_code, apdu, decode_card_id, find_wallet, passcode};
use crate::{Card, CardStatus, Error, Result, SessionEnvironment, WalletIndex};

/// Erases the key of a wallet slot
#[derive(Debug, Clone)]
pub struct PurgeWalletCommand {
    index: u32,
}

/// Result of a purge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeWalletResponse {
    /// Card that answered
    pub card_id: String,
    /// Status of the slot after the purge
    pub status: CardStatus,
}

impl PurgeWalletCommand {
    /// Purge the wallet in slot `index`
    pub const fn new(index: u32) -> Self {
        Self { index }
    }
}

impl CardCommand for PurgeWalletCommand {
    type Response = PurgeWalletResponse;

    const INSTRUCTION: Instruction = Instruction::PurgeWallet;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.status == CardStatus::NotPersonalized {
            return Err(Error::NotPersonalized);
        }

        let wallet = find_wallet(card, &WalletIndex::Index(self.index))?;
        if !wallet.is_created() {
            return Err(Error::WalletNotFound);
        }

        let permanent = wallet.settings.is_some_and(|settings| settings.is_permanent_wallet());
        if permanent || card.settings.is_purge_prohibited() {
            return Err(Error::PurgeWalletProhibited);
        }
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
            builder = builder.append(Tag::WalletIndex, self.index)?;
        }

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.tlv()?;
        Ok(PurgeWalletResponse {
            card_id: decode_card_id(environment, &decoder)?,
            status: CardStatus::try_from(decoder.decode::<u8>(Tag::Status)?)?,
        })
    }

    fn apply(&self, environment: &mut SessionEnvironment, response: &Self::Response) -> Result<()> {
        let card = environment.card_mut()?;
        if !card.firmware_version.is_multi_wallet() {
            card.status = response.status;
        }
        if matches!(response.status, CardStatus::Empty | CardStatus::Purged) {
            card.purge_wallet(self.index);
            info!(index = self.index, "Wallet purged");
        }
        Ok(())
    }
}
