use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag, TlvDecoder};
use serde::Serialize;
use tracing::debug;

use super::{CardCommand, PreflightReadMode, access_code, apdu, decode_card_id};
use crate::{CardWallet, Result, SessionEnvironment};

/// Reads every wallet slot of a multi-wallet card
#[derive(Debug, Clone, Default)]
pub struct ReadWalletsListCommand;

/// Wallets reported by the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadWalletsListResponse {
    /// Card that answered
    pub card_id: String,
    /// Wallets in card order
    pub wallets: Vec<CardWallet>,
}

impl CardCommand for ReadWalletsListCommand {
    type Response = ReadWalletsListResponse;

    const INSTRUCTION: Instruction = Instruction::ReadWalletsList;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = environment.card()?;
        let builder = environment
            .tlv_builder()
            .append(Tag::Pin, access_code(environment)?)?
            .append(Tag::CardId, &card.card_id)?;

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.tlv()?;
        let card_id = decode_card_id(environment, &decoder)?;
        let wallets = decoder
            .decode_all::<TlvDecoder>(Tag::WalletInfo)?
            .iter()
            .enumerate()
            .map(|(position, wallet)| CardWallet::decode(wallet, u32::try_from(position).ok()))
            .collect::<Result<Vec<_>>>()?;

        Ok(ReadWalletsListResponse { card_id, wallets })
    }

    fn apply(&self, environment: &mut SessionEnvironment, response: &Self::Response) -> Result<()> {
        debug!(count = response.wallets.len(), "Wallet list read");
        environment.card_mut()?.set_wallets(response.wallets.clone());
        Ok(())
    }
}
