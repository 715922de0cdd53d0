use bytes::Bytes;
use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag, TlvBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{CardCommand, access_code, apdu, decode_card_id, passcode};
use crate::{
    BackupRawStatus, BackupStatus, Card, Error, Result, SessionEnvironment,
    card::hex_bytes,
    environment::{UserCode, UserCodeType},
};

/// Origin card data needed to link backups to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkableOriginCard {
    /// Origin card linking key
    #[serde(with = "hex_bytes")]
    pub linking_key: Bytes,
    /// Issuer certificate of the origin linking key
    #[serde(with = "hex_bytes")]
    pub certificate: Bytes,
}

/// A backup card to be linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCard {
    /// Backup card id
    pub card_id: String,
    /// Backup card linking key
    #[serde(with = "hex_bytes")]
    pub linking_key: Bytes,
}

/// Links backup cards to the origin card
///
/// Backup blocks are written in the order given, each carrying its position.
#[derive(Debug, Clone)]
pub struct LinkOriginCardCommand {
    origin: LinkableOriginCard,
    backups: Vec<BackupCard>,
    attest_signature: Bytes,
    new_access_code: UserCode,
    new_passcode: UserCode,
}

/// Backup state reported after linking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOriginCardResponse {
    /// Card that answered
    pub card_id: String,
    /// Raw backup status after linking
    pub backup_status: BackupRawStatus,
}

impl LinkOriginCardCommand {
    /// Link `backups` to the origin card
    ///
    /// `access_code` and `passcode` are the codes shared by the whole backup set.
    pub fn new(
        origin: LinkableOriginCard,
        backups: Vec<BackupCard>,
        attest_signature: Bytes,
        access_code: &str,
        passcode: &str,
    ) -> Self {
        Self {
            origin,
            backups,
            attest_signature,
            new_access_code: UserCode::new(UserCodeType::AccessCode, access_code),
            new_passcode: UserCode::new(UserCodeType::Passcode, passcode),
        }
    }
}

impl CardCommand for LinkOriginCardCommand {
    type Response = LinkOriginCardResponse;

    const INSTRUCTION: Instruction = Instruction::LinkOriginCard;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if self.backups.is_empty() {
            return Err(Error::InvalidArgument("no backup cards to link"));
        }
        if card.has_created_wallets() || !card.settings.is_backup_allowed() {
            return Err(Error::BackupCannotBeCreated);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = environment.card()?;
        let mut builder = environment
            .tlv_builder()
            .append(Tag::CardId, &card.card_id)?
            .append(Tag::Pin, access_code(environment)?)?
            .append(Tag::Pin2, passcode(environment)?)?
            .append(Tag::OriginCardLinkingKey, &self.origin.linking_key)?
            .append(Tag::Certificate, &self.origin.certificate)?
            .append(Tag::BackupAttestSignature, &self.attest_signature)?
            .append(Tag::NewPin, self.new_access_code.hash())?
            .append(Tag::NewPin2, self.new_passcode.hash())?
            .append(Tag::SettingsMask, card.settings.mask())?;

        for (index, backup) in self.backups.iter().enumerate() {
            let link = TlvBuilder::new(environment.legacy_mode())
                .append(Tag::FileIndex, index)?
                .append(Tag::BackupCardLinkingKey, &backup.linking_key)?;
            builder = builder.append_nested(Tag::BackupCardLink, link)?;
        }

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.tlv()?;
        Ok(LinkOriginCardResponse {
            card_id: decode_card_id(environment, &decoder)?,
            backup_status: BackupRawStatus::try_from(decoder.decode::<u8>(Tag::BackupStatus)?)?,
        })
    }

    fn apply(&self, environment: &mut SessionEnvironment, response: &Self::Response) -> Result<()> {
        let status = BackupStatus::from_raw(response.backup_status, Some(self.backups.len()))?;
        info!(?status, "Backup cards linked");
        environment.card_mut()?.backup_status = Some(status);
        Ok(())
    }
}
