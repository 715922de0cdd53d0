use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag, TlvError};
use tracing::debug;

use super::{CardCommand, PreflightReadMode, access_code, apdu, decode_card_id};
use crate::{
    BackupRawStatus, BackupStatus, Card, CardSettings, CardStatus, CardWallet, FirmwareVersion,
    Result, SessionEnvironment,
};

/// Base card read
///
/// Cards without multi-wallet support report their single wallet inline; it
/// becomes wallet 0.
#[derive(Debug, Clone, Default)]
pub struct ReadCommand;

impl ReadCommand {
    /// Create a read command
    pub const fn new() -> Self {
        Self
    }
}

impl CardCommand for ReadCommand {
    type Response = Card;

    const INSTRUCTION: Instruction = Instruction::Read;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = environment
            .tlv_builder()
            .append(Tag::Pin, access_code(environment)?)?
            .append_optional(
                Tag::TerminalPublicKey,
                environment
                    .terminal_keys
                    .as_ref()
                    .map(|keys| keys.public_key.as_slice()),
            )?;

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Card> {
        let decoder = response.tlv()?;
        let card_id = decode_card_id(environment, &decoder)?;

        let firmware: String = decoder.decode(Tag::FirmwareVersion)?;
        let firmware_version = firmware
            .parse::<FirmwareVersion>()
            .map_err(|_| TlvError::MalformedValue {
                tag: Tag::FirmwareVersion,
                reason: "invalid firmware version",
            })?;

        let status = CardStatus::try_from(decoder.decode::<u8>(Tag::Status)?)?;
        let backup_status = decoder
            .decode_optional::<u8>(Tag::BackupStatus)?
            .map(|raw| {
                let count = decoder.decode_optional::<usize>(Tag::BackupCount)?;
                BackupStatus::from_raw(BackupRawStatus::try_from(raw)?, count)
            })
            .transpose()?;

        let mut card = Card {
            card_id,
            manufacturer_name: decoder.decode_optional(Tag::ManufacturerName)?.unwrap_or_default(),
            firmware_version,
            card_public_key: decoder.decode(Tag::CardPublicKey)?,
            issuer_public_key: decoder.decode_optional(Tag::IssuerPublicKey)?,
            settings: CardSettings(decoder.decode_optional(Tag::SettingsMask)?.unwrap_or_default()),
            status,
            curve: decoder.decode_optional(Tag::CurveId)?,
            activation_pending: decoder.decode(Tag::IsActivated)?,
            health: decoder.decode_optional(Tag::Health)?,
            wallets_count: decoder.decode_optional(Tag::WalletsCount)?,
            backup_status,
            wallets: Vec::new(),
            full_read: false,
        };

        if !card.firmware_version.is_multi_wallet() {
            card.wallets.push(CardWallet {
                status: status.into(),
                curve: card.curve,
                public_key: decoder.decode_optional(Tag::WalletPublicKey)?,
                signed_hashes: decoder.decode_optional(Tag::WalletSignedHashes)?,
                remaining_signatures: decoder.decode_optional(Tag::WalletRemainingSignatures)?,
                ..CardWallet::empty(0)
            });
            card.full_read = true;
        }

        Ok(card)
    }

    fn apply(&self, environment: &mut SessionEnvironment, card: &Card) -> Result<()> {
        let mut card = card.clone();
        if let Some(previous) = environment.card.take() {
            if card.firmware_version.is_multi_wallet() && previous.card_id == card.card_id {
                card.wallets = previous.wallets;
                card.full_read = previous.full_read;
            }
        }

        debug!(
            card_id = %card.card_id,
            firmware = %card.firmware_version,
            status = %card.status,
            "Card read"
        );
        environment.card = Some(card);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use cardwallet_apdu_core::TlvBuilder;

    use super::*;
    use crate::{Config, WalletStatus, commands::tests::success};

    fn response(firmware: &str, card_id: &str) -> ResponseApdu {
        success(
            TlvBuilder::new(true)
                .append(Tag::CardId, card_id)
                .unwrap()
                .append(Tag::ManufacturerName, "TANGEM")
                .unwrap()
                .append(Tag::Status, 2u8)
                .unwrap()
                .append(Tag::FirmwareVersion, firmware)
                .unwrap()
                .append(Tag::CardPublicKey, &[0x04; 65])
                .unwrap()
                .append(Tag::SettingsMask, CardSettings::ALLOW_BACKUP)
                .unwrap()
                .append(Tag::CurveId, "secp256k1")
                .unwrap()
                .append(Tag::WalletPublicKey, &[0x02; 33])
                .unwrap()
                .append(Tag::WalletSignedHashes, 5u32)
                .unwrap()
                .append(Tag::WalletsCount, 3u8)
                .unwrap(),
        )
    }

    #[test]
    fn test_single_wallet_card_gets_wallet_zero() {
        let env = SessionEnvironment::new(Config::default());
        let card = ReadCommand
            .deserialize(&env, &response("2.30r", "CB79000000018201"))
            .unwrap();
        assert!(card.is_fully_read());
        assert_eq!(card.wallets.len(), 1);
        assert_eq!(card.wallets[0].index, 0);
        assert_eq!(card.wallets[0].status, WalletStatus::Loaded);
        assert_eq!(card.wallets[0].signed_hashes, Some(5));
        assert_eq!(
            card.wallets[0].public_key,
            Some(Bytes::from_static(&[0x02; 33]))
        );
    }

    #[test]
    fn test_multi_wallet_card_keeps_known_wallets() {
        let mut env = SessionEnvironment::new(Config::default());
        let read = ReadCommand;
        let card = read.deserialize(&env, &response("4.52d SDK", "CB79000000018201")).unwrap();
        assert!(!card.is_fully_read());
        assert!(card.wallets.is_empty());
        assert!(!card.activation_pending);
        read.apply(&mut env, &card).unwrap();

        env.card_mut().unwrap().set_wallets(vec![CardWallet::empty(0)]);
        let again = read.deserialize(&env, &response("4.52d SDK", "CB79000000018201")).unwrap();
        read.apply(&mut env, &again).unwrap();
        assert!(env.card().unwrap().is_fully_read());
        assert_eq!(env.card().unwrap().wallets.len(), 1);
    }

    #[test]
    fn test_other_card_rejected() {
        let mut env = SessionEnvironment::new(Config::default());
        let card = ReadCommand
            .deserialize(&env, &response("4.52r", "CB79000000018201"))
            .unwrap();
        ReadCommand.apply(&mut env, &card).unwrap();

        assert!(matches!(
            ReadCommand.deserialize(&env, &response("4.52r", "CB79000000019999")),
            Err(crate::Error::WrongCardNumber { .. })
        ));
    }

    #[test]
    fn test_request_carries_access_code() {
        let env = SessionEnvironment::new(Config::default());
        let apdu = ReadCommand.serialize(&env).unwrap();
        assert_eq!(apdu.ins, Instruction::Read);
        assert_eq!(&apdu.data[..2], &[Tag::Pin.code(), 32]);
    }
}
