use bytes::Bytes;
use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag, TlvError};
use serde::Serialize;
use tracing::debug;

use super::{
    CardCommand, PreflightReadMode, access_code, apdu, decode_card_id, find_wallet, passcode,
};
use crate::{
    Card, CardStatus, CryptoProvider, EllipticCurve, Error, Result, SessionEnvironment,
    WalletIndex, card::hex_bytes, commands::read_wallet::append_wallet_index,
};

const SIGNATURE_LEN: usize = 64;

/// Signs equally sized hashes with a wallet key
#[derive(Debug, Clone)]
pub struct SignHashesCommand {
    hashes: Vec<Bytes>,
    index: WalletIndex,
    terminal_signature: Option<Bytes>,
}

/// Signatures in request order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignHashesResponse {
    /// Card that answered
    pub card_id: String,
    /// One signature per hash, in request order
    #[serde(serialize_with = "hex_list")]
    pub signatures: Vec<Bytes>,
    /// Hashes signed by the wallet so far
    pub total_signed_hashes: Option<u32>,
}

fn hex_list<S: serde::Serializer>(
    items: &[Bytes],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(items.iter().map(hex::encode_upper))
}

impl SignHashesCommand {
    /// Sign `hashes` with the wallet at `index`
    ///
    /// Fails unless there is at least one hash and all have the same non-zero
    /// length.
    pub fn new(hashes: Vec<Bytes>, index: impl Into<WalletIndex>) -> Result<Self> {
        let Some(first) = hashes.first() else {
            return Err(Error::InvalidArgument("no hashes to sign"));
        };
        let size = first.len();
        if size == 0 || size > usize::from(u8::MAX) {
            return Err(Error::InvalidArgument("invalid hash size"));
        }
        if hashes.iter().any(|hash| hash.len() != size) {
            return Err(Error::InvalidArgument("hashes differ in size"));
        }

        Ok(Self {
            hashes,
            index: index.into(),
            terminal_signature: None,
        })
    }

    fn hash_size(&self) -> usize {
        self.hashes.first().map_or(0, Bytes::len)
    }

    fn joined_hashes(&self) -> Bytes {
        Bytes::from(self.hashes.concat())
    }
}

impl CardCommand for SignHashesCommand {
    type Response = SignHashesResponse;

    const INSTRUCTION: Instruction = Instruction::Sign;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        match &self.index {
            WalletIndex::PublicKey(key) => PreflightReadMode::ReadWallet(key.clone()),
            WalletIndex::Index(_) => PreflightReadMode::FullCardRead,
        }
    }

    fn requires_passcode(&self) -> bool {
        self.terminal_signature.is_none()
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.status == CardStatus::NotPersonalized {
            return Err(Error::NotPersonalized);
        }
        if card.activation_pending {
            return Err(Error::NotActivated);
        }
        if !find_wallet(card, &self.index)?.is_created() {
            return Err(Error::WalletNotFound);
        }
        Ok(())
    }

    fn prepare(
        &mut self,
        environment: &SessionEnvironment,
        crypto: &dyn CryptoProvider,
    ) -> Result<()> {
        let card = environment.card()?;
        self.terminal_signature = match &environment.terminal_keys {
            Some(keys) if card.settings.is_linked_terminal_enabled() => Some(crypto.sign(
                EllipticCurve::Secp256k1,
                &keys.private_key,
                &self.joined_hashes(),
            )?),
            _ => None,
        };
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = environment.card()?;
        let mut builder = environment
            .tlv_builder()
            .append(Tag::Pin, access_code(environment)?)?;
        if self.terminal_signature.is_none() {
            builder = builder.append(Tag::Pin2, passcode(environment)?)?;
        }

        let builder = builder
            .append(Tag::CardId, &card.card_id)?
            .append(Tag::TransactionOutHashSize, self.hash_size())?
            .append(Tag::TransactionOutHash, self.joined_hashes())?;
        let mut builder = append_wallet_index(builder, &self.index)?;

        if let (Some(signature), Some(keys)) =
            (&self.terminal_signature, &environment.terminal_keys)
        {
            builder = builder
                .append(Tag::TerminalPublicKey, keys.public_key.as_slice())?
                .append(Tag::TerminalTransactionSignature, signature)?;
        }

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.tlv()?;
        let card_id = decode_card_id(environment, &decoder)?;
        let joined: Bytes = decoder.decode(Tag::WalletSignature)?;
        if joined.len() != self.hashes.len() * SIGNATURE_LEN {
            return Err(TlvError::MalformedValue {
                tag: Tag::WalletSignature,
                reason: "signature count does not match hash count",
            }
            .into());
        }

        Ok(SignHashesResponse {
            card_id,
            signatures: joined
                .chunks(SIGNATURE_LEN)
                .map(Bytes::copy_from_slice)
                .collect(),
            total_signed_hashes: decoder.decode_optional(Tag::WalletSignedHashes)?,
        })
    }

    fn apply(&self, environment: &mut SessionEnvironment, response: &Self::Response) -> Result<()> {
        let wallet = environment
            .card_mut()?
            .wallet_mut(&self.index)
            .ok_or(Error::WalletNotFound)?;
        wallet.update_signed_hashes(response.total_signed_hashes);
        debug!(
            index = wallet.index,
            signed = ?wallet.signed_hashes,
            count = response.signatures.len(),
            "Hashes signed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cardwallet_apdu_core::{TlvBuilder, TlvDecoder};

    use super::*;
    use crate::{
        CardSettings, CardWallet, SoftwareCrypto, WalletStatus,
        commands::tests::{environment, success},
    };

    fn env_with_wallet(signed: u32) -> SessionEnvironment {
        let mut env = environment();
        env.card_mut().unwrap().set_wallets(vec![CardWallet {
            status: WalletStatus::Loaded,
            curve: Some(EllipticCurve::Secp256k1),
            public_key: Some(Bytes::from_static(&[0x02; 33])),
            signed_hashes: Some(signed),
            ..CardWallet::empty(0)
        }]);
        env
    }

    fn hashes() -> Vec<Bytes> {
        vec![Bytes::from_static(&[0x11; 32]), Bytes::from_static(&[0x22; 32])]
    }

    #[test]
    fn test_hash_validation() {
        assert!(matches!(
            SignHashesCommand::new(Vec::new(), 0u32),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            SignHashesCommand::new(
                vec![Bytes::from_static(&[0x11; 32]), Bytes::from_static(&[0x22; 20])],
                0u32
            ),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_counter_only_increases() {
        let mut env = env_with_wallet(10);
        let command = SignHashesCommand::new(hashes(), 0u32).unwrap();
        let response = |total: u32| {
            success(
                TlvBuilder::new(true)
                    .append(Tag::CardId, "CB79000000018201")
                    .unwrap()
                    .append(Tag::WalletSignature, vec![0xAB; 128])
                    .unwrap()
                    .append(Tag::WalletSignedHashes, total)
                    .unwrap(),
            )
        };

        let signed = command.deserialize(&env, &response(12)).unwrap();
        assert_eq!(signed.signatures.len(), 2);
        command.apply(&mut env, &signed).unwrap();
        assert_eq!(env.card().unwrap().wallets[0].signed_hashes, Some(12));

        let stale = command.deserialize(&env, &response(3)).unwrap();
        command.apply(&mut env, &stale).unwrap();
        assert_eq!(env.card().unwrap().wallets[0].signed_hashes, Some(12));
    }

    #[test]
    fn test_linked_terminal_replaces_passcode() {
        let crypto = SoftwareCrypto;
        let mut env = env_with_wallet(0);
        env.terminal_keys = Some(crypto.generate_key_pair(EllipticCurve::Secp256k1).unwrap());
        let mut command = SignHashesCommand::new(hashes(), 0u32).unwrap();

        command.prepare(&env, &crypto).unwrap();
        assert!(command.requires_passcode());

        env.card_mut().unwrap().settings =
            CardSettings(CardSettings::SKIP_SECURITY_DELAY_IF_VALIDATED_BY_LINKED_TERMINAL);
        command.prepare(&env, &crypto).unwrap();
        assert!(!command.requires_passcode());

        let request = TlvDecoder::new(&command.serialize(&env).unwrap().data).unwrap();
        assert!(!request.contains(Tag::Pin2));
        let keys = env.terminal_keys.as_ref().unwrap();
        let signature: Bytes = request.decode(Tag::TerminalTransactionSignature).unwrap();
        assert!(
            crypto
                .verify(
                    EllipticCurve::Secp256k1,
                    &keys.public_key,
                    &[[0x11; 32], [0x22; 32]].concat(),
                    &signature
                )
                .unwrap()
        );
    }
}
