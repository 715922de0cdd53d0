use bytes::Bytes;
use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    CardCommand, access_code, apdu, challenge_or_random, check_wallet::wallet_curve,
    decode_card_id, find_wallet,
};
use crate::{
    CryptoProvider, Error, FirmwareVersion, Result, SessionEnvironment, WalletIndex,
    card::hex_bytes,
};

/// Extra proof of wallet ownership signed with the card key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMode {
    /// No card signature
    None,
    /// Card signs the wallet public key
    Static,
    /// Card signs the wallet public key, the challenge and a fresh salt
    #[default]
    Dynamic,
}

/// Proves wallet key possession, optionally confirmed by the card key
#[derive(Debug, Clone)]
pub struct AttestWalletKeyCommand {
    public_key: Bytes,
    /// Caller supplied challenge, reused on every run
    supplied: Option<Bytes>,
    /// Challenge of the current run
    challenge: Option<Bytes>,
    confirmation_mode: ConfirmationMode,
}

/// Attestation returned by the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestWalletKeyResponse {
    /// Card that answered
    pub card_id: String,
    /// Salt chosen by the card
    #[serde(with = "hex_bytes")]
    pub salt: Bytes,
    /// Wallet signature over `challenge || salt`
    #[serde(with = "hex_bytes")]
    pub wallet_signature: Bytes,
    /// Challenge the card signed
    #[serde(with = "hex_bytes")]
    pub challenge: Bytes,
    /// Card key signature, depending on the confirmation mode
    #[serde(with = "hex_bytes::option")]
    pub card_signature: Option<Bytes>,
    /// Salt of a dynamic confirmation
    #[serde(with = "hex_bytes::option")]
    pub public_key_salt: Option<Bytes>,
    /// Number of attestations performed by the card
    pub counter: Option<u32>,
}

impl AttestWalletKeyCommand {
    /// Attest the wallet with `public_key` using dynamic confirmation
    pub fn new(public_key: Bytes) -> Self {
        Self {
            public_key,
            supplied: None,
            challenge: None,
            confirmation_mode: ConfirmationMode::default(),
        }
    }

    /// Use a caller supplied challenge
    pub fn with_challenge(mut self, challenge: impl Into<Bytes>) -> Self {
        self.supplied = Some(challenge.into());
        self
    }

    /// Confirmation requested from the card key
    pub const fn with_confirmation_mode(mut self, mode: ConfirmationMode) -> Self {
        self.confirmation_mode = mode;
        self
    }

    fn challenge(&self) -> Result<&Bytes> {
        self.challenge.as_ref().ok_or(Error::MissingContext("challenge"))
    }
}

impl CardCommand for AttestWalletKeyCommand {
    type Response = AttestWalletKeyResponse;

    const INSTRUCTION: Instruction = Instruction::AttestWalletKey;

    fn prepare(
        &mut self,
        _environment: &SessionEnvironment,
        crypto: &dyn CryptoProvider,
    ) -> Result<()> {
        self.challenge = Some(challenge_or_random(self.supplied.as_ref(), crypto)?);
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = environment.card()?;
        let wallet = find_wallet(card, &WalletIndex::PublicKey(self.public_key.clone()))?;
        let challenge = self.challenge()?;

        let mut builder = environment
            .tlv_builder()
            .append(Tag::Pin, access_code(environment)?)?
            .append(Tag::CardId, &card.card_id)?
            .append(Tag::Challenge, challenge)?
            .append(Tag::WalletIndex, wallet.index)?;

        // Older firmware rejects the confirmation tag.
        if card.firmware_version >= FirmwareVersion::ATTEST_WALLET_CONFIRMATION {
            builder = match self.confirmation_mode {
                ConfirmationMode::None => builder,
                ConfirmationMode::Static => builder.append(Tag::PublicKeyChallenge, Bytes::new())?,
                ConfirmationMode::Dynamic => builder.append(Tag::PublicKeyChallenge, challenge)?,
            };
        }

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.tlv()?;
        Ok(AttestWalletKeyResponse {
            card_id: decode_card_id(environment, &decoder)?,
            salt: decoder.decode(Tag::Salt)?,
            wallet_signature: decoder.decode(Tag::WalletSignature)?,
            challenge: self.challenge()?.clone(),
            card_signature: decoder.decode_optional(Tag::CardSignature)?,
            public_key_salt: decoder.decode_optional(Tag::PublicKeySalt)?,
            counter: decoder.decode_optional(Tag::CheckWalletCounter)?,
        })
    }

    fn verify(
        &self,
        environment: &SessionEnvironment,
        response: &Self::Response,
        crypto: &dyn CryptoProvider,
    ) -> Result<()> {
        let curve = wallet_curve(environment.card()?, &self.public_key)?;
        let message = [response.challenge.as_ref(), response.salt.as_ref()].concat();

        if crypto.verify(curve, &self.public_key, &message, &response.wallet_signature)? {
            Ok(())
        } else {
            warn!(card_id = %response.card_id, %curve, "Wallet attestation does not verify");
            Err(Error::CardVerificationFailed)
        }
    }
}
