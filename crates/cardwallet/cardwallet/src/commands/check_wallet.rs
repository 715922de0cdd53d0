use bytes::Bytes;
use cardwallet_apdu_core::{CommandApdu, Instruction, ResponseApdu, Tag};
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    CardCommand, PreflightReadMode, access_code, apdu, challenge_or_random, decode_card_id,
};
use crate::{
    Card, CardStatus, CryptoProvider, EllipticCurve, Error, Result, SessionEnvironment,
    WalletIndex, card::hex_bytes,
};

/// Proves the card holds the private key of a wallet
///
/// The card signs `challenge || salt` with the wallet key, where the salt is
/// chosen by the card. A signature that does not verify fails with
/// [`Error::CardVerificationFailed`].
#[derive(Debug, Clone)]
pub struct CheckWalletCommand {
    public_key: Bytes,
    /// Caller supplied challenge, reused on every run
    supplied: Option<Bytes>,
    /// Challenge of the current run
    challenge: Option<Bytes>,
}

/// Proof returned by the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckWalletResponse {
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
}

impl CheckWalletCommand {
    /// Check the wallet with `public_key` against a fresh challenge
    pub const fn new(public_key: Bytes) -> Self {
        Self {
            public_key,
            supplied: None,
            challenge: None,
        }
    }

    /// Use a caller supplied challenge
    pub fn with_challenge(mut self, challenge: impl Into<Bytes>) -> Self {
        self.supplied = Some(challenge.into());
        self
    }

    fn challenge(&self) -> Result<&Bytes> {
        self.challenge.as_ref().ok_or(Error::MissingContext("challenge"))
    }
}

/// Curve of the wallet with `public_key`, falling back to the card curve
pub(crate) fn wallet_curve(card: &Card, public_key: &Bytes) -> Result<EllipticCurve> {
    card.wallet(&WalletIndex::PublicKey(public_key.clone()))
        .and_then(|wallet| wallet.curve)
        .or(card.curve)
        .ok_or(Error::MissingContext("wallet curve"))
}

impl CardCommand for CheckWalletCommand {
    type Response = CheckWalletResponse;

    const INSTRUCTION: Instruction = Instruction::AttestWalletKey;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadWallet(self.public_key.clone())
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.status == CardStatus::NotPersonalized {
            return Err(Error::NotPersonalized);
        }
        if card.activation_pending {
            return Err(Error::NotActivated);
        }
        Ok(())
    }

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
        let builder = environment
            .tlv_builder()
            .append(Tag::Pin, access_code(environment)?)?
            .append(Tag::CardId, &card.card_id)?
            .append(Tag::Challenge, self.challenge()?)?
            .append(Tag::WalletPublicKey, &self.public_key)?;

        Ok(apdu::<Self>(builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.tlv()?;
        Ok(CheckWalletResponse {
            card_id: decode_card_id(environment, &decoder)?,
            salt: decoder.decode(Tag::Salt)?,
            wallet_signature: decoder.decode(Tag::WalletSignature)?,
            challenge: self.challenge()?.clone(),
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

        if !crypto.verify(curve, &self.public_key, &message, &response.wallet_signature)? {
            warn!(card_id = %response.card_id, %curve, "Wallet signature does not verify");
            return Err(Error::CardVerificationFailed);
        }
        debug!(card_id = %response.card_id, "Wallet verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cardwallet_apdu_core::TlvBuilder;

    use super::*;
    use crate::{
        CardWallet, KeyPair, SoftwareCrypto, WalletStatus,
        commands::tests::{environment, success},
    };

    const CHALLENGE: [u8; 16] = [0x5A; 16];
    const SALT: [u8; 16] = [0xA5; 16];

    fn setup(curve: EllipticCurve) -> (SessionEnvironment, KeyPair) {
        let keys = SoftwareCrypto.generate_key_pair(curve).unwrap();
        let mut env = environment();
        env.card_mut().unwrap().set_wallets(vec![CardWallet {
            status: WalletStatus::Loaded,
            curve: Some(curve),
            public_key: Some(Bytes::from(keys.public_key.clone())),
            ..CardWallet::empty(0)
        }]);
        (env, keys)
    }

    fn respond(
        env: &SessionEnvironment,
        command: &CheckWalletCommand,
        signature: Bytes,
    ) -> Result<CheckWalletResponse> {
        let response = command.deserialize(
            env,
            &success(
                TlvBuilder::new(true)
                    .append(Tag::CardId, "CB79000000018201")
                    .unwrap()
                    .append(Tag::Salt, &SALT)
                    .unwrap()
                    .append(Tag::WalletSignature, signature)
                    .unwrap(),
            ),
        )?;
        command.verify(env, &response, &SoftwareCrypto)?;
        Ok(response)
    }

    #[test]
    fn test_valid_signature_accepted() {
        for curve in [EllipticCurve::Secp256k1, EllipticCurve::Ed25519] {
            let (env, keys) = setup(curve);
            let mut command = CheckWalletCommand::new(Bytes::from(keys.public_key.clone()))
                .with_challenge(Bytes::from_static(&CHALLENGE));
            command.prepare(&env, &SoftwareCrypto).unwrap();

            let signature = SoftwareCrypto
                .sign(curve, &keys.private_key, &[CHALLENGE, SALT].concat())
                .unwrap();
            let response = respond(&env, &command, signature).unwrap();
            assert_eq!(response.challenge.as_ref(), &CHALLENGE);
            assert_eq!(response.salt.as_ref(), &SALT);
        }
    }

    #[test]
    fn test_flipped_bit_fails_verification() {
        let (env, keys) = setup(EllipticCurve::Secp256k1);
        let mut command = CheckWalletCommand::new(Bytes::from(keys.public_key.clone()))
            .with_challenge(Bytes::from_static(&CHALLENGE));
        command.prepare(&env, &SoftwareCrypto).unwrap();

        let mut signature = SoftwareCrypto
            .sign(EllipticCurve::Secp256k1, &keys.private_key, &[CHALLENGE, SALT].concat())
            .unwrap()
            .to_vec();
        signature[10] ^= 0x01;
        let result = respond(&env, &command, Bytes::from(signature));
        assert!(matches!(result, Err(Error::CardVerificationFailed)));
        assert_eq!(
            result.unwrap_err().category(),
            crate::ErrorCategory::Verification
        );
    }

    #[test]
    fn test_generated_challenge() {
        let (env, keys) = setup(EllipticCurve::Secp256k1);
        let mut command = CheckWalletCommand::new(Bytes::from(keys.public_key.clone()));
        command.prepare(&env, &SoftwareCrypto).unwrap();
        assert_eq!(command.challenge().unwrap().len(), super::super::CHALLENGE_LEN);
    }

    #[test]
    fn test_each_run_draws_a_new_challenge() {
        let (env, keys) = setup(EllipticCurve::Secp256k1);
        let mut command = CheckWalletCommand::new(Bytes::from(keys.public_key.clone()));
        command.prepare(&env, &SoftwareCrypto).unwrap();
        let first = command.challenge().unwrap().clone();
        command.prepare(&env, &SoftwareCrypto).unwrap();
        assert_ne!(command.challenge().unwrap(), &first);

        let mut command = CheckWalletCommand::new(Bytes::from(keys.public_key.clone()))
            .with_challenge(Bytes::from_static(&CHALLENGE));
        command.prepare(&env, &SoftwareCrypto).unwrap();
        command.prepare(&env, &SoftwareCrypto).unwrap();
        assert_eq!(command.challenge().unwrap().as_ref(), &CHALLENGE);
    }

    #[test]
    fn test_inactive_card_rejected() {
        let (mut env, keys) = setup(EllipticCurve::Secp256k1);
        let card = env.card_mut().unwrap();
        card.activation_pending = true;
        assert!(matches!(
            CheckWalletCommand::new(Bytes::from(keys.public_key.clone())).perform_pre_check(card),
            Err(Error::NotActivated)
        ));
    }
}
