use bytes::Bytes;
use cardwallet_apdu_core::{
    CommandApdu, EncryptionKey, EncryptionMode, Instruction, ResponseApdu, Tag, TlvError,
};
use k256::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand_v8::thread_rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{CardCommand, PreflightReadMode, access_code, apdu};
use crate::{
    CryptoProvider, Error, Result, SessionEnvironment, card::hex_bytes,
    crypto::generate_ecdh_shared_secret,
};

const NONCE_LEN: usize = 16;

/// Negotiates the session encryption key
///
/// `fast` derives the key from two nonces and the access code; `strong` from an
/// ECDH agreement over secp256k1 and the access code.
#[derive(Debug, Clone)]
pub struct OpenSessionCommand {
    mode: EncryptionMode,
    nonce: Option<Bytes>,
    secret: Option<SecretKey>,
}

/// Card half of the key agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionResponse {
    /// Card nonce, or the card ephemeral key in strong mode
    #[serde(with = "hex_bytes")]
    pub session_key_b: Bytes,
}

impl OpenSessionCommand {
    /// Negotiate a key for `mode`
    pub const fn new(mode: EncryptionMode) -> Self {
        Self {
            mode,
            nonce: None,
            secret: None,
        }
    }

    fn session_key_a(&self) -> Result<Bytes> {
        match (self.mode, &self.nonce, &self.secret) {
            (EncryptionMode::Fast, Some(nonce), _) => Ok(nonce.clone()),
            (EncryptionMode::Strong, _, Some(secret)) => Ok(Bytes::copy_from_slice(
                secret.public_key().to_encoded_point(false).as_bytes(),
            )),
            _ => Err(Error::MissingContext("session key agreement")),
        }
    }

    fn derive_key(&self, access_code: &[u8; 32], card_half: &[u8]) -> Result<EncryptionKey> {
        let mut hasher = Sha256::new();
        match (self.mode, &self.nonce, &self.secret) {
            (EncryptionMode::Fast, Some(nonce), _) => {
                hasher.update(access_code);
                hasher.update(nonce);
                hasher.update(card_half);
            }
            (EncryptionMode::Strong, _, Some(secret)) => {
                let card_key = PublicKey::from_sec1_bytes(card_half).map_err(|_| {
                    TlvError::MalformedValue {
                        tag: Tag::SessionKeyB,
                        reason: "invalid public key",
                    }
                })?;
                let shared = generate_ecdh_shared_secret(secret, &card_key);
                hasher.update(shared.raw_secret_bytes());
                hasher.update(access_code);
            }
            _ => return Err(Error::MissingContext("session key agreement")),
        }
        Ok(EncryptionKey::from(<[u8; 32]>::from(hasher.finalize())))
    }
}

impl CardCommand for OpenSessionCommand {
    type Response = OpenSessionResponse;

    const INSTRUCTION: Instruction = Instruction::OpenSession;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn prepare(
        &mut self,
        _environment: &SessionEnvironment,
        crypto: &dyn CryptoProvider,
    ) -> Result<()> {
        match self.mode {
            EncryptionMode::None => return Err(Error::InvalidArgument("no encryption mode")),
            EncryptionMode::Fast => self.nonce = Some(crypto.random_bytes(NONCE_LEN)),
            EncryptionMode::Strong => self.secret = Some(SecretKey::random(&mut thread_rng())),
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = environment
            .tlv_builder()
            .append(Tag::SessionKeyA, self.session_key_a()?)?;

        Ok(apdu::<Self>(builder.serialize()?).with_encryption_mode(self.mode))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response> {
        Ok(OpenSessionResponse {
            session_key_b: response.tlv()?.decode(Tag::SessionKeyB)?,
        })
    }

    fn apply(&self, environment: &mut SessionEnvironment, response: &Self::Response) -> Result<()> {
        let key = self.derive_key(access_code(environment)?, &response.session_key_b)?;
        environment.set_encryption_key(Some(key));
        debug!(mode = ?self.mode, "Session encryption established");
        Ok(())
    }
}
