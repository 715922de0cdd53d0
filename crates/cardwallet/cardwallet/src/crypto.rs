//! Signing, verification, hashing and randomness
//!
//! Commands reach cryptography only through [`CryptoProvider`], so a platform
//! keystore or a hardware RNG can replace [`SoftwareCrypto`].

use std::fmt;

use bytes::Bytes;
use k256::{
    PublicKey, SecretKey,
    ecdh::SharedSecret,
    ecdsa::signature::{Signer, Verifier},
    elliptic_curve::sec1::ToEncodedPoint,
};
use rand::RngCore;
use rand_v8::thread_rng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{EllipticCurve, Error, Result};

/// A key pair on one curve
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    /// Secret scalar or seed
    pub private_key: Vec<u8>,
    /// Public key in the curve's wire encoding
    pub public_key: Vec<u8>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode_upper(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Cryptographic capability used by commands
pub trait CryptoProvider: Send + Sync + fmt::Debug {
    /// Verify `signature` over `message` with `public_key`
    ///
    /// A signature that cannot be parsed verifies as `false`. A public key that
    /// cannot be parsed is an error.
    fn verify(
        &self,
        curve: EllipticCurve,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool>;

    /// Sign `message` with `private_key`
    fn sign(&self, curve: EllipticCurve, private_key: &[u8], message: &[u8]) -> Result<Bytes>;

    /// Secure random bytes
    fn random_bytes(&self, len: usize) -> Bytes;

    /// SHA-256 digest
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    /// Generate a fresh key pair
    fn generate_key_pair(&self, curve: EllipticCurve) -> Result<KeyPair>;
}

/// Pure Rust implementation of [`CryptoProvider`]
///
/// ECDSA over SHA-256 for secp256k1 and secp256r1, BIP-340 Schnorr, and Ed25519.
/// ECDSA signatures are raw 64-byte `r || s`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCrypto;

fn crypto_error(e: impl fmt::Display) -> Error {
    Error::Crypto(e.to_string())
}

fn x_only(public_key: &[u8]) -> &[u8] {
    match public_key {
        [0x02 | 0x03, rest @ ..] if rest.len() == 32 => rest,
        [0x04, rest @ ..] if rest.len() == 64 => &rest[..32],
        _ => public_key,
    }
}

fn ed25519_key<'a>(bytes: &'a [u8], what: &str) -> Result<&'a [u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| Error::Crypto(format!("invalid {what} length: {}", bytes.len())))
}

impl CryptoProvider for SoftwareCrypto {
    fn verify(
        &self,
        curve: EllipticCurve,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        match curve {
            EllipticCurve::Secp256k1 => {
                let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(crypto_error)?;
                let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                let signature = signature.normalize_s().unwrap_or(signature);
                Ok(key.verify(message, &signature).is_ok())
            }
            EllipticCurve::Secp256r1 => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(crypto_error)?;
                let Ok(signature) = p256::ecdsa::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(key.verify(message, &signature).is_ok())
            }
            EllipticCurve::Bip0340 => {
                let key = k256::schnorr::VerifyingKey::from_bytes(x_only(public_key))
                    .map_err(crypto_error)?;
                let Ok(signature) = k256::schnorr::Signature::try_from(signature) else {
                    return Ok(false);
                };
                Ok(key.verify(message, &signature).is_ok())
            }
            EllipticCurve::Ed25519 | EllipticCurve::Ed25519Slip0010 => {
                let key = ed25519_dalek::VerifyingKey::from_bytes(ed25519_key(
                    public_key,
                    "public key",
                )?)
                .map_err(crypto_error)?;
                let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(key.verify(message, &signature).is_ok())
            }
        }
    }

    fn sign(&self, curve: EllipticCurve, private_key: &[u8], message: &[u8]) -> Result<Bytes> {
        let signature = match curve {
            EllipticCurve::Secp256k1 => {
                let key = k256::ecdsa::SigningKey::from_slice(private_key).map_err(crypto_error)?;
                let signature: k256::ecdsa::Signature = key.sign(message);
                signature.to_bytes().to_vec()
            }
            EllipticCurve::Secp256r1 => {
                let key = p256::ecdsa::SigningKey::from_slice(private_key).map_err(crypto_error)?;
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_bytes().to_vec()
            }
            EllipticCurve::Bip0340 => {
                let key =
                    k256::schnorr::SigningKey::from_bytes(private_key).map_err(crypto_error)?;
                let signature: k256::schnorr::Signature = key.sign(message);
                signature.to_bytes().to_vec()
            }
            EllipticCurve::Ed25519 | EllipticCurve::Ed25519Slip0010 => {
                let key =
                    ed25519_dalek::SigningKey::from_bytes(ed25519_key(private_key, "private key")?);
                key.sign(message).to_bytes().to_vec()
            }
        };
        Ok(Bytes::from(signature))
    }

    fn random_bytes(&self, len: usize) -> Bytes {
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        Bytes::from(bytes)
    }

    fn generate_key_pair(&self, curve: EllipticCurve) -> Result<KeyPair> {
        let (private_key, public_key) = match curve {
            EllipticCurve::Secp256k1 => {
                let secret = SecretKey::random(&mut thread_rng());
                let public = secret.public_key().to_encoded_point(false);
                (secret.to_bytes().to_vec(), public.as_bytes().to_vec())
            }
            EllipticCurve::Secp256r1 => {
                let secret = p256::SecretKey::random(&mut thread_rng());
                let public = secret.public_key().to_encoded_point(false);
                (secret.to_bytes().to_vec(), public.as_bytes().to_vec())
            }
            EllipticCurve::Bip0340 => {
                let secret = k256::schnorr::SigningKey::random(&mut thread_rng());
                let public = secret.verifying_key().to_bytes();
                (secret.to_bytes().to_vec(), public.to_vec())
            }
            EllipticCurve::Ed25519 | EllipticCurve::Ed25519Slip0010 => {
                let mut seed = [0u8; 32];
                rand::rng().fill_bytes(&mut seed);
                let secret = ed25519_dalek::SigningKey::from_bytes(&seed);
                seed.zeroize();
                (
                    secret.to_bytes().to_vec(),
                    secret.verifying_key().to_bytes().to_vec(),
                )
            }
        };
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }
}

/// ECDH over secp256k1
pub(crate) fn generate_ecdh_shared_secret(private: &SecretKey, public: &PublicKey) -> SharedSecret {
    k256::elliptic_curve::ecdh::diffie_hellman(private.to_nonzero_scalar(), public.as_affine())
}
