use std::str::FromStr;

use bytes::Bytes;
use cardwallet_apdu_core::{FromTlv, IntoTlv, Tag, TlvError, TlvValue};
use serde::{Deserialize, Serialize};

/// Elliptic curve of a wallet key, carried on the wire as its name
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum EllipticCurve {
    /// ECDSA over secp256k1
    #[serde(rename = "secp256k1")]
    #[display("secp256k1")]
    Secp256k1,
    /// EdDSA over Curve25519
    #[serde(rename = "ed25519")]
    #[display("ed25519")]
    Ed25519,
    /// ECDSA over NIST P-256
    #[serde(rename = "secp256r1")]
    #[display("secp256r1")]
    Secp256r1,
    /// BIP-340 Schnorr over secp256k1
    #[serde(rename = "bip0340")]
    #[display("bip0340")]
    Bip0340,
    /// Ed25519 with SLIP-0010 derivation
    #[serde(rename = "ed25519_slip0010")]
    #[display("ed25519_slip0010")]
    Ed25519Slip0010,
}

impl EllipticCurve {
    /// Every supported curve
    pub const ALL: [Self; 5] = [
        Self::Secp256k1,
        Self::Ed25519,
        Self::Secp256r1,
        Self::Bip0340,
        Self::Ed25519Slip0010,
    ];

    /// Curve name as sent to the card
    pub const fn name(self) -> &'static str {
        match self {
            Self::Secp256k1 => "secp256k1",
            Self::Ed25519 => "ed25519",
            Self::Secp256r1 => "secp256r1",
            Self::Bip0340 => "bip0340",
            Self::Ed25519Slip0010 => "ed25519_slip0010",
        }
    }

    /// Whether the card derives BIP-32 child keys on this curve
    pub const fn is_bip32_compatible(self) -> bool {
        matches!(self, Self::Secp256k1 | Self::Ed25519)
    }
}

/// Unknown curve name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown curve: {0}")]
pub struct UnknownCurve(pub String);

impl FromStr for EllipticCurve {
    type Err = UnknownCurve;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|curve| curve.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCurve(s.to_string()))
    }
}

impl FromTlv for EllipticCurve {
    fn from_tlv(tag: Tag, value: TlvValue) -> Result<Self, TlvError> {
        let name = String::from_tlv(tag, value)?;
        name.parse().map_err(|_| TlvError::MalformedValue {
            tag,
            reason: "unknown curve",
        })
    }
}

impl IntoTlv for EllipticCurve {
    fn into_tlv(self, tag: Tag) -> Result<Bytes, TlvError> {
        self.name().into_tlv(tag)
    }
}
