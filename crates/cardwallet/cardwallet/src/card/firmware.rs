use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Build flavour of the card operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareType {
    /// Developer build, version suffix `d`
    Sdk,
    /// Production build, version suffix `r`
    Release,
    /// Anything else
    Special,
}

impl FirmwareType {
    const fn from_suffix(suffix: Option<char>) -> Self {
        match suffix {
            Some('d') => Self::Sdk,
            Some('r') => Self::Release,
            _ => Self::Special,
        }
    }
}

/// Card operating system version, e.g. `4.52d SDK`
///
/// Ordering and equality consider the numeric part only.
#[derive(Debug, Clone, Copy)]
pub struct FirmwareVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
    /// Build flavour
    pub kind: FirmwareType,
}

impl FirmwareVersion {
    /// First version with several wallets per card
    pub const MULTI_WALLET_AVAILABLE: Self = Self::new(4, 0);
    /// First version that supports backup cards
    pub const BACKUP_AVAILABLE: Self = Self::new(4, 39);
    /// First version that accepts a confirmation mode on wallet attestation
    pub const ATTEST_WALLET_CONFIRMATION: Self = Self::new(6, 33);

    /// Create a release version from its numeric parts
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: 0,
            kind: FirmwareType::Release,
        }
    }

    /// Whether this version supports several wallets
    pub fn is_multi_wallet(&self) -> bool {
        *self >= Self::MULTI_WALLET_AVAILABLE
    }

    fn numeric(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }
}

/// Version string the card reported could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid firmware version: {0}")]
pub struct InvalidFirmwareVersion(pub String);

impl FromStr for FirmwareVersion {
    type Err = InvalidFirmwareVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidFirmwareVersion(s.to_string());
        let trimmed = s.trim();

        let end = trimmed
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(trimmed.len());
        let (numbers, rest) = trimmed.split_at(end);
        let kind = FirmwareType::from_suffix(rest.chars().next());

        let mut parts = numbers.split('.').map(str::parse::<u32>);
        let major = parts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
        let minor = parts.next().transpose().map_err(|_| invalid())?.unwrap_or(0);
        let patch = parts.next().transpose().map_err(|_| invalid())?.unwrap_or(0);
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
            kind,
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.patch != 0 {
            write!(f, ".{}", self.patch)?;
        }
        match self.kind {
            FirmwareType::Sdk => f.write_str("d SDK"),
            FirmwareType::Release => f.write_str("r"),
            FirmwareType::Special => Ok(()),
        }
    }
}

impl PartialEq for FirmwareVersion {
    fn eq(&self, other: &Self) -> bool {
        self.numeric() == other.numeric()
    }
}

impl Eq for FirmwareVersion {}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric().cmp(&other.numeric())
    }
}

impl Serialize for FirmwareVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FirmwareVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
