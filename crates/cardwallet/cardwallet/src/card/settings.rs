use serde::{Deserialize, Serialize};

/// Personalization settings bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardSettings(pub u32);

impl CardSettings {
    /// A purged wallet slot can be used again
    pub const REUSABLE: u32 = 0x0001;
    /// Wallets cannot be purged
    pub const PROHIBIT_PURGE_WALLET: u32 = 0x0004;
    /// Plain payloads are accepted
    pub const ALLOW_UNENCRYPTED: u32 = 0x1000;
    /// Fast session encryption is accepted
    pub const ALLOW_FAST_ENCRYPTION: u32 = 0x2000;
    /// Created wallets cannot be purged
    pub const PERMANENT_WALLET: u32 = 0x0010_0000;
    /// A linked terminal signature skips the security delay
    pub const SKIP_SECURITY_DELAY_IF_VALIDATED_BY_LINKED_TERMINAL: u32 = 0x0008_0000;
    /// Backup cards can be linked
    pub const ALLOW_BACKUP: u32 = 0x0800_0000;

    /// Raw mask
    pub const fn mask(self) -> u32 {
        self.0
    }

    /// Whether all bits of `flag` are set
    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Whether purged slots can be reused
    pub const fn is_reusable(self) -> bool {
        self.contains(Self::REUSABLE)
    }

    /// Whether wallets can never be purged
    pub const fn is_purge_prohibited(self) -> bool {
        self.contains(Self::PROHIBIT_PURGE_WALLET)
    }

    /// Wallets created under these settings can never be purged
    pub const fn is_permanent_wallet(self) -> bool {
        self.contains(Self::PERMANENT_WALLET)
    }

    /// Signing with a linked terminal skips the security delay
    pub const fn is_linked_terminal_enabled(self) -> bool {
        self.contains(Self::SKIP_SECURITY_DELAY_IF_VALIDATED_BY_LINKED_TERMINAL)
    }

    /// Whether backup cards can be linked
    pub const fn is_backup_allowed(self) -> bool {
        self.contains(Self::ALLOW_BACKUP)
    }
}

impl From<u32> for CardSettings {
    fn from(mask: u32) -> Self {
        Self(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let settings =
            CardSettings(CardSettings::ALLOW_BACKUP | CardSettings::REUSABLE | 0x0400);
        assert!(settings.is_backup_allowed());
        assert!(settings.is_reusable());
        assert!(!settings.is_linked_terminal_enabled());
        assert!(!settings.is_permanent_wallet());
        assert!(!CardSettings::default().is_backup_allowed());
    }
}
