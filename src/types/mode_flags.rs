//! Mode flag bitfield carried in the heartbeat `base_mode` byte.

use serde::{Deserialize, Serialize};

/// System mode bitfield reported in every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeFlags(pub u8);

impl ModeFlags {
    pub const CUSTOM_MODE_ENABLED: u8 = 0x01;
    pub const TEST_ENABLED: u8 = 0x02;
    pub const AUTO_ENABLED: u8 = 0x04;
    pub const GUIDED_ENABLED: u8 = 0x08;
    pub const STABILIZE_ENABLED: u8 = 0x10;
    pub const HIL_ENABLED: u8 = 0x20;
    pub const MANUAL_INPUT_ENABLED: u8 = 0x40;
    pub const SAFETY_ARMED: u8 = 0x80;

    /// Create from the raw wire byte.
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    /// Check if a specific flag is set using a bitmask.
    pub fn has_flag(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    /// Whether the safety-armed bit is set.
    pub fn is_armed(&self) -> bool {
        self.has_flag(Self::SAFETY_ARMED)
    }

    /// Get the raw byte value.
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Decompose into the names of every set flag, low bit first.
    pub fn names(&self) -> Vec<&'static str> {
        const TABLE: [(u8, &str); 8] = [
            (ModeFlags::CUSTOM_MODE_ENABLED, "CUSTOM_MODE_ENABLED"),
            (ModeFlags::TEST_ENABLED, "TEST_ENABLED"),
            (ModeFlags::AUTO_ENABLED, "AUTO_ENABLED"),
            (ModeFlags::GUIDED_ENABLED, "GUIDED_ENABLED"),
            (ModeFlags::STABILIZE_ENABLED, "STABILIZE_ENABLED"),
            (ModeFlags::HIL_ENABLED, "HIL_ENABLED"),
            (ModeFlags::MANUAL_INPUT_ENABLED, "MANUAL_INPUT_ENABLED"),
            (ModeFlags::SAFETY_ARMED, "SAFETY_ARMED"),
        ];
        TABLE
            .iter()
            .filter(|(mask, _)| self.has_flag(*mask))
            .map(|(_, name)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_decompose_set_bits() {
        let flags = ModeFlags::new(ModeFlags::SAFETY_ARMED | ModeFlags::GUIDED_ENABLED);
        assert_eq!(flags.names(), vec!["GUIDED_ENABLED", "SAFETY_ARMED"]);
        assert!(flags.is_armed());
    }

    #[test]
    fn boundary_values() {
        assert!(ModeFlags::new(0x00).names().is_empty());
        assert_eq!(ModeFlags::new(0xFF).names().len(), 8);
    }
}
