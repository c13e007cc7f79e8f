//! Device identification decoded from the version reply.

use bitflags::bitflags;

bitflags! {
    /// On-device UI languages/regions enabled on the scope.
    ///
    /// The wire encodes these as (index, enabled) byte pairs; indexes 12-15
    /// have no known name yet but are representable, since the device masks
    /// the index with `0x0F`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Locales: u16 {
        const CHINA = 1 << 0;
        const TAIWAN = 1 << 1;
        const ENGLISH = 1 << 2;
        const FRENCH = 1 << 3;
        const SPAIN = 1 << 4;
        const RUSSIA = 1 << 5;
        const GERMANY = 1 << 6;
        const POLAND = 1 << 7;
        const BRAZIL = 1 << 8;
        const ITALY = 1 << 9;
        const JAPAN = 1 << 10;
        const KOREA = 1 << 11;
    }
}

impl Default for Locales {
    fn default() -> Self {
        Locales::empty()
    }
}

/// Identification fields accumulated from the version reply.
///
/// Fields are populated incrementally as the record is parsed and decode
/// independently of each other; a failed exchange leaves whatever was
/// already decoded in place.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Board version text reported by the scope.
    pub board_version: Option<String>,
    /// Serial number text reported by the scope.
    pub serial_number: Option<String>,
    /// Enabled UI languages/regions.
    pub locales: Locales,
    /// Meaning unknown, reported by the device as property 4.
    pub neutral: bool,
    /// Firmware is pluggable.
    pub pluggable: bool,
    /// Firmware is encrypted.
    pub encrypted: bool,
    /// Device supports the new single trigger.
    pub single_trigger: bool,
    /// Device runs a unified clock.
    pub unified_clock: bool,
}

impl DeviceIdentity {
    /// Whether the identification exchange has produced the textual fields.
    ///
    /// The flags cannot be told apart from their defaults, so population is
    /// judged by the two text properties every record carries.
    pub fn is_populated(&self) -> bool {
        self.board_version.is_some() && self.serial_number.is_some()
    }
}
