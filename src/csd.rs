use crate::consts::{BLOCK_SIZE, BYTE_ADDRESS_SHIFT};

use bitfield::bitfield;
use size::Size;

/// Card Specific Data register as read from the card.
pub type CsdData = [u8; 16];

bitfield! {
    /// Card Specific Data, version 1 (standard capacity).
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct CsdV1(u128);
    impl Debug;
    pub u8, version, _: 127, 126;
    pub u8, max_data_transfer_rate, _: 103, 96;
    pub u16, card_command_classes, _: 95, 84;
    pub u8, read_block_length, _: 83, 80;
    pub u16, device_size, _: 73, 62;
    pub u8, device_size_multiplier, _: 49, 47;
    pub permanent_write_protection, _: 13;
    pub temporary_write_protection, _: 12;
    pub u8, crc, _: 7, 1;
}

bitfield! {
    /// Card Specific Data, version 2 (high capacity).
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct CsdV2(u128);
    impl Debug;
    pub u8, version, _: 127, 126;
    pub u8, max_data_transfer_rate, _: 103, 96;
    pub u16, card_command_classes, _: 95, 84;
    pub u8, read_block_length, _: 83, 80;
    pub u32, device_size, _: 69, 48;
    pub permanent_write_protection, _: 13;
    pub temporary_write_protection, _: 12;
    pub u8, crc, _: 7, 1;
}

impl CsdV1 {
    /// Capacity in 512-byte blocks: `(C_SIZE + 1) * 2^(C_SIZE_MULT + 2) * 2^READ_BL_LEN / 512`.
    pub fn block_count(&self) -> u64 {
        let exponent =
            u32::from(self.device_size_multiplier()) + 2 + u32::from(self.read_block_length());
        ((u64::from(self.device_size()) + 1) << exponent) >> BYTE_ADDRESS_SHIFT
    }
}

impl CsdV2 {
    /// Capacity in 512-byte blocks: `(C_SIZE + 1) * 512KiB / 512`.
    pub fn block_count(&self) -> u64 {
        (u64::from(self.device_size()) + 1) * 1024
    }
}

/// Card Specific Data, either layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Csd {
    V1(CsdV1),
    V2(CsdV2),
}

impl Csd {
    /// CSD_STRUCTURE value of a version 1 register.
    const STRUCTURE_V1: u8 = 0;
    /// CSD_STRUCTURE value of a version 2 register.
    const STRUCTURE_V2: u8 = 1;

    /// Decode a register, `None` for an unknown structure version.
    pub fn parse(data: CsdData) -> Option<Self> {
        let raw = u128::from_be_bytes(data);
        match CsdV1(raw).version() {
            Self::STRUCTURE_V1 => Some(Csd::V1(CsdV1(raw))),
            Self::STRUCTURE_V2 => Some(Csd::V2(CsdV2(raw))),
            _ => None,
        }
    }

    /// Returns the card capacity in 512-byte blocks.
    pub fn block_count(&self) -> u64 {
        match self {
            Csd::V1(csd) => csd.block_count(),
            Csd::V2(csd) => csd.block_count(),
        }
    }

    /// Returns the card capacity in bytes.
    pub fn card_capacity(&self) -> Size {
        Size::from_bytes(self.block_count() * BLOCK_SIZE as u64)
    }

    /// Whether either write protection flag is set.
    pub fn is_write_protected(&self) -> bool {
        match self {
            Csd::V1(csd) => csd.permanent_write_protection() || csd.temporary_write_protection(),
            Csd::V2(csd) => csd.permanent_write_protection() || csd.temporary_write_protection(),
        }
    }
}
