use bitfield::bitfield;
use core::ops::BitOr;

bitfield! {
    /// R1 response bitset.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R1Response(u8);
    impl Debug;
    pub in_idle_state, _: 0;
    pub erase_reset, _: 1;
    pub illegal_command, _: 2;
    pub command_crc_error, _: 3;
    pub erase_sequence_error, _: 4;
    pub address_error, _: 5;
    pub parameter_error, _: 6;
}

impl R1Response {
    /// Card is initialized, no error.
    pub const READY_STATE: Self = Self(0x00);
    /// Card is running its initialization process.
    pub const IN_IDLE_STATE: Self = Self(0x01);
    pub const ERASE_RESET: Self = Self(0x02);
    pub const ILLEGAL_COMMAND: Self = Self(0x04);
    pub const CRC_ERROR: Self = Self(0x08);
    pub const ERASE_SEQUENCE_ERROR: Self = Self(0x10);
    pub const ADDRESS_ERROR: Self = Self(0x20);
    pub const PARAMETER_ERROR: Self = Self(0x40);
    /// SD v1 answer to CMD8.
    pub const IN_IDLE_AND_ILLEGAL: Self = Self(0x05);

    /// Bit that is always zero in a real response.
    const START_BIT: u8 = 0x80;
    /// All error bits.
    const ERROR_BITS: u8 = 0x7E;

    /// Raw byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether the byte can be a response at all, i.e. the card is not still filling the bus.
    pub fn is_valid(self) -> bool {
        self.0 & Self::START_BIT == 0
    }

    /// Whether any error bit is set.
    pub fn has_errors(self) -> bool {
        self.0 & Self::ERROR_BITS != 0
    }

    /// Whether all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl From<u8> for R1Response {
    fn from(byte: u8) -> Self {
        Self(byte)
    }
}

impl BitOr for R1Response {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

bitfield! {
    /// Second byte of an R2 response.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R2Status(u8);
    impl Debug;
    pub card_locked, _: 0;
    pub lock_unlock_failed, _: 1;
    pub error, _: 2;
    pub card_controller_error, _: 3;
    pub card_ecc_failed, _: 4;
    pub write_protect_violation, _: 5;
    pub erase_param, _: 6;
    pub out_of_range, _: 7;
}

impl R2Status {
    /// Raw byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether no status bit is set.
    pub fn is_clear(self) -> bool {
        self.0 == 0
    }
}

/// R2 response, answer to SEND_STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct R2Response {
    pub r1: R1Response,
    pub status: R2Status,
}

impl R2Response {
    pub(crate) fn new(r1: R1Response, status: u8) -> Self {
        Self {
            r1,
            status: R2Status(status),
        }
    }
}

/// R3 OCR payload, or R7 interface condition payload.
pub type R3R7Payload = [u8; 4];

/// R3 or R7 response, answer to READ_OCR or SEND_IF_COND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct R3R7Response {
    pub r1: R1Response,
    /// Register contents, MSB first.
    pub payload: R3R7Payload,
}

impl R3R7Response {
    /// The payload read as an OCR.
    pub fn ocr(&self) -> Ocr {
        Ocr(u32::from_be_bytes(self.payload))
    }

    /// Voltage accepted field of an R7.
    pub fn voltage_accepted(&self) -> u8 {
        self.payload[2] & 0x0F
    }

    /// Echoed check pattern of an R7.
    pub fn check_pattern(&self) -> u8 {
        self.payload[3]
    }
}

bitfield! {
    /// Operation Conditions Register.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Ocr(u32);
    impl Debug;
    // Low while the card is busy.
    pub power_up_complete, _: 31;
    // CCS, set for block addressed (SDHC/SDXC) cards.
    pub card_capacity_status, _: 30;
    pub switching_to_1v8_accepted, _: 24;
    // 2.7V to 3.6V in 100mV steps.
    pub u16, voltage_window, _: 23, 15;
}

impl Ocr {
    /// Raw register value.
    pub fn bits(self) -> u32 {
        self.0
    }
}
