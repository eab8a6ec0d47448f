/// Size of a data block in bytes.
pub const BLOCK_SIZE: usize = 512;
/// Size of a command frame in bytes.
pub const COMMAND_SIZE: usize = 6;
/// 80 clock cycles with chip select released, required before the first command.
pub const IDLE_CLOCKS: [u8; 10] = [0xFF; 10];
/// Left shift turning a block number into a byte address.
pub const BYTE_ADDRESS_SHIFT: u32 = 9;

pub mod commands {
    /// GO_IDLE_STATE - init card in spi mode if CS low.
    pub const CMD0: u8 = 0;
    /// SEND_IF_COND - verify SD Memory Card interface operating condition.
    pub const CMD8: u8 = 8;
    /// SEND_CSD - read the Card Specific Data (CSD register).
    pub const CMD9: u8 = 9;
    /// SEND_STATUS - read the card status register.
    pub const CMD13: u8 = 13;
    /// SET_BLOCKLEN - set the block length of a byte addressed card.
    pub const CMD16: u8 = 16;
    /// READ_SINGLE_BLOCK - read a single data block from the card.
    pub const CMD17: u8 = 17;
    /// WRITE_BLOCK - write a single data block to the card.
    pub const CMD24: u8 = 24;
    /// SD_SEND_OP_COND - sends host capacity support information and activates
    /// the card's initialization process. Must follow CMD55.
    pub const ACMD41: u8 = 41;
    /// APP_CMD - escape for application specific command.
    pub const CMD55: u8 = 55;
    /// READ_OCR - read the OCR register of a card.
    pub const CMD58: u8 = 58;
}

pub mod args {
    /// CMD8 argument: 2.7-3.6V supply and the check pattern.
    pub const SEND_IF_COND: u32 = 0x0000_0100 | CHECK_PATTERN as u32;
    /// Check pattern echoed back by CMD8.
    pub const CHECK_PATTERN: u8 = 0x5A;
    /// Voltage accepted field of a CMD8 answer for 2.7-3.6V.
    pub const VOLTAGE_ACCEPTED: u8 = 0x01;
    /// HCS bit of the ACMD41 argument.
    pub const HOST_CAPACITY_SUPPORT: u32 = 0x4000_0000;
}

pub mod tokens {
    /// Start data token for read or write single block.
    pub const DATA_START_BLOCK: u8 = 0xFE;
    /// Bus released by the card.
    pub const AVAILABLE: u8 = 0xFF;
    /// Mask for data response tokens after a write block operation.
    pub const DATA_RES_MASK: u8 = 0x1F;
    /// Write data accepted token.
    pub const DATA_RES_ACCEPTED: u8 = 0x05;
}
