/// Represents config for [`SdCard`](crate::SdCard).
///
/// Every wait in the driver is bounded by a number of byte reads, never by wall clock time,
/// so the real duration depends on the bus clock.
pub trait SdCardConfig {
    /// Max bytes to read while waiting for a command response.
    const READ_RESPONSE_ATTEMPTS: usize;
    /// Max CMD55 + ACMD41 rounds while the card leaves the idle state.
    const OP_COND_ATTEMPTS: usize;
    /// Max bytes to read while waiting for the start of a data block.
    const START_TOKEN_ATTEMPTS: usize;
    /// Max bytes to read while the card is busy programming a written block.
    const WRITE_BUSY_ATTEMPTS: usize;
}

/// Default implementation of [`SdCardConfig`](crate::SdCardConfig).
pub struct DefaultSdCardConfig;

impl SdCardConfig for DefaultSdCardConfig {
    const READ_RESPONSE_ATTEMPTS: usize = 8;
    const OP_COND_ATTEMPTS: usize = 2048;
    const START_TOKEN_ATTEMPTS: usize = 32;
    const WRITE_BUSY_ATTEMPTS: usize = 2048;
}
