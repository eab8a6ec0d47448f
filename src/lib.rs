//! SD card block storage over SPI, written in Embedded Rust.
//!
//! This crate is intended to allow you to init/read/write SD cards by SPI bus, one 512-byte
//! block at a time. The bus is reached through the [`Transport`] capability: use
//! [`SpiTransport`] for an `embedded-hal` SPI bus with a `switch-hal` chip select, or bring your
//! own implementation.
//!
//! [`SdCard::init`] returns a [`Session`] holding the addressing mode of the card; pass it to
//! every block operation. [`SdMmcDisk`] wraps both into a [`DiskioDevice`].
//!
//! ## Features
//!
//! * `defmt`: log through defmt.
//! * `log`: log through the `log` facade.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

mod command;
mod config;
mod consts;
mod crc;
mod csd;
mod disk;
mod init;
mod response;
mod transport;

pub use crate::command::{build_command, CommandFrame};
pub use crate::config::{DefaultSdCardConfig, SdCardConfig};
pub use crate::consts::BLOCK_SIZE;
pub use crate::crc::{crc16, crc7};
pub use crate::csd::{Csd, CsdData, CsdV1, CsdV2};
pub use crate::disk::SdMmcDisk;
pub use crate::response::{Ocr, R1Response, R2Response, R2Status, R3R7Payload, R3R7Response};
pub use crate::transport::{SpiTransport, Transport, TransportError};
pub use diskio::{
    BlockSize, DiskioDevice, Error as DiskioError, IoctlCmd, Lba, Status, StatusFlag,
};

use crate::consts::{commands, tokens, BYTE_ADDRESS_SHIFT};

use core::marker::PhantomData;

/// [`SdCard`] result error.
///
/// `T` - transport error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<T> {
    /// Error from the transport.
    Transport(T),
    /// Bad argument, or the card reported an error after a write.
    InvalidParameter,
    /// The card did not answer within the attempt budget.
    Timeout,
    /// The card answered an initialization step with an unexpected response.
    HardwareConfigFailed,
    /// The card refused a block command.
    InvalidHardware,
    /// CRC mismatch (card, host).
    InvalidCrc(u16, u16),
    /// The card did not accept a written block (data response token).
    DataRejected(u8),
}

impl<T> Error<T> {
    /// Static name of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::Transport(_) => "Transport",
            Error::InvalidParameter => "InvalidParameter",
            Error::Timeout => "Timeout",
            Error::HardwareConfigFailed => "HardwareConfigFailed",
            Error::InvalidHardware => "InvalidHardware",
            Error::InvalidCrc(_, _) => "InvalidCrc",
            Error::DataRejected(_) => "DataRejected",
        }
    }
}

/// Card type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardType {
    /// SD version 1, standard capacity.
    SD1,
    /// SD version 2, standard capacity.
    SD2,
    /// SD version 2, high or extended capacity.
    SDHC,
}

/// How block numbers map to command arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Addressing {
    /// Arguments are byte addresses.
    Byte,
    /// Arguments are block numbers.
    Block,
}

impl Addressing {
    /// Left shift applied to a block number.
    pub fn shift(self) -> u32 {
        match self {
            Addressing::Byte => BYTE_ADDRESS_SHIFT,
            Addressing::Block => 0,
        }
    }
}

/// State of an initialized card, returned by [`SdCard::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    card_type: CardType,
    addressing: Addressing,
    ocr: Ocr,
}

impl Session {
    pub(crate) fn new(card_type: CardType, ocr: Ocr) -> Self {
        let addressing = if ocr.card_capacity_status() {
            Addressing::Block
        } else {
            Addressing::Byte
        };

        Session {
            card_type,
            addressing,
            ocr,
        }
    }

    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// OCR read during initialization.
    pub fn ocr(&self) -> Ocr {
        self.ocr
    }

    /// Command argument for a block number, `None` if it doesn't fit.
    pub fn block_address(&self, block: u32) -> Option<u32> {
        block.checked_mul(1 << self.addressing.shift())
    }
}

/// A data block.
pub type Block = [u8; BLOCK_SIZE];

/// Error type alias.
type ErrorFor<T> = Error<<T as Transport>::Error>;

/// SD Card SPI driver.
///
/// `T` - bus transport.
/// `Config` - Config implementation of driver config trait.
///
/// The driver does no locking: one operation owns the bus from its first chip select to its
/// last. Callers sharing a card between tasks must serialize the calls.
pub struct SdCard<T: Transport, Config: SdCardConfig = DefaultSdCardConfig> {
    transport: T,
    config: PhantomData<Config>,
}

impl<T: Transport, Config: SdCardConfig> SdCard<T, Config> {
    /// Creates a new [`SdCard<T, Config>`].
    pub fn new(transport: T) -> Self {
        SdCard {
            transport,
            config: PhantomData::<Config>,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport.
    pub fn release(self) -> T {
        self.transport
    }

    /// Activate chip select.
    fn select(&mut self) -> Result<(), ErrorFor<T>> {
        self.transport.select().map_err(Error::Transport)
    }

    /// Deactivate chip select.
    fn deselect(&mut self) -> Result<(), ErrorFor<T>> {
        self.transport.deselect().map_err(Error::Transport)
    }

    /// Run `f` with chip select active. Chip select is released whatever `f` returns.
    fn cs_scope<R, F>(&mut self, f: F) -> Result<R, ErrorFor<T>>
    where
        F: FnOnce(&mut Self) -> Result<R, ErrorFor<T>>,
    {
        self.select()?;
        let result = f(self);
        let deselected = self.deselect();

        let value = result?;
        deselected?;
        Ok(value)
    }

    /// Send bytes to the SD card.
    fn send(&mut self, data: &[u8]) -> Result<usize, ErrorFor<T>> {
        self.transport.write(data).map_err(Error::Transport)
    }

    /// Receive bytes from the SD card.
    fn receive_slice(&mut self, data: &mut [u8]) -> Result<usize, ErrorFor<T>> {
        self.transport.read(data).map_err(Error::Transport)
    }

    /// Receive a byte from the SD card by clocking out an 0xFF byte.
    fn receive(&mut self) -> Result<u8, ErrorFor<T>> {
        let mut byte = [tokens::AVAILABLE];
        self.receive_slice(&mut byte)?;
        Ok(byte[0])
    }

    /// Wait for a token accepted by `token_validator`, reading at most `attempts` bytes.
    fn wait_for_token<F: Fn(u8) -> bool>(
        &mut self,
        attempts: usize,
        token_validator: F,
    ) -> Result<u8, ErrorFor<T>> {
        for _ in 0..attempts {
            let token = self.receive()?;

            if token_validator(token) {
                return Ok(token);
            }
        }

        Err(Error::Timeout)
    }

    /// Send a command frame and poll for its R1. Chip select must be active.
    fn command(&mut self, cmd: u8, arg: u32) -> Result<R1Response, ErrorFor<T>> {
        self.send(&build_command(cmd, arg))?;

        match self.wait_for_token(Config::READ_RESPONSE_ATTEMPTS, |token| {
            R1Response::from(token).is_valid()
        }) {
            Ok(token) => Ok(R1Response::from(token)),
            Err(Error::Timeout) => {
                warn!("No response to CMD{}", cmd);
                Err(Error::Timeout)
            }
            Err(err) => Err(err),
        }
    }

    /// Send a command and read its R1 response.
    pub fn read_r1(&mut self, cmd: u8, arg: u32) -> Result<R1Response, ErrorFor<T>> {
        self.cs_scope(|s| s.command(cmd, arg))
    }

    /// Send a command and read its R2 response.
    pub fn read_r2(&mut self, cmd: u8, arg: u32) -> Result<R2Response, ErrorFor<T>> {
        self.cs_scope(|s| {
            let r1 = s.command(cmd, arg)?;
            let status = s.receive()?;

            Ok(R2Response::new(r1, status))
        })
    }

    /// Send a command and read its R3 or R7 response.
    pub fn read_r3_r7(&mut self, cmd: u8, arg: u32) -> Result<R3R7Response, ErrorFor<T>> {
        self.cs_scope(|s| {
            let r1 = s.command(cmd, arg)?;
            let mut payload = R3R7Payload::default();
            s.receive_slice(&mut payload)?;

            Ok(R3R7Response { r1, payload })
        })
    }

    /// Convert a block number to a command argument.
    fn block_address(session: &Session, block: u32) -> Result<u32, ErrorFor<T>> {
        session.block_address(block).ok_or_else(|| {
            error!("SD block {} out of the byte address range", block);
            Error::InvalidParameter
        })
    }

    /// Send a block command and check the card accepted it.
    fn block_command(&mut self, cmd: u8, address: u32) -> Result<(), ErrorFor<T>> {
        let r1 = self.read_r1(cmd, address)?;

        if r1 != R1Response::READY_STATE {
            error!(
                "CMD{} refused, address: {}, response: 0x{:02X}",
                cmd,
                address,
                r1.bits()
            );
            Err(Error::InvalidHardware)
        } else {
            Ok(())
        }
    }

    /// Read a data packet: start token, `data.len()` bytes, big-endian CRC16.
    ///
    /// The packet is always drained completely; `data` holds what the card sent even when
    /// the CRC does not match.
    fn read_data(&mut self, data: &mut [u8]) -> Result<usize, ErrorFor<T>> {
        if let Err(err) = self.wait_for_token(Config::START_TOKEN_ATTEMPTS, |token| {
            token == tokens::DATA_START_BLOCK
        }) {
            warn!("SD start token not received");
            return Err(err);
        }

        let read = self.receive_slice(data)?;
        let mut crc = [0u8; 2];
        self.receive_slice(&mut crc)?;

        let card_crc = u16::from_be_bytes(crc);
        let host_crc = crc16(data);

        if card_crc != host_crc {
            warn!(
                "SD data CRC mismatch, card: 0x{:04X}, host: 0x{:04X}",
                card_crc, host_crc
            );
            return Err(Error::InvalidCrc(card_crc, host_crc));
        }

        Ok(read)
    }

    /// Write a data packet and wait for the card to finish programming it.
    fn write_data(&mut self, data: &[u8]) -> Result<usize, ErrorFor<T>> {
        let host_crc = crc16(data);

        self.send(&[tokens::DATA_START_BLOCK])?;
        let written = self.send(data)?;
        self.send(&host_crc.to_be_bytes())?;

        let token = self.receive()?;
        if token & tokens::DATA_RES_MASK != tokens::DATA_RES_ACCEPTED {
            error!("SD rejected data, token: 0x{:02X}", token);
            return Err(Error::DataRejected(token));
        }

        // The data response token is the first read of the busy budget.
        let attempts = Config::WRITE_BUSY_ATTEMPTS.saturating_sub(1);
        match self.wait_for_token(attempts, |token| token == tokens::AVAILABLE) {
            Ok(_) => Ok(written),
            Err(Error::Timeout) => {
                warn!("SD still busy after write");
                Err(Error::Timeout)
            }
            Err(err) => Err(err),
        }
    }

    /// Read one block.
    ///
    /// Returns the number of bytes read. On [`Error::InvalidCrc`] `buf` still holds the data
    /// sent by the card.
    pub fn read_block(
        &mut self,
        session: &Session,
        block: u32,
        buf: &mut Block,
    ) -> Result<usize, ErrorFor<T>> {
        let address = Self::block_address(session, block)?;
        trace!("SD read block {}", block);

        self.block_command(commands::CMD17, address)?;
        self.cs_scope(|s| s.read_data(buf))
    }

    /// Write one block.
    ///
    /// Returns the number of bytes written.
    pub fn write_block(
        &mut self,
        session: &Session,
        block: u32,
        data: &Block,
    ) -> Result<usize, ErrorFor<T>> {
        let address = Self::block_address(session, block)?;
        trace!("SD write block {}", block);

        self.block_command(commands::CMD24, address)?;
        let written = self.cs_scope(|s| s.write_data(data))?;

        let r2 = self.read_r2(commands::CMD13, 0x0000_0000)?;
        if !r2.status.is_clear() {
            error!("SD write failed, status: 0x{:02X}", r2.status.bits());
            return Err(Error::InvalidParameter);
        }

        Ok(written)
    }

    /// Read the Card Specific Data register.
    pub fn read_csd(&mut self) -> Result<Csd, ErrorFor<T>> {
        let mut data = CsdData::default();

        self.block_command(commands::CMD9, 0x0000_0000)?;
        self.cs_scope(|s| s.read_data(&mut data))?;

        Csd::parse(data).ok_or_else(|| {
            error!("Unknown CSD structure");
            Error::HardwareConfigFailed
        })
    }
}
