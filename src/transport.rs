use embedded_hal::blocking::spi::Transfer;
use switch_hal::OutputSwitch;

/// Byte clocked out when there is nothing to send.
const IDLE_BYTE: u8 = 0xFF;
/// Bytes moved per SPI transfer.
const CHUNK_SIZE: usize = 64;

/// Bus capability the driver runs over.
///
/// A transport is a half of a chip-select gated, full-duplex byte bus. Every call blocks until
/// the bytes are on the wire.
pub trait Transport {
    /// Transport error type.
    type Error;

    /// Exchange bytes. Byte `i` of `read` is clocked in while byte `i` of `write` is clocked
    /// out; once `write` is exhausted `0xFF` is sent.
    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error>;

    /// Send bytes, discarding what comes back. Returns the number of bytes written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        self.transact(data, &mut [])?;
        Ok(data.len())
    }

    /// Receive bytes while sending `0xFF`. Returns the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.transact(&[], buf)?;
        Ok(buf.len())
    }

    /// Assert chip select (line low).
    fn select(&mut self) -> Result<(), Self::Error>;

    /// Release chip select (line high).
    fn deselect(&mut self) -> Result<(), Self::Error>;
}

/// [`SpiTransport`] error.
///
/// `S` - SPI error type.
/// `C` - chip select switch error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError<S, C> {
    /// Error from the SPI peripheral.
    Spi(S),
    /// Couldn't set a select.
    ChipSelect(C),
}

/// [`Transport`] over an `embedded-hal` SPI bus and a `switch-hal` chip select.
///
/// `Spi` - SPI.
/// `Cs` - Chip select output switch. Switching it on must drive the line low, so build it
/// with `into_active_low_switch()`.
pub struct SpiTransport<Spi, Cs> {
    spi: Spi,
    cs: Cs,
}

impl<Spi: Transfer<u8>, Cs: OutputSwitch> SpiTransport<Spi, Cs> {
    /// Creates a new [`SpiTransport<Spi, Cs>`].
    pub fn new(spi: Spi, cs: Cs) -> Self {
        SpiTransport { spi, cs }
    }

    /// Give back the bus and the chip select.
    pub fn release(self) -> (Spi, Cs) {
        (self.spi, self.cs)
    }
}

impl<Spi: Transfer<u8>, Cs: OutputSwitch> Transport for SpiTransport<Spi, Cs> {
    type Error = TransportError<Spi::Error, Cs::Error>;

    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        let len = write.len().max(read.len());
        let mut chunk = [IDLE_BYTE; CHUNK_SIZE];
        let mut offset = 0;

        while offset < len {
            let size = CHUNK_SIZE.min(len - offset);
            for (i, byte) in chunk[..size].iter_mut().enumerate() {
                *byte = write.get(offset + i).copied().unwrap_or(IDLE_BYTE);
            }

            let received = self
                .spi
                .transfer(&mut chunk[..size])
                .map_err(TransportError::Spi)?;

            let end = read.len().min(offset + size);
            if offset < end {
                read[offset..end].copy_from_slice(&received[..end - offset]);
            }

            offset += size;
        }

        Ok(())
    }

    fn select(&mut self) -> Result<(), Self::Error> {
        self.cs.on().map_err(TransportError::ChipSelect)
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        self.cs.off().map_err(TransportError::ChipSelect)
    }
}
