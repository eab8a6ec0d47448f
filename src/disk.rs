use crate::{
    consts::BLOCK_SIZE, Block, DefaultSdCardConfig, Error, SdCard, SdCardConfig, Session,
    Transport,
};

use core::cell::RefCell;
use diskio::{DiskioDevice, Error as DiskioError, IoctlCmd, Lba, Status, StatusFlag};

/// [`DiskioDevice`] over an [`SdCard`].
///
/// Multi-block buffers are transferred as consecutive single-block operations.
pub struct SdMmcDisk<T: Transport, Config: SdCardConfig = DefaultSdCardConfig> {
    card: RefCell<SdCard<T, Config>>,
    session: Option<Session>,
    status: Status,
}

impl<T: Transport, Config: SdCardConfig> SdMmcDisk<T, Config>
where
    T::Error: core::fmt::Debug,
{
    /// Creates a new, uninitialized [`SdMmcDisk<T, Config>`].
    pub fn new(card: SdCard<T, Config>) -> Self {
        SdMmcDisk {
            card: RefCell::new(card),
            session: None,
            status: StatusFlag::NotInitialized.into(),
        }
    }

    /// Session of the initialized card.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Give back the card driver.
    pub fn release(self) -> SdCard<T, Config> {
        self.card.into_inner()
    }

    /// Validate buffer for read/write.
    fn validate_buffer_len(buf_len: usize) -> Result<(), DiskioError<Error<T::Error>>> {
        if buf_len == 0 || buf_len % BLOCK_SIZE != 0 {
            error!(
                "SD invalid buffer, length: {}, block size: {}",
                buf_len, BLOCK_SIZE
            );
            Err(DiskioError::InvalidArgument)
        } else {
            Ok(())
        }
    }

    /// Session, if initialized.
    fn validate_initialized(&self) -> Result<&Session, DiskioError<Error<T::Error>>> {
        self.session.as_ref().ok_or(DiskioError::NotInitialized)
    }

    /// Block number of the `index`-th block of a transfer starting at `lba`.
    fn block_number(lba: Lba, index: usize) -> Result<u32, DiskioError<Error<T::Error>>> {
        u32::try_from(lba)
            .ok()
            .zip(u32::try_from(index).ok())
            .and_then(|(lba, index)| lba.checked_add(index))
            .ok_or(DiskioError::InvalidArgument)
    }
}

impl<T: Transport, Config: SdCardConfig> DiskioDevice for SdMmcDisk<T, Config>
where
    T::Error: core::fmt::Debug,
{
    type HardwareError = Error<T::Error>;

    fn status(&self) -> Status {
        self.status
    }

    fn reset(&mut self) {
        info!("SD reset invoked");
        self.session = None;
        self.status = StatusFlag::NotInitialized.into();
    }

    fn initialize(&mut self) -> Result<(), DiskioError<Self::HardwareError>> {
        if self.session.is_some() {
            warn!("SD already is initialized");
            return Err(DiskioError::AlreadyInitialized);
        }

        match self.card.get_mut().init() {
            Ok(session) => {
                self.session = Some(session);
                self.status = Status::default();
                Ok(())
            }
            Err(err) => {
                self.status = StatusFlag::ErrorOccured | StatusFlag::NotInitialized;
                Err(DiskioError::Hardware(err))
            }
        }
    }

    fn read(&self, buf: &mut [u8], lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        Self::validate_buffer_len(buf.len())?;
        let session = self.validate_initialized()?;
        let mut card = self.card.borrow_mut();

        for (index, chunk) in buf.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            let block = Self::block_number(lba, index)?;
            let chunk: &mut Block = chunk
                .try_into()
                .map_err(|_| DiskioError::InvalidArgument)?;

            card.read_block(session, block, chunk)
                .map_err(DiskioError::Hardware)?;
        }

        Ok(())
    }

    fn write(&self, buf: &[u8], lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        Self::validate_buffer_len(buf.len())?;
        let session = self.validate_initialized()?;
        let mut card = self.card.borrow_mut();

        for (index, chunk) in buf.chunks_exact(BLOCK_SIZE).enumerate() {
            let block = Self::block_number(lba, index)?;
            let chunk: &Block = chunk
                .try_into()
                .map_err(|_| DiskioError::InvalidArgument)?;

            card.write_block(session, block, chunk)
                .map_err(DiskioError::Hardware)?;
        }

        Ok(())
    }

    fn ioctl(&self, cmd: IoctlCmd) -> Result<(), DiskioError<Self::HardwareError>> {
        match cmd {
            // Writes wait for the card to finish programming before returning.
            IoctlCmd::CtrlSync => Ok(()),
            IoctlCmd::GetBlockSize(block_size) => {
                *block_size = BLOCK_SIZE;
                Ok(())
            }
            _ => Err(DiskioError::NotSupported),
        }
    }
}
