use crate::{
    consts::{args, commands, BLOCK_SIZE, IDLE_CLOCKS},
    response::{Ocr, R1Response},
    Addressing, CardType, Error, ErrorFor, SdCard, SdCardConfig, Session, Transport,
};

impl<T: Transport, Config: SdCardConfig> SdCard<T, Config> {
    /// Initialize the card.
    ///
    /// Runs the power up sequence: idle clocks, CMD0, CMD8, ACMD41 until the card is ready,
    /// CMD58, and CMD16 for byte addressed cards. Any failure aborts the sequence; run it
    /// again to retry.
    pub fn init(&mut self) -> Result<Session, ErrorFor<T>> {
        info!("SD initialize started");

        let result = self.init_sequence();

        match &result {
            Ok(session) => info!(
                "SD successfully initialized, type: {:?}, addressing: {:?}",
                session.card_type(),
                session.addressing()
            ),
            Err(err) => error!("Failed to initialize SD: {}", err.as_str()),
        }

        result
    }

    fn init_sequence(&mut self) -> Result<Session, ErrorFor<T>> {
        self.send_idle_clocks()?;
        self.go_idle_state()?;

        let card_type = self.send_if_cond()?;
        self.send_op_cond(card_type)?;

        let ocr = self.read_ocr()?;
        let card_type = match card_type {
            CardType::SD2 if ocr.card_capacity_status() => CardType::SDHC,
            other => other,
        };
        let session = Session::new(card_type, ocr);

        if session.addressing() == Addressing::Byte {
            self.set_block_len()?;
        }

        Ok(session)
    }

    /// Clock the card with chip select released so it can enter SPI mode.
    fn send_idle_clocks(&mut self) -> Result<(), ErrorFor<T>> {
        self.deselect()?;
        self.send(&IDLE_CLOCKS)?;

        Ok(())
    }

    /// Reset the card into the idle state.
    fn go_idle_state(&mut self) -> Result<(), ErrorFor<T>> {
        info!("Enter to SPI mode for SD");

        let r1 = self.read_r1(commands::CMD0, 0x0000_0000)?;
        if r1 != R1Response::IN_IDLE_STATE {
            warn!("Wrong response from CMD0: 0x{:02X}", r1.bits());
            return Err(Error::HardwareConfigFailed);
        }

        Ok(())
    }

    /// Verify SD Memory Card interface operating condition.
    fn send_if_cond(&mut self) -> Result<CardType, ErrorFor<T>> {
        info!("Verifying SD Memory Card interface operating condition");

        let r7 = self.read_r3_r7(commands::CMD8, args::SEND_IF_COND)?;
        debug!(
            "CMD8 response: 0x{:02X} {:02X} {:02X} {:02X} {:02X}",
            r7.r1.bits(),
            r7.payload[0],
            r7.payload[1],
            r7.payload[2],
            r7.payload[3]
        );

        if r7.r1 == R1Response::IN_IDLE_AND_ILLEGAL {
            info!("SD doesn't know CMD8, assuming version 1");
            return Ok(CardType::SD1);
        }

        if r7.r1 != R1Response::IN_IDLE_STATE
            || r7.voltage_accepted() != args::VOLTAGE_ACCEPTED
            || r7.check_pattern() != args::CHECK_PATTERN
        {
            warn!("Wrong response from CMD8");
            return Err(Error::HardwareConfigFailed);
        }

        Ok(CardType::SD2)
    }

    /// Sends host capacity support information and activates, until the card leaves the
    /// idle state.
    fn send_op_cond(&mut self, card_type: CardType) -> Result<(), ErrorFor<T>> {
        info!("Sending host capacity support information and activates");

        let arg = match card_type {
            CardType::SD1 => 0x0000_0000,
            CardType::SD2 | CardType::SDHC => args::HOST_CAPACITY_SUPPORT,
        };

        for attempt in 0..Config::OP_COND_ATTEMPTS {
            match self.read_r1(commands::CMD55, 0x0000_0000) {
                Ok(r1) if !r1.has_errors() => {}
                Ok(_) | Err(Error::Timeout) => continue,
                Err(err) => return Err(err),
            }

            match self.read_r1(commands::ACMD41, arg) {
                Ok(R1Response::READY_STATE) => {
                    debug!("SD ready after {} ACMD41 attempts", attempt + 1);
                    return Ok(());
                }
                Ok(_) | Err(Error::Timeout) => {}
                Err(err) => return Err(err),
            }
        }

        warn!("SD didn't leave the idle state");
        Err(Error::Timeout)
    }

    /// Read the OCR of a ready card.
    fn read_ocr(&mut self) -> Result<Ocr, ErrorFor<T>> {
        info!("Reading SD operation conditions");

        let r3 = self.read_r3_r7(commands::CMD58, 0x0000_0000)?;
        debug!("CMD58 response: 0x{:02X}, OCR: 0x{:08X}", r3.r1.bits(), r3.ocr().bits());

        if r3.r1 != R1Response::READY_STATE {
            warn!("Wrong response from CMD58: 0x{:02X}", r3.r1.bits());
            return Err(Error::HardwareConfigFailed);
        }

        Ok(r3.ocr())
    }

    /// Set the block length of a byte addressed card.
    fn set_block_len(&mut self) -> Result<(), ErrorFor<T>> {
        info!("Setting SD block length");

        let r1 = self.read_r1(commands::CMD16, BLOCK_SIZE as u32)?;
        if r1 != R1Response::READY_STATE {
            warn!("Wrong response from CMD16: 0x{:02X}", r1.bits());
            return Err(Error::HardwareConfigFailed);
        }

        Ok(())
    }
}
