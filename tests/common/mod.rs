//! In-memory SD card speaking the SPI protocol.

#![allow(dead_code)]

use sdcard_spi::{crc16, crc7, SdCard, Transport, BLOCK_SIZE};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Bus failure injected by the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

/// A decoded command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub index: u8,
    pub arg: u32,
}

const DATA_PACKET_SIZE: usize = 1 + BLOCK_SIZE + 2;

pub struct FakeCard {
    /// Report CCS in the OCR.
    pub high_capacity: bool,
    /// Answer CMD8 as illegal.
    pub legacy: bool,
    /// ACMD41 answers "idle" this many times before "ready".
    pub op_cond_busy_rounds: usize,
    /// Filler bytes before every response.
    pub response_delay: usize,
    /// Filler bytes between a read R1 and the start token.
    pub token_delay: usize,
    /// Busy bytes after a data response.
    pub busy_bytes: usize,
    /// Byte on which the card lets go of a low bus, sent after the busy bytes.
    pub release_byte: Option<u8>,
    /// Second byte of the CMD13 answer.
    pub write_status: u8,
    /// Data response token replacing "accepted".
    pub reject_writes: Option<u8>,
    /// Send a wrong CRC with read blocks.
    pub corrupt_read_crc: bool,
    /// Byte on the bus when the card has nothing to say.
    pub idle_byte: u8,
    /// Never answer commands.
    pub muted: bool,
    /// Fail every exchange.
    pub broken: bool,
    /// Raw answers replacing the protocol ones, per command index, used once each.
    pub overrides: HashMap<u8, VecDeque<Vec<u8>>>,
    pub csd: [u8; 16],
    pub blocks: BTreeMap<u32, [u8; BLOCK_SIZE]>,

    pub commands: Vec<Command>,
    pub selected: bool,
    pub chip_select: Vec<bool>,
    /// 0xFF bytes clocked while deselected.
    pub idle_clocks: usize,
    pub bytes_read: usize,
    /// CRCs that came with written blocks.
    pub written_crcs: Vec<u16>,

    rx: VecDeque<u8>,
    ready: bool,
    app_command: bool,
    pending_write: Option<(u32, Vec<u8>)>,
}

impl FakeCard {
    /// SDHC card.
    pub fn new() -> Self {
        FakeCard {
            high_capacity: true,
            legacy: false,
            op_cond_busy_rounds: 0,
            response_delay: 1,
            token_delay: 2,
            busy_bytes: 3,
            release_byte: None,
            write_status: 0x00,
            reject_writes: None,
            corrupt_read_crc: false,
            idle_byte: 0xFF,
            muted: false,
            broken: false,
            overrides: HashMap::new(),
            csd: [0; 16],
            blocks: BTreeMap::new(),
            commands: Vec::new(),
            selected: false,
            chip_select: Vec::new(),
            idle_clocks: 0,
            bytes_read: 0,
            written_crcs: Vec::new(),
            rx: VecDeque::new(),
            ready: false,
            app_command: false,
            pending_write: None,
        }
    }

    /// SD v2 standard capacity card.
    pub fn standard_capacity() -> Self {
        FakeCard {
            high_capacity: false,
            ..FakeCard::new()
        }
    }

    /// SD v1 card.
    pub fn legacy() -> Self {
        FakeCard {
            high_capacity: false,
            legacy: true,
            ..FakeCard::new()
        }
    }

    /// Queue a raw answer for the next `index` command.
    pub fn answer(&mut self, index: u8, bytes: &[u8]) -> &mut Self {
        self.overrides
            .entry(index)
            .or_default()
            .push_back(bytes.to_vec());
        self
    }

    pub fn command_indices(&self) -> Vec<u8> {
        self.commands.iter().map(|c| c.index).collect()
    }

    pub fn count(&self, index: u8) -> usize {
        self.commands.iter().filter(|c| c.index == index).count()
    }

    pub fn last_command(&self) -> Option<Command> {
        self.commands.last().copied()
    }

    /// Bytes queued but not clocked out yet.
    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    fn consume(&mut self, bytes: &[u8]) {
        if let Some((block, mut packet)) = self.pending_write.take() {
            packet.extend_from_slice(bytes);
            if packet.len() < DATA_PACKET_SIZE {
                self.pending_write = Some((block, packet));
            } else {
                self.finish_write(block, &packet);
            }
            return;
        }

        if !self.selected {
            if bytes.iter().all(|&b| b == 0xFF) {
                self.idle_clocks += bytes.len();
            }
            return;
        }

        if bytes.len() == 6 && bytes[0] & 0xC0 == 0x40 {
            assert_eq!(
                bytes[5],
                (crc7(&bytes[..5]) << 1) | 0x01,
                "bad command frame {:02X?}",
                bytes
            );
            let index = bytes[0] & 0x3F;
            let arg = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
            self.commands.push(Command { index, arg });
            self.respond(index, arg);
        }
    }

    fn respond(&mut self, index: u8, arg: u32) {
        self.rx.clear();
        if self.muted {
            return;
        }

        let answer = match self.overrides.get_mut(&index).and_then(VecDeque::pop_front) {
            Some(answer) => {
                if index == 41 && answer.first() == Some(&0x00) {
                    self.ready = true;
                }
                answer
            }
            None => self.protocol_answer(index, arg),
        };

        self.rx
            .extend(std::iter::repeat(0xFF).take(self.response_delay));
        self.rx.extend(answer);
    }

    fn protocol_answer(&mut self, index: u8, arg: u32) -> Vec<u8> {
        let state = if self.ready { 0x00 } else { 0x01 };
        let app_command = std::mem::take(&mut self.app_command);

        match index {
            0 => {
                self.ready = false;
                vec![0x01]
            }
            8 if self.legacy => vec![0x05],
            8 => vec![0x01, 0x00, 0x00, ((arg >> 8) & 0x0F) as u8, arg as u8],
            55 => {
                self.app_command = true;
                vec![state]
            }
            41 if app_command => {
                if self.op_cond_busy_rounds > 0 {
                    self.op_cond_busy_rounds -= 1;
                    vec![0x01]
                } else {
                    self.ready = true;
                    vec![0x00]
                }
            }
            58 => {
                let mut ocr = 0x00FF_8000u32;
                if self.ready {
                    ocr |= 1 << 31;
                    if self.high_capacity {
                        ocr |= 1 << 30;
                    }
                }
                let mut answer = vec![state];
                answer.extend_from_slice(&ocr.to_be_bytes());
                answer
            }
            16 => vec![state],
            9 | 17 | 24 if !self.ready => vec![0x05],
            9 => {
                let mut answer = vec![0x00, 0xFF, 0xFE];
                answer.extend_from_slice(&self.csd);
                answer.extend_from_slice(&crc16(&self.csd).to_be_bytes());
                answer
            }
            13 => vec![state, self.write_status],
            17 => {
                let block = self.block_index(arg);
                let data = self.blocks.get(&block).copied().unwrap_or([0; BLOCK_SIZE]);
                let mut crc = crc16(&data);
                if self.corrupt_read_crc {
                    crc ^= 0x8001;
                }

                let mut answer = vec![0x00];
                answer.extend(std::iter::repeat(0xFF).take(self.token_delay));
                answer.push(0xFE);
                answer.extend_from_slice(&data);
                answer.extend_from_slice(&crc.to_be_bytes());
                answer
            }
            24 => {
                self.pending_write = Some((self.block_index(arg), Vec::new()));
                vec![0x00]
            }
            _ => vec![state | 0x04],
        }
    }

    fn block_index(&self, arg: u32) -> u32 {
        if self.high_capacity {
            arg
        } else {
            assert_eq!(arg % BLOCK_SIZE as u32, 0, "unaligned byte address {}", arg);
            arg / BLOCK_SIZE as u32
        }
    }

    fn finish_write(&mut self, block: u32, packet: &[u8]) {
        assert_eq!(packet.len(), DATA_PACKET_SIZE);
        assert_eq!(packet[0], 0xFE, "missing start token");

        let data = &packet[1..1 + BLOCK_SIZE];
        let crc = u16::from_be_bytes([packet[1 + BLOCK_SIZE], packet[2 + BLOCK_SIZE]]);
        self.written_crcs.push(crc);

        let token = match self.reject_writes {
            Some(token) => token,
            None if crc != crc16(data) => 0xEB,
            None => {
                let mut stored = [0u8; BLOCK_SIZE];
                stored.copy_from_slice(data);
                self.blocks.insert(block, stored);
                0xE5
            }
        };

        self.rx.clear();
        self.rx.push_back(token);
        self.rx.extend(std::iter::repeat(0x00).take(self.busy_bytes));
        self.rx.extend(self.release_byte);
    }
}

impl Transport for FakeCard {
    type Error = BusFault;

    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        if self.broken {
            return Err(BusFault);
        }

        if !write.is_empty() {
            self.consume(write);
        }

        for slot in read.iter_mut() {
            *slot = self.rx.pop_front().unwrap_or(self.idle_byte);
            self.bytes_read += 1;
        }

        Ok(())
    }

    fn select(&mut self) -> Result<(), Self::Error> {
        self.selected = true;
        self.chip_select.push(true);
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        self.selected = false;
        self.chip_select.push(false);
        Ok(())
    }
}

/// Driver over a fake card.
pub fn driver(card: FakeCard) -> SdCard<FakeCard> {
    SdCard::new(card)
}

/// Block filled with a recognizable pattern.
pub fn pattern(seed: u8) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(31).wrapping_add(seed);
    }
    block
}
