use crate::{consts::COMMAND_SIZE, crc::crc7};

/// A command frame as sent on the wire.
pub type CommandFrame = [u8; COMMAND_SIZE];

/// Start and transmission bits of the first frame byte.
const TRANSMISSION_BITS: u8 = 0x40;
/// Command index bits of the first frame byte.
const INDEX_MASK: u8 = 0x3F;
/// End bit of the last frame byte.
const END_BIT: u8 = 0x01;

/// Build a command frame: `[0x40 | cmd][arg, big-endian][crc7 << 1 | 1]`.
///
/// Only the low 6 bits of `cmd` are used.
pub fn build_command(cmd: u8, arg: u32) -> CommandFrame {
    let mut frame = [0u8; COMMAND_SIZE];
    let crc_index = frame.len() - 1;

    frame[0] = (cmd & INDEX_MASK) | TRANSMISSION_BITS;
    frame[1..crc_index].copy_from_slice(&arg.to_be_bytes());
    frame[crc_index] = (crc7(&frame[..crc_index]) << 1) | END_BIT;

    frame
}
