/// CRC-7 generator polynomial, x^7 + x^3 + 1 (without the x^7 term).
const CRC7_POLY: u8 = 0x09;
/// CRC-16-CCITT generator polynomial, x^16 + x^12 + x^5 + 1 (without the x^16 term).
const CRC16_POLY: u16 = 0x1021;

/// CRC-7 calculation, MSB first, no initial or final XOR.
///
/// Protects command frames. The result occupies the low 7 bits.
pub fn crc7(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        for bit in (0..8).rev() {
            let feedback = ((crc >> 6) ^ (byte >> bit)) & 0x01;
            crc = (crc << 1) & 0x7F;
            if feedback != 0 {
                crc ^= CRC7_POLY;
            }
        }
    }
    crc
}

/// CRC-16-CCITT calculation, MSB first, zero initial value.
///
/// Protects data blocks. The card sends it big-endian after the payload.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}
