//! MCP45x1 digital potentiometer command encoding.
//!
//! The device packs the wiper's ninth bit into bit 0 of the command byte; a
//! 7-bit device only ever uses values 0..=127 but the encoding carries the
//! high bit through regardless.

/// 7-bit I2C address (A0 strapped high).
pub const DEVICE_ADDR: u8 = 0x2E;

pub const CMD_SET_WIPER: u8 = 0x40;
pub const CMD_INC_WIPER: u8 = 0x42;
pub const CMD_DEC_WIPER: u8 = 0x44;
pub const CMD_WRITE_TCON: u8 = 0x60;

/// Volatile wiper-0 write: command byte with D8 folded in, then D7..D0.
pub fn encode_set_wiper(value: u8) -> [u8; 2] {
    [CMD_SET_WIPER | ((value & 0x80) >> 7), value & 0x7F]
}
