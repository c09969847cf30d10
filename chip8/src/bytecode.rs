//! Helpers for extracting data from opcodes.
use std::fmt;

/// A single 16-bit instruction word.
///
/// Instructions are stored big-endian, so the first byte in memory
/// holds the opcode identity in its upper nibble.
///
/// ```text
/// 0xF000 op
/// 0x0F00 x
/// 0x00F0 y
/// 0x000F n
/// 0x00FF nn (kk)
/// 0x0FFF nnn
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instr(pub u16);

impl Instr {
    #[inline(always)]
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// Original bytes as they are laid out in memory.
    #[inline(always)]
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    #[inline(always)]
    pub fn word(self) -> u16 {
        self.0
    }

    /// Extract the opcode class from the leading nibble.
    #[inline(always)]
    pub fn op(self) -> u8 {
        (self.0 >> 12) as u8
    }

    /// Extract register selector VX.
    #[inline(always)]
    pub fn x(self) -> u8 {
        ((self.0 >> 8) & 0xF) as u8
    }

    /// Extract register selector VY.
    #[inline(always)]
    pub fn y(self) -> u8 {
        ((self.0 >> 4) & 0xF) as u8
    }

    /// Extract the trailing nibble N.
    #[inline(always)]
    pub fn n(self) -> u8 {
        (self.0 & 0xF) as u8
    }

    /// Extract the trailing byte NN.
    #[inline(always)]
    pub fn nn(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Extract the 12-bit address NNN.
    #[inline(always)]
    pub fn nnn(self) -> u16 {
        self.0 & 0xFFF
    }
}

impl From<u16> for Instr {
    fn from(word: u16) -> Self {
        Self(word)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}
