//! Two-level opcode dispatch.
//!
//! The leading nibble of an instruction selects an entry in the primary
//! table. Most entries name an operation directly. The families starting
//! with `0`, `8`, `E` and `F` share their leading nibble between several
//! operations, so those entries redirect to a secondary table keyed on the
//! trailing nibble (`0`, `8`, `E`) or the trailing byte (`F`).
use crate::bytecode::Instr;

/// Identity of an executable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// 00E0 (CLS)
    ClearScreen,
    /// 00EE (RET)
    Return,
    /// 1nnn (JP addr)
    Jump,
    /// 2nnn (CALL addr)
    Call,
    /// 3xkk (SE Vx, byte)
    SkipEqByte,
    /// 4xkk (SNE Vx, byte)
    SkipNeByte,
    /// 5xy0 (SE Vx, Vy)
    SkipEqReg,
    /// 6xkk (LD Vx, byte)
    LoadByte,
    /// 7xkk (ADD Vx, byte)
    AddByte,
    /// 8xy0 (LD Vx, Vy)
    LoadReg,
    /// 8xy1 (OR Vx, Vy)
    Or,
    /// 8xy2 (AND Vx, Vy)
    And,
    /// 8xy3 (XOR Vx, Vy)
    Xor,
    /// 8xy4 (ADD Vx, Vy)
    AddReg,
    /// 8xy5 (SUB Vx, Vy)
    Sub,
    /// 8xy6 (SHR Vx)
    ShiftRight,
    /// 8xy7 (SUBN Vx, Vy)
    SubN,
    /// 8xyE (SHL Vx)
    ShiftLeft,
    /// 9xy0 (SNE Vx, Vy)
    SkipNeReg,
    /// Annn (LD I, addr)
    LoadIndex,
    /// Bnnn (JP V0, addr)
    JumpOffset,
    /// Cxkk (RND Vx, byte)
    Random,
    /// Dxyn (DRW Vx, Vy, nibble)
    Draw,
    /// Ex9E (SKP Vx)
    SkipKeyPressed,
    /// ExA1 (SKNP Vx)
    SkipKeyNotPressed,
    /// Fx07 (LD Vx, DT)
    LoadDelay,
    /// Fx0A (LD Vx, K)
    WaitKey,
    /// Fx15 (LD DT, Vx)
    SetDelay,
    /// Fx18 (LD ST, Vx)
    SetSound,
    /// Fx1E (ADD I, Vx)
    AddIndex,
    /// Fx29 (LD F, Vx)
    LoadFont,
    /// Fx33 (LD B, Vx)
    StoreBcd,
    /// Fx55 (LD [I], Vx)
    StoreRegisters,
    /// Fx65 (LD Vx, [I])
    LoadRegisters,
    /// Unmapped slot. Executes as a no-op.
    Unknown,
}

impl OpKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::ClearScreen => "CLS",
            Self::Return => "RET",
            Self::Jump | Self::JumpOffset => "JP",
            Self::Call => "CALL",
            Self::SkipEqByte | Self::SkipEqReg => "SE",
            Self::SkipNeByte | Self::SkipNeReg => "SNE",
            Self::LoadByte
            | Self::LoadReg
            | Self::LoadIndex
            | Self::LoadDelay
            | Self::WaitKey
            | Self::SetDelay
            | Self::SetSound
            | Self::LoadFont
            | Self::StoreBcd
            | Self::StoreRegisters
            | Self::LoadRegisters => "LD",
            Self::AddByte | Self::AddReg | Self::AddIndex => "ADD",
            Self::Or => "OR",
            Self::And => "AND",
            Self::Xor => "XOR",
            Self::Sub => "SUB",
            Self::ShiftRight => "SHR",
            Self::SubN => "SUBN",
            Self::ShiftLeft => "SHL",
            Self::Random => "RND",
            Self::Draw => "DRW",
            Self::SkipKeyPressed => "SKP",
            Self::SkipKeyNotPressed => "SKNP",
            Self::Unknown => "???",
        }
    }
}

/// Secondary table selected by a redirecting primary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// `0nnn` keyed on the trailing nibble.
    Misc,
    /// `8xyn` keyed on the trailing nibble.
    Math,
    /// `Exnn` keyed on the trailing nibble.
    Keys,
    /// `Fxnn` keyed on the trailing byte.
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Op(OpKind),
    Table(Table),
}

use self::{Entry as E, OpKind as K};

/// Keyed on the leading nibble.
pub const PRIMARY: [Entry; 16] = [
    E::Table(Table::Misc),
    E::Op(K::Jump),
    E::Op(K::Call),
    E::Op(K::SkipEqByte),
    E::Op(K::SkipNeByte),
    E::Op(K::SkipEqReg),
    E::Op(K::LoadByte),
    E::Op(K::AddByte),
    E::Table(Table::Math),
    E::Op(K::SkipNeReg),
    E::Op(K::LoadIndex),
    E::Op(K::JumpOffset),
    E::Op(K::Random),
    E::Op(K::Draw),
    E::Table(Table::Keys),
    E::Table(Table::Extended),
];

pub const TABLE_0: [OpKind; 16] = {
    let mut table = [K::Unknown; 16];
    table[0x0] = K::ClearScreen;
    table[0xE] = K::Return;
    table
};

pub const TABLE_8: [OpKind; 16] = {
    let mut table = [K::Unknown; 16];
    table[0x0] = K::LoadReg;
    table[0x1] = K::Or;
    table[0x2] = K::And;
    table[0x3] = K::Xor;
    table[0x4] = K::AddReg;
    table[0x5] = K::Sub;
    table[0x6] = K::ShiftRight;
    table[0x7] = K::SubN;
    table[0xE] = K::ShiftLeft;
    table
};

pub const TABLE_E: [OpKind; 16] = {
    let mut table = [K::Unknown; 16];
    table[0x1] = K::SkipKeyNotPressed; // ExA1
    table[0xE] = K::SkipKeyPressed; // Ex9E
    table
};

pub const TABLE_F: [OpKind; 256] = {
    let mut table = [K::Unknown; 256];
    table[0x07] = K::LoadDelay;
    table[0x0A] = K::WaitKey;
    table[0x15] = K::SetDelay;
    table[0x18] = K::SetSound;
    table[0x1E] = K::AddIndex;
    table[0x29] = K::LoadFont;
    table[0x33] = K::StoreBcd;
    table[0x55] = K::StoreRegisters;
    table[0x65] = K::LoadRegisters;
    table
};

/// Resolve an instruction to its operation.
#[inline]
pub fn decode(instr: Instr) -> OpKind {
    match PRIMARY[instr.op() as usize] {
        Entry::Op(kind) => kind,
        Entry::Table(Table::Misc) => TABLE_0[instr.n() as usize],
        Entry::Table(Table::Math) => TABLE_8[instr.n() as usize],
        Entry::Table(Table::Keys) => TABLE_E[instr.n() as usize],
        Entry::Table(Table::Extended) => TABLE_F[instr.nn() as usize],
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn op(word: u16) -> OpKind {
        decode(Instr(word))
    }

    #[test]
    fn test_primary_direct() {
        // Operands must not affect the lookup of direct entries.
        for operands in [0x000, 0x123, 0xABC, 0xFFF] {
            assert_eq!(op(0x1000 | operands), K::Jump);
            assert_eq!(op(0x2000 | operands), K::Call);
            assert_eq!(op(0x3000 | operands), K::SkipEqByte);
            assert_eq!(op(0x4000 | operands), K::SkipNeByte);
            assert_eq!(op(0x5000 | operands), K::SkipEqReg);
            assert_eq!(op(0x6000 | operands), K::LoadByte);
            assert_eq!(op(0x7000 | operands), K::AddByte);
            assert_eq!(op(0x9000 | operands), K::SkipNeReg);
            assert_eq!(op(0xA000 | operands), K::LoadIndex);
            assert_eq!(op(0xB000 | operands), K::JumpOffset);
            assert_eq!(op(0xC000 | operands), K::Random);
            assert_eq!(op(0xD000 | operands), K::Draw);
        }
    }

    #[test]
    fn test_redirect_entries() {
        let redirects: Vec<usize> = PRIMARY
            .iter()
            .enumerate()
            .filter(|(_, entry)| matches!(entry, Entry::Table(_)))
            .map(|(index, _)| index)
            .collect();
        assert_eq!(redirects, vec![0x0, 0x8, 0xE, 0xF]);
    }

    #[test]
    fn test_table_0() {
        assert_eq!(op(0x00E0), K::ClearScreen);
        assert_eq!(op(0x00EE), K::Return);
        for n in 0x1..0xE {
            assert_eq!(op(0x00E0 | n), K::Unknown, "00E{n:X}");
        }
        assert_eq!(op(0x00EF), K::Unknown);
    }

    #[test]
    fn test_table_8() {
        let expected = [
            (0x0, K::LoadReg),
            (0x1, K::Or),
            (0x2, K::And),
            (0x3, K::Xor),
            (0x4, K::AddReg),
            (0x5, K::Sub),
            (0x6, K::ShiftRight),
            (0x7, K::SubN),
            (0xE, K::ShiftLeft),
        ];
        for n in 0x0..=0xF_u16 {
            let kind = expected
                .iter()
                .find(|(key, _)| *key == n)
                .map(|(_, kind)| *kind)
                .unwrap_or(K::Unknown);
            assert_eq!(op(0x8AB0 | n), kind, "8AB{n:X}");
        }
    }

    #[test]
    fn test_table_e() {
        assert_eq!(op(0xE39E), K::SkipKeyPressed);
        assert_eq!(op(0xE3A1), K::SkipKeyNotPressed);
        let mapped = (0x0..=0xF_u16)
            .filter(|n| op(0xE390 | n) != K::Unknown)
            .count();
        assert_eq!(mapped, 2);
    }

    #[test]
    fn test_table_f() {
        let expected = [
            (0x07, K::LoadDelay),
            (0x0A, K::WaitKey),
            (0x15, K::SetDelay),
            (0x18, K::SetSound),
            (0x1E, K::AddIndex),
            (0x29, K::LoadFont),
            (0x33, K::StoreBcd),
            (0x55, K::StoreRegisters),
            (0x65, K::LoadRegisters),
        ];
        for nn in 0x00..=0xFF_u16 {
            let kind = expected
                .iter()
                .find(|(key, _)| *key == nn)
                .map(|(_, kind)| *kind)
                .unwrap_or(K::Unknown);
            assert_eq!(op(0xF500 | nn), kind, "F5{nn:02X}");
        }
    }

    #[test]
    fn test_all_operations_reachable() {
        let mut kinds: Vec<OpKind> = (0..=u16::MAX)
            .map(op)
            .filter(|kind| *kind != K::Unknown)
            .collect();
        kinds.sort_by_key(|kind| *kind as u8);
        kinds.dedup();
        assert_eq!(kinds.len(), 34);
    }
}
