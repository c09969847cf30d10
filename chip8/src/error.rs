//! Result and errors.
use std::{
    fmt::{self, Display, Formatter},
    io,
};

use crate::constants::*;

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug)]
pub enum Chip8Error {
    /// Fatal condition raised while executing a cycle.
    ///
    /// The VM is halted until a new program is loaded.
    Fault(Fault),
    /// Attempt to load a bytecode program that can't fit in memory.
    AddressRange { start: usize, end: usize },
    /// The program image was empty.
    EmptyProgram,
    /// The program image could not be read from its source.
    ProgramLoad(io::Error),
    Fmt(fmt::Error),
}

impl Chip8Error {
    /// The fault that halted the VM, if this is a runtime error.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fault(fault) => write!(f, "runtime error: {}", fault),
            Self::AddressRange { start, end } => write!(
                f,
                "program too large for VM memory: 0x{start:04X}..0x{end:04X} exceeds 0x{:04X}",
                MEM_SIZE
            ),
            Self::EmptyProgram => write!(f, "program image is empty"),
            Self::ProgramLoad(err) => write!(f, "failed to load program: {}", err),
            Self::Fmt(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Chip8Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProgramLoad(err) => Some(err),
            Self::Fmt(err) => Some(err),
            _ => None,
        }
    }
}

impl From<fmt::Error> for Chip8Error {
    fn from(err: fmt::Error) -> Self {
        Chip8Error::Fmt(err)
    }
}

impl From<io::Error> for Chip8Error {
    fn from(err: io::Error) -> Self {
        Chip8Error::ProgramLoad(err)
    }
}

impl From<Fault> for Chip8Error {
    fn from(fault: Fault) -> Self {
        Chip8Error::Fault(fault)
    }
}

/// Fatal condition, with the context needed to diagnose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// Address the faulting instruction was fetched from.
    pub pc: Address,
    /// The faulting instruction word. Empty when the fetch itself failed.
    pub instr: Option<u16>,
    pub kind: FaultKind,
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.instr {
            Some(instr) => write!(f, "{} at 0x{:04X} ({:04X})", self.kind, self.pc, instr),
            None => write!(f, "{} at 0x{:04X}", self.kind, self.pc),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A computed address fell outside the writable or addressable memory.
    AddressRange { address: usize },
    /// `CALL` with a full call stack.
    StackOverflow,
    /// `RET` with an empty call stack.
    StackUnderflow,
    /// Instruction word that doesn't decode to an operation.
    ///
    /// Only raised when the VM is configured to treat unknown opcodes as fatal.
    UnknownOpcode,
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressRange { address } => write!(f, "address 0x{address:04X} out of range"),
            Self::StackOverflow => write!(f, "call stack overflow"),
            Self::StackUnderflow => write!(f, "call stack underflow"),
            Self::UnknownOpcode => write!(f, "unknown opcode"),
        }
    }
}
