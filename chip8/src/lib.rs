//! Chip-8 virtual CPU.
//!
//! The host loads a program image, writes the keypad state and calls
//! [`Chip8Vm::cycle`](vm::Chip8Vm::cycle) at its own pace. Each cycle executes
//! exactly one instruction. The display buffer can be read between cycles.
mod bytecode;
pub mod constants;
mod cpu;
mod devices;
pub mod dispatch;
mod error;
mod ops;
mod vm;

pub use self::{
    bytecode::Instr,
    constants::Chip8DisplayBuffer,
    devices::{InvalidKeyCode, KeyCode},
    error::{Chip8Error, Chip8Result, Fault, FaultKind},
};

/// Version of this crate, for display in hosts.
pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        cpu::{Chip8Cpu, RunState},
        devices::KeyCode,
        error::{Chip8Error, Chip8Result, Fault, FaultKind},
        vm::{AddressPolicy, Chip8Conf, Chip8Vm, Flow, OpcodePolicy},
    };
}
