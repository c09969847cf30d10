//! Virtual machine.
use std::fmt::{self, Write};

use log::{debug, error, warn};

use crate::{
    constants::*,
    cpu::{Chip8Cpu, RunState},
    devices::KeyCode,
    dispatch::{self, OpKind},
    error::{Chip8Error, Chip8Result, Fault, FaultKind},
    ops,
};

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    conf: Chip8Conf,
    /// Number of executed instructions that resolved to no operation.
    unknown_count: usize,
    /// Fatal fault that stopped execution.
    halted: Option<Fault>,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        Chip8Vm {
            cpu: Chip8Cpu::new(conf.seed),
            conf,
            unknown_count: 0,
            halted: None,
        }
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Load a program image and prepare it for execution.
    ///
    /// Clears a previous halt, so a VM can be reused for a fresh program.
    pub fn load_bytecode(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        self.cpu.load_program(bytecode)?;
        self.unknown_count = 0;
        self.halted = None;

        debug!("loaded program of {} bytes", bytecode.len());

        Ok(())
    }

    pub fn display_buffer(&self) -> Chip8DisplayBuffer<'_> {
        self.cpu.display()
    }

    /// Pixel state at the given coordinate, wrapped to the display size.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.cpu.pixel(x, y)
    }

    /// Export the display as 32-bit colors, leaving the color encoding to the caller.
    pub fn encode_display(&self, on: u32, off: u32) -> Vec<u32> {
        self.cpu
            .display()
            .iter()
            .map(|px| if *px { on } else { off })
            .collect()
    }
}

/// Outcome of a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is useful for the caller to avoid being
    /// blocked on infinite or long running loops.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// The display buffer changed.
    Draw,
    /// The sound timer was set.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
    /// The instruction did not decode to an operation and was skipped.
    Unknown,
}

/// What to do when an address computed from the index register leaves memory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AddressPolicy {
    /// Halt with an address range fault.
    #[default]
    Fault,
    /// Truncate the address to 12 bits.
    Wrap,
}

/// What to do with instruction words that don't decode to an operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OpcodePolicy {
    /// Skip the instruction and count it.
    #[default]
    Ignore,
    /// Halt with an unknown opcode fault.
    Fault,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Chip8Conf {
    /// Seed for the random number instruction. Seeded from the OS when empty.
    pub seed: Option<u64>,
    pub index_overflow: AddressPolicy,
    pub unknown_opcode: OpcodePolicy,
}

/// Interpreter
impl Chip8Vm {
    /// Sets the keyboard key input state.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);
    }

    /// Replace the whole keyboard input state.
    pub fn set_keypad(&mut self, keys: &[bool; KEY_COUNT as usize]) {
        self.cpu.set_keypad(keys);
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    /// Run up to `step_count` cycles, stopping at the first error.
    ///
    /// Returns the flow of the last executed cycle.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<Flow> {
        let mut flow = Flow::Ok;

        for _ in 0..step_count {
            flow = self.cycle()?;
        }

        Ok(flow)
    }

    /// Execute one instruction.
    ///
    /// Fetches the instruction at the program counter, advances the program
    /// counter past it, executes it and then counts down both timers.
    ///
    /// A fatal fault halts the VM. Every following cycle returns the same
    /// fault until a new program is loaded.
    pub fn cycle(&mut self) -> Chip8Result<Flow> {
        if let Some(fault) = self.halted {
            return Err(Chip8Error::Fault(fault));
        }

        let pc = self.cpu.pc;
        let result = self.step();

        // Count down timers
        self.cpu.tick_delay();
        self.cpu.tick_sound();

        result.map_err(|(instr, kind)| {
            let fault = Fault {
                pc: pc as Address,
                instr,
                kind,
            };
            error!("halted: {fault}");
            self.halted = Some(fault);
            Chip8Error::Fault(fault)
        })
    }

    fn step(&mut self) -> Result<Flow, (Option<u16>, FaultKind)> {
        let instr = self.cpu.fetch().map_err(|kind| (None, kind))?;
        self.cpu.pc += 2;

        let kind = dispatch::decode(instr);
        let fault_at = |kind: FaultKind| (Some(instr.word()), kind);

        if kind == OpKind::Unknown {
            self.unknown_count += 1;
            warn!("unknown opcode {instr} at 0x{:04X}", self.cpu.pc - 2);
            if self.conf.unknown_opcode == OpcodePolicy::Fault {
                return Err(fault_at(FaultKind::UnknownOpcode));
            }
        }

        ops::execute(kind, &mut self.cpu, instr, &self.conf).map_err(fault_at)
    }
}

/// State inspection
impl Chip8Vm {
    #[inline]
    pub fn cpu(&self) -> &Chip8Cpu {
        &self.cpu
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.cpu.pc
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.cpu.sp
    }

    #[inline]
    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.cpu.registers
    }

    #[inline]
    pub fn register(&self, index: usize) -> u8 {
        self.cpu.registers[index & 0xF]
    }

    pub fn set_register(&mut self, index: usize, value: u8) {
        self.cpu.registers[index & 0xF] = value;
    }

    /// Value of the index register I.
    #[inline]
    pub fn index(&self) -> Address {
        self.cpu.address
    }

    #[inline]
    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    pub fn set_delay_timer(&mut self, value: u8) {
        self.cpu.delay_timer = value;
    }

    #[inline]
    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    pub fn set_sound_timer(&mut self, value: u8) {
        self.cpu.sound_timer = value;
    }

    #[inline]
    pub fn run_state(&self) -> RunState {
        self.cpu.run_state
    }

    /// Number of executed instructions that did not decode to an operation.
    #[inline]
    pub fn unknown_opcodes(&self) -> usize {
        self.unknown_count
    }

    /// The fault that halted the VM, if any.
    #[inline]
    pub fn fault(&self) -> Option<&Fault> {
        self.halted.as_ref()
    }

    /// Read-only view of main memory.
    pub fn ram(&self) -> &[u8; MEM_SIZE] {
        &self.cpu.ram
    }
}

/// Troubleshooting
#[doc(hidden)]
impl Chip8Vm {
    /// Returns the contents of the memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let iter = self
            .cpu
            .ram
            .iter()
            .enumerate()
            .skip(MEM_START)
            .take(count)
            .step_by(2);
        let mut buf = String::new();

        for (i, op) in iter {
            let low = self.cpu.ram.get(i + 1).copied().unwrap_or_default();
            writeln!(buf, "{:04X}: {:02X}{:02X}", i, op, low)?;
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if self.cpu.display[x + y * DISPLAY_WIDTH] {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }

    pub fn dump_keys(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        if self.cpu.any_key() {
            write!(buf, "keys: ")?;
            for i in 0..KEY_COUNT {
                if self.cpu.key_state(i) {
                    write!(buf, "k{i:x}")?;
                }
            }
        }

        Ok(buf)
    }
}
