//! CPU and memory state.
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    bytecode::Instr,
    constants::*,
    error::{Chip8Error, Chip8Result, FaultKind},
};

/// Whether the CPU is executing normally or stalled on `Fx0A` (`LD Vx, K`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Waiting for any key to be pressed. The key value will
    /// be stored in the given register.
    AwaitingKey { register: u8 },
}

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the bytecode.
    pub(crate) pc: usize,
    /// Stack pointer, indicating the number of return addresses on the stack.
    pub(crate) sp: usize,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. The host plays a tone while it's non-zero.
    pub(crate) sound_timer: u8,
    /// Keyboard input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,
    pub(crate) run_state: RunState,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
    /// Screen buffer that is drawn too.
    pub(crate) display: Box<[bool; DISPLAY_BUFFER_SIZE]>,

    /// Source of the `Cxkk` (`RND Vx, byte`) values.
    pub(crate) rng: StdRng,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Chip8Cpu {
    /// Create a zeroed machine with the font set loaded.
    ///
    /// Passing a seed makes the random number instruction deterministic.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut cpu = Self {
            pc: MEM_START,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_state: 0,
            run_state: RunState::Running,

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
            display: Box::new([false; DISPLAY_BUFFER_SIZE]),

            rng,
        };
        cpu.load_font();
        cpu
    }

    /// Write the built-in digit sprites into the font region.
    fn load_font(&mut self) {
        let start = FONTSET_START as usize;
        self.ram[start..start + FONTSET_DATA_LENGTH].copy_from_slice(&FONTSET);
    }

    /// Copy a program image into memory at `MEM_START`.
    ///
    /// Nothing is modified when the image is rejected. On success the
    /// previous program, the registers, stack, timers and display are
    /// cleared, and the program counter points at the first instruction.
    pub fn load_program(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if bytecode.is_empty() {
            return Err(Chip8Error::EmptyProgram);
        }

        if bytecode.len() > MAX_PROGRAM_SIZE {
            return Err(Chip8Error::AddressRange {
                start: MEM_START,
                end: MEM_START + bytecode.len(),
            });
        }

        // Start with clean memory to avoid leaking previous program.
        self.ram[MEM_START..].fill(0);
        self.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);

        self.reset();

        Ok(())
    }

    /// Clear execution state, keeping memory and the keyboard.
    fn reset(&mut self) {
        self.pc = MEM_START;
        self.sp = 0;
        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.run_state = RunState::Running;
        self.stack.fill(0);
        self.display.fill(false);
    }

    pub fn clear_display(&mut self) {
        self.display.fill(false);
    }

    #[inline]
    pub fn display(&self) -> &[bool; DISPLAY_BUFFER_SIZE] {
        &self.display
    }

    /// Pixel state at the given coordinate, wrapped to the display size.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.display[(x & DISPLAY_WIDTH_MASK) + (y & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH]
    }

    pub fn set_key_state(&mut self, key_id: u8, state: bool) {
        if key_id < KEY_COUNT {
            if state {
                self.key_state |= 1 << key_id;
            } else {
                self.key_state &= !(1 << key_id);
            }
        }
    }

    pub fn key_state(&self, key_id: u8) -> bool {
        if key_id < KEY_COUNT {
            self.key_state & (1 << key_id) > 0
        } else {
            false
        }
    }

    /// Replace the whole keyboard state.
    pub fn set_keypad(&mut self, keys: &[bool; KEY_COUNT as usize]) {
        self.key_state = keys
            .iter()
            .enumerate()
            .filter(|(_, pressed)| **pressed)
            .fold(0, |acc, (k, _)| acc | (1 << k));
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state > 0
    }

    /// Retrieve the value of the first key that is pressed down.
    #[inline]
    pub fn first_key(&self) -> Option<u8> {
        if self.any_key() {
            Some(self.key_state.trailing_zeros() as u8)
        } else {
            None
        }
    }

    /// Clear the keyboard input state, setting all keys to up.
    #[inline(always)]
    pub fn clear_keys(&mut self) {
        self.key_state = 0;
    }

    /// Count down the delay timer.
    #[inline]
    pub fn tick_delay(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
    }

    #[inline]
    pub fn tick_sound(&mut self) {
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Read the instruction at the program counter.
    ///
    /// Both bytes must lie inside memory.
    #[inline]
    pub(crate) fn fetch(&self) -> Result<Instr, FaultKind> {
        if self.pc + 1 >= MEM_SIZE {
            return Err(FaultKind::AddressRange { address: self.pc });
        }
        Ok(Instr::from_bytes([self.ram[self.pc], self.ram[self.pc + 1]]))
    }

    #[inline]
    pub(crate) fn read(&self, address: usize) -> Result<u8, FaultKind> {
        self.ram
            .get(address)
            .copied()
            .ok_or(FaultKind::AddressRange { address })
    }

    /// Write a byte to program memory.
    ///
    /// The font and the reserved area below `MEM_START` are read-only to instructions.
    #[inline]
    pub(crate) fn write(&mut self, address: usize, value: u8) -> Result<(), FaultKind> {
        self.check_writable(address)?;
        self.ram[address] = value;
        Ok(())
    }

    #[inline]
    pub(crate) fn check_writable(&self, address: usize) -> Result<(), FaultKind> {
        if (MEM_START..MEM_SIZE).contains(&address) {
            Ok(())
        } else {
            Err(FaultKind::AddressRange { address })
        }
    }

    pub(crate) fn push(&mut self, return_address: Address) -> Result<(), FaultKind> {
        if self.sp >= STACK_SIZE {
            return Err(FaultKind::StackOverflow);
        }
        self.stack[self.sp] = return_address;
        self.sp += 1;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Address, FaultKind> {
        if self.sp == 0 {
            return Err(FaultKind::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    #[inline]
    pub(crate) fn random_byte(&mut self) -> u8 {
        self.rng.gen::<u8>()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut cpu = Chip8Cpu::default();

        cpu.set_key_state(0, true);
        assert_eq!(cpu.key_state, 0b00000000_00000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(!cpu.key_state(7));

        cpu.set_key_state(7, true);
        assert_eq!(cpu.key_state, 0b00000000_10000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(0, false);
        assert_eq!(cpu.key_state, 0b00000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(15, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));
        assert!(cpu.key_state(15));

        // out of range keys are ignored
        cpu.set_key_state(16, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(16));
        assert_eq!(cpu.first_key(), Some(7));
    }

    #[test]
    fn test_set_keypad() {
        let mut cpu = Chip8Cpu::default();
        let mut keys = [false; 16];
        keys[0x3] = true;
        keys[0xC] = true;

        cpu.set_keypad(&keys);
        assert_eq!(cpu.key_state, 0b00010000_00001000);
        assert_eq!(cpu.first_key(), Some(0x3));

        cpu.clear_keys();
        assert!(!cpu.any_key());
        assert_eq!(cpu.first_key(), None);
    }

    #[test]
    fn test_font_loaded() {
        let cpu = Chip8Cpu::default();
        let start = FONTSET_START as usize;
        assert_eq!(&cpu.ram[start..start + FONTSET_DATA_LENGTH], &FONTSET[..]);
        assert!(cpu.ram[..start].iter().all(|b| *b == 0));
        assert!(cpu.ram[start + FONTSET_DATA_LENGTH..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_load_program() {
        let mut cpu = Chip8Cpu::default();
        cpu.load_program(&[0x12, 0x34, 0x56]).unwrap();
        assert_eq!(&cpu.ram[MEM_START..MEM_START + 4], &[0x12, 0x34, 0x56, 0x00]);
        assert_eq!(cpu.pc, MEM_START);

        // The largest image fills memory to the last byte.
        let image = vec![0xAB; MAX_PROGRAM_SIZE];
        cpu.load_program(&image).unwrap();
        assert_eq!(cpu.ram[MEM_SIZE - 1], 0xAB);

        // Previous program is cleared
        cpu.load_program(&[0x00, 0xE0]).unwrap();
        assert_eq!(cpu.ram[MEM_START + 2], 0x00);
        assert_eq!(cpu.ram[FONTSET_START as usize], FONTSET[0]);
    }

    #[test]
    fn test_load_program_rejected() {
        let mut cpu = Chip8Cpu::default();
        cpu.load_program(&[0x60, 0x01]).unwrap();

        let image = vec![0xAB; MAX_PROGRAM_SIZE + 1];
        assert!(matches!(
            cpu.load_program(&image),
            Err(Chip8Error::AddressRange {
                start: MEM_START,
                end: 0x1001
            })
        ));
        assert!(matches!(cpu.load_program(&[]), Err(Chip8Error::EmptyProgram)));

        // Memory is untouched by rejected images.
        assert_eq!(&cpu.ram[MEM_START..MEM_START + 3], &[0x60, 0x01, 0x00]);
    }

    #[test]
    fn test_stack_bounds() {
        let mut cpu = Chip8Cpu::default();
        assert_eq!(cpu.pop(), Err(FaultKind::StackUnderflow));

        for i in 0..STACK_SIZE {
            cpu.push(0x200 + i as u16 * 2).unwrap();
        }
        assert_eq!(cpu.sp, STACK_SIZE);
        assert_eq!(cpu.push(0x300), Err(FaultKind::StackOverflow));
        assert_eq!(cpu.sp, STACK_SIZE);

        assert_eq!(cpu.pop(), Ok(0x21E));
        assert_eq!(cpu.sp, STACK_SIZE - 1);
    }

    #[test]
    fn test_memory_bounds() {
        let mut cpu = Chip8Cpu::default();
        assert_eq!(
            cpu.write(0x1FF, 1),
            Err(FaultKind::AddressRange { address: 0x1FF })
        );
        assert_eq!(
            cpu.write(FONTSET_START as usize, 1),
            Err(FaultKind::AddressRange { address: 0x050 })
        );
        assert_eq!(
            cpu.write(MEM_SIZE, 1),
            Err(FaultKind::AddressRange { address: MEM_SIZE })
        );
        assert_eq!(cpu.write(MEM_SIZE - 1, 7), Ok(()));
        assert_eq!(cpu.read(MEM_SIZE - 1), Ok(7));
        assert_eq!(
            cpu.read(MEM_SIZE),
            Err(FaultKind::AddressRange { address: MEM_SIZE })
        );

        cpu.pc = MEM_SIZE - 2;
        assert!(cpu.fetch().is_ok());
        cpu.pc = MEM_SIZE - 1;
        assert_eq!(
            cpu.fetch(),
            Err(FaultKind::AddressRange { address: MEM_SIZE - 1 })
        );
    }

    #[test]
    fn test_timers_floor_at_zero() {
        let mut cpu = Chip8Cpu::default();
        cpu.delay_timer = 1;
        cpu.tick_delay();
        cpu.tick_delay();
        cpu.tick_sound();
        assert_eq!(cpu.delay_timer, 0);
        assert_eq!(cpu.sound_timer, 0);
    }
}
