//! Instruction set.
//!
//! Each operation reads its operands from the instruction word and
//! mutates the CPU state. The program counter has already been advanced
//! past the instruction when an operation runs.
use log::{debug, warn};

use crate::{
    bytecode::Instr,
    constants::*,
    cpu::{Chip8Cpu, RunState},
    dispatch::OpKind,
    error::FaultKind,
    vm::{AddressPolicy, Chip8Conf, Flow},
};

pub(crate) type OpResult = Result<Flow, FaultKind>;

/// Execute the decoded operation.
pub(crate) fn execute(
    kind: OpKind,
    cpu: &mut Chip8Cpu,
    instr: Instr,
    conf: &Chip8Conf,
) -> OpResult {
    use OpKind as K;

    match kind {
        K::ClearScreen => clear_screen(cpu),
        K::Return => ret(cpu),
        K::Jump => jump(cpu, instr),
        K::Call => call(cpu, instr),
        K::SkipEqByte => {
            let x = cpu.registers[instr.x() as usize];
            skip_if(cpu, x == instr.nn())
        }
        K::SkipNeByte => {
            let x = cpu.registers[instr.x() as usize];
            skip_if(cpu, x != instr.nn())
        }
        K::SkipEqReg => {
            let (x, y) = operands_xy(cpu, instr);
            skip_if(cpu, x == y)
        }
        K::SkipNeReg => {
            let (x, y) = operands_xy(cpu, instr);
            skip_if(cpu, x != y)
        }
        K::LoadByte => {
            cpu.registers[instr.x() as usize] = instr.nn();
            Ok(Flow::Ok)
        }
        K::AddByte => {
            let vx = instr.x() as usize;
            cpu.registers[vx] = cpu.registers[vx].wrapping_add(instr.nn());
            Ok(Flow::Ok)
        }
        K::LoadReg => logic(cpu, instr, |_, y| y),
        K::Or => logic(cpu, instr, |x, y| x | y),
        K::And => logic(cpu, instr, |x, y| x & y),
        K::Xor => logic(cpu, instr, |x, y| x ^ y),
        K::AddReg => add(cpu, instr),
        K::Sub => sub(cpu, instr),
        K::SubN => subn(cpu, instr),
        K::ShiftRight => shift_right(cpu, instr),
        K::ShiftLeft => shift_left(cpu, instr),
        K::LoadIndex => {
            cpu.address = instr.nnn();
            Ok(Flow::Ok)
        }
        K::JumpOffset => jump_offset(cpu, instr),
        K::Random => {
            let byte = cpu.random_byte();
            cpu.registers[instr.x() as usize] = byte & instr.nn();
            Ok(Flow::Ok)
        }
        K::Draw => draw(cpu, instr, conf),
        K::SkipKeyPressed => {
            let key = cpu.registers[instr.x() as usize] & 0xF;
            let pressed = cpu.key_state(key);
            skip_if(cpu, pressed)
        }
        K::SkipKeyNotPressed => {
            let key = cpu.registers[instr.x() as usize] & 0xF;
            let pressed = cpu.key_state(key);
            skip_if(cpu, !pressed)
        }
        K::LoadDelay => {
            cpu.registers[instr.x() as usize] = cpu.delay_timer;
            Ok(Flow::Ok)
        }
        K::WaitKey => wait_key(cpu, instr),
        K::SetDelay => {
            cpu.delay_timer = cpu.registers[instr.x() as usize];
            Ok(Flow::Ok)
        }
        K::SetSound => {
            cpu.sound_timer = cpu.registers[instr.x() as usize];
            Ok(Flow::Sound)
        }
        K::AddIndex => add_index(cpu, instr, conf),
        K::LoadFont => {
            // Only the low nibble selects a digit.
            let digit = (cpu.registers[instr.x() as usize] & 0xF) as u16;
            cpu.address = FONTSET_START + digit * FONTSET_HEIGHT as u16;
            Ok(Flow::Ok)
        }
        K::StoreBcd => store_bcd(cpu, instr, conf),
        K::StoreRegisters => store_registers(cpu, instr, conf),
        K::LoadRegisters => load_registers(cpu, instr, conf),
        K::Unknown => Ok(Flow::Unknown),
    }
}

#[inline(always)]
fn operands_xy(cpu: &Chip8Cpu, instr: Instr) -> (u8, u8) {
    (
        cpu.registers[instr.x() as usize],
        cpu.registers[instr.y() as usize],
    )
}

/// Skip the next instruction word when the predicate holds.
#[inline(always)]
fn skip_if(cpu: &mut Chip8Cpu, predicate: bool) -> OpResult {
    if predicate {
        cpu.pc += 2;
    }
    Ok(Flow::Ok)
}

/// Resolve the memory address `I + offset` according to the overflow policy.
#[inline]
fn index_address(cpu: &Chip8Cpu, offset: usize, conf: &Chip8Conf) -> usize {
    let address = cpu.address as usize + offset;
    match conf.index_overflow {
        AddressPolicy::Fault => address,
        AddressPolicy::Wrap => address & ADDRESS_MASK,
    }
}

// ----------------------------------------------------------------------------
// Control flow

/// 00E0 (CLS)
///
/// Clear display
fn clear_screen(cpu: &mut Chip8Cpu) -> OpResult {
    cpu.clear_display();
    Ok(Flow::Draw)
}

/// 00EE (RET)
///
/// Return from a subroutine.
/// Pop the return address off the stack and jump to it.
fn ret(cpu: &mut Chip8Cpu) -> OpResult {
    cpu.pc = cpu.pop()? as usize;
    Ok(Flow::Jump)
}

/// 1nnn (JP addr)
fn jump(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    cpu.pc = instr.nnn() as usize;
    Ok(Flow::Jump)
}

/// 2nnn (CALL addr)
///
/// Push the address of the next instruction, then jump to `nnn`.
fn call(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    cpu.push(cpu.pc as Address)?;
    cpu.pc = instr.nnn() as usize;
    Ok(Flow::Jump)
}

/// Bnnn (JP V0, addr)
///
/// Jump to address `nnn` offset by register V0.
fn jump_offset(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    let address = cpu.registers[0] as usize + instr.nnn() as usize;
    if address > ADDRESS_MASK {
        return Err(FaultKind::AddressRange { address });
    }
    cpu.pc = address;
    Ok(Flow::Jump)
}

// ----------------------------------------------------------------------------
// Arithmetic

/// 8xy0, 8xy1, 8xy2, 8xy3
///
/// Combine VX and VY, and store the result in VX. VF is left untouched.
#[inline]
fn logic(cpu: &mut Chip8Cpu, instr: Instr, f: impl Fn(u8, u8) -> u8) -> OpResult {
    let (x, y) = operands_xy(cpu, instr);
    cpu.registers[instr.x() as usize] = f(x, y);
    Ok(Flow::Ok)
}

/// Write the flag first, so when VX is VF the result wins.
#[inline(always)]
fn store_with_flag(cpu: &mut Chip8Cpu, instr: Instr, result: u8, flag: bool) {
    cpu.registers[FLAG_REGISTER] = flag as u8;
    cpu.registers[instr.x() as usize] = result;
}

/// 8xy4 (ADD Vx, Vy)
///
/// ADDs VY to VX, and stores the result in VX.
/// Overflow is wrapped.
/// If overflow, set VF to 1, else 0.
fn add(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    let (x, y) = operands_xy(cpu, instr);
    let (result, carry) = x.overflowing_add(y);
    store_with_flag(cpu, instr, result, carry);
    Ok(Flow::Ok)
}

/// 8xy5 (SUB Vx, Vy)
///
/// Subtracts VY from VX, and stores the result in VX.
/// VF is set to 0 when there is a borrow, set to 1 when there isn't.
fn sub(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    let (x, y) = operands_xy(cpu, instr);
    store_with_flag(cpu, instr, x.wrapping_sub(y), x >= y);
    Ok(Flow::Ok)
}

/// 8xy7 (SUBN Vx, Vy)
///
/// Subtracts VX from VY, and stores the result in VX.
/// VF is set to 0 when there is a borrow, set to 1 when there isn't.
fn subn(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    let (x, y) = operands_xy(cpu, instr);
    store_with_flag(cpu, instr, y.wrapping_sub(x), y >= x);
    Ok(Flow::Ok)
}

/// 8xy6 (SHR Vx)
///
/// If the least-significant bit of Vx is 1, then VF is set to 1, otherwise 0.
/// Shift VX right by 1.
/// VY is unused.
fn shift_right(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    let x = cpu.registers[instr.x() as usize];
    store_with_flag(cpu, instr, x >> 1, x & 1 == 1);
    Ok(Flow::Ok)
}

/// 8xyE (SHL Vx)
///
/// If the most-significant bit of Vx is 1, then VF is set to 1, otherwise 0.
/// Shift VX left by 1.
/// VY is unused.
fn shift_left(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    let x = cpu.registers[instr.x() as usize];
    store_with_flag(cpu, instr, x << 1, x & 0x80 != 0);
    Ok(Flow::Ok)
}

// ----------------------------------------------------------------------------
// Display

/// Dxyn (DRW Vx, Vy, nibble)
///
/// Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
/// Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
/// memory pointed to by address register I.
///
/// If the sprite is drawn outside of the display area, it is wrapped around to the other side.
///
/// If the drawing operation erases existing pixels in the display buffer, register VF is set to
/// 1, and set to 0 if no display bits are unset. This is used for collision detection.
fn draw(cpu: &mut Chip8Cpu, instr: Instr, conf: &Chip8Conf) -> OpResult {
    let (x, y) = operands_xy(cpu, instr);
    let (x, y) = (x as usize, y as usize);

    // Fetch the whole sprite first so a bad address leaves the display untouched.
    let mut sprite = [0u8; 0xF];
    let rows = instr.n() as usize;
    for (r, row) in sprite.iter_mut().enumerate().take(rows) {
        *row = cpu.read(index_address(cpu, r, conf))?;
    }

    let mut is_erased = false;

    for (r, row) in sprite.iter().enumerate().take(rows) {
        // Each row is 8 bits representing the 8 pixels of the sprite.
        for c in 0..8 {
            if (row >> (7 - c)) & 1 == 0 {
                continue;
            }

            let d = ((x + c) & DISPLAY_WIDTH_MASK)
                + ((y + r) & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH;

            // XOR erases a pixel when both the old and new values are both 1.
            is_erased |= cpu.display[d];
            cpu.display[d] = !cpu.display[d];
        }
    }

    // If a pixel was erased, then a collision occurred.
    cpu.registers[FLAG_REGISTER] = is_erased as u8;
    Ok(Flow::Draw)
}

// ----------------------------------------------------------------------------
// Input

/// Fx0A (LD Vx, K)
///
/// Wait for a key press, store the value of the key in Vx.
/// While no key is pressed the program counter is rewound, so the
/// same instruction is executed again on the next cycle.
fn wait_key(cpu: &mut Chip8Cpu, instr: Instr) -> OpResult {
    let register = instr.x();

    match cpu.first_key() {
        Some(k) => {
            if cpu.run_state != RunState::Running {
                debug!("key wait resolved with k{k:x}");
            }
            cpu.registers[register as usize] = k;
            cpu.run_state = RunState::Running;
            Ok(Flow::Ok)
        }
        None => {
            if cpu.run_state == RunState::Running {
                debug!("waiting for key into V{register:X}");
            }
            // rewind the program counter to stall the machine
            cpu.pc -= 2;
            cpu.run_state = RunState::AwaitingKey { register };
            Ok(Flow::KeyWait)
        }
    }
}

// ----------------------------------------------------------------------------
// Memory

/// Fx1E (ADD I, Vx)
fn add_index(cpu: &mut Chip8Cpu, instr: Instr, conf: &Chip8Conf) -> OpResult {
    let address = cpu.address as usize + cpu.registers[instr.x() as usize] as usize;

    if address > ADDRESS_MASK {
        match conf.index_overflow {
            AddressPolicy::Fault => return Err(FaultKind::AddressRange { address }),
            AddressPolicy::Wrap => warn!("index register overflow 0x{address:04X} wrapped"),
        }
    }

    cpu.address = (address & ADDRESS_MASK) as Address;
    Ok(Flow::Ok)
}

/// Fx33 (LD B, Vx)
///
/// Store the binary-coded decimal representation of Vx
/// in the memory locations I, I+1, and I+2.
fn store_bcd(cpu: &mut Chip8Cpu, instr: Instr, conf: &Chip8Conf) -> OpResult {
    let x = cpu.registers[instr.x() as usize];
    let digits = [x / 100, x / 10 % 10, x % 10];
    store(cpu, &digits, conf)
}

/// Fx55 (LD [I], Vx)
///
/// Store registers V0 through Vx in memory starting at location I.
fn store_registers(cpu: &mut Chip8Cpu, instr: Instr, conf: &Chip8Conf) -> OpResult {
    let registers = cpu.registers;
    store(cpu, &registers[0..=instr.x() as usize], conf)
}

/// Write bytes starting at I, only once every target is known to be writable.
fn store(cpu: &mut Chip8Cpu, data: &[u8], conf: &Chip8Conf) -> OpResult {
    for offset in 0..data.len() {
        cpu.check_writable(index_address(cpu, offset, conf))?;
    }
    for (offset, value) in data.iter().enumerate() {
        cpu.write(index_address(cpu, offset, conf), *value)?;
    }
    Ok(Flow::Ok)
}

/// Fx65 (LD Vx, [I])
///
/// Read registers V0 through Vx from memory starting at location I.
fn load_registers(cpu: &mut Chip8Cpu, instr: Instr, conf: &Chip8Conf) -> OpResult {
    let count = instr.x() as usize + 1;
    let mut values = [0u8; REGISTER_COUNT];
    for (offset, value) in values.iter_mut().enumerate().take(count) {
        *value = cpu.read(index_address(cpu, offset, conf))?;
    }
    cpu.registers[0..count].copy_from_slice(&values[0..count]);
    Ok(Flow::Ok)
}
