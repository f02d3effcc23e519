//! Instruction execution.
//!
//! Handlers run after the PC has been advanced past the instruction and all
//! of its extension and index words, so PC-relative reads see the address of
//! the next instruction. Each handler resolves its operands, computes, stores
//! the result and then updates the status flags. A fault aborts the
//! instruction with the side effects that preceded it still applied, as on
//! the hardware.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, missing_docs)]

mod flags;
mod helpers;

pub use flags::{add, shift_left, shift_right, subtract, AluResult, FlagsUpdate};
pub(crate) use helpers::Machine;
pub use helpers::{autoincrement, sign_extend, stack_slot, Location};

use crate::decoder::{ExtensionWord, Instruction, Operand, RepeatCount};
use crate::encoding::{AddressOp, DoubleOp, JumpCondition, RotateOp, SingleOp};
use crate::timing::{instruction_cycles, repeated_cycles};
use crate::{AccessWidth, EmulationError, Register, SR_C, SR_N, SR_V, SR_Z};

use flags::is_negative;

/// What executing one instruction did besides its architectural effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOutcome {
    /// Cycles consumed, including repetitions.
    pub cycles: u64,
    /// The instruction was `RETI`.
    pub returned_from_interrupt: bool,
}

/// Executes a decoded instruction against `machine`.
pub(crate) fn execute(
    machine: &mut Machine<'_>,
    instruction: &Instruction,
) -> Result<ExecuteOutcome, EmulationError> {
    let mut returned_from_interrupt = false;
    let mut repeat = 1;
    let mut extended_form = false;

    match *instruction {
        Instruction::DoubleOperand {
            op,
            width,
            src,
            dst,
            extension,
        } => {
            repeat = repeat_count(machine, extension);
            extended_form = extension.is_some();
            let zero_carry = extension.is_some_and(|ext| ext.zero_carry);
            for _ in 0..repeat {
                double_operand(machine, op, width, &src, &dst, zero_carry)?;
            }
        }
        Instruction::SingleOperand {
            op,
            width,
            operand,
            extension,
        } => {
            repeat = repeat_count(machine, extension);
            extended_form = extension.is_some();
            let zero_carry = extension.is_some_and(|ext| ext.zero_carry);
            for _ in 0..repeat {
                single_operand(machine, op, width, &operand, zero_carry)?;
            }
        }
        Instruction::Reti => {
            reti(machine)?;
            returned_from_interrupt = true;
        }
        Instruction::Calla { target } => {
            let location = machine.resolve(&target, AccessWidth::Word20)?;
            let destination = machine.load(location, AccessWidth::Word20)?;
            let return_address = machine.reg(Register::PC);
            machine.push(return_address, AccessWidth::Word20)?;
            machine.set_reg(Register::PC, destination)?;
        }
        Instruction::PushMultiple {
            width,
            count,
            register,
        } => {
            for offset in 0..usize::from(count) {
                let register = Register::ALL[register.index() - offset];
                let value = machine.reg(register);
                machine.push(value, width)?;
            }
        }
        Instruction::PopMultiple {
            width,
            count,
            register,
        } => {
            for offset in 0..usize::from(count) {
                let register = Register::ALL[register.index() + offset];
                let value = machine.pop(width)?;
                machine.set_reg(register, value)?;
            }
        }
        Instruction::Jump { condition, offset } => {
            if jump_taken(machine, condition) {
                let pc = machine.reg(Register::PC);
                let target = pc.wrapping_add((i32::from(offset) * 2) as u32);
                machine.set_reg(Register::PC, target)?;
            }
        }
        Instruction::Address { op, src, dst } => address(machine, op, &src, &dst)?,
        Instruction::RotateMultiple {
            op,
            width,
            count,
            register,
        } => rotate_multiple(machine, op, width, count, register)?,
    }

    let cycles = if extended_form {
        repeated_cycles(instruction, repeat)
    } else {
        instruction_cycles(instruction)
    };
    Ok(ExecuteOutcome {
        cycles,
        returned_from_interrupt,
    })
}

fn repeat_count(machine: &mut Machine<'_>, extension: Option<ExtensionWord>) -> u32 {
    match extension.and_then(|ext| ext.repeat) {
        None => 1,
        Some(RepeatCount::Count(count)) => u32::from(count),
        Some(RepeatCount::Register(register)) => (machine.reg(register) & 0xF) + 1,
    }
}

/// Stores `result` and applies its flags.
///
/// When the destination is SR itself, the stored value wins over the flags.
fn commit(
    machine: &mut Machine<'_>,
    location: Location,
    result: AluResult,
    width: AccessWidth,
    write: bool,
) -> Result<(), EmulationError> {
    if write {
        machine.store(location, result.value, width)?;
        if location == Location::Register(Register::SR) {
            return Ok(());
        }
    }
    result.flags.apply(machine.registers);
    Ok(())
}

fn double_operand(
    machine: &mut Machine<'_>,
    op: DoubleOp,
    width: AccessWidth,
    src: &Operand,
    dst: &Operand,
    zero_carry: bool,
) -> Result<(), EmulationError> {
    let source = machine.resolve(src, width)?;
    let s = machine.load(source, width)?;
    let target = machine.resolve(dst, width)?;
    let d = if op == DoubleOp::Mov {
        0
    } else {
        machine.load(target, width)?
    };
    let carry_in = !zero_carry && machine.registers.flag(SR_C);

    let keep = |value| AluResult {
        value,
        flags: FlagsUpdate::Keep,
    };
    let logic = |value, overflow| AluResult {
        value,
        flags: FlagsUpdate::logic(value, width, overflow),
    };
    let result = match op {
        DoubleOp::Mov => keep(s),
        DoubleOp::Add => add(d, s, false, width),
        // Decimal adjust is not modelled; DADD adds in binary with carry.
        DoubleOp::Addc | DoubleOp::Dadd => add(d, s, carry_in, width),
        DoubleOp::Sub | DoubleOp::Cmp => subtract(d, s, true, width),
        DoubleOp::Subc => subtract(d, s, carry_in, width),
        DoubleOp::Bit | DoubleOp::And => logic(d & s, false),
        DoubleOp::Bic => keep(d & !s),
        DoubleOp::Bis => keep(d | s),
        DoubleOp::Xor => logic(d ^ s, is_negative(d, width) && is_negative(s, width)),
    };
    commit(machine, target, result, width, !op.is_compare())
}

fn single_operand(
    machine: &mut Machine<'_>,
    op: SingleOp,
    width: AccessWidth,
    operand: &Operand,
    zero_carry: bool,
) -> Result<(), EmulationError> {
    match op {
        SingleOp::Push => {
            let location = machine.resolve(operand, width)?;
            let value = machine.load(location, width)?;
            machine.push(value, width)
        }
        SingleOp::Call => {
            let location = machine.resolve(operand, AccessWidth::Word)?;
            let destination = machine.load(location, AccessWidth::Word)?;
            let return_address = machine.reg(Register::PC) & 0xFFFF;
            machine.push(return_address, AccessWidth::Word)?;
            machine.set_reg(Register::PC, destination)
        }
        SingleOp::Rrc | SingleOp::Rra => {
            let location = machine.resolve(operand, width)?;
            let value = machine.load(location, width)?;
            let fill = if op == SingleOp::Rrc {
                !zero_carry && machine.registers.flag(SR_C)
            } else {
                is_negative(value, width)
            };
            commit(machine, location, shift_right(value, fill, width), width, true)
        }
        SingleOp::Swpb => {
            let location = machine.resolve(operand, width)?;
            let value = machine.load(location, width)?;
            let swapped = (value & 0xF_0000) | ((value & 0xFF) << 8) | ((value >> 8) & 0xFF);
            machine.store(location, swapped, width)
        }
        SingleOp::Sxt => {
            let location = machine.resolve(operand, width)?;
            let value = machine.load(location, width)?;
            let extended = sign_extend(value, AccessWidth::Byte);
            let store_width = match location {
                Location::Register(_) if machine.extended => AccessWidth::Word20,
                _ => width,
            };
            let result = AluResult {
                value: extended & store_width.mask(),
                flags: FlagsUpdate::logic(extended, width, false),
            };
            commit(machine, location, result, store_width, true)
        }
    }
}

fn reti(machine: &mut Machine<'_>) -> Result<(), EmulationError> {
    let status = machine.pop(AccessWidth::Word)?;
    let pc = machine.pop(AccessWidth::Word)?;
    if machine.extended {
        machine.set_reg(Register::SR, status & 0x0FFF)?;
        machine.set_reg(Register::PC, pc | ((status & 0xF000) << 4))?;
    } else {
        machine.set_reg(Register::SR, status)?;
        machine.set_reg(Register::PC, pc)?;
    }
    machine.ctx.interrupts_mut().end_service();
    Ok(())
}

fn jump_taken(machine: &Machine<'_>, condition: JumpCondition) -> bool {
    let flag = |bits| machine.registers.flag(bits);
    match condition {
        JumpCondition::Ne => !flag(SR_Z),
        JumpCondition::Eq => flag(SR_Z),
        JumpCondition::Nc => !flag(SR_C),
        JumpCondition::C => flag(SR_C),
        JumpCondition::N => flag(SR_N),
        JumpCondition::Ge => flag(SR_N) == flag(SR_V),
        JumpCondition::L => flag(SR_N) != flag(SR_V),
        JumpCondition::Always => true,
    }
}

fn address(
    machine: &mut Machine<'_>,
    op: AddressOp,
    src: &Operand,
    dst: &Operand,
) -> Result<(), EmulationError> {
    const WIDTH: AccessWidth = AccessWidth::Word20;
    let source = machine.resolve(src, WIDTH)?;
    let s = machine.load(source, WIDTH)?;
    let target = machine.resolve(dst, WIDTH)?;
    match op {
        AddressOp::Mova => machine.store(target, s, WIDTH),
        AddressOp::Cmpa | AddressOp::Suba => {
            let d = machine.load(target, WIDTH)?;
            let result = subtract(d, s, true, WIDTH);
            commit(machine, target, result, WIDTH, op == AddressOp::Suba)
        }
        AddressOp::Adda => {
            let d = machine.load(target, WIDTH)?;
            commit(machine, target, add(d, s, false, WIDTH), WIDTH, true)
        }
    }
}

fn rotate_multiple(
    machine: &mut Machine<'_>,
    op: RotateOp,
    width: AccessWidth,
    count: u8,
    register: Register,
) -> Result<(), EmulationError> {
    let location = Location::Register(register);
    let mut result = AluResult {
        value: machine.load(location, width)?,
        flags: FlagsUpdate::Keep,
    };
    let carry = machine.registers.flag(SR_C);
    for _ in 0..count {
        let value = result.value;
        result = match op {
            RotateOp::Rrcm => shift_right(value, result.flags.carry_or(carry), width),
            RotateOp::Rram => shift_right(value, is_negative(value, width), width),
            RotateOp::Rlam => shift_left(value, width),
            RotateOp::Rrum => shift_right(value, false, width),
        };
    }
    commit(machine, location, result, width, true)
}
