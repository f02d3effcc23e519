//! Instruction cycle costs.
//!
//! Format I and format II costs depend on the addressing modes involved, so
//! they are looked up by operand class. Everything else has a fixed cost.

use crate::decoder::{AddressingMode, Instruction, Operand};
use crate::encoding::{AddressOp, SingleOp};
use crate::Register;

/// Instruction and dispatch forms with a fixed cycle cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleCostKind {
    /// Any jump, taken or not.
    Jump,
    /// Return from interrupt.
    Reti,
    /// Interrupt entry sequence.
    InterruptEntry,
    /// Reset vector entry sequence.
    ResetEntry,
    /// `CALLA` through a register, indirect, autoincrement or immediate.
    CallaDirect,
    /// `CALLA` through an indexed, symbolic or absolute operand.
    CallaIndexed,
    /// Register-to-register address instruction.
    AddressRegister,
    /// Address instruction with a 20-bit immediate source.
    AddressImmediate,
    /// `MOVA @Rs` / `MOVA @Rs+` into a register.
    MovaIndirect,
    /// `MOVA` between a register and an absolute or indexed operand.
    MovaIndexed,
    /// Base cost of `PUSHM`/`POPM`; one cycle is added per register.
    MultipleBase,
}

/// Fixed cycle costs.
pub const CYCLE_COST_TABLE: &[(CycleCostKind, u16)] = &[
    (CycleCostKind::Jump, 2),
    (CycleCostKind::Reti, 5),
    (CycleCostKind::InterruptEntry, 6),
    (CycleCostKind::ResetEntry, 4),
    (CycleCostKind::CallaDirect, 5),
    (CycleCostKind::CallaIndexed, 6),
    (CycleCostKind::AddressRegister, 1),
    (CycleCostKind::AddressImmediate, 2),
    (CycleCostKind::MovaIndirect, 3),
    (CycleCostKind::MovaIndexed, 4),
    (CycleCostKind::MultipleBase, 2),
];

/// Looks up the cycle cost for a fixed-cost kind.
#[must_use]
pub fn cycle_cost(kind: CycleCostKind) -> Option<u16> {
    CYCLE_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
}

/// Operand classes that determine format I and II costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceClass {
    /// Register or constant generator.
    Register,
    /// `@Rn`.
    Indirect,
    /// `@Rn+` or `#N`.
    AutoIncrement,
    /// `x(Rn)`, `EDE` or `&EDE`.
    Indexed,
}

impl SourceClass {
    /// Classifies a source operand.
    #[must_use]
    pub const fn of(operand: &Operand) -> Self {
        match operand.mode {
            AddressingMode::Register | AddressingMode::Constant => Self::Register,
            AddressingMode::Indirect => Self::Indirect,
            AddressingMode::IndirectAutoIncrement | AddressingMode::Immediate => {
                Self::AutoIncrement
            }
            AddressingMode::Indexed | AddressingMode::Symbolic | AddressingMode::Absolute => {
                Self::Indexed
            }
        }
    }
}

/// Destination classes for format I costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationClass {
    /// Any register except PC.
    Register,
    /// The program counter.
    ProgramCounter,
    /// A memory operand.
    Memory,
}

impl DestinationClass {
    /// Classifies a destination operand.
    #[must_use]
    pub fn of(operand: &Operand) -> Self {
        match operand.mode {
            AddressingMode::Register if operand.register == Register::PC => Self::ProgramCounter,
            AddressingMode::Register => Self::Register,
            _ => Self::Memory,
        }
    }
}

/// Format I costs by source and destination class.
pub const FORMAT_I_COST_TABLE: &[((SourceClass, DestinationClass), u16)] = &[
    ((SourceClass::Register, DestinationClass::Register), 1),
    ((SourceClass::Register, DestinationClass::ProgramCounter), 2),
    ((SourceClass::Register, DestinationClass::Memory), 4),
    ((SourceClass::Indirect, DestinationClass::Register), 2),
    ((SourceClass::Indirect, DestinationClass::ProgramCounter), 2),
    ((SourceClass::Indirect, DestinationClass::Memory), 5),
    ((SourceClass::AutoIncrement, DestinationClass::Register), 2),
    ((SourceClass::AutoIncrement, DestinationClass::ProgramCounter), 3),
    ((SourceClass::AutoIncrement, DestinationClass::Memory), 5),
    ((SourceClass::Indexed, DestinationClass::Register), 3),
    ((SourceClass::Indexed, DestinationClass::ProgramCounter), 3),
    ((SourceClass::Indexed, DestinationClass::Memory), 6),
];

/// Format II instruction groups that share a cost row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingleOperandClass {
    /// `RRC`, `RRA`, `SWPB`, `SXT`.
    Shift,
    /// `PUSH`.
    Push,
    /// `CALL`.
    Call,
}

impl SingleOperandClass {
    /// Groups a format II operation.
    #[must_use]
    pub const fn of(op: SingleOp) -> Self {
        match op {
            SingleOp::Rrc | SingleOp::Rra | SingleOp::Swpb | SingleOp::Sxt => Self::Shift,
            SingleOp::Push => Self::Push,
            SingleOp::Call => Self::Call,
        }
    }
}

/// Format II costs by instruction group and operand class.
pub const FORMAT_II_COST_TABLE: &[((SingleOperandClass, SourceClass), u16)] = &[
    ((SingleOperandClass::Shift, SourceClass::Register), 1),
    ((SingleOperandClass::Shift, SourceClass::Indirect), 3),
    ((SingleOperandClass::Shift, SourceClass::AutoIncrement), 3),
    ((SingleOperandClass::Shift, SourceClass::Indexed), 4),
    ((SingleOperandClass::Push, SourceClass::Register), 3),
    ((SingleOperandClass::Push, SourceClass::Indirect), 4),
    ((SingleOperandClass::Push, SourceClass::AutoIncrement), 4),
    ((SingleOperandClass::Push, SourceClass::Indexed), 5),
    ((SingleOperandClass::Call, SourceClass::Register), 4),
    ((SingleOperandClass::Call, SourceClass::Indirect), 4),
    ((SingleOperandClass::Call, SourceClass::AutoIncrement), 5),
    ((SingleOperandClass::Call, SourceClass::Indexed), 5),
];

fn format_i_cost(src: SourceClass, dst: DestinationClass) -> u16 {
    FORMAT_I_COST_TABLE
        .iter()
        .find_map(|(key, cycles)| (*key == (src, dst)).then_some(*cycles))
        .unwrap_or(1)
}

fn format_ii_cost(op: SingleOperandClass, operand: SourceClass) -> u16 {
    FORMAT_II_COST_TABLE
        .iter()
        .find_map(|(key, cycles)| (*key == (op, operand)).then_some(*cycles))
        .unwrap_or(1)
}

fn fixed(kind: CycleCostKind) -> u64 {
    u64::from(cycle_cost(kind).unwrap_or(1))
}

/// Cycles one execution of `instruction` costs, before any repetition.
#[must_use]
pub fn instruction_cycles(instruction: &Instruction) -> u64 {
    match instruction {
        Instruction::DoubleOperand { src, dst, .. } => {
            u64::from(format_i_cost(SourceClass::of(src), DestinationClass::of(dst)))
        }
        Instruction::SingleOperand { op, operand, .. } => u64::from(format_ii_cost(
            SingleOperandClass::of(*op),
            SourceClass::of(operand),
        )),
        Instruction::Reti => fixed(CycleCostKind::Reti),
        Instruction::Jump { .. } => fixed(CycleCostKind::Jump),
        Instruction::Calla { target } => match SourceClass::of(target) {
            SourceClass::Indexed => fixed(CycleCostKind::CallaIndexed),
            _ => fixed(CycleCostKind::CallaDirect),
        },
        Instruction::PushMultiple { count, .. } | Instruction::PopMultiple { count, .. } => {
            fixed(CycleCostKind::MultipleBase) + u64::from(*count)
        }
        Instruction::RotateMultiple { count, .. } => u64::from(*count),
        Instruction::Address { op, src, dst } => {
            if src.mode == AddressingMode::Immediate {
                return fixed(CycleCostKind::AddressImmediate);
            }
            match (op, SourceClass::of(src), dst.mode) {
                (AddressOp::Mova, SourceClass::Indirect | SourceClass::AutoIncrement, _) => {
                    fixed(CycleCostKind::MovaIndirect)
                }
                (AddressOp::Mova, SourceClass::Indexed, _)
                | (AddressOp::Mova, _, AddressingMode::Absolute | AddressingMode::Indexed | AddressingMode::Symbolic) => {
                    fixed(CycleCostKind::MovaIndexed)
                }
                _ => fixed(CycleCostKind::AddressRegister),
            }
        }
    }
}

/// Cycles for an instruction executed `repeat` times under an extension word.
///
/// Repetition pays the single-execution cost per iteration plus one cycle
/// for the extension word.
#[must_use]
pub fn repeated_cycles(instruction: &Instruction, repeat: u32) -> u64 {
    1 + instruction_cycles(instruction) * u64::from(repeat.max(1))
}

/// Interrupt entry cost.
#[must_use]
pub fn interrupt_cycles() -> u64 {
    fixed(CycleCostKind::InterruptEntry)
}

/// Reset entry cost.
#[must_use]
pub fn reset_cycles() -> u64 {
    fixed(CycleCostKind::ResetEntry)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::{
        cycle_cost, instruction_cycles, repeated_cycles, CycleCostKind, CYCLE_COST_TABLE,
        FORMAT_II_COST_TABLE, FORMAT_I_COST_TABLE,
    };
    use crate::decoder::{Decoder, Instruction};

    fn decode(words: &[u16]) -> Instruction {
        Decoder::new(true)
            .decode(0x4400, |address| {
                Ok(words
                    .get(((address - 0x4400) / 2) as usize)
                    .copied()
                    .unwrap_or(0))
            })
            .expect("valid encoding")
            .instruction
    }

    #[test]
    fn tables_contain_unique_keys() {
        let kinds: HashSet<_> = CYCLE_COST_TABLE.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds.len(), CYCLE_COST_TABLE.len());
        let format_i: HashSet<_> = FORMAT_I_COST_TABLE.iter().map(|(key, _)| *key).collect();
        assert_eq!(format_i.len(), FORMAT_I_COST_TABLE.len());
        let format_ii: HashSet<_> = FORMAT_II_COST_TABLE.iter().map(|(key, _)| *key).collect();
        assert_eq!(format_ii.len(), FORMAT_II_COST_TABLE.len());
    }

    #[test]
    fn every_table_entry_resolves_via_lookup() {
        for (kind, expected_cycles) in CYCLE_COST_TABLE {
            assert_eq!(cycle_cost(*kind), Some(*expected_cycles));
        }
    }

    #[rstest]
    #[case(&[0x4405], 1)] // mov r4, r5
    #[case(&[0x4400], 2)] // mov r4, pc
    #[case(&[0x4485, 0x0002], 4)] // mov r4, 2(r5)
    #[case(&[0x4435], 2)] // mov @r4+, r5
    #[case(&[0x4130], 3)] // ret: mov @sp+, pc
    #[case(&[0x40B2, 0x1234, 0x0200], 5)] // mov #n, &abs
    #[case(&[0x4495, 0x0002, 0x0004], 6)] // mov 2(r4), 4(r5)
    #[case(&[0x4304], 1)] // mov #0, r4 via constant generator
    #[case(&[0x4392, 0x0200], 4)] // mov #1, &abs via constant generator
    fn format_i_costs(#[case] words: &[u16], #[case] cycles: u64) {
        assert_eq!(instruction_cycles(&decode(words)), cycles);
    }

    #[rstest]
    #[case(&[0x1004], 1)] // rrc r4
    #[case(&[0x1124], 3)] // rra @r4
    #[case(&[0x1204], 3)] // push r4
    #[case(&[0x1230, 0x1234], 4)] // push #n
    #[case(&[0x1284], 4)] // call r4
    #[case(&[0x12B0, 0x4500], 5)] // call #n
    #[case(&[0x1290, 0x0010], 5)] // call label
    fn format_ii_costs(#[case] words: &[u16], #[case] cycles: u64) {
        assert_eq!(instruction_cycles(&decode(words)), cycles);
    }

    #[rstest]
    #[case(&[0x1300], 5)] // reti
    #[case(&[0x3C00], 2)] // jmp
    #[case(&[0x142A], 5)] // pushm.a #3, r10
    #[case(&[0x0CC5], 1)] // mova r12, r5
    #[case(&[0x0084, 0x1000], 2)] // mova #imm, r4
    #[case(&[0x0405], 3)] // mova @r4, r5
    #[case(&[0x0A54], 3)] // rlam.w #3, r4
    #[case(&[0x1344], 5)] // calla r4
    #[case(&[0x1354, 0x0010], 6)] // calla 16(r4)
    fn fixed_and_address_costs(#[case] words: &[u16], #[case] cycles: u64) {
        assert_eq!(instruction_cycles(&decode(words)), cycles);
    }

    #[test]
    fn repetition_scales_with_count() {
        let rrc = decode(&[0x1004]);
        assert_eq!(repeated_cycles(&rrc, 1), 2);
        assert_eq!(repeated_cycles(&rrc, 4), 5);
    }
}
