/// Instruction format selected by the top bits of the first word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionFormat {
    /// `0x0000..=0x0FFF`: MSP430X address instructions.
    AddressGroup,
    /// `0x1000..=0x13FF`: single-operand instructions, `RETI` and `CALLA`.
    SingleOperand,
    /// `0x1400..=0x17FF`: `PUSHM`/`POPM`.
    PushPopMultiple,
    /// `0x1800..=0x1FFF`: MSP430X extension word prefix.
    Extension,
    /// `0x2000..=0x3FFF`: conditional and unconditional jumps.
    Jump,
    /// `0x4000..=0xFFFF`: double-operand instructions.
    DoubleOperand,
}

/// Classifies an instruction word by format.
#[must_use]
pub const fn classify_word(word: u16) -> InstructionFormat {
    match word >> 12 {
        0x0 => InstructionFormat::AddressGroup,
        0x1 => match (word >> 10) & 0x3 {
            0 => InstructionFormat::SingleOperand,
            1 => InstructionFormat::PushPopMultiple,
            _ => InstructionFormat::Extension,
        },
        0x2 | 0x3 => InstructionFormat::Jump,
        _ => InstructionFormat::DoubleOperand,
    }
}

/// Double-operand (format I) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DoubleOp {
    Mov,
    Add,
    Addc,
    Subc,
    Sub,
    Cmp,
    Dadd,
    Bit,
    Bic,
    Bis,
    Xor,
    And,
}

impl DoubleOp {
    /// Returns `true` for operations that do not write the destination.
    #[must_use]
    pub const fn is_compare(self) -> bool {
        matches!(self, Self::Cmp | Self::Bit)
    }
}

/// Opcode nibble (bits 15..12) to double-operand operation.
pub const DOUBLE_OPERAND_TABLE: &[(u8, DoubleOp)] = &[
    (0x4, DoubleOp::Mov),
    (0x5, DoubleOp::Add),
    (0x6, DoubleOp::Addc),
    (0x7, DoubleOp::Subc),
    (0x8, DoubleOp::Sub),
    (0x9, DoubleOp::Cmp),
    (0xA, DoubleOp::Dadd),
    (0xB, DoubleOp::Bit),
    (0xC, DoubleOp::Bic),
    (0xD, DoubleOp::Bis),
    (0xE, DoubleOp::Xor),
    (0xF, DoubleOp::And),
];

/// Looks up the double-operand operation for an opcode nibble.
#[must_use]
pub fn double_operand(opcode: u8) -> Option<DoubleOp> {
    DOUBLE_OPERAND_TABLE
        .iter()
        .find_map(|(entry, op)| (*entry == opcode).then_some(*op))
}

/// Single-operand (format II) operations; `RETI` and `CALLA` decode apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SingleOp {
    Rrc,
    Swpb,
    Rra,
    Sxt,
    Push,
    Call,
}

impl SingleOp {
    /// Returns `true` when the `.B` form is encodable.
    #[must_use]
    pub const fn allows_byte(self) -> bool {
        matches!(self, Self::Rrc | Self::Rra | Self::Push)
    }
}

/// Opcode field (bits 9..7) to single-operand operation.
pub const SINGLE_OPERAND_TABLE: &[(u8, SingleOp)] = &[
    (0, SingleOp::Rrc),
    (1, SingleOp::Swpb),
    (2, SingleOp::Rra),
    (3, SingleOp::Sxt),
    (4, SingleOp::Push),
    (5, SingleOp::Call),
];

/// Looks up the single-operand operation for an opcode field.
#[must_use]
pub fn single_operand(opcode: u8) -> Option<SingleOp> {
    SINGLE_OPERAND_TABLE
        .iter()
        .find_map(|(entry, op)| (*entry == opcode).then_some(*op))
}

/// Jump conditions (bits 12..10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum JumpCondition {
    Ne,
    Eq,
    Nc,
    C,
    N,
    Ge,
    L,
    Always,
}

impl JumpCondition {
    /// Decodes the condition field of a jump word.
    #[must_use]
    pub const fn from_word(word: u16) -> Self {
        match (word >> 10) & 0x7 {
            0 => Self::Ne,
            1 => Self::Eq,
            2 => Self::Nc,
            3 => Self::C,
            4 => Self::N,
            5 => Self::Ge,
            6 => Self::L,
            _ => Self::Always,
        }
    }
}

/// 20-bit address arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AddressOp {
    Mova,
    Cmpa,
    Adda,
    Suba,
}

impl AddressOp {
    /// Decodes the low two bits of an address-group kind field.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => Self::Mova,
            1 => Self::Cmpa,
            2 => Self::Adda,
            _ => Self::Suba,
        }
    }
}

/// Multi-bit rotate/shift operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RotateOp {
    Rrcm,
    Rram,
    Rlam,
    Rrum,
}

impl RotateOp {
    /// Decodes bits 9..8 of a rotate word.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => Self::Rrcm,
            1 => Self::Rram,
            2 => Self::Rlam,
            _ => Self::Rrum,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::{
        classify_word, double_operand, single_operand, InstructionFormat, JumpCondition,
        DOUBLE_OPERAND_TABLE, SINGLE_OPERAND_TABLE,
    };
    use crate::encoding::{DoubleOp, SingleOp};

    #[rstest]
    #[case(0x0000, InstructionFormat::AddressGroup)]
    #[case(0x0FFF, InstructionFormat::AddressGroup)]
    #[case(0x1000, InstructionFormat::SingleOperand)]
    #[case(0x1300, InstructionFormat::SingleOperand)]
    #[case(0x13FF, InstructionFormat::SingleOperand)]
    #[case(0x1400, InstructionFormat::PushPopMultiple)]
    #[case(0x17FF, InstructionFormat::PushPopMultiple)]
    #[case(0x1800, InstructionFormat::Extension)]
    #[case(0x1FFF, InstructionFormat::Extension)]
    #[case(0x2000, InstructionFormat::Jump)]
    #[case(0x3FFF, InstructionFormat::Jump)]
    #[case(0x4000, InstructionFormat::DoubleOperand)]
    #[case(0xFFFF, InstructionFormat::DoubleOperand)]
    fn formats_follow_top_bits(#[case] word: u16, #[case] expected: InstructionFormat) {
        assert_eq!(classify_word(word), expected);
    }

    #[test]
    fn tables_have_unique_keys() {
        let double: HashSet<_> = DOUBLE_OPERAND_TABLE.iter().map(|(key, _)| *key).collect();
        assert_eq!(double.len(), DOUBLE_OPERAND_TABLE.len());
        let single: HashSet<_> = SINGLE_OPERAND_TABLE.iter().map(|(key, _)| *key).collect();
        assert_eq!(single.len(), SINGLE_OPERAND_TABLE.len());
    }

    #[test]
    fn lookups_cover_assigned_opcodes_only() {
        assert_eq!(double_operand(0x4), Some(DoubleOp::Mov));
        assert_eq!(double_operand(0xA), Some(DoubleOp::Dadd));
        assert_eq!(double_operand(0x3), None);
        assert_eq!(single_operand(5), Some(SingleOp::Call));
        assert_eq!(single_operand(6), None);
        assert!(SingleOp::Rra.allows_byte());
        assert!(!SingleOp::Sxt.allows_byte());
    }

    #[test]
    fn jump_condition_field() {
        assert_eq!(JumpCondition::from_word(0x2000), JumpCondition::Ne);
        assert_eq!(JumpCondition::from_word(0x2400), JumpCondition::Eq);
        assert_eq!(JumpCondition::from_word(0x3800), JumpCondition::L);
        assert_eq!(JumpCondition::from_word(0x3C00), JumpCondition::Always);
    }
}
