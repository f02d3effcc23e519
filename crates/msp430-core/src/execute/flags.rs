//! Status flag computation for ALU results.

use crate::{AccessWidth, Registers, SR_C, SR_N, SR_V, SR_Z};

/// Describes how the status flags change after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsUpdate {
    /// Flags are left untouched.
    #[default]
    Keep,
    /// All four arithmetic flags are replaced.
    Update {
        /// Zero flag.
        zero: bool,
        /// Negative flag.
        negative: bool,
        /// Carry flag.
        carry: bool,
        /// Overflow flag.
        overflow: bool,
    },
}

impl FlagsUpdate {
    /// Flags for a result with explicit carry and overflow.
    #[must_use]
    pub const fn from_result(value: u32, width: AccessWidth, carry: bool, overflow: bool) -> Self {
        let value = value & width.mask();
        Self::Update {
            zero: value == 0,
            negative: value & width.sign_bit() != 0,
            carry,
            overflow,
        }
    }

    /// Flags for logic results where carry is the inverse of zero.
    #[must_use]
    pub const fn logic(value: u32, width: AccessWidth, overflow: bool) -> Self {
        Self::from_result(value, width, value & width.mask() != 0, overflow)
    }

    /// Writes the update into SR.
    pub fn apply(self, registers: &mut Registers) {
        if let Self::Update {
            zero,
            negative,
            carry,
            overflow,
        } = self
        {
            registers.set_flag(SR_Z, zero);
            registers.set_flag(SR_N, negative);
            registers.set_flag(SR_C, carry);
            registers.set_flag(SR_V, overflow);
        }
    }

    /// Carry this update would leave set, falling back to `current`.
    #[must_use]
    pub const fn carry_or(self, current: bool) -> bool {
        match self {
            Self::Keep => current,
            Self::Update { carry, .. } => carry,
        }
    }
}

/// A computed value and the flags it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    /// Result masked to the operation width.
    pub value: u32,
    /// Flag effect.
    pub flags: FlagsUpdate,
}

/// `dst + src + carry_in` at `width`.
#[must_use]
pub fn add(dst: u32, src: u32, carry_in: bool, width: AccessWidth) -> AluResult {
    let mask = width.mask();
    let (dst, src) = (dst & mask, src & mask);
    let sum = u64::from(dst) + u64::from(src) + u64::from(carry_in);
    #[allow(clippy::cast_possible_truncation)]
    let value = (sum as u32) & mask;
    let carry = sum > u64::from(mask);
    let overflow = !(dst ^ src) & (dst ^ value) & width.sign_bit() != 0;
    AluResult {
        value,
        flags: FlagsUpdate::from_result(value, width, carry, overflow),
    }
}

/// `dst - src - 1 + carry_in`, computed as `dst + !src + carry_in`.
///
/// Carry set means no borrow occurred.
#[must_use]
pub fn subtract(dst: u32, src: u32, carry_in: bool, width: AccessWidth) -> AluResult {
    add(dst, !src & width.mask(), carry_in, width)
}

/// Shifts right one bit, filling the top bit with `fill`.
#[must_use]
pub const fn shift_right(value: u32, fill: bool, width: AccessWidth) -> AluResult {
    let value = value & width.mask();
    let mut result = value >> 1;
    if fill {
        result |= width.sign_bit();
    }
    AluResult {
        value: result,
        flags: FlagsUpdate::from_result(result, width, value & 1 != 0, false),
    }
}

/// Shifts left one bit into carry.
#[must_use]
pub const fn shift_left(value: u32, width: AccessWidth) -> AluResult {
    let value = value & width.mask();
    let result = (value << 1) & width.mask();
    AluResult {
        value: result,
        flags: FlagsUpdate::from_result(result, width, value & width.sign_bit() != 0, false),
    }
}

/// Returns `true` when the width's sign bit is set in `value`.
#[must_use]
pub const fn is_negative(value: u32, width: AccessWidth) -> bool {
    value & width.sign_bit() != 0
}
