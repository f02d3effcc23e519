//! Instruction decoder for MSP430 and MSP430X.
//!
//! The decoder pulls words through a fetch callback starting at the
//! instruction address, so it sees exactly the words the CPU would fetch.
//! Every operand word records the address it came from; symbolic operands
//! are relative to that address.

#![allow(
    missing_docs,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use crate::encoding::{
    classify_word, double_operand, single_operand, AddressOp, DoubleOp, InstructionFormat,
    JumpCondition, RotateOp, SingleOp,
};
use crate::{AccessWidth, EmulationError, FaultCode, Register};

/// Operand addressing modes after constant-generator resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Register,
    Indexed,
    Symbolic,
    Absolute,
    Indirect,
    IndirectAutoIncrement,
    Immediate,
    Constant,
}

/// A decoded source or destination operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub mode: AddressingMode,
    pub register: Register,
    /// Index, absolute address, immediate or constant.
    pub value: u32,
    /// `value` is a 20-bit quantity from an extension word or address instruction.
    pub long: bool,
    /// Address of the operand word; 0 when the mode has none.
    pub word_address: u32,
}

impl Operand {
    #[must_use]
    pub const fn register(register: Register) -> Self {
        Self {
            mode: AddressingMode::Register,
            register,
            value: 0,
            long: false,
            word_address: 0,
        }
    }

    #[must_use]
    pub const fn constant(register: Register, value: u32) -> Self {
        Self {
            mode: AddressingMode::Constant,
            register,
            value,
            long: false,
            word_address: 0,
        }
    }

    const fn with_mode(register: Register, mode: AddressingMode) -> Self {
        Self {
            mode,
            register,
            value: 0,
            long: false,
            word_address: 0,
        }
    }

    const fn with_word(
        register: Register,
        mode: AddressingMode,
        value: u32,
        long: bool,
        word_address: u32,
    ) -> Self {
        Self {
            mode,
            register,
            value,
            long,
            word_address,
        }
    }

    /// Returns `true` for modes that touch memory.
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(
            self.mode,
            AddressingMode::Indexed
                | AddressingMode::Symbolic
                | AddressingMode::Absolute
                | AddressingMode::Indirect
                | AddressingMode::IndirectAutoIncrement
        )
    }
}

/// Repetition source of a register-mode extension word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatCount {
    /// Fixed count, `1..=16`.
    Count(u8),
    /// Count is `(Rn & 0xF) + 1` at execution time.
    Register(Register),
}

/// Execution modifiers carried by an extension word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionWord {
    /// Carry-in forced to zero for every repetition.
    pub zero_carry: bool,
    /// Repetition for register-mode operations.
    pub repeat: Option<RepeatCount>,
}

/// A fully decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    DoubleOperand {
        op: DoubleOp,
        width: AccessWidth,
        src: Operand,
        dst: Operand,
        extension: Option<ExtensionWord>,
    },
    SingleOperand {
        op: SingleOp,
        width: AccessWidth,
        operand: Operand,
        extension: Option<ExtensionWord>,
    },
    Reti,
    Calla {
        target: Operand,
    },
    /// Pushes `register` down to `register - count + 1`.
    PushMultiple {
        width: AccessWidth,
        count: u8,
        register: Register,
    },
    /// Pops into `register` up to `register + count - 1`.
    PopMultiple {
        width: AccessWidth,
        count: u8,
        register: Register,
    },
    Jump {
        condition: JumpCondition,
        /// Signed offset in words.
        offset: i16,
    },
    Address {
        op: AddressOp,
        src: Operand,
        dst: Operand,
    },
    RotateMultiple {
        op: RotateOp,
        width: AccessWidth,
        count: u8,
        register: Register,
    },
}

/// An instruction and the number of bytes it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decoded {
    pub instruction: Instruction,
    pub length: u32,
}

/// Why decoding failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Encoding rejected; `word` is the offending instruction word.
    Fault { code: FaultCode, word: u16 },
    /// A word could not be fetched.
    Fetch(EmulationError),
}

const fn illegal(word: u16) -> DecodeError {
    DecodeError::Fault {
        code: FaultCode::IllegalInstruction,
        word,
    }
}

const fn extended_disabled(word: u16) -> DecodeError {
    DecodeError::Fault {
        code: FaultCode::ExtendedDisabled,
        word,
    }
}

const fn sign_extend_16(value: u16) -> u32 {
    value as i16 as i32 as u32 & 0xF_FFFF
}

struct Cursor<F> {
    next: u32,
    mask: u32,
    words: u32,
    fetch: F,
}

impl<F> Cursor<F>
where
    F: FnMut(u32) -> Result<u16, EmulationError>,
{
    fn word(&mut self) -> Result<(u16, u32), DecodeError> {
        let at = self.next;
        let word = (self.fetch)(at).map_err(DecodeError::Fetch)?;
        self.next = at.wrapping_add(2) & self.mask;
        self.words += 1;
        Ok((word, at))
    }
}

/// Decoder for one CPU variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoder {
    extended: bool,
}

impl Decoder {
    #[must_use]
    pub const fn new(extended: bool) -> Self {
        Self { extended }
    }

    /// Decodes the instruction at `pc`, fetching words through `fetch`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Fault`] for illegal or disabled encodings and
    /// [`DecodeError::Fetch`] when `fetch` fails.
    pub fn decode<F>(&self, pc: u32, fetch: F) -> Result<Decoded, DecodeError>
    where
        F: FnMut(u32) -> Result<u16, EmulationError>,
    {
        let mut cursor = Cursor {
            next: pc,
            mask: if self.extended { 0xF_FFFF } else { 0xFFFF },
            words: 0,
            fetch,
        };
        let (first, _) = cursor.word()?;
        let instruction = match classify_word(first) {
            InstructionFormat::DoubleOperand => Self::double(first, None, &mut cursor)?,
            InstructionFormat::SingleOperand => self.single(first, None, &mut cursor)?,
            InstructionFormat::Jump => Instruction::Jump {
                condition: JumpCondition::from_word(first),
                offset: ((first << 6) as i16) >> 6,
            },
            _ if !self.extended => return Err(extended_disabled(first)),
            InstructionFormat::Extension => {
                let (second, _) = cursor.word()?;
                match classify_word(second) {
                    InstructionFormat::DoubleOperand => {
                        Self::double(second, Some(first), &mut cursor)?
                    }
                    InstructionFormat::SingleOperand => {
                        self.single(second, Some(first), &mut cursor)?
                    }
                    _ => return Err(illegal(second)),
                }
            }
            InstructionFormat::AddressGroup => Self::address(first, &mut cursor)?,
            InstructionFormat::PushPopMultiple => Self::push_pop(first)?,
        };
        Ok(Decoded {
            instruction,
            length: cursor.words * 2,
        })
    }

    fn double<F>(
        word: u16,
        ext: Option<u16>,
        cursor: &mut Cursor<F>,
    ) -> Result<Instruction, DecodeError>
    where
        F: FnMut(u32) -> Result<u16, EmulationError>,
    {
        let op = double_operand((word >> 12) as u8).ok_or_else(|| illegal(word))?;
        let src_reg = Register::from_u4(word >> 8);
        let ad = (word >> 7) & 1;
        let byte = word & 0x40 != 0;
        let as_bits = (word >> 4) & 0x3;
        let dst_reg = Register::from_u4(word);

        let (width, extension, src_high, dst_high) = match ext {
            None => (byte_or_word(byte), None, 0, 0),
            Some(ext) => {
                let width = extended_width(ext, byte).ok_or_else(|| illegal(word))?;
                let register_mode = as_bits == 0 && ad == 0;
                let (extension, src_high, dst_high) = split_extension(ext, register_mode);
                (width, Some(extension), src_high, dst_high)
            }
        };
        let long = ext.is_some();
        let src = source(src_reg, as_bits, src_high, long, cursor)?;
        let dst = destination(dst_reg, ad, dst_high, long, cursor)?;
        Ok(Instruction::DoubleOperand {
            op,
            width,
            src,
            dst,
            extension,
        })
    }

    fn single<F>(
        &self,
        word: u16,
        ext: Option<u16>,
        cursor: &mut Cursor<F>,
    ) -> Result<Instruction, DecodeError>
    where
        F: FnMut(u32) -> Result<u16, EmulationError>,
    {
        let op_bits = ((word >> 7) & 0x7) as u8;
        let byte = word & 0x40 != 0;
        let as_bits = (word >> 4) & 0x3;
        let register = Register::from_u4(word);

        if op_bits >= 6 {
            if ext.is_some() {
                return Err(illegal(word));
            }
            if op_bits == 6 && word & 0xC0 == 0 {
                return if word == 0x1300 {
                    Ok(Instruction::Reti)
                } else {
                    Err(illegal(word))
                };
            }
            if !self.extended {
                return Err(extended_disabled(word));
            }
            return Self::calla(word, cursor);
        }

        let op = single_operand(op_bits).ok_or_else(|| illegal(word))?;
        if byte && !op.allows_byte() {
            return Err(illegal(word));
        }
        let (width, extension, high) = match ext {
            None => (byte_or_word(byte), None, 0),
            Some(_) if op == SingleOp::Call => return Err(illegal(word)),
            Some(ext) => {
                let width = if matches!(op, SingleOp::Swpb | SingleOp::Sxt) {
                    if ext & 0x40 != 0 {
                        AccessWidth::Word
                    } else {
                        AccessWidth::Word20
                    }
                } else {
                    extended_width(ext, byte).ok_or_else(|| illegal(word))?
                };
                let (extension, _, dst_high) = split_extension(ext, as_bits == 0);
                (width, Some(extension), dst_high)
            }
        };
        let operand = source(register, as_bits, high, ext.is_some(), cursor)?;
        Ok(Instruction::SingleOperand {
            op,
            width,
            operand,
            extension,
        })
    }

    fn calla<F>(word: u16, cursor: &mut Cursor<F>) -> Result<Instruction, DecodeError>
    where
        F: FnMut(u32) -> Result<u16, EmulationError>,
    {
        let register = Register::from_u4(word);
        let high = u32::from(word & 0xF) << 16;
        let target = match (word >> 4) & 0xF {
            0x4 => Operand::register(register),
            0x5 => {
                let (x, at) = cursor.word()?;
                let mode = if register == Register::PC {
                    AddressingMode::Symbolic
                } else {
                    AddressingMode::Indexed
                };
                Operand::with_word(register, mode, sign_extend_16(x), true, at)
            }
            0x6 => Operand::with_mode(register, AddressingMode::Indirect),
            0x7 => Operand::with_mode(register, AddressingMode::IndirectAutoIncrement),
            0x8 => {
                let (x, at) = cursor.word()?;
                Operand::with_word(Register::SR, AddressingMode::Absolute, high | u32::from(x), true, at)
            }
            0x9 => {
                let (x, at) = cursor.word()?;
                Operand::with_word(Register::PC, AddressingMode::Symbolic, high | u32::from(x), true, at)
            }
            0xB => {
                let (x, at) = cursor.word()?;
                Operand::with_word(Register::PC, AddressingMode::Immediate, high | u32::from(x), true, at)
            }
            _ => return Err(illegal(word)),
        };
        Ok(Instruction::Calla { target })
    }

    fn push_pop(word: u16) -> Result<Instruction, DecodeError> {
        let count = ((word >> 4) & 0xF) as u8 + 1;
        let register = Register::from_u4(word);
        let index = register.index();
        let width = if (word >> 8) & 1 == 0 {
            AccessWidth::Word20
        } else {
            AccessWidth::Word
        };
        if (word >> 9) & 1 == 0 {
            if index + 1 < usize::from(count) {
                return Err(illegal(word));
            }
            Ok(Instruction::PushMultiple {
                width,
                count,
                register,
            })
        } else {
            if index + usize::from(count) > 16 {
                return Err(illegal(word));
            }
            Ok(Instruction::PopMultiple {
                width,
                count,
                register,
            })
        }
    }

    fn address<F>(word: u16, cursor: &mut Cursor<F>) -> Result<Instruction, DecodeError>
    where
        F: FnMut(u32) -> Result<u16, EmulationError>,
    {
        let src_bits = (word >> 8) & 0xF;
        let src = Register::from_u4(src_bits);
        let dst = Register::from_u4(word);
        let src_high = u32::from(src_bits) << 16;
        let dst_high = u32::from(word & 0xF) << 16;
        let mova = |src, dst| Instruction::Address {
            op: AddressOp::Mova,
            src,
            dst,
        };

        let instruction = match (word >> 4) & 0xF {
            0x0 => mova(
                Operand::with_mode(src, AddressingMode::Indirect),
                Operand::register(dst),
            ),
            0x1 => mova(
                Operand::with_mode(src, AddressingMode::IndirectAutoIncrement),
                Operand::register(dst),
            ),
            0x2 => {
                let (x, at) = cursor.word()?;
                let value = src_high | u32::from(x);
                mova(
                    Operand::with_word(Register::SR, AddressingMode::Absolute, value, true, at),
                    Operand::register(dst),
                )
            }
            0x3 => {
                let (x, at) = cursor.word()?;
                mova(indexed_long(src, x, at), Operand::register(dst))
            }
            kind @ (0x4 | 0x5) => Instruction::RotateMultiple {
                op: RotateOp::from_bits(word >> 8),
                width: if kind == 0x5 {
                    AccessWidth::Word
                } else {
                    AccessWidth::Word20
                },
                count: ((word >> 10) & 0x3) as u8 + 1,
                register: dst,
            },
            0x6 => {
                let (x, at) = cursor.word()?;
                let value = dst_high | u32::from(x);
                mova(
                    Operand::register(src),
                    Operand::with_word(Register::SR, AddressingMode::Absolute, value, true, at),
                )
            }
            0x7 => {
                let (x, at) = cursor.word()?;
                mova(Operand::register(src), indexed_long(dst, x, at))
            }
            kind @ 0x8..=0xB => {
                let (x, at) = cursor.word()?;
                Instruction::Address {
                    op: AddressOp::from_bits(kind),
                    src: Operand::with_word(
                        Register::PC,
                        AddressingMode::Immediate,
                        src_high | u32::from(x),
                        true,
                        at,
                    ),
                    dst: Operand::register(dst),
                }
            }
            kind => Instruction::Address {
                op: AddressOp::from_bits(kind),
                src: Operand::register(src),
                dst: Operand::register(dst),
            },
        };
        Ok(instruction)
    }
}

const fn byte_or_word(byte: bool) -> AccessWidth {
    if byte {
        AccessWidth::Byte
    } else {
        AccessWidth::Word
    }
}

/// Width selected by the extension word's A/L bit and the instruction's B/W bit.
const fn extended_width(ext: u16, byte: bool) -> Option<AccessWidth> {
    match (ext & 0x40 != 0, byte) {
        (true, false) => Some(AccessWidth::Word),
        (true, true) => Some(AccessWidth::Byte),
        (false, true) => Some(AccessWidth::Word20),
        (false, false) => None,
    }
}

/// Splits an extension word into modifiers and the high address nibbles.
fn split_extension(ext: u16, register_mode: bool) -> (ExtensionWord, u32, u32) {
    if register_mode {
        let repeat = if ext & 0x80 != 0 {
            RepeatCount::Register(Register::from_u4(ext))
        } else {
            RepeatCount::Count((ext & 0xF) as u8 + 1)
        };
        let extension = ExtensionWord {
            zero_carry: ext & 0x100 != 0,
            repeat: Some(repeat),
        };
        (extension, 0, 0)
    } else {
        let extension = ExtensionWord {
            zero_carry: false,
            repeat: None,
        };
        (
            extension,
            u32::from((ext >> 7) & 0xF) << 16,
            u32::from(ext & 0xF) << 16,
        )
    }
}

fn indexed_long(register: Register, x: u16, at: u32) -> Operand {
    let mode = if register == Register::PC {
        AddressingMode::Symbolic
    } else {
        AddressingMode::Indexed
    };
    Operand::with_word(register, mode, sign_extend_16(x), true, at)
}

fn source<F>(
    register: Register,
    as_bits: u16,
    high: u32,
    long: bool,
    cursor: &mut Cursor<F>,
) -> Result<Operand, DecodeError>
where
    F: FnMut(u32) -> Result<u16, EmulationError>,
{
    let operand = match (as_bits, register) {
        (0, Register::CG) => Operand::constant(register, 0),
        (0, _) => Operand::register(register),
        (1, Register::CG) => Operand::constant(register, 1),
        (1, _) => {
            let (x, at) = cursor.word()?;
            let mode = match register {
                Register::PC => AddressingMode::Symbolic,
                Register::SR => AddressingMode::Absolute,
                _ => AddressingMode::Indexed,
            };
            Operand::with_word(register, mode, high | u32::from(x), long, at)
        }
        (2, Register::SR) => Operand::constant(register, 4),
        (2, Register::CG) => Operand::constant(register, 2),
        (2, _) => Operand::with_mode(register, AddressingMode::Indirect),
        (_, Register::SR) => Operand::constant(register, 8),
        (_, Register::CG) => Operand::constant(register, 0xF_FFFF),
        (_, Register::PC) => {
            let (x, at) = cursor.word()?;
            Operand::with_word(register, AddressingMode::Immediate, high | u32::from(x), long, at)
        }
        _ => Operand::with_mode(register, AddressingMode::IndirectAutoIncrement),
    };
    Ok(operand)
}

fn destination<F>(
    register: Register,
    ad: u16,
    high: u32,
    long: bool,
    cursor: &mut Cursor<F>,
) -> Result<Operand, DecodeError>
where
    F: FnMut(u32) -> Result<u16, EmulationError>,
{
    if ad == 0 {
        return Ok(Operand::register(register));
    }
    let (x, at) = cursor.word()?;
    let mode = match register {
        Register::PC => AddressingMode::Symbolic,
        Register::SR => AddressingMode::Absolute,
        _ => AddressingMode::Indexed,
    };
    Ok(Operand::with_word(register, mode, high | u32::from(x), long, at))
}
