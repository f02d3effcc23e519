//! Operand resolution shared by the instruction handlers.

use crate::decoder::{AddressingMode, Operand};
use crate::{
    AccessIntent, AccessWidth, CoreContext, EmulationError, Memory, Register, Registers,
    WarningKind,
};

/// Where an operand lives once its addressing mode has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A register.
    Register(Register),
    /// A memory address.
    Memory(u32),
    /// An immediate or constant-generator value; stores are discarded.
    Value(u32),
}

/// Mutable view of the CPU state one instruction operates on.
pub struct Machine<'a> {
    pub registers: &'a mut Registers,
    pub memory: &'a mut Memory,
    pub ctx: &'a mut CoreContext,
    pub extended: bool,
}

impl Machine<'_> {
    /// Monitored register read.
    pub fn reg(&mut self, register: Register) -> u32 {
        self.registers.read(register)
    }

    /// Monitored register write; an odd PC is corrected and reported.
    pub fn set_reg(&mut self, register: Register, value: u32) -> Result<(), EmulationError> {
        if self.registers.write(register, value) {
            self.ctx.warn(WarningKind::OddProgramCounter, value)?;
        }
        Ok(())
    }

    /// Dispatched data read.
    pub fn load_memory(&mut self, address: u32, width: AccessWidth) -> Result<u32, EmulationError> {
        self.memory.read(address, width, AccessIntent::Read, self.ctx)
    }

    /// Dispatched data write.
    pub fn store_memory(
        &mut self,
        address: u32,
        value: u32,
        width: AccessWidth,
    ) -> Result<(), EmulationError> {
        self.memory.write(address, value, width, self.ctx)
    }

    /// Address mask for the configured architecture.
    pub const fn address_mask(&self) -> u32 {
        if self.extended {
            0xF_FFFF
        } else {
            0xFFFF
        }
    }

    /// Resolves `operand` to a location, applying autoincrement.
    pub fn resolve(
        &mut self,
        operand: &Operand,
        width: AccessWidth,
    ) -> Result<Location, EmulationError> {
        let location = match operand.mode {
            AddressingMode::Register => Location::Register(operand.register),
            AddressingMode::Constant | AddressingMode::Immediate => {
                Location::Value(operand.value & width.mask())
            }
            AddressingMode::Indexed => {
                let base = self.reg(operand.register);
                Location::Memory(self.offset(base, operand))
            }
            AddressingMode::Symbolic => Location::Memory(self.offset(operand.word_address, operand)),
            AddressingMode::Absolute => Location::Memory(operand.value & self.address_mask()),
            AddressingMode::Indirect => Location::Memory(self.reg(operand.register)),
            AddressingMode::IndirectAutoIncrement => {
                let address = self.reg(operand.register);
                let step = autoincrement(operand.register, width);
                let next = address.wrapping_add(step) & self.registers.mask();
                self.set_reg(operand.register, next)?;
                Location::Memory(address)
            }
        };
        Ok(location)
    }

    /// `base + index` under the 16-bit or 20-bit wrap rule.
    fn offset(&self, base: u32, operand: &Operand) -> u32 {
        if operand.long {
            return base.wrapping_add(operand.value) & 0xF_FFFF;
        }
        let index = sign_extend(operand.value & 0xFFFF, AccessWidth::Word);
        let address = base.wrapping_add(index);
        if !self.extended || base <= 0xFFFF {
            address & 0xFFFF
        } else {
            address & 0xF_FFFF
        }
    }

    /// Reads the value at a resolved location.
    pub fn load(&mut self, location: Location, width: AccessWidth) -> Result<u32, EmulationError> {
        match location {
            Location::Register(register) => Ok(self.reg(register) & width.mask()),
            Location::Memory(address) => self.load_memory(address, width),
            Location::Value(value) => Ok(value & width.mask()),
        }
    }

    /// Writes a value to a resolved location.
    ///
    /// Register stores are zero-extended from `width`.
    pub fn store(
        &mut self,
        location: Location,
        value: u32,
        width: AccessWidth,
    ) -> Result<(), EmulationError> {
        match location {
            Location::Register(register) => self.set_reg(register, value & width.mask()),
            Location::Memory(address) => self.store_memory(address, value & width.mask(), width),
            Location::Value(_) => Ok(()),
        }
    }

    /// Pre-decrements SP by the width's stack slot and stores `value`.
    pub fn push(&mut self, value: u32, width: AccessWidth) -> Result<(), EmulationError> {
        let slot = stack_slot(width);
        let sp = self.reg(Register::SP).wrapping_sub(slot) & self.registers.mask();
        self.set_reg(Register::SP, sp)?;
        self.store_memory(sp, value & width.mask(), width)
    }

    /// Loads from SP and post-increments it by the width's stack slot.
    pub fn pop(&mut self, width: AccessWidth) -> Result<u32, EmulationError> {
        let sp = self.reg(Register::SP);
        let value = self.load_memory(sp, width)?;
        let next = sp.wrapping_add(stack_slot(width)) & self.registers.mask();
        self.set_reg(Register::SP, next)?;
        Ok(value)
    }
}

/// Autoincrement step; SP and PC never move by a single byte.
pub const fn autoincrement(register: Register, width: AccessWidth) -> u32 {
    match width {
        AccessWidth::Byte => match register {
            Register::R0 | Register::R1 => 2,
            _ => 1,
        },
        AccessWidth::Word => 2,
        AccessWidth::Word20 => 4,
    }
}

/// Stack space one pushed value occupies.
pub const fn stack_slot(width: AccessWidth) -> u32 {
    match width {
        AccessWidth::Word20 => 4,
        _ => 2,
    }
}

/// Sign-extends `value` from `width` to 32 bits.
pub const fn sign_extend(value: u32, width: AccessWidth) -> u32 {
    let value = value & width.mask();
    if value & width.sign_bit() != 0 {
        value | !width.mask()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::{autoincrement, sign_extend, Location, Machine};
    use crate::decoder::{AddressingMode, Operand};
    use crate::{AccessWidth, CoreConfig, CoreContext, Memory, Register, Registers};

    struct Fixture {
        registers: Registers,
        memory: Memory,
        ctx: CoreContext,
        extended: bool,
    }

    impl Fixture {
        fn new(config: &CoreConfig) -> Self {
            Self {
                registers: Registers::new(config.extended),
                memory: Memory::new(config),
                ctx: CoreContext::new(config),
                extended: config.extended,
            }
        }

        fn machine(&mut self) -> Machine<'_> {
            Machine {
                registers: &mut self.registers,
                memory: &mut self.memory,
                ctx: &mut self.ctx,
                extended: self.extended,
            }
        }
    }

    fn operand(mode: AddressingMode, register: Register, value: u32, long: bool) -> Operand {
        Operand {
            mode,
            register,
            value,
            long,
            word_address: 0x4402,
        }
    }

    #[test]
    fn indexed_addresses_wrap_in_the_low_64k() {
        let mut fixture = Fixture::new(&CoreConfig::msp430f5437());
        fixture.registers.set(Register::R4, 0x0010);
        let mut machine = fixture.machine();
        let location = machine
            .resolve(&operand(AddressingMode::Indexed, Register::R4, 0xFFF0, false), AccessWidth::Word)
            .expect("resolves");
        assert_eq!(location, Location::Memory(0x0000));

        machine.registers.set(Register::R4, 0x1_0010);
        let location = machine
            .resolve(&operand(AddressingMode::Indexed, Register::R4, 0xFFF0, false), AccessWidth::Word)
            .expect("resolves");
        assert_eq!(location, Location::Memory(0x1_0000));

        let location = machine
            .resolve(&operand(AddressingMode::Indexed, Register::R4, 0x2_0000, true), AccessWidth::Word)
            .expect("resolves");
        assert_eq!(location, Location::Memory(0x3_0010));
    }

    #[test]
    fn symbolic_is_relative_to_the_index_word() {
        let mut fixture = Fixture::new(&CoreConfig::default());
        let mut machine = fixture.machine();
        let location = machine
            .resolve(&operand(AddressingMode::Symbolic, Register::PC, 0x0010, false), AccessWidth::Word)
            .expect("resolves");
        assert_eq!(location, Location::Memory(0x4412));
    }

    #[test]
    fn autoincrement_steps_by_width() {
        let mut fixture = Fixture::new(&CoreConfig::msp430f5437());
        fixture.registers.set(Register::R5, 0x2000);
        fixture.registers.set(Register::SP, 0x3000);
        let mut machine = fixture.machine();
        let auto = |register| operand(AddressingMode::IndirectAutoIncrement, register, 0, false);

        machine.resolve(&auto(Register::R5), AccessWidth::Byte).expect("resolves");
        assert_eq!(machine.registers.get(Register::R5), 0x2001);
        machine.resolve(&auto(Register::R5), AccessWidth::Word20).expect("resolves");
        assert_eq!(machine.registers.get(Register::R5), 0x2005);
        let location = machine.resolve(&auto(Register::SP), AccessWidth::Byte).expect("resolves");
        assert_eq!(location, Location::Memory(0x3000));
        assert_eq!(machine.registers.get(Register::SP), 0x3002);
        assert_eq!(autoincrement(Register::R7, AccessWidth::Word), 2);
    }

    #[test]
    fn push_then_pop_restores_stack_pointer() {
        let mut fixture = Fixture::new(&CoreConfig::msp430f5437());
        fixture.registers.set(Register::SP, 0x3000);
        let mut machine = fixture.machine();
        machine.push(0xA_BCDE, AccessWidth::Word20).expect("push");
        assert_eq!(machine.registers.get(Register::SP), 0x2FFC);
        machine.push(0x1234, AccessWidth::Word).expect("push");
        assert_eq!(machine.pop(AccessWidth::Word).expect("pop"), 0x1234);
        assert_eq!(machine.pop(AccessWidth::Word20).expect("pop"), 0xA_BCDE);
        assert_eq!(machine.registers.get(Register::SP), 0x3000);
    }

    #[test]
    fn register_stores_zero_extend_and_values_discard() {
        let mut fixture = Fixture::new(&CoreConfig::default());
        fixture.registers.set(Register::R6, 0xFFFF);
        let mut machine = fixture.machine();
        machine
            .store(Location::Register(Register::R6), 0x1234, AccessWidth::Byte)
            .expect("store");
        assert_eq!(machine.registers.get(Register::R6), 0x0034);
        machine
            .store(Location::Value(7), 0x1234, AccessWidth::Word)
            .expect("discarded");
    }

    #[test]
    fn sign_extension_by_width() {
        assert_eq!(sign_extend(0x80, AccessWidth::Byte), 0xFFFF_FF80);
        assert_eq!(sign_extend(0x7F, AccessWidth::Byte), 0x7F);
        assert_eq!(sign_extend(0x8_0000, AccessWidth::Word20), 0xFFF8_0000);
    }
}
