use crate::{MonitorId, PowerMode};

/// Number of CPU registers (`R0..R15`).
pub const REGISTER_COUNT: usize = 16;

/// Status register carry bit.
pub const SR_C: u32 = 0x0001;
/// Status register zero bit.
pub const SR_Z: u32 = 0x0002;
/// Status register negative bit.
pub const SR_N: u32 = 0x0004;
/// Status register general interrupt enable bit.
pub const SR_GIE: u32 = 0x0008;
/// Status register CPU-off bit.
pub const SR_CPUOFF: u32 = 0x0010;
/// Status register oscillator-off bit.
pub const SR_OSCOFF: u32 = 0x0020;
/// Status register system clock generator 0 bit.
pub const SR_SCG0: u32 = 0x0040;
/// Status register system clock generator 1 bit.
pub const SR_SCG1: u32 = 0x0080;
/// Status register overflow bit.
pub const SR_V: u32 = 0x0100;

/// CPU register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Register {
    /// Program counter.
    pub const PC: Self = Self::R0;
    /// Stack pointer.
    pub const SP: Self = Self::R1;
    /// Status register, constant generator 1.
    pub const SR: Self = Self::R2;
    /// Constant generator 2.
    pub const CG: Self = Self::R3;

    /// Ordered list of all registers.
    pub const ALL: [Self; REGISTER_COUNT] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::R13,
        Self::R14,
        Self::R15,
    ];

    /// Decodes the low nibble of `bits` as a register field.
    #[must_use]
    pub const fn from_u4(bits: u16) -> Self {
        Self::ALL[(bits & 0xF) as usize]
    }

    /// Array index of this register.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Observer of register traffic.
///
/// Writes notify `write_before` with the old value, store, then notify
/// `write_after` with the stored value.
pub trait RegisterMonitor {
    /// Called before a monitored read.
    fn read_before(&mut self, _register: Register, _value: u32) {}
    /// Called after a monitored read.
    fn read_after(&mut self, _register: Register, _value: u32) {}
    /// Called before a write with the value being replaced.
    fn write_before(&mut self, _register: Register, _value: u32) {}
    /// Called after a write with the value now held.
    fn write_after(&mut self, _register: Register, _value: u32) {}
}

/// Register file masked to the configured architecture width.
pub struct Registers {
    values: [u32; REGISTER_COUNT],
    mask: u32,
    monitors: Vec<(MonitorId, Register, Box<dyn RegisterMonitor>)>,
    next_monitor: u32,
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registers")
            .field("values", &self.values)
            .field("mask", &self.mask)
            .field("monitors", &self.monitors.len())
            .finish()
    }
}

impl Registers {
    /// Creates a zeroed register file; 20-bit when `extended`.
    #[must_use]
    pub const fn new(extended: bool) -> Self {
        Self {
            values: [0; REGISTER_COUNT],
            mask: if extended { 0xF_FFFF } else { 0xFFFF },
            monitors: Vec::new(),
            next_monitor: 0,
        }
    }

    /// Register width mask (`0xFFFF` or `0xFFFFF`).
    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.mask
    }

    /// Raw read with no monitor notification.
    #[must_use]
    pub const fn get(&self, register: Register) -> u32 {
        self.values[register.index()]
    }

    /// Raw store with no monitor notification.
    ///
    /// The value is masked to the register width, writes to `R3` are
    /// discarded and the PC is forced even. Returns `true` when the PC value
    /// had to be corrected.
    pub const fn set(&mut self, register: Register, value: u32) -> bool {
        match register {
            Register::R3 => false,
            Register::R0 => {
                self.values[0] = value & self.mask & !1;
                value & 1 != 0
            }
            _ => {
                self.values[register.index()] = value & self.mask;
                false
            }
        }
    }

    /// Monitored read.
    pub fn read(&mut self, register: Register) -> u32 {
        let value = self.get(register);
        if self.monitors.is_empty() {
            return value;
        }
        for (_, watched, monitor) in &mut self.monitors {
            if *watched == register {
                monitor.read_before(register, value);
            }
        }
        for (_, watched, monitor) in &mut self.monitors {
            if *watched == register {
                monitor.read_after(register, value);
            }
        }
        value
    }

    /// Monitored store; same masking rules as [`Self::set`].
    pub fn write(&mut self, register: Register, value: u32) -> bool {
        if self.monitors.is_empty() {
            return self.set(register, value);
        }
        let old = self.get(register);
        for (_, watched, monitor) in &mut self.monitors {
            if *watched == register {
                monitor.write_before(register, old);
            }
        }
        let corrected = self.set(register, value);
        let stored = self.get(register);
        for (_, watched, monitor) in &mut self.monitors {
            if *watched == register {
                monitor.write_after(register, stored);
            }
        }
        corrected
    }

    /// Adds a monitor for `register`, called after previously added ones.
    pub fn add_monitor(
        &mut self,
        register: Register,
        monitor: Box<dyn RegisterMonitor>,
    ) -> MonitorId {
        let id = MonitorId::new(self.next_monitor);
        self.next_monitor = self.next_monitor.wrapping_add(1);
        self.monitors.push((id, register, monitor));
        id
    }

    /// Removes a monitor; returns `false` when `id` is unknown.
    pub fn remove_monitor(&mut self, id: MonitorId) -> bool {
        let before = self.monitors.len();
        self.monitors.retain(|(existing, _, _)| *existing != id);
        self.monitors.len() != before
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.values[0]
    }

    /// Stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.values[1]
    }

    /// Status register.
    #[must_use]
    pub const fn sr(&self) -> u32 {
        self.values[2]
    }

    /// Returns `true` when every bit of `bits` is set in SR.
    #[must_use]
    pub const fn flag(&self, bits: u32) -> bool {
        self.values[2] & bits == bits
    }

    /// Sets or clears `bits` in SR without notifying monitors.
    pub const fn set_flag(&mut self, bits: u32, on: bool) {
        if on {
            self.values[2] = (self.values[2] | bits) & self.mask;
        } else {
            self.values[2] &= !bits;
        }
    }

    /// Current power mode derived from SR.
    #[must_use]
    pub const fn power_mode(&self) -> PowerMode {
        PowerMode::from_sr(self.values[2])
    }

    /// Zeroes every register; monitors are kept.
    pub const fn clear(&mut self) {
        self.values = [0; REGISTER_COUNT];
    }
}
