use thiserror::Error;

use crate::diag::WarningKind;

/// Fault classes used for diagnostics aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Decoder rejected an instruction encoding.
    Decode,
    /// Address outside the address space or on an unmapped page.
    Memory,
    /// Interrupt entry could not proceed.
    Interrupt,
}

/// Stable taxonomy of faults that abort emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultCode {
    /// Unassigned opcode or invalid field combination.
    #[error("illegal instruction")]
    IllegalInstruction = 0x01,
    /// MSP430X encoding executed on a core configured without the extension.
    #[error("extended instruction on a non-extended core")]
    ExtendedDisabled = 0x02,
    /// Address beyond the configured address space.
    #[error("address out of range")]
    AddressOutOfRange = 0x03,
    /// Access to a page that has no backing handler.
    #[error("access to unmapped memory")]
    UnmappedAccess = 0x04,
    /// Interrupt became due while the flash controller blocks the CPU.
    #[error("interrupt while flash is blocking the cpu")]
    FlashBlockingInterrupt = 0x05,
}

impl FaultCode {
    /// Converts a fault code to its stable byte value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte value back into a fault code.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalInstruction),
            0x02 => Some(Self::ExtendedDisabled),
            0x03 => Some(Self::AddressOutOfRange),
            0x04 => Some(Self::UnmappedAccess),
            0x05 => Some(Self::FlashBlockingInterrupt),
            _ => None,
        }
    }

    /// Returns the diagnostics fault class for this fault code.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::IllegalInstruction | Self::ExtendedDisabled => FaultClass::Decode,
            Self::AddressOutOfRange | Self::UnmappedAccess => FaultClass::Memory,
            Self::FlashBlockingInterrupt => FaultClass::Interrupt,
        }
    }
}

/// Every condition that stops a run before its boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmulationError {
    /// A fatal emulation fault.
    #[error("{code} at pc {pc:#07x} (address {address:#07x}, cycle {cycles})")]
    Fault {
        /// What went wrong.
        code: FaultCode,
        /// Address of the instruction being executed.
        pc: u32,
        /// Faulting address or instruction word.
        address: u32,
        /// Cycle count when the fault was raised.
        cycles: u64,
    },
    /// A warning whose policy is fatal.
    #[error("{kind} at pc {pc:#07x} (address {address:#07x}, cycle {cycles})")]
    Escalated {
        /// Warning that was escalated.
        kind: WarningKind,
        /// Address of the instruction being executed.
        pc: u32,
        /// Address the warning refers to.
        address: u32,
        /// Cycle count when the warning was raised.
        cycles: u64,
    },
    /// A run was requested while another run is in progress.
    #[error("core is already running")]
    AlreadyRunning,
    /// Execution stopped on a breakpoint.
    #[error("breakpoint at pc {pc:#07x}")]
    Breakpoint {
        /// Program counter of the instruction that was not executed.
        pc: u32,
    },
    /// A low-power jump would have skipped a scheduled event.
    #[error("jump to cycle {requested_cycles} passes the event due at cycle {next_event_cycles}")]
    PromiseViolation {
        /// Cycle count the jump would have reached.
        requested_cycles: u64,
        /// Cycle count of the next due event.
        next_event_cycles: u64,
    },
    /// A virtual-time jump was requested while the CPU is executing.
    #[error("virtual time jump requested while the cpu is active")]
    JumpWhileActive,
}

impl EmulationError {
    /// Returns the fault code when this error is a fault.
    #[must_use]
    pub const fn fault_code(&self) -> Option<FaultCode> {
        match self {
            Self::Fault { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Rejected configuration or I/O registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Region bounds are not multiples of the page size.
    #[error("{region} region {start:#x}+{size:#x} is not page aligned")]
    MisalignedRegion {
        /// Region name.
        region: &'static str,
        /// Start address.
        start: u32,
        /// Size in bytes.
        size: u32,
    },
    /// Region extends past the address space.
    #[error("{region} region {start:#x}+{size:#x} exceeds the address space of {max_memory:#x} bytes")]
    RegionOutOfRange {
        /// Region name.
        region: &'static str,
        /// Start address.
        start: u32,
        /// Size in bytes.
        size: u32,
        /// Configured address space size.
        max_memory: u32,
    },
    /// Two regions share at least one page.
    #[error("{first} and {second} regions overlap")]
    OverlappingRegions {
        /// First region name.
        first: &'static str,
        /// Second region name.
        second: &'static str,
    },
    /// Reset vector index outside the supported range.
    #[error("max interrupt {0} is outside 1..=63")]
    InvalidInterruptCount(usize),
    /// Vector table does not live in RAM or flash.
    #[error("vector table at {0:#06x} is not backed by ram or flash")]
    UnmappedVectorTable(u32),
    /// Address space size unsupported for the selected architecture.
    #[error("address space of {0:#x} bytes is unsupported for this core")]
    AddressSpaceSize(u32),
    /// A clock frequency of zero.
    #[error("clock frequency must be non-zero")]
    ZeroFrequency,
    /// I/O claim outside the I/O region.
    #[error("`{name}` claims {start:#06x}..={end:#06x} outside the io region ..{io_size:#06x}")]
    IoOutOfRange {
        /// Unit name.
        name: String,
        /// First claimed address.
        start: u32,
        /// Last claimed address.
        end: u32,
        /// Size of the I/O region.
        io_size: u32,
    },
    /// I/O claim overlaps an existing registration.
    #[error("`{name}` claims {start:#06x}..={end:#06x} already owned by `{owner}`")]
    IoOverlap {
        /// Unit name.
        name: String,
        /// Name of the unit that already owns part of the range.
        owner: String,
        /// First claimed address.
        start: u32,
        /// Last claimed address.
        end: u32,
    },
}
