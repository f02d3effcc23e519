//! Host-facing configuration, run control and outcome types.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::{ConfigError, WarningPolicy, PAGE_SIZE};

/// Address space of a classic MSP430 (64 KiB).
pub const CLASSIC_ADDRESS_SPACE: u32 = 0x1_0000;
/// Largest address space of an MSP430X (1 MiB).
pub const EXTENDED_ADDRESS_SPACE: u32 = 0x10_0000;
/// Address of the highest interrupt vector, the reset vector.
pub const RESET_VECTOR_ADDRESS: u32 = 0xFFFE;

/// Handle returned when adding a register or memory monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(u32);

impl MonitorId {
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

/// Static description of one MCU variant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CoreConfig {
    /// First RAM address.
    pub ram_start: u32,
    /// RAM size in bytes.
    pub ram_size: u32,
    /// First flash address.
    pub flash_start: u32,
    /// Flash size in bytes.
    pub flash_size: u32,
    /// Size of the I/O region, which always starts at address 0.
    pub io_size: u32,
    /// Index of the reset vector; vectors are `0..=max_interrupt`.
    pub max_interrupt: usize,
    /// Enables the MSP430X instruction set and 20-bit registers.
    pub extended: bool,
    /// Size of the address space in bytes.
    pub max_memory: u32,
    /// CPU clock in Hz.
    pub cpu_frequency_hz: u64,
    /// Ticks per second of the virtual-time domain.
    pub virtual_time_hz: u64,
    /// Per-kind warning severities.
    pub warnings: WarningPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::msp430f1611()
    }
}

impl CoreConfig {
    /// MSP430F1611: 10 KiB RAM, 48 KiB flash, 16 vectors.
    #[must_use]
    pub fn msp430f1611() -> Self {
        Self {
            ram_start: 0x1100,
            ram_size: 0x2800,
            flash_start: 0x4000,
            flash_size: 0xC000,
            io_size: 0x0200,
            max_interrupt: 15,
            extended: false,
            max_memory: CLASSIC_ADDRESS_SPACE,
            cpu_frequency_hz: 4_915_200,
            virtual_time_hz: 1_000_000,
            warnings: WarningPolicy::default(),
        }
    }

    /// MSP430F5437: 16 KiB RAM, 256 KiB flash, 64 vectors, MSP430X.
    #[must_use]
    pub fn msp430f5437() -> Self {
        Self {
            ram_start: 0x1C00,
            ram_size: 0x4000,
            flash_start: 0x5C00,
            flash_size: 0x4_0000,
            io_size: 0x1000,
            max_interrupt: 63,
            extended: true,
            max_memory: EXTENDED_ADDRESS_SPACE,
            cpu_frequency_hz: 8_000_000,
            virtual_time_hz: 1_000_000,
            warnings: WarningPolicy::default(),
        }
    }

    /// Address the CPU loads `vector` from.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn vector_address(&self, vector: usize) -> u32 {
        RESET_VECTOR_ADDRESS - 2 * (self.max_interrupt - vector) as u32
    }

    /// Checks the memory map, vector table and clocks for consistency.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_interrupt == 0 || self.max_interrupt > 63 {
            return Err(ConfigError::InvalidInterruptCount(self.max_interrupt));
        }
        let space_ok = if self.extended {
            self.max_memory >= CLASSIC_ADDRESS_SPACE
                && self.max_memory <= EXTENDED_ADDRESS_SPACE
                && self.max_memory % PAGE_SIZE == 0
        } else {
            self.max_memory == CLASSIC_ADDRESS_SPACE
        };
        if !space_ok {
            return Err(ConfigError::AddressSpaceSize(self.max_memory));
        }
        if self.cpu_frequency_hz == 0 || self.virtual_time_hz == 0 {
            return Err(ConfigError::ZeroFrequency);
        }

        let regions = self.regions();
        for &(region, start, size) in &regions {
            if start % PAGE_SIZE != 0 || size % PAGE_SIZE != 0 {
                return Err(ConfigError::MisalignedRegion {
                    region,
                    start,
                    size,
                });
            }
            if u64::from(start) + u64::from(size) > u64::from(self.max_memory) {
                return Err(ConfigError::RegionOutOfRange {
                    region,
                    start,
                    size,
                    max_memory: self.max_memory,
                });
            }
        }
        for (index, &(first, a_start, a_size)) in regions.iter().enumerate() {
            for &(second, b_start, b_size) in &regions[index + 1..] {
                let disjoint = a_size == 0
                    || b_size == 0
                    || a_start + a_size <= b_start
                    || b_start + b_size <= a_start;
                if !disjoint {
                    return Err(ConfigError::OverlappingRegions { first, second });
                }
            }
        }

        let table_start = self.vector_address(0);
        let backed = |address: u32| {
            (address >= self.ram_start && address - self.ram_start < self.ram_size)
                || (address >= self.flash_start && address - self.flash_start < self.flash_size)
        };
        if !backed(table_start) || !backed(RESET_VECTOR_ADDRESS + 1) {
            return Err(ConfigError::UnmappedVectorTable(table_start));
        }
        Ok(())
    }

    pub(crate) const fn regions(&self) -> [(&'static str, u32, u32); 3] {
        [
            ("io", 0, self.io_size),
            ("ram", self.ram_start, self.ram_size),
            ("flash", self.flash_start, self.flash_size),
        ]
    }
}

/// Why I/O units are being reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ResetReason {
    /// Initial power-up of the core.
    PowerOn,
    /// Reset vector serviced at runtime.
    ResetVector,
}

/// Result of a single [`crate::Msp430Core::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// One instruction executed.
    Executed {
        /// Address of the executed instruction.
        pc: u32,
        /// Cycles charged, including interrupt entry.
        cycles: u64,
    },
    /// CPU is off; time advanced to the next event or ceiling.
    Sleeping {
        /// Cycles skipped.
        cycles: u64,
    },
    /// CPU is off and no event is scheduled, so nothing can ever wake it.
    Idle,
}

/// When a run stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunBoundary {
    /// Until a stop request or an idle core.
    UntilStopped,
    /// After this many executed instructions.
    Instructions(u64),
    /// When the cycle counter reaches this value.
    CycleCeiling(u64),
}

/// Why a run returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The requested [`RunBoundary`] was reached.
    BoundaryReached,
    /// A stop was requested through the [`ControlHandle`].
    StopRequested,
    /// CPU is off with nothing scheduled.
    Idle,
}

/// Aggregated result of [`crate::Msp430Core::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Instructions executed during this run.
    pub instructions: u64,
    /// Cycles elapsed during this run.
    pub cycles: u64,
    /// Why the run returned.
    pub reason: StopReason,
}

const REQUEST_NONE: u8 = 0;
const REQUEST_STOP: u8 = 1;
const REQUEST_BREAKPOINT: u8 = 2;

#[derive(Debug, Default)]
struct ControlState {
    running: AtomicBool,
    request: AtomicU8,
}

/// Pending request taken by the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlRequest {
    None,
    Stop,
    Breakpoint,
}

/// Cross-thread handle for stopping a running core.
///
/// Requests made while the core is idle stay pending and stop the next run
/// before its first instruction.
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    inner: Arc<ControlState>,
}

impl ControlHandle {
    /// Asks the run loop to return at the next instruction boundary.
    pub fn request_stop(&self) {
        self.inner.request.fetch_max(REQUEST_STOP, Ordering::SeqCst);
    }

    /// Asks the run loop to stop with [`crate::EmulationError::Breakpoint`].
    pub fn request_breakpoint(&self) {
        self.inner
            .request
            .fetch_max(REQUEST_BREAKPOINT, Ordering::SeqCst);
    }

    /// Returns `true` while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub(crate) fn try_begin(&self) -> bool {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn finish(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    pub(crate) fn take_request(&self) -> ControlRequest {
        match self.inner.request.swap(REQUEST_NONE, Ordering::SeqCst) {
            REQUEST_STOP => ControlRequest::Stop,
            REQUEST_BREAKPOINT => ControlRequest::Breakpoint,
            _ => ControlRequest::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlHandle, ControlRequest, CoreConfig, CLASSIC_ADDRESS_SPACE};
    use crate::ConfigError;

    #[test]
    fn presets_validate() {
        assert_eq!(CoreConfig::default().validate(), Ok(()));
        assert_eq!(CoreConfig::msp430f5437().validate(), Ok(()));
    }

    #[test]
    fn vector_addresses_count_down_from_reset() {
        let config = CoreConfig::default();
        assert_eq!(config.vector_address(15), 0xFFFE);
        assert_eq!(config.vector_address(14), 0xFFFC);
        assert_eq!(config.vector_address(0), 0xFFE0);

        let extended = CoreConfig::msp430f5437();
        assert_eq!(extended.vector_address(0), 0xFF80);
    }

    #[test]
    fn misaligned_and_overlapping_regions_are_rejected() {
        let misaligned = CoreConfig {
            ram_start: 0x1180,
            ..CoreConfig::default()
        };
        assert!(matches!(
            misaligned.validate(),
            Err(ConfigError::MisalignedRegion { region: "ram", .. })
        ));

        let overlapping = CoreConfig {
            ram_size: 0x3000,
            ..CoreConfig::default()
        };
        assert_eq!(
            overlapping.validate(),
            Err(ConfigError::OverlappingRegions {
                first: "ram",
                second: "flash"
            })
        );
    }

    #[test]
    fn vector_table_must_be_backed() {
        let config = CoreConfig {
            flash_size: 0x8000,
            ..CoreConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnmappedVectorTable(0xFFE0))
        );
    }

    #[test]
    fn classic_core_requires_64k_space() {
        let config = CoreConfig {
            max_memory: 2 * CLASSIC_ADDRESS_SPACE,
            ..CoreConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::AddressSpaceSize(0x2_0000))
        );
        let config = CoreConfig {
            max_interrupt: 64,
            ..CoreConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidInterruptCount(64))
        );
    }

    #[test]
    fn control_requests_are_taken_once_and_breakpoint_wins() {
        let handle = ControlHandle::default();
        let remote = handle.clone();
        remote.request_breakpoint();
        remote.request_stop();
        assert_eq!(handle.take_request(), ControlRequest::Breakpoint);
        assert_eq!(handle.take_request(), ControlRequest::None);

        assert!(handle.try_begin());
        assert!(remote.is_running());
        assert!(!handle.try_begin());
        handle.finish();
        assert!(!remote.is_running());
    }
}
