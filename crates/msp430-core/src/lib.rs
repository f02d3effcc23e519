//! Instruction-accurate MSP430 and MSP430X CPU core.
//!
//! The core owns its registers, a paged memory arena, the I/O unit registry
//! and two event queues, one keyed by CPU cycles and one by virtual time.
//! Peripherals plug in through [`IoUnit`] and reach back into the core
//! through [`CoreContext`].

/// Host-facing configuration, run control and outcome types.
pub mod api;
pub use api::{
    ControlHandle, CoreConfig, MonitorId, ResetReason, RunBoundary, RunOutcome, StepOutcome,
    StopReason, CLASSIC_ADDRESS_SPACE, EXTENDED_ADDRESS_SPACE, RESET_VECTOR_ADDRESS,
};

/// Services peripherals call back into.
pub mod context;
pub use context::CoreContext;

/// The CPU core and its run loop.
pub mod cpu;
pub use cpu::{Chip, Msp430Core};

/// Instruction decoder.
pub mod decoder;
pub use decoder::{Decoded, DecodeError, Decoder, Instruction};

/// Warnings, warning policy and execution counters.
pub mod diag;
pub use diag::{ExecutionStats, Severity, WarningChannel, WarningKind, WarningPolicy};

/// Opcode tables and format classification.
pub mod encoding;
pub use encoding::{classify_word, InstructionFormat};

/// Event arena, event queues and clock conversion.
pub mod event;
pub use event::clock::ClockConversion;
pub use event::{EventAction, EventCallback, EventId, EventQueue, Scheduler, TimeDomain};

/// Instruction semantics and ALU helpers.
pub mod execute;
pub use execute::{AluResult, FlagsUpdate};

/// Fault taxonomy and error types.
pub mod fault;
pub use fault::{ConfigError, EmulationError, FaultClass, FaultCode};

/// Interrupt priority tracking.
pub mod interrupt;
pub use interrupt::InterruptController;

/// Peripheral contract and unit registry.
pub mod io;
pub use io::{IoRegistry, IoUnit, UnitId};

/// Paged memory with watchpoints.
pub mod memory;
pub use memory::{
    AccessIntent, AccessWidth, Memory, MemoryMonitor, PageHandler, Segment, PAGE_SHIFT, PAGE_SIZE,
};

/// Register file and power modes.
pub mod state;
pub use state::{
    PowerMode, Register, RegisterMonitor, Registers, REGISTER_COUNT, SR_C, SR_CPUOFF, SR_GIE,
    SR_N, SR_OSCOFF, SR_SCG0, SR_SCG1, SR_V, SR_Z,
};

/// Instruction cycle costs.
pub mod timing;
pub use timing::{cycle_cost, instruction_cycles, CycleCostKind, CYCLE_COST_TABLE};

#[cfg(test)]
use proptest as _;
