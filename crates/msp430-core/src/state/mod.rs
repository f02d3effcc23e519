//! CPU register file and derived power state.

/// Status register view of the clock control bits.
pub mod power;
/// Register file, status bits and register monitors.
pub mod registers;

pub use power::PowerMode;
pub use registers::{
    Register, RegisterMonitor, Registers, REGISTER_COUNT, SR_C, SR_CPUOFF, SR_GIE, SR_N,
    SR_OSCOFF, SR_SCG0, SR_SCG1, SR_V, SR_Z,
};
