use crate::state::registers::{SR_CPUOFF, SR_OSCOFF, SR_SCG0, SR_SCG1};

/// Operating mode derived from the status register clock bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PowerMode {
    /// CPU executing.
    #[default]
    Active,
    /// `CPUOFF`.
    Lpm0,
    /// `CPUOFF | SCG0`.
    Lpm1,
    /// `CPUOFF | SCG1`.
    Lpm2,
    /// `CPUOFF | SCG0 | SCG1`.
    Lpm3,
    /// `CPUOFF | OSCOFF`.
    Lpm4,
}

impl PowerMode {
    /// Number of power modes.
    pub const COUNT: usize = 6;

    /// All power modes, active first.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Active,
        Self::Lpm0,
        Self::Lpm1,
        Self::Lpm2,
        Self::Lpm3,
        Self::Lpm4,
    ];

    /// Derives the mode from a status register value.
    #[must_use]
    pub const fn from_sr(sr: u32) -> Self {
        if sr & SR_CPUOFF == 0 {
            return Self::Active;
        }
        if sr & SR_OSCOFF != 0 {
            return Self::Lpm4;
        }
        match (sr & SR_SCG0 != 0, sr & SR_SCG1 != 0) {
            (false, false) => Self::Lpm0,
            (true, false) => Self::Lpm1,
            (false, true) => Self::Lpm2,
            (true, true) => Self::Lpm3,
        }
    }

    /// Returns `true` when instructions are not being fetched.
    #[must_use]
    pub const fn is_cpu_off(self) -> bool {
        !matches!(self, Self::Active)
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}
