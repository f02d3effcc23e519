//! Recoverable warning channel and execution statistics.
//!
//! Warnings never stop the core on their own. Each report bumps a saturating
//! per-kind counter and is then handled by the kind's [`Severity`]: dropped,
//! logged through `tracing`, or escalated into [`EmulationError::Escalated`].

use thiserror::Error;

use crate::{EmulationError, PowerMode};

/// Recoverable conditions reported while emulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum WarningKind {
    /// Word or 20-bit access at an odd address.
    #[error("misaligned access")]
    MisalignedAccess,
    /// I/O access to an address no unit has claimed.
    #[error("access to unclaimed io address")]
    VoidIoAccess,
    /// Store to flash while it is write protected.
    #[error("write to protected flash")]
    FlashWriteViolation,
    /// Odd value written to the program counter.
    #[error("odd program counter")]
    OddProgramCounter,
}

impl WarningKind {
    /// Number of warning kinds.
    pub const COUNT: usize = 4;

    /// All warning kinds in counter order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::MisalignedAccess,
        Self::VoidIoAccess,
        Self::FlashWriteViolation,
        Self::OddProgramCounter,
    ];

    const fn index(self) -> usize {
        match self {
            Self::MisalignedAccess => 0,
            Self::VoidIoAccess => 1,
            Self::FlashWriteViolation => 2,
            Self::OddProgramCounter => 3,
        }
    }
}

/// What happens when a warning is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Severity {
    /// Count only.
    Silent,
    /// Count and log at warn level.
    #[default]
    Print,
    /// Count and abort the run.
    Fatal,
}

/// Per-kind warning severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct WarningPolicy {
    levels: [Severity; WarningKind::COUNT],
}

impl WarningPolicy {
    /// Policy with every kind set to `severity`.
    #[must_use]
    pub const fn uniform(severity: Severity) -> Self {
        Self {
            levels: [severity; WarningKind::COUNT],
        }
    }

    /// Returns this policy with `kind` set to `severity`.
    #[must_use]
    pub const fn with(mut self, kind: WarningKind, severity: Severity) -> Self {
        self.levels[kind.index()] = severity;
        self
    }

    /// Severity configured for `kind`.
    #[must_use]
    pub const fn severity(&self, kind: WarningKind) -> Severity {
        self.levels[kind.index()]
    }

    /// Changes the severity for `kind`.
    pub const fn set(&mut self, kind: WarningKind, severity: Severity) {
        self.levels[kind.index()] = severity;
    }
}

/// Policy plus counters; the single sink for recoverable conditions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WarningChannel {
    policy: WarningPolicy,
    counts: [u64; WarningKind::COUNT],
}

impl WarningChannel {
    /// Creates a channel with zeroed counters.
    #[must_use]
    pub const fn new(policy: WarningPolicy) -> Self {
        Self {
            policy,
            counts: [0; WarningKind::COUNT],
        }
    }

    /// Records a warning and applies its severity.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::Escalated`] when `kind` is configured as
    /// [`Severity::Fatal`].
    pub fn report(
        &mut self,
        kind: WarningKind,
        address: u32,
        pc: u32,
        cycles: u64,
    ) -> Result<(), EmulationError> {
        let slot = &mut self.counts[kind.index()];
        *slot = slot.saturating_add(1);

        match self.policy.severity(kind) {
            Severity::Silent => Ok(()),
            Severity::Print => {
                tracing::warn!(%kind, address, pc, cycles, "emulation warning");
                Ok(())
            }
            Severity::Fatal => Err(EmulationError::Escalated {
                kind,
                pc,
                address,
                cycles,
            }),
        }
    }

    /// Number of reports of `kind` so far.
    #[must_use]
    pub const fn count(&self, kind: WarningKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Number of reports of any kind.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, count| acc.saturating_add(*count))
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &WarningPolicy {
        &self.policy
    }

    /// Mutable access to the active policy.
    pub const fn policy_mut(&mut self) -> &mut WarningPolicy {
        &mut self.policy
    }
}

/// Saturating counters describing what the core has done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ExecutionStats {
    instructions: u64,
    interrupts_serviced: u64,
    resets: u64,
    mode_cycles: [u64; PowerMode::COUNT],
}

impl ExecutionStats {
    /// Instructions executed.
    #[must_use]
    pub const fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Maskable interrupts entered.
    #[must_use]
    pub const fn interrupts_serviced(&self) -> u64 {
        self.interrupts_serviced
    }

    /// Reset vector services.
    #[must_use]
    pub const fn resets(&self) -> u64 {
        self.resets
    }

    /// Cycles spent in `mode`.
    #[must_use]
    pub const fn cycles_in(&self, mode: PowerMode) -> u64 {
        self.mode_cycles[mode.index()]
    }

    pub(crate) const fn record_instruction(&mut self) {
        self.instructions = self.instructions.saturating_add(1);
    }

    pub(crate) const fn record_interrupt(&mut self) {
        self.interrupts_serviced = self.interrupts_serviced.saturating_add(1);
    }

    pub(crate) const fn record_reset(&mut self) {
        self.resets = self.resets.saturating_add(1);
    }

    pub(crate) const fn record_cycles(&mut self, mode: PowerMode, cycles: u64) {
        let slot = &mut self.mode_cycles[mode.index()];
        *slot = slot.saturating_add(cycles);
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecutionStats, Severity, WarningChannel, WarningKind, WarningPolicy};
    use crate::{EmulationError, PowerMode};

    #[test]
    fn default_policy_prints_every_kind() {
        let policy = WarningPolicy::default();
        for kind in WarningKind::ALL {
            assert_eq!(policy.severity(kind), Severity::Print);
        }
    }

    #[test]
    fn report_counts_regardless_of_severity() {
        let mut channel = WarningChannel::new(
            WarningPolicy::uniform(Severity::Silent)
                .with(WarningKind::OddProgramCounter, Severity::Print),
        );
        channel
            .report(WarningKind::MisalignedAccess, 0x201, 0x4400, 3)
            .expect("silent warning");
        channel
            .report(WarningKind::OddProgramCounter, 0x4401, 0x4400, 4)
            .expect("printed warning");
        channel
            .report(WarningKind::MisalignedAccess, 0x203, 0x4402, 9)
            .expect("silent warning");

        assert_eq!(channel.count(WarningKind::MisalignedAccess), 2);
        assert_eq!(channel.count(WarningKind::OddProgramCounter), 1);
        assert_eq!(channel.count(WarningKind::VoidIoAccess), 0);
        assert_eq!(channel.total(), 3);
    }

    #[test]
    fn fatal_severity_escalates_with_context() {
        let mut channel = WarningChannel::new(WarningPolicy::default());
        channel
            .policy_mut()
            .set(WarningKind::VoidIoAccess, Severity::Fatal);

        let error = channel
            .report(WarningKind::VoidIoAccess, 0x0120, 0x4410, 77)
            .expect_err("fatal warning must escalate");
        assert_eq!(
            error,
            EmulationError::Escalated {
                kind: WarningKind::VoidIoAccess,
                pc: 0x4410,
                address: 0x0120,
                cycles: 77,
            }
        );
        assert_eq!(channel.count(WarningKind::VoidIoAccess), 1);
    }

    #[test]
    fn stats_counters_saturate() {
        let mut stats = ExecutionStats {
            instructions: u64::MAX,
            ..ExecutionStats::default()
        };
        stats.record_instruction();
        stats.record_cycles(PowerMode::Lpm3, 10);
        stats.record_cycles(PowerMode::Lpm3, u64::MAX);

        assert_eq!(stats.instructions(), u64::MAX);
        assert_eq!(stats.cycles_in(PowerMode::Lpm3), u64::MAX);
        assert_eq!(stats.cycles_in(PowerMode::Active), 0);
    }
}
