//! Conversion between CPU cycles and virtual time.
//!
//! The mapping is a rational scale anchored at the last frequency change, so
//! re-clocking the CPU never moves virtual time backwards.

/// Rational cycle/virtual-time scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ClockConversion {
    cpu_hz: u64,
    virtual_hz: u64,
    anchor_cycles: u64,
    anchor_time: u64,
}

fn saturate(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl ClockConversion {
    /// Creates a scale anchored at cycle 0 and virtual time 0.
    #[must_use]
    pub const fn new(cpu_hz: u64, virtual_hz: u64) -> Self {
        Self {
            cpu_hz,
            virtual_hz,
            anchor_cycles: 0,
            anchor_time: 0,
        }
    }

    /// Current CPU clock in Hz.
    #[must_use]
    pub const fn cpu_hz(&self) -> u64 {
        self.cpu_hz
    }

    /// Virtual-time ticks per second.
    #[must_use]
    pub const fn virtual_hz(&self) -> u64 {
        self.virtual_hz
    }

    /// Virtual time at `cycles`, rounded down.
    #[must_use]
    pub fn virtual_time_at(&self, cycles: u64) -> u64 {
        let elapsed = u128::from(cycles.saturating_sub(self.anchor_cycles));
        let scaled = elapsed * u128::from(self.virtual_hz) / u128::from(self.cpu_hz);
        self.anchor_time.saturating_add(saturate(scaled))
    }

    /// First cycle at which virtual time has reached `time`.
    #[must_use]
    pub fn cycles_at(&self, time: u64) -> u64 {
        let elapsed = u128::from(time.saturating_sub(self.anchor_time));
        let scaled = (elapsed * u128::from(self.cpu_hz)).div_ceil(u128::from(self.virtual_hz));
        self.anchor_cycles.saturating_add(saturate(scaled))
    }

    /// Changes the CPU clock, re-anchoring the scale at `now_cycles`.
    pub fn set_cpu_hz(&mut self, cpu_hz: u64, now_cycles: u64) {
        self.anchor_time = self.virtual_time_at(now_cycles);
        self.anchor_cycles = now_cycles;
        self.cpu_hz = cpu_hz;
    }
}

#[cfg(test)]
mod tests {
    use super::ClockConversion;

    #[test]
    fn one_to_one_scale_is_identity() {
        let clock = ClockConversion::new(1_000_000, 1_000_000);
        assert_eq!(clock.virtual_time_at(1234), 1234);
        assert_eq!(clock.cycles_at(1234), 1234);
    }

    #[test]
    fn cycles_round_up_so_events_are_never_early() {
        let clock = ClockConversion::new(4_915_200, 1_000_000);
        let cycles = clock.cycles_at(50);
        assert_eq!(cycles, 246);
        assert!(clock.virtual_time_at(cycles) >= 50);
        assert!(clock.virtual_time_at(cycles - 1) < 50);
    }

    #[test]
    fn frequency_change_keeps_time_continuous() {
        let mut clock = ClockConversion::new(2_000_000, 1_000_000);
        assert_eq!(clock.virtual_time_at(2000), 1000);

        clock.set_cpu_hz(4_000_000, 2000);
        assert_eq!(clock.virtual_time_at(2000), 1000);
        assert_eq!(clock.virtual_time_at(6000), 2000);
        assert_eq!(clock.cycles_at(1500), 4000);
        assert_eq!(clock.cycles_at(10), 2000);
    }
}
