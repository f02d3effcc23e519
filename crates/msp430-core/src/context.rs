//! The core services a peripheral may call while handling an access, an
//! interrupt acknowledgement or a fired event.

use crate::event::clock::ClockConversion;
use crate::event::Scheduler;
use crate::{
    CoreConfig, EmulationError, EventAction, EventId, FaultCode, InterruptController, TimeDomain,
    UnitId, WarningChannel, WarningKind,
};

/// Time, scheduling, interrupt and warning state shared with peripherals.
#[derive(Debug)]
pub struct CoreContext {
    cycles: u64,
    clock: ClockConversion,
    scheduler: Scheduler,
    interrupts: InterruptController,
    warnings: WarningChannel,
    instruction_pc: u32,
}

impl CoreContext {
    /// Creates a context at cycle 0 for `config`.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            cycles: 0,
            clock: ClockConversion::new(config.cpu_frequency_hz, config.virtual_time_hz),
            scheduler: Scheduler::default(),
            interrupts: InterruptController::new(config.max_interrupt),
            warnings: WarningChannel::new(config.warnings),
            instruction_pc: 0,
        }
    }

    /// CPU cycles elapsed since power-on.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Virtual time corresponding to the current cycle count.
    #[must_use]
    pub fn virtual_time(&self) -> u64 {
        self.clock.virtual_time_at(self.cycles)
    }

    /// Clock conversion in effect.
    #[must_use]
    pub const fn clock(&self) -> &ClockConversion {
        &self.clock
    }

    /// Adds an unscheduled event.
    pub fn create_event(&mut self, name: impl Into<String>, action: EventAction) -> EventId {
        self.scheduler.create(name, action)
    }

    /// Schedules `id` at absolute cycle `cycles`.
    pub fn schedule_cycle_event(&mut self, id: EventId, cycles: u64) {
        self.scheduler.schedule(id, TimeDomain::Cycles, cycles);
    }

    /// Schedules `id` at absolute virtual time `time`.
    pub fn schedule_virtual_time_event(&mut self, id: EventId, time: u64) {
        self.scheduler.schedule(id, TimeDomain::VirtualTime, time);
    }

    /// Unschedules `id`; returns `false` when it was not queued.
    pub fn remove_event(&mut self, id: EventId) -> bool {
        self.scheduler.unlink(id)
    }

    /// Destroys `id` and frees its slot; returns `false` when it was already
    /// gone.
    pub fn destroy_event(&mut self, id: EventId) -> bool {
        self.scheduler.destroy(id)
    }

    /// Event arena and queues.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Cycle at which the next event in either queue is due.
    #[must_use]
    pub fn next_event_cycles(&self) -> Option<u64> {
        let cycle_head = self
            .scheduler
            .queue(TimeDomain::Cycles)
            .first()
            .map(|(time, _)| time);
        let virtual_head = self
            .scheduler
            .queue(TimeDomain::VirtualTime)
            .first()
            .map(|(time, _)| self.clock.cycles_at(time));
        match (cycle_head, virtual_head) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Raises or lowers interrupt `vector` on behalf of `owner`.
    pub fn flag_interrupt(&mut self, vector: usize, owner: UnitId, on: bool) {
        tracing::trace!(vector, %owner, on, "interrupt flag");
        self.interrupts.flag(vector, owner, on);
    }

    /// Interrupt controller state.
    #[must_use]
    pub const fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    /// Reports a recoverable condition at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::Escalated`] when `kind` is configured fatal.
    pub fn warn(&mut self, kind: WarningKind, address: u32) -> Result<(), EmulationError> {
        self.warnings
            .report(kind, address, self.instruction_pc, self.cycles)
    }

    /// Warning policy and counters.
    #[must_use]
    pub const fn warnings(&self) -> &WarningChannel {
        &self.warnings
    }

    /// Mutable warning policy and counters.
    pub const fn warnings_mut(&mut self) -> &mut WarningChannel {
        &mut self.warnings
    }

    /// Builds a fault carrying the current instruction address and cycle.
    #[must_use]
    pub const fn fault(&self, code: FaultCode, address: u32) -> EmulationError {
        EmulationError::Fault {
            code,
            pc: self.instruction_pc,
            address,
            cycles: self.cycles,
        }
    }

    /// Address of the instruction being executed.
    #[must_use]
    pub const fn instruction_pc(&self) -> u32 {
        self.instruction_pc
    }

    pub(crate) const fn set_instruction_pc(&mut self, pc: u32) {
        self.instruction_pc = pc;
    }

    pub(crate) const fn add_cycles(&mut self, cycles: u64) {
        self.cycles = self.cycles.saturating_add(cycles);
    }

    pub(crate) const fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }

    pub(crate) const fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub(crate) fn set_cpu_frequency(&mut self, hz: u64) {
        self.clock.set_cpu_hz(hz, self.cycles);
    }
}
