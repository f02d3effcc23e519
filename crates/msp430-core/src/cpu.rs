//! The CPU core: fetch, interrupt entry, event draining and run control.
//!
//! One [`Msp430Core::step`] services a pending interrupt if the controller
//! allows it, then either executes one instruction or, while the CPU is off,
//! jumps the cycle counter to the next due event. Events due at the new
//! cycle count are drained before the step returns.

use std::collections::BTreeSet;
use std::fmt;

use crate::api::ControlRequest;
use crate::decoder::{DecodeError, Decoder};
use crate::execute::{execute, Machine};
use crate::timing::{interrupt_cycles, reset_cycles};
use crate::{
    AccessIntent, AccessWidth, ConfigError, ControlHandle, CoreConfig, CoreContext,
    EmulationError, EventAction, ExecutionStats, FaultCode, IoRegistry, IoUnit, Memory,
    MemoryMonitor, MonitorId, PowerMode, Register, RegisterMonitor, Registers, ResetReason,
    RunBoundary, RunOutcome, StepOutcome, StopReason, TimeDomain, UnitId, WarningChannel,
    RESET_VECTOR_ADDRESS, SR_GIE,
};

/// A chip-level component that is told about resets but maps no addresses,
/// such as a clock system or a flash controller.
pub trait Chip {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called during the reset sequence, before I/O units are reset.
    fn notify_reset(&mut self);
}

/// An MSP430 or MSP430X CPU with its memory, peripherals and scheduler.
pub struct Msp430Core {
    config: CoreConfig,
    registers: Registers,
    memory: Memory,
    ctx: CoreContext,
    decoder: Decoder,
    stats: ExecutionStats,
    chips: Vec<Box<dyn Chip>>,
    breakpoints: BTreeSet<u32>,
    resume_from: Option<u32>,
    control: ControlHandle,
}

impl fmt::Debug for Msp430Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msp430Core")
            .field("registers", &self.registers)
            .field("cycles", &self.ctx.cycles())
            .field("memory", &self.memory)
            .field("stats", &self.stats)
            .field("breakpoints", &self.breakpoints)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn word(value: u32) -> u16 {
    value as u16
}

impl Msp430Core {
    /// Builds a core for `config` and performs a power-on reset.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency [`CoreConfig::validate`] finds.
    pub fn new(config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut core = Self {
            registers: Registers::new(config.extended),
            memory: Memory::new(&config),
            ctx: CoreContext::new(&config),
            decoder: Decoder::new(config.extended),
            stats: ExecutionStats::default(),
            chips: Vec::new(),
            breakpoints: BTreeSet::new(),
            resume_from: None,
            control: ControlHandle::default(),
            config,
        };
        core.reset();
        Ok(core)
    }

    /// Configuration the core was built with.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Registers an I/O unit for `start..=end`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoOutOfRange`] or [`ConfigError::IoOverlap`].
    pub fn add_io_unit(
        &mut self,
        start: u32,
        end: u32,
        unit: Box<dyn IoUnit>,
    ) -> Result<UnitId, ConfigError> {
        self.memory.io_mut().register(start, end, unit, &mut self.ctx)
    }

    /// Adds a chip notified on every reset.
    pub fn add_chip(&mut self, chip: Box<dyn Chip>) {
        tracing::debug!(chip = chip.name(), "chip added");
        self.chips.push(chip);
    }

    /// Copies a firmware image into memory without dispatch.
    ///
    /// # Errors
    ///
    /// Faults with [`FaultCode::AddressOutOfRange`] when the image does not fit.
    pub fn load_image(&mut self, address: u32, image: &[u8]) -> Result<(), EmulationError> {
        self.memory
            .load_image(address, image)
            .map_err(|code| self.ctx.fault(code, address))
    }

    /// Power-on reset: registers cleared, pending interrupts and queued
    /// events dropped, chips and units reset, PC loaded from the reset vector.
    pub fn reset(&mut self) {
        self.registers.clear();
        self.internal_reset(ResetReason::PowerOn);
        self.resume_from = None;
        tracing::info!(pc = self.registers.pc(), "power-on reset");
    }

    /// Raises the reset vector; it is serviced at the next step.
    pub fn request_reset(&mut self) {
        let vector = self.config.max_interrupt;
        self.ctx.flag_interrupt(vector, UnitId::HOST, true);
    }

    fn internal_reset(&mut self, reason: ResetReason) {
        self.ctx.interrupts_mut().clear();
        self.ctx.scheduler_mut().clear_queues();
        for chip in &mut self.chips {
            chip.notify_reset();
        }
        self.memory.io_mut().reset_all(reason, &mut self.ctx);
        self.registers.set(Register::SR, 0);
        let vector = self.memory.get(RESET_VECTOR_ADDRESS, AccessWidth::Word);
        self.registers.set(Register::PC, vector);
        self.stats.record_reset();
    }

    const fn machine(&mut self) -> Machine<'_> {
        Machine {
            registers: &mut self.registers,
            memory: &mut self.memory,
            ctx: &mut self.ctx,
            extended: self.config.extended,
        }
    }

    /// Enters the highest pending interrupt when the controller allows it.
    ///
    /// Returns the cycles spent, or `None` when nothing was entered.
    fn service_interrupt(&mut self) -> Result<Option<u64>, EmulationError> {
        let gie = self.registers.flag(SR_GIE);
        if !self.ctx.interrupts().should_service(gie) {
            return Ok(None);
        }
        let Some(vector) = self.ctx.interrupts().pending() else {
            return Ok(None);
        };
        let vector_address = self.config.vector_address(vector);
        if self.memory.flash_blocking() {
            return Err(self
                .ctx
                .fault(FaultCode::FlashBlockingInterrupt, vector_address));
        }

        if vector == self.ctx.interrupts().reset_vector() {
            self.internal_reset(ResetReason::ResetVector);
            let cycles = reset_cycles();
            self.ctx.add_cycles(cycles);
            tracing::info!(pc = self.registers.pc(), "reset vector serviced");
            return Ok(Some(cycles));
        }

        let extended = self.config.extended;
        let pc = self.registers.pc();
        let sr = self.registers.sr();
        let mut machine = self.machine();
        machine.push(pc & 0xFFFF, AccessWidth::Word)?;
        let status = if extended {
            (sr & 0x0FFF) | ((pc >> 4) & 0xF000)
        } else {
            sr
        };
        machine.push(status, AccessWidth::Word)?;
        machine.set_reg(Register::SR, 0)?;
        let handler = machine.load_memory(vector_address, AccessWidth::Word)?;
        machine.set_reg(Register::PC, handler)?;

        let owner = self.ctx.interrupts_mut().begin_service(vector);
        let cycles = interrupt_cycles();
        self.ctx.add_cycles(cycles);
        self.stats.record_interrupt();
        tracing::debug!(vector, handler, return_pc = pc, "interrupt entry");
        if owner == Some(UnitId::HOST) {
            self.ctx.flag_interrupt(vector, UnitId::HOST, false);
        } else if let Some(owner) = owner {
            self.memory
                .io_mut()
                .interrupt_serviced(owner, vector, &mut self.ctx);
        }
        Ok(Some(cycles))
    }

    /// Runs every event due now; events scheduled for now by those events
    /// wait for the next drain.
    fn drain_events(&mut self) {
        let now_cycles = self.ctx.cycles();
        let now_time = self.ctx.virtual_time();
        let due = self.ctx.scheduler().due_count(now_cycles, now_time);
        for _ in 0..due {
            let Some((id, domain, time)) = self.ctx.scheduler_mut().pop_due(now_cycles, now_time)
            else {
                break;
            };
            let Some(mut action) = self.ctx.scheduler_mut().take_action(id) else {
                continue;
            };
            tracing::trace!(?id, ?domain, time, "event fired");
            match &mut action {
                EventAction::Unit { unit, tag } => {
                    self.memory
                        .io_mut()
                        .time_event(*unit, *tag, time, &mut self.ctx);
                }
                EventAction::Callback(callback) => callback(&mut self.ctx, time),
            }
            self.ctx.scheduler_mut().restore_action(id, action);
        }
    }

    /// Services interrupts, then executes one instruction or sleeps.
    ///
    /// # Errors
    ///
    /// Returns faults, escalated warnings and breakpoint hits.
    pub fn step(&mut self) -> Result<StepOutcome, EmulationError> {
        self.step_bounded(None)
    }

    fn step_bounded(&mut self, ceiling: Option<u64>) -> Result<StepOutcome, EmulationError> {
        let start = self.ctx.cycles();
        self.service_interrupt()?;

        let mode = self.registers.power_mode();
        if mode.is_cpu_off() || self.memory.flash_blocking() {
            return Ok(self.sleep(mode, start, ceiling));
        }

        let pc = self.registers.pc();
        if self.breakpoints.contains(&pc) && self.resume_from != Some(pc) {
            self.resume_from = Some(pc);
            tracing::debug!(pc, "breakpoint hit");
            return Err(EmulationError::Breakpoint { pc });
        }
        self.resume_from = None;
        self.ctx.set_instruction_pc(pc);

        let decoded = {
            let memory = &mut self.memory;
            let ctx = &mut self.ctx;
            self.decoder.decode(pc, |address| {
                memory
                    .read(address, AccessWidth::Word, AccessIntent::Fetch, ctx)
                    .map(word)
            })
        };
        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(DecodeError::Fault { code, word }) => {
                tracing::debug!(pc, word, %code, "decode fault");
                return Err(self.ctx.fault(code, pc));
            }
            Err(DecodeError::Fetch(error)) => return Err(error),
        };

        let next = pc.wrapping_add(decoded.length) & self.registers.mask();
        self.registers.set(Register::PC, next);
        tracing::trace!(pc, instruction = ?decoded.instruction, "execute");
        let outcome = execute(&mut self.machine(), &decoded.instruction)?;
        self.ctx.add_cycles(outcome.cycles);
        self.stats.record_instruction();
        self.stats.record_cycles(PowerMode::Active, outcome.cycles);

        if outcome.returned_from_interrupt {
            tracing::debug!(pc = self.registers.pc(), "interrupt return");
            self.service_interrupt()?;
        }
        self.drain_events();
        Ok(StepOutcome::Executed {
            pc,
            cycles: self.ctx.cycles() - start,
        })
    }

    fn sleep(&mut self, mode: PowerMode, start: u64, ceiling: Option<u64>) -> StepOutcome {
        let now = self.ctx.cycles();
        let target = match (self.ctx.next_event_cycles(), ceiling) {
            (Some(next), Some(ceiling)) => next.min(ceiling),
            (Some(bound), None) | (None, Some(bound)) => bound,
            (None, None) => return StepOutcome::Idle,
        };
        let skipped = target.saturating_sub(now);
        self.ctx.add_cycles(skipped);
        self.stats.record_cycles(mode, skipped);
        self.drain_events();
        StepOutcome::Sleeping {
            cycles: self.ctx.cycles() - start,
        }
    }

    /// Runs until `boundary`, a stop request or an idle CPU.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::AlreadyRunning`] when a run is in progress,
    /// [`EmulationError::Breakpoint`] on a breakpoint, and any fault.
    pub fn run(&mut self, boundary: RunBoundary) -> Result<RunOutcome, EmulationError> {
        if !self.control.try_begin() {
            return Err(EmulationError::AlreadyRunning);
        }
        let result = self.run_loop(boundary);
        self.control.finish();
        if let Ok(outcome) = &result {
            tracing::debug!(
                instructions = outcome.instructions,
                cycles = outcome.cycles,
                reason = ?outcome.reason,
                "run finished"
            );
        }
        result
    }

    fn run_loop(&mut self, boundary: RunBoundary) -> Result<RunOutcome, EmulationError> {
        let start = self.ctx.cycles();
        let mut instructions = 0;
        let ceiling = match boundary {
            RunBoundary::CycleCeiling(ceiling) => Some(ceiling),
            _ => None,
        };
        let reason = loop {
            match self.control.take_request() {
                ControlRequest::Stop => break StopReason::StopRequested,
                ControlRequest::Breakpoint => {
                    return Err(EmulationError::Breakpoint {
                        pc: self.registers.pc(),
                    })
                }
                ControlRequest::None => {}
            }
            let reached = match boundary {
                RunBoundary::UntilStopped => false,
                RunBoundary::Instructions(limit) => instructions >= limit,
                RunBoundary::CycleCeiling(limit) => self.ctx.cycles() >= limit,
            };
            if reached {
                break StopReason::BoundaryReached;
            }
            match self.step_bounded(ceiling)? {
                StepOutcome::Executed { .. } => instructions += 1,
                StepOutcome::Sleeping { .. } => {}
                StepOutcome::Idle => break StopReason::Idle,
            }
        };
        Ok(RunOutcome {
            instructions,
            cycles: self.ctx.cycles() - start,
            reason,
        })
    }

    /// Skips `jump` units of virtual time with the CPU off, then runs for
    /// `execute` units. Returns the virtual time of the next due event.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::JumpWhileActive`] when `jump` is non-zero
    /// and the CPU is executing, [`EmulationError::PromiseViolation`] when
    /// the jump would pass a scheduled event, and any error from the run.
    pub fn step_virtual_time(
        &mut self,
        jump: u64,
        execute: u64,
    ) -> Result<Option<u64>, EmulationError> {
        if jump > 0 {
            let mode = self.registers.power_mode();
            if !mode.is_cpu_off() {
                return Err(EmulationError::JumpWhileActive);
            }
            let target_time = self.ctx.virtual_time().saturating_add(jump);
            let requested_cycles = self.ctx.clock().cycles_at(target_time);
            if let Some(next_event_cycles) = self.ctx.next_event_cycles() {
                if requested_cycles > next_event_cycles {
                    return Err(EmulationError::PromiseViolation {
                        requested_cycles,
                        next_event_cycles,
                    });
                }
            }
            let skipped = requested_cycles.saturating_sub(self.ctx.cycles());
            self.ctx.add_cycles(skipped);
            self.stats.record_cycles(mode, skipped);
            self.drain_events();
        }
        if execute > 0 {
            let target_time = self.ctx.virtual_time().saturating_add(execute);
            let ceiling = self.ctx.clock().cycles_at(target_time);
            self.run(RunBoundary::CycleCeiling(ceiling))?;
        }
        Ok(self.next_event_virtual_time())
    }

    /// Virtual time at which the next event in either queue is due.
    #[must_use]
    pub fn next_event_virtual_time(&self) -> Option<u64> {
        self.ctx
            .next_event_cycles()
            .map(|cycles| self.ctx.clock().virtual_time_at(cycles))
    }

    /// Handle for stopping runs from another thread.
    #[must_use]
    pub fn control_handle(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Stops execution before the instruction at `address`; returns `false`
    /// when one was already set.
    pub fn add_breakpoint(&mut self, address: u32) -> bool {
        self.breakpoints.insert(address & self.registers.mask() & !1)
    }

    /// Removes a breakpoint; returns `false` when none was set.
    pub fn remove_breakpoint(&mut self, address: u32) -> bool {
        self.breakpoints.remove(&(address & self.registers.mask() & !1))
    }

    /// Monitored register read.
    pub fn read_register(&mut self, register: Register) -> u32 {
        self.registers.read(register)
    }

    /// Monitored register write.
    ///
    /// # Errors
    ///
    /// Propagates an escalated [`crate::WarningKind::OddProgramCounter`].
    pub fn write_register(&mut self, register: Register, value: u32) -> Result<(), EmulationError> {
        self.machine().set_reg(register, value)
    }

    /// Adds a monitor on `register`.
    pub fn add_register_monitor(
        &mut self,
        register: Register,
        monitor: Box<dyn RegisterMonitor>,
    ) -> MonitorId {
        self.registers.add_monitor(register, monitor)
    }

    /// Removes a register monitor; returns `false` when `id` is unknown.
    pub fn remove_register_monitor(&mut self, id: MonitorId) -> bool {
        self.registers.remove_monitor(id)
    }

    /// Dispatched, watched memory read.
    ///
    /// # Errors
    ///
    /// Faults on out-of-range or unmapped addresses.
    pub fn read_memory(&mut self, address: u32, width: AccessWidth) -> Result<u32, EmulationError> {
        self.memory
            .read(address, width, AccessIntent::Read, &mut self.ctx)
    }

    /// Dispatched, watched memory write.
    ///
    /// # Errors
    ///
    /// Faults on out-of-range or unmapped addresses.
    pub fn write_memory(
        &mut self,
        address: u32,
        value: u32,
        width: AccessWidth,
    ) -> Result<(), EmulationError> {
        self.memory.write(address, value, width, &mut self.ctx)
    }

    /// Raw memory read.
    #[must_use]
    pub fn get(&self, address: u32, width: AccessWidth) -> u32 {
        self.memory.get(address, width)
    }

    /// Raw memory write; returns `false` outside the address space.
    pub fn set(&mut self, address: u32, value: u32, width: AccessWidth) -> bool {
        self.memory.set(address, value, width)
    }

    /// Watches `address`.
    ///
    /// # Errors
    ///
    /// Faults with [`FaultCode::AddressOutOfRange`] outside the address space.
    pub fn add_watchpoint(
        &mut self,
        address: u32,
        monitor: Box<dyn MemoryMonitor>,
    ) -> Result<MonitorId, EmulationError> {
        self.memory
            .add_watchpoint(address, monitor)
            .map_err(|code| self.ctx.fault(code, address))
    }

    /// Removes a watchpoint; returns `false` when `id` is not at `address`.
    pub fn remove_watchpoint(&mut self, address: u32, id: MonitorId) -> bool {
        self.memory.remove_watchpoint(address, id)
    }

    /// Raises or lowers `vector` on behalf of the host.
    pub fn flag_interrupt(&mut self, vector: usize, on: bool) {
        self.ctx.flag_interrupt(vector, UnitId::HOST, on);
    }

    /// Allows or forbids stores to flash.
    pub fn set_flash_writable(&mut self, writable: bool) {
        self.memory.set_flash_writable(writable);
    }

    /// Holds or releases the CPU for a flash operation.
    pub fn set_flash_blocking(&mut self, blocking: bool) {
        tracing::debug!(blocking, "flash blocking changed");
        self.memory.set_flash_blocking(blocking);
    }

    /// Changes the CPU clock; queued virtual-time events keep their time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroFrequency`] for 0 Hz.
    pub fn set_cpu_frequency(&mut self, hz: u64) -> Result<(), ConfigError> {
        if hz == 0 {
            return Err(ConfigError::ZeroFrequency);
        }
        tracing::debug!(hz, cycles = self.ctx.cycles(), "cpu frequency changed");
        self.ctx.set_cpu_frequency(hz);
        self.config.cpu_frequency_hz = hz;
        Ok(())
    }

    /// Register file.
    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Address space.
    #[must_use]
    pub const fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Registered I/O units.
    #[must_use]
    pub const fn io(&self) -> &IoRegistry {
        self.memory.io()
    }

    /// Time, events, interrupts and warnings.
    #[must_use]
    pub const fn context(&self) -> &CoreContext {
        &self.ctx
    }

    /// Mutable context for scheduling host events and raising interrupts.
    pub const fn context_mut(&mut self) -> &mut CoreContext {
        &mut self.ctx
    }

    /// Execution counters.
    #[must_use]
    pub const fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Warning counters and policy.
    #[must_use]
    pub const fn warnings(&self) -> &WarningChannel {
        self.ctx.warnings()
    }

    /// CPU cycles since power-on.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.ctx.cycles()
    }

    /// Virtual time now.
    #[must_use]
    pub fn virtual_time(&self) -> u64 {
        self.ctx.virtual_time()
    }

    /// Power mode selected by SR.
    #[must_use]
    pub const fn power_mode(&self) -> PowerMode {
        self.registers.power_mode()
    }

    /// Schedules a one-shot host callback at virtual time `time`.
    ///
    /// The event is destroyed after it fires, or on reset, so the returned
    /// id is only meaningful until then.
    pub fn schedule_virtual_time_callback(
        &mut self,
        name: impl Into<String>,
        time: u64,
        callback: impl FnMut(&mut CoreContext, u64) + 'static,
    ) -> crate::EventId {
        let id = self
            .ctx
            .scheduler_mut()
            .create_one_shot(name, EventAction::Callback(Box::new(callback)));
        self.ctx.schedule_virtual_time_event(id, time);
        id
    }

    /// Schedules a one-shot host callback at cycle `cycles`.
    ///
    /// Destroyed like [`Self::schedule_virtual_time_callback`].
    pub fn schedule_cycle_callback(
        &mut self,
        name: impl Into<String>,
        cycles: u64,
        callback: impl FnMut(&mut CoreContext, u64) + 'static,
    ) -> crate::EventId {
        let id = self
            .ctx
            .scheduler_mut()
            .create_one_shot(name, EventAction::Callback(Box::new(callback)));
        self.ctx.schedule_cycle_event(id, cycles);
        id
    }

    /// Cancels a host callback before it fires and frees its slot.
    pub fn cancel_callback(&mut self, id: crate::EventId) -> bool {
        self.ctx.destroy_event(id)
    }

    /// Time domain and target of a scheduled event.
    #[must_use]
    pub fn event_schedule(&self, id: crate::EventId) -> Option<(TimeDomain, u64)> {
        self.ctx.scheduler().scheduled(id)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::{Chip, Msp430Core};
    use crate::{
        AccessWidth, CoreConfig, EmulationError, FaultCode, Register, RunBoundary, StepOutcome,
        StopReason, SR_CPUOFF, SR_GIE,
    };

    fn core_with(program: &[u16]) -> Msp430Core {
        let mut core = Msp430Core::new(CoreConfig::default()).expect("valid config");
        for (address, word) in (0x4400..).step_by(2).zip(program) {
            core.set(address, u32::from(*word), AccessWidth::Word);
        }
        core.set(0xFFFE, 0x4400, AccessWidth::Word);
        core.reset();
        core
    }

    struct Counter(Rc<Cell<u32>>);

    impl Chip for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn notify_reset(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn reset_loads_the_reset_vector() {
        let core = core_with(&[]);
        assert_eq!(core.registers().pc(), 0x4400);
        assert_eq!(core.registers().sr(), 0);
        assert_eq!(core.stats().resets(), 2);
    }

    #[test]
    fn step_executes_and_counts_cycles() {
        let mut core = core_with(&[0x4031, 0x3900, 0x4304]); // mov #0x3900, sp; mov #0, r4
        assert_eq!(
            core.step().expect("step"),
            StepOutcome::Executed { pc: 0x4400, cycles: 2 }
        );
        assert_eq!(core.registers().sp(), 0x3900);
        core.step().expect("step");
        assert_eq!(core.cycles(), 3);
        assert_eq!(core.stats().instructions(), 2);
    }

    #[test]
    fn run_is_rejected_while_running() {
        let mut core = core_with(&[0x3FFF]);
        assert!(core.control.try_begin());
        assert_eq!(
            core.run(RunBoundary::Instructions(1)),
            Err(EmulationError::AlreadyRunning)
        );
        core.control.finish();
        let outcome = core.run(RunBoundary::Instructions(3)).expect("runs");
        assert_eq!(outcome.instructions, 3);
        assert_eq!(outcome.reason, StopReason::BoundaryReached);
    }

    #[test]
    fn breakpoints_stop_once_then_resume() {
        let mut core = core_with(&[0x4304, 0x4305, 0x3FFF]);
        assert!(core.add_breakpoint(0x4402));
        assert_eq!(
            core.run(RunBoundary::UntilStopped),
            Err(EmulationError::Breakpoint { pc: 0x4402 })
        );
        assert_eq!(core.stats().instructions(), 1);
        let outcome = core.run(RunBoundary::Instructions(2)).expect("resumes");
        assert_eq!(outcome.instructions, 2);
        assert!(core.remove_breakpoint(0x4402));
        assert!(!core.remove_breakpoint(0x4402));
    }

    #[test]
    fn stop_request_is_observed_before_the_next_instruction() {
        let mut core = core_with(&[0x3FFF]);
        core.control_handle().request_stop();
        let outcome = core.run(RunBoundary::UntilStopped).expect("runs");
        assert_eq!(outcome.reason, StopReason::StopRequested);
        assert_eq!(outcome.instructions, 0);
        assert!(!core.control_handle().is_running());
    }

    #[test]
    fn sleeping_core_without_events_is_idle() {
        let mut core = core_with(&[]);
        core.registers.set(Register::SR, SR_CPUOFF);
        assert_eq!(core.step().expect("step"), StepOutcome::Idle);
        let outcome = core.run(RunBoundary::UntilStopped).expect("runs");
        assert_eq!(outcome.reason, StopReason::Idle);
    }

    #[test]
    fn reset_vector_notifies_chips_and_clears_state() {
        let resets = Rc::new(Cell::new(0));
        let mut core = core_with(&[0x3FFF]);
        core.add_chip(Box::new(Counter(Rc::clone(&resets))));
        core.registers.set(Register::SR, SR_GIE);
        core.flag_interrupt(3, true);
        core.request_reset();
        core.step().expect("step");
        assert_eq!(resets.get(), 1);
        assert_eq!(core.context().interrupts().pending(), None);
        assert_eq!(core.stats().interrupts_serviced(), 0);
        assert_eq!(core.registers().sr(), 0);
    }

    #[test]
    fn interrupt_while_flash_blocks_faults() {
        let mut core = core_with(&[0x3FFF]);
        core.registers.set(Register::SR, SR_GIE);
        core.set_flash_blocking(true);
        core.flag_interrupt(2, true);
        let error = core.step().expect_err("blocked");
        assert_eq!(error.fault_code(), Some(FaultCode::FlashBlockingInterrupt));
    }

    #[test]
    fn decode_faults_carry_the_instruction_address() {
        let mut core = core_with(&[0x0004]);
        let error = core.step().expect_err("extended opcode");
        assert_eq!(
            error,
            EmulationError::Fault {
                code: FaultCode::ExtendedDisabled,
                pc: 0x4400,
                address: 0x4400,
                cycles: 0,
            }
        );
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let mut core = core_with(&[]);
        assert!(core.set_cpu_frequency(0).is_err());
        assert!(core.set_cpu_frequency(1_000_000).is_ok());
        assert_eq!(core.config().cpu_frequency_hz, 1_000_000);
    }
}
