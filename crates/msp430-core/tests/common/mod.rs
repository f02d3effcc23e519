//! Shared fixtures: firmware placement and a compare timer unit.

#![allow(dead_code, clippy::cast_possible_truncation)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use msp430_core::{
    AccessIntent, AccessWidth, CoreConfig, CoreContext, EventAction, EventId, IoUnit,
    MemoryMonitor, Msp430Core, ResetReason, UnitId,
};

/// Where test programs start on the classic preset.
pub const ENTRY: u32 = 0x4400;
/// Top of RAM on the classic preset.
pub const STACK_TOP: u32 = 0x3900;

/// Classic core with CPU and virtual time on the same 1 MHz clock.
pub fn one_to_one() -> CoreConfig {
    CoreConfig {
        cpu_frequency_hz: 1_000_000,
        virtual_time_hz: 1_000_000,
        ..CoreConfig::default()
    }
}

/// Writes `words` starting at `address` without dispatch.
pub fn place(core: &mut Msp430Core, address: u32, words: &[u16]) {
    for (at, word) in (address..).step_by(2).zip(words) {
        assert!(core.set(at, u32::from(*word), AccessWidth::Word));
    }
}

/// Builds a core with `program` at [`ENTRY`], boots it and sets SP.
pub fn boot(config: CoreConfig, program: &[u16]) -> Msp430Core {
    let mut core = Msp430Core::new(config).expect("valid config");
    place(&mut core, ENTRY, program);
    place(&mut core, 0xFFFE, &[ENTRY as u16]);
    core.reset();
    core.write_register(msp430_core::Register::SP, STACK_TOP)
        .expect("even stack pointer");
    core
}

/// Points `vector` at `handler` and places the handler body there.
pub fn install_handler(core: &mut Msp430Core, vector: usize, handler: u32, body: &[u16]) {
    let slot = core.config().vector_address(vector);
    place(core, slot, &[handler as u16]);
    place(core, handler, body);
}

/// Counts accesses seen at a watched address.
#[derive(Debug, Default, Clone)]
pub struct AccessLog {
    pub reads: Rc<Cell<u32>>,
    pub fetches: Rc<Cell<u32>>,
    pub writes: Rc<RefCell<Vec<u32>>>,
}

impl MemoryMonitor for AccessLog {
    fn read_before(&mut self, _address: u32, _width: AccessWidth, intent: AccessIntent) {
        match intent {
            AccessIntent::Fetch => self.fetches.set(self.fetches.get() + 1),
            AccessIntent::Read => self.reads.set(self.reads.get() + 1),
        }
    }

    fn write_after(&mut self, _address: u32, _width: AccessWidth, value: u32) {
        self.writes.borrow_mut().push(value);
    }
}

/// Observable state of a [`CompareTimer`].
#[derive(Debug, Default)]
pub struct TimerProbe {
    pub fired_at_cycles: RefCell<Vec<u64>>,
    pub resets: Cell<u32>,
    pub serviced: Cell<u32>,
}

/// Continuous-mode counter on the virtual-time clock with one compare
/// register. Control at `base` (bit 5 starts the counter), compare at
/// `base + 2`. Reaching the compare value raises `vector`.
pub struct CompareTimer {
    base: u32,
    vector: usize,
    id: Option<UnitId>,
    event: Option<EventId>,
    running: bool,
    started_at: u64,
    compare: u16,
    probe: Rc<TimerProbe>,
}

impl CompareTimer {
    pub const START: u16 = 0x0020;

    pub fn new(base: u32, vector: usize) -> (Self, Rc<TimerProbe>) {
        let probe = Rc::new(TimerProbe::default());
        let timer = Self {
            base,
            vector,
            id: None,
            event: None,
            running: false,
            started_at: 0,
            compare: 0,
            probe: Rc::clone(&probe),
        };
        (timer, probe)
    }

    fn arm(&self, ctx: &mut CoreContext) {
        if let (true, Some(event)) = (self.running, self.event) {
            ctx.schedule_virtual_time_event(event, self.started_at + u64::from(self.compare));
        }
    }
}

impl IoUnit for CompareTimer {
    fn name(&self) -> &str {
        "compare-timer"
    }

    fn attach(&mut self, id: UnitId, ctx: &mut CoreContext) {
        self.id = Some(id);
        self.event = Some(ctx.create_event("compare", EventAction::Unit { unit: id, tag: 0 }));
    }

    fn reset(&mut self, _reason: ResetReason, ctx: &mut CoreContext) {
        if let Some(event) = self.event {
            ctx.remove_event(event);
        }
        self.running = false;
        self.compare = 0;
        self.probe.resets.set(self.probe.resets.get() + 1);
    }

    fn read(&mut self, address: u32, _width: AccessWidth, ctx: &mut CoreContext) -> u16 {
        match address - self.base {
            0 if self.running => Self::START,
            2 => self.compare,
            4 if self.running => (ctx.virtual_time() - self.started_at) as u16,
            _ => 0,
        }
    }

    fn write(&mut self, address: u32, value: u16, _width: AccessWidth, ctx: &mut CoreContext) {
        match address - self.base {
            0 => {
                self.running = value & Self::START != 0;
                self.started_at = ctx.virtual_time();
                self.arm(ctx);
            }
            2 => {
                self.compare = value;
                self.arm(ctx);
            }
            _ => {}
        }
    }

    fn interrupt_serviced(&mut self, vector: usize, ctx: &mut CoreContext) {
        self.probe.serviced.set(self.probe.serviced.get() + 1);
        if let Some(id) = self.id {
            ctx.flag_interrupt(vector, id, false);
        }
    }

    fn time_event(&mut self, _tag: u32, _time: u64, ctx: &mut CoreContext) {
        self.probe.fired_at_cycles.borrow_mut().push(ctx.cycles());
        if let Some(id) = self.id {
            ctx.flag_interrupt(self.vector, id, true);
        }
    }
}
