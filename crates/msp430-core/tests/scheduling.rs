//! Events, low-power skipping, virtual-time stepping and run control.

#![allow(clippy::pedantic, clippy::nursery)]

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{boot, install_handler, one_to_one, CompareTimer, ENTRY};
use msp430_core::{
    AccessWidth, CoreConfig, EmulationError, EventAction, EventId, PowerMode, Register,
    RunBoundary, StepOutcome, StopReason, UnitId, SR_CPUOFF, SR_GIE,
};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

const JMP_SELF: u16 = 0x3FFF;
const RETI: u16 = 0x1300;

fn two_to_one() -> CoreConfig {
    CoreConfig {
        cpu_frequency_hz: 2_000_000,
        virtual_time_hz: 1_000_000,
        ..CoreConfig::default()
    }
}

#[test]
fn continuous_timer_compare_wakes_the_cpu_at_its_deadline() {
    let mut core = boot(one_to_one(), &[JMP_SELF]);
    let (timer, probe) = CompareTimer::new(0x0160, 6);
    core.add_io_unit(0x0160, 0x0165, Box::new(timer)).expect("free range");
    install_handler(&mut core, 6, 0x4600, &[RETI]);

    core.write_memory(0x0162, 100, AccessWidth::Word).expect("compare");
    core.write_memory(0x0160, u32::from(CompareTimer::START), AccessWidth::Word)
        .expect("start");
    core.write_register(Register::SR, SR_GIE | SR_CPUOFF).expect("sleep");

    let outcome = core.run(RunBoundary::UntilStopped).expect("runs");
    assert_eq!(*probe.fired_at_cycles.borrow(), vec![100]);
    assert_eq!(probe.serviced.get(), 1);
    assert_eq!(outcome.reason, StopReason::Idle);
    assert_eq!(outcome.instructions, 1);
    assert_eq!(outcome.cycles, 100 + 6 + 5);
    assert_eq!(core.stats().cycles_in(PowerMode::Lpm0), 100);
    assert_eq!(core.stats().cycles_in(PowerMode::Active), 5);
    assert_eq!(core.power_mode(), PowerMode::Lpm0);
}

#[test]
fn compare_event_never_fires_early_while_executing() {
    let mut core = boot(one_to_one(), &[JMP_SELF]);
    let (timer, probe) = CompareTimer::new(0x0160, 6);
    core.add_io_unit(0x0160, 0x0165, Box::new(timer)).expect("free range");
    core.write_memory(0x0162, 100, AccessWidth::Word).expect("compare");
    core.write_memory(0x0160, u32::from(CompareTimer::START), AccessWidth::Word)
        .expect("start");

    core.run(RunBoundary::CycleCeiling(98)).expect("runs");
    assert_eq!(core.cycles(), 98);
    assert!(probe.fired_at_cycles.borrow().is_empty());
    assert_eq!(core.read_memory(0x0164, AccessWidth::Word).expect("count"), 98);

    core.run(RunBoundary::Instructions(5)).expect("runs");
    assert_eq!(*probe.fired_at_cycles.borrow(), vec![100]);
    assert_eq!(core.context().interrupts().pending(), Some(6));
}

#[test]
fn low_power_jumps_straight_to_the_pending_event() {
    // bis #0x18, sr ; mov #1, r15 ; jmp $
    let mut core = boot(two_to_one(), &[0xD032, 0x0018, 0x431F, JMP_SELF]);
    // bic #CPUOFF, 0(sp) ; reti
    install_handler(&mut core, 5, 0x4600, &[0xC0B1, 0x0010, 0x0000, RETI]);
    core.schedule_virtual_time_callback("wake", 50, |ctx, _| {
        ctx.flag_interrupt(5, UnitId::HOST, true);
    });

    assert_eq!(
        core.step().expect("enter lpm0"),
        StepOutcome::Executed { pc: ENTRY, cycles: 2 }
    );
    assert_eq!(
        core.step().expect("sleep"),
        StepOutcome::Sleeping { cycles: 98 }
    );
    assert_eq!(core.cycles(), 100);
    assert_eq!(core.virtual_time(), 50);
    assert_eq!(core.stats().instructions(), 1);

    assert_eq!(
        core.step().expect("handler"),
        StepOutcome::Executed { pc: 0x4600, cycles: 6 + 5 }
    );
    assert_eq!(
        core.step().expect("reti"),
        StepOutcome::Executed { pc: 0x4606, cycles: 5 }
    );
    assert_eq!(
        core.step().expect("resumed"),
        StepOutcome::Executed { pc: ENTRY + 4, cycles: 1 }
    );
    assert_eq!(core.registers().get(Register::R15), 1);
    assert_eq!(core.power_mode(), PowerMode::Active);
    assert_eq!(core.stats().cycles_in(PowerMode::Lpm0), 98);
}

#[test]
fn virtual_time_jump_requires_a_sleeping_cpu() {
    let mut core = boot(two_to_one(), &[JMP_SELF]);
    assert_eq!(
        core.step_virtual_time(10, 0),
        Err(EmulationError::JumpWhileActive)
    );
}

#[test]
fn virtual_time_jump_cannot_pass_an_event() {
    let mut core = boot(two_to_one(), &[JMP_SELF]);
    core.write_register(Register::SR, SR_CPUOFF).expect("sleep");
    let fired = Rc::new(Cell::new(false));
    let seen = Rc::clone(&fired);
    core.schedule_virtual_time_callback("deadline", 50, move |_, _| seen.set(true));

    assert_eq!(
        core.step_virtual_time(60, 0),
        Err(EmulationError::PromiseViolation {
            requested_cycles: 120,
            next_event_cycles: 100,
        })
    );
    assert_eq!(core.cycles(), 0);

    assert_eq!(core.step_virtual_time(20, 0), Ok(Some(50)));
    assert_eq!(core.cycles(), 40);
    assert!(!fired.get());

    assert_eq!(core.step_virtual_time(30, 0), Ok(None));
    assert_eq!(core.cycles(), 100);
    assert!(fired.get());
}

#[test]
fn virtual_time_execution_runs_to_the_converted_ceiling() {
    let mut core = boot(two_to_one(), &[JMP_SELF]);
    assert_eq!(core.step_virtual_time(0, 10), Ok(None));
    assert_eq!(core.cycles(), 20);
    assert_eq!(core.stats().instructions(), 10);
}

#[test]
fn fired_host_callbacks_release_their_slots() {
    let mut core = boot(one_to_one(), &[JMP_SELF]);
    core.write_register(Register::SR, SR_CPUOFF).expect("sleep");
    let fired = Rc::new(Cell::new(0u32));

    for _ in 0..1_000 {
        let counter = Rc::clone(&fired);
        let due = core.cycles() + 1;
        core.schedule_cycle_callback("tick", due, move |_, _| counter.set(counter.get() + 1));
        assert_eq!(core.step().expect("sleep"), StepOutcome::Sleeping { cycles: 1 });
    }

    assert_eq!(fired.get(), 1_000);
    assert_eq!(core.context().scheduler().capacity(), 1);
    assert_eq!(core.context().scheduler().live_events(), 0);
}

#[test]
fn cancelled_host_callback_never_fires() {
    let mut core = boot(one_to_one(), &[JMP_SELF]);
    core.write_register(Register::SR, SR_CPUOFF).expect("sleep");
    let fired = Rc::new(Cell::new(false));
    let seen = Rc::clone(&fired);
    let id = core.schedule_cycle_callback("late", 10, move |_, _| seen.set(true));

    assert!(core.cancel_callback(id));
    assert!(!core.cancel_callback(id));
    assert_eq!(core.event_schedule(id), None);
    assert_eq!(core.step().expect("nothing scheduled"), StepOutcome::Idle);
    assert!(!fired.get());
}

#[test]
fn virtual_time_wins_ties_with_cycle_events() {
    let mut core = boot(one_to_one(), &[JMP_SELF]);
    core.write_register(Register::SR, SR_CPUOFF).expect("sleep");
    let order = Rc::new(RefCell::new(Vec::new()));
    let cycle_log = Rc::clone(&order);
    let virtual_log = Rc::clone(&order);
    core.schedule_cycle_callback("cycle", 10, move |_, _| cycle_log.borrow_mut().push("cycle"));
    core.schedule_virtual_time_callback("virtual", 10, move |_, _| {
        virtual_log.borrow_mut().push("virtual");
    });

    assert_eq!(core.step().expect("sleep"), StepOutcome::Sleeping { cycles: 10 });
    assert_eq!(*order.borrow(), vec!["virtual", "cycle"]);
}

#[test]
fn periodic_event_keeps_its_phase_across_a_frequency_change() {
    let mut core = boot(one_to_one(), &[JMP_SELF]);
    core.write_register(Register::SR, SR_CPUOFF).expect("sleep");
    let ticks = Rc::new(Cell::new(0u32));
    let slot: Rc<Cell<Option<EventId>>> = Rc::new(Cell::new(None));
    let (counter, own_id) = (Rc::clone(&ticks), Rc::clone(&slot));
    let id = core.context_mut().create_event(
        "tick",
        EventAction::Callback(Box::new(move |ctx, time| {
            counter.set(counter.get() + 1);
            if let Some(id) = own_id.get() {
                ctx.schedule_virtual_time_event(id, time + 25);
            }
        })),
    );
    slot.set(Some(id));
    core.context_mut().schedule_virtual_time_event(id, 25);

    let outcome = core.run(RunBoundary::CycleCeiling(50)).expect("runs");
    assert_eq!(outcome.reason, StopReason::BoundaryReached);
    assert_eq!(ticks.get(), 2);

    core.set_cpu_frequency(2_000_000).expect("non-zero");
    assert_eq!(core.virtual_time(), 50);
    assert_eq!(core.next_event_virtual_time(), Some(75));
    assert_eq!(core.context().next_event_cycles(), Some(100));

    core.run(RunBoundary::CycleCeiling(150)).expect("runs");
    assert_eq!(ticks.get(), 4);
    assert_eq!(core.virtual_time(), 100);
}

#[test]
fn stop_request_from_another_thread_ends_the_run() {
    let mut core = boot(one_to_one(), &[JMP_SELF]);
    let handle = core.control_handle();
    let stopper = std::thread::spawn(move || {
        while !handle.is_running() {
            std::thread::yield_now();
        }
        handle.request_stop();
    });

    let outcome = core.run(RunBoundary::UntilStopped).expect("runs");
    stopper.join().expect("stopper thread");
    assert_eq!(outcome.reason, StopReason::StopRequested);
    assert!(!core.control_handle().is_running());
}

#[test]
fn breakpoint_request_unwinds_with_the_current_pc() {
    let mut core = boot(one_to_one(), &[JMP_SELF]);
    core.control_handle().request_breakpoint();
    assert_eq!(
        core.run(RunBoundary::UntilStopped),
        Err(EmulationError::Breakpoint { pc: ENTRY })
    );
    let outcome = core.run(RunBoundary::Instructions(2)).expect("pending request consumed");
    assert_eq!(outcome.instructions, 2);
}
