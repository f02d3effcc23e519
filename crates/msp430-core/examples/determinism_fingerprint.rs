//! Runs a timer-driven firmware loop and prints a fingerprint of the final
//! core state, for comparing runs across hosts.

use msp430_core::{
    AccessWidth, CoreConfig, CoreContext, EventAction, EventId, IoUnit, Msp430Core, Register,
    ResetReason, RunBoundary, UnitId,
};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

const TIMER_BASE: u32 = 0x0160;
const TIMER_VECTOR: usize = 6;

/// Free-running virtual-time counter with one compare register.
#[derive(Default)]
struct Timer {
    id: Option<UnitId>,
    event: Option<EventId>,
    compare: u16,
}

impl IoUnit for Timer {
    fn name(&self) -> &str {
        "timer"
    }

    fn attach(&mut self, id: UnitId, ctx: &mut CoreContext) {
        self.id = Some(id);
        self.event = Some(ctx.create_event("timer-compare", EventAction::Unit { unit: id, tag: 0 }));
    }

    fn reset(&mut self, _reason: ResetReason, ctx: &mut CoreContext) {
        if let Some(event) = self.event {
            ctx.remove_event(event);
        }
        self.compare = 0;
    }

    fn read(&mut self, address: u32, _width: AccessWidth, _ctx: &mut CoreContext) -> u16 {
        if address == TIMER_BASE + 2 {
            self.compare
        } else {
            0
        }
    }

    fn write(&mut self, address: u32, value: u16, _width: AccessWidth, ctx: &mut CoreContext) {
        if address == TIMER_BASE + 2 {
            self.compare = value;
            if let Some(event) = self.event {
                ctx.schedule_virtual_time_event(event, u64::from(value));
            }
        }
    }

    fn interrupt_serviced(&mut self, vector: usize, ctx: &mut CoreContext) {
        if let Some(id) = self.id {
            ctx.flag_interrupt(vector, id, false);
        }
    }

    fn time_event(&mut self, _tag: u32, _time: u64, ctx: &mut CoreContext) {
        if let Some(id) = self.id {
            ctx.flag_interrupt(TIMER_VECTOR, id, true);
        }
    }
}

const FIRMWARE: &[u16] = &[
    0x4031, 0x3900, // mov #0x3900, sp
    0x40B2, 0x0064, 0x0162, // mov #100, &0x0162
    0xD032, 0x0018, // bis #GIE|CPUOFF, sr
    0x5314, // inc r4
    0x3FFC, // jmp to the bis
];

const HANDLER: &[u16] = &[
    0x50B2, 0x0064, 0x0162, // add #100, &0x0162
    0xC0B1, 0x0010, 0x0000, // bic #CPUOFF, 0(sp)
    0x1300, // reti
];

fn place(core: &mut Msp430Core, address: u32, words: &[u16]) {
    for (at, word) in (address..).step_by(2).zip(words) {
        core.set(at, u32::from(*word), AccessWidth::Word);
    }
}

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn fingerprint() -> Result<String, Box<dyn std::error::Error>> {
    let mut core = Msp430Core::new(CoreConfig::default())?;
    core.add_io_unit(TIMER_BASE, TIMER_BASE + 3, Box::new(Timer::default()))?;
    place(&mut core, 0x4400, FIRMWARE);
    place(&mut core, 0x4600, HANDLER);
    let slot = core.config().vector_address(TIMER_VECTOR);
    place(&mut core, slot, &[0x4600]);
    place(&mut core, 0xFFFE, &[0x4400]);
    core.reset();

    let outcome = core.run(RunBoundary::Instructions(200))?;

    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for register in Register::ALL {
        hash_bytes(&mut hash, &core.registers().get(register).to_le_bytes());
    }
    hash_bytes(&mut hash, &core.cycles().to_le_bytes());
    hash_bytes(&mut hash, &core.virtual_time().to_le_bytes());
    hash_bytes(&mut hash, &outcome.instructions.to_le_bytes());
    hash_bytes(&mut hash, &core.stats().interrupts_serviced().to_le_bytes());
    hash_bytes(&mut hash, &core.read_memory(TIMER_BASE + 2, AccessWidth::Word)?.to_le_bytes());

    Ok(format!(
        "{hash:016x} cycles={} wakeups={} r4={}",
        core.cycles(),
        core.stats().interrupts_serviced(),
        core.registers().get(Register::R4)
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", fingerprint()?);
    Ok(())
}
