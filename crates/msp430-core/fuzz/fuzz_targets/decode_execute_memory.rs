#![no_main]

use libfuzzer_sys::fuzz_target;
use msp430_core::{
    AccessWidth, CoreConfig, Decoder, Msp430Core, Register, RunBoundary, Severity, WarningPolicy,
};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, program)) = data.split_first() else {
        return;
    };
    let extended = selector & 1 != 0;
    let words: Vec<u16> = program
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take(256)
        .collect();
    if words.is_empty() {
        return;
    }

    let _ = Decoder::new(extended).decode(0, |address| {
        Ok(words[(address as usize / 2) % words.len()])
    });

    let config = CoreConfig {
        warnings: WarningPolicy::uniform(Severity::Silent),
        ..if extended {
            CoreConfig::msp430f5437()
        } else {
            CoreConfig::msp430f1611()
        }
    };
    let entry = if extended { 0x5C00 } else { 0x4400 };
    let Ok(mut core) = Msp430Core::new(config) else {
        return;
    };
    for (address, word) in (entry..).step_by(2).zip(&words) {
        core.set(address, u32::from(*word), AccessWidth::Word);
    }
    core.set(0xFFFE, entry, AccessWidth::Word);
    core.reset();
    let _ = core.write_register(Register::SP, entry);
    if selector & 2 != 0 {
        core.flag_interrupt(usize::from(selector >> 4) % 8, true);
        let _ = core.write_register(Register::SR, msp430_core::SR_GIE);
    }

    let _ = core.run(RunBoundary::Instructions(512));
});
