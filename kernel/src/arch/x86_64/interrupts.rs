//! Selects and exposes the single active [`IrqController`] backend.
//!
//! Spec §6 names two alternative EOI-capable controllers (legacy 8259,
//! local-APIC); exactly one is active at a time. Without a real ACPI MADT
//! parser this core always selects the legacy 8259 path — the local-APIC
//! implementation exists and is exercised by unit tests, but is not wired
//! as the default (see DESIGN.md's Open Question resolution).

use core::sync::atomic::{AtomicU8, Ordering};

use crate::irq::IrqController;

use super::{apic::LocalApic, pic::LegacyPic};

static LAST_IRQ_LINE: AtomicU8 = AtomicU8::new(0);

pub fn set_last_irq_line(line: u8) {
    LAST_IRQ_LINE.store(line, Ordering::Relaxed);
}

pub fn last_irq_line() -> u8 {
    LAST_IRQ_LINE.load(Ordering::Relaxed)
}

static LEGACY_PIC: LegacyPic = LegacyPic::new();
static LOCAL_APIC: LocalApic = LocalApic::new();

enum ActiveKind {
    Legacy,
    Apic,
}

static ACTIVE: ActiveKind = ActiveKind::Legacy;

pub fn active_controller() -> &'static dyn IrqController {
    match ACTIVE {
        ActiveKind::Legacy => &LEGACY_PIC,
        ActiveKind::Apic => &LOCAL_APIC,
    }
}

/// Remap and unmask the active controller. Called once from `arch::init()`.
pub fn init() {
    match ACTIVE {
        ActiveKind::Legacy => LEGACY_PIC.remap_and_init(),
        ActiveKind::Apic => LOCAL_APIC.init(),
    }
}
