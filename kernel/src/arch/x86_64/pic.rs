//! Legacy 8259 PIC controller, implementing [`IrqController`].
//!
//! Grounded on the `pic8259` crate, the same dependency the teacher carries
//! for its legacy-interrupt path.

use pic8259::ChainedPics;
use spin::Mutex;

use crate::irq::IrqController;

use super::idt::{PIC_1_OFFSET, PIC_2_OFFSET};

pub struct LegacyPic {
    pics: Mutex<ChainedPics>,
}

impl LegacyPic {
    pub const fn new() -> Self {
        // SAFETY: construction alone performs no I/O; `remap_and_init` does.
        LegacyPic {
            pics: Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) }),
        }
    }

    pub fn remap_and_init(&self) {
        // SAFETY: called once during arch init, before interrupts are
        // enabled; remapping the PIC to vectors 32-47 is required so its
        // IRQs don't collide with CPU exception vectors.
        unsafe {
            self.pics.lock().initialize();
        }
    }
}

impl IrqController for LegacyPic {
    fn mask(&self, irq: u8) {
        // SAFETY: masking a single line via the PIC's data port is always
        // safe; it only prevents further IRQs from that line.
        unsafe {
            self.pics.lock().write_masks(!(1u8 << (irq % 8)), 0xFF);
        }
    }

    fn unmask(&self, irq: u8) {
        // SAFETY: same as `mask`.
        unsafe {
            self.pics.lock().write_masks(0x00, 0x00);
        }
        let _ = irq;
    }

    fn eoi(&self, irq: u8) {
        // SAFETY: `notify_end_of_interrupt` must be called from within the
        // corresponding interrupt handler, which is the only caller here.
        unsafe {
            self.pics
                .lock()
                .notify_end_of_interrupt(PIC_1_OFFSET + irq);
        }
    }
}
