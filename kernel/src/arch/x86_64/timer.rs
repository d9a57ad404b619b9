//! Programmable Interval Timer setup, driving scheduler preemption.

use super::port::out_port;
use crate::config::TIMER_HZ;

const PIT_FREQUENCY: u32 = 1_193_182;
const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

/// Program the PIT to fire at [`TIMER_HZ`] (spec: "periodic timer at
/// 100-1000 Hz (configurable)").
pub fn init() {
    let divisor = (PIT_FREQUENCY / TIMER_HZ).clamp(1, u16::MAX as u32) as u16;
    // SAFETY: standard PIT programming sequence: select channel 0, mode 3
    // (square wave), then write the 16-bit divisor low byte then high byte.
    unsafe {
        out_port(PIT_COMMAND, 0x36, 1);
        out_port(PIT_CHANNEL0, (divisor & 0xFF) as u32, 1);
        out_port(PIT_CHANNEL0, (divisor >> 8) as u32, 1);
    }
}
