//! 8254 programmable interval timer, channel 0 drives the clock interrupt.

use bit_field::BitField;
use x86_64::instructions::port::Port;

use crate::config::CLOCK_FREQUENCY;
use crate::log_info;

/// Input clock of the PIT in Hz.
const PIT_BASE_HZ: u32 = 1_193_182;

const CHANNEL0: u16 = 0x40;
const COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave), binary.
const CMD_CH0_SQUARE: u8 = 0x36;

pub fn divisor(frequency: u32) -> u16 {
    let d = PIT_BASE_HZ / frequency.max(1);
    d.clamp(1, u16::MAX as u32) as u16
}

/// Program channel 0 for `CLOCK_FREQUENCY` interrupts per second.
pub fn init() {
    let d = divisor(CLOCK_FREQUENCY);
    let mut command: Port<u8> = Port::new(COMMAND);
    let mut channel0: Port<u8> = Port::new(CHANNEL0);
    unsafe {
        command.write(CMD_CH0_SQUARE);
        channel0.write(d.get_bits(0..8) as u8);
        channel0.write(d.get_bits(8..16) as u8);
    }
    log_info!("PIT programmed for {} Hz (divisor {})", CLOCK_FREQUENCY, d);
}
