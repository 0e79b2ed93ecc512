//! 16550 UART on COM1: kernel log sink and the serial channel.

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::instructions::port::Port;

use super::{CharDevice, InputQueue};

pub const COM1: u16 = 0x3F8;

const LSR_DATA_READY: u8 = 0x01;
const LSR_TX_EMPTY: u8 = 0x20;
const IER_RX_AVAILABLE: u8 = 0x01;

pub struct SerialPort {
    data: Port<u8>,
    int_en: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_sts: Port<u8>,
}

impl SerialPort {
    /// # Safety
    /// `base` must be the I/O base of a 16550-compatible UART.
    pub const unsafe fn new(base: u16) -> SerialPort {
        SerialPort {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_sts: Port::new(base + 5),
        }
    }

    /// 38400 baud, 8N1, FIFOs on, interrupt on received data.
    pub fn init(&mut self) {
        unsafe {
            self.int_en.write(0x00);
            self.line_ctrl.write(0x80);
            self.data.write(0x03);
            self.int_en.write(0x00);
            self.line_ctrl.write(0x03);
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
            self.int_en.write(IER_RX_AVAILABLE);
        }
    }

    fn line_status(&mut self) -> u8 {
        unsafe { self.line_sts.read() }
    }

    pub fn send(&mut self, byte: u8) {
        while self.line_status() & LSR_TX_EMPTY == 0 {}
        unsafe { self.data.write(byte) };
    }

    /// Next received byte, if the receiver holds one.
    pub fn try_receive(&mut self) -> Option<u8> {
        if self.line_status() & LSR_DATA_READY == 0 {
            return None;
        }
        Some(unsafe { self.data.read() })
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

/// Hand every byte waiting in the COM1 receiver to `sink`.
pub fn drain_receiver(mut sink: impl FnMut(u8)) {
    let mut port = SERIAL1.lock();
    while let Some(byte) = port.try_receive() {
        sink(byte);
    }
}

lazy_static! {
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut port = unsafe { SerialPort::new(COM1) };
        port.init();
        Mutex::new(port)
    };
}

/// Program COM1 before anything logs.
pub fn init() {
    lazy_static::initialize(&SERIAL1);
}

/// The serial channel: received bytes are buffered until a process reads
/// them; writes go straight to the line.
pub struct SerialDevice {
    input: InputQueue,
}

impl SerialDevice {
    pub fn new() -> Self {
        SerialDevice { input: InputQueue::new() }
    }
}

impl Default for SerialDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CharDevice for SerialDevice {
    fn available(&self) -> usize {
        self.input.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.input.drain_into(buf)
    }

    fn write(&mut self, data: &[u8]) {
        let mut port = SERIAL1.lock();
        for byte in data {
            port.send(*byte);
        }
    }

    fn receive(&mut self, byte: u8) {
        self.input.push(byte);
    }
}
