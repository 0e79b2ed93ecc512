//! VGA text-mode console: output for the console channel and the clock's
//! pinwheel in the top-right corner.

use lazy_static::lazy_static;
use spin::Mutex;
use volatile::Volatile;

use super::{CharDevice, InputQueue};

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;
const VGA_BUFFER: usize = 0xb8000;

/// Light grey on black.
const DEFAULT_ATTR: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii: u8,
    attr: u8,
}

#[repr(transparent)]
struct Buffer {
    chars: [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

/// Scrolling writer over the bottom line of the screen. Row 0 is kept for
/// status output.
pub struct Writer {
    column: usize,
    buffer: &'static mut Buffer,
}

impl Writer {
    fn blank() -> ScreenChar {
        ScreenChar { ascii: b' ', attr: DEFAULT_ATTR }
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\r' => self.column = 0,
            0x08 => {
                if self.column > 0 {
                    self.column -= 1;
                    self.buffer.chars[BUFFER_HEIGHT - 1][self.column].write(Self::blank());
                }
            }
            byte => {
                if self.column >= BUFFER_WIDTH {
                    self.new_line();
                }
                let ascii = if (0x20..0x7f).contains(&byte) { byte } else { 0xfe };
                self.buffer.chars[BUFFER_HEIGHT - 1][self.column].write(ScreenChar { ascii, attr: DEFAULT_ATTR });
                self.column += 1;
            }
        }
    }

    fn new_line(&mut self) {
        for row in 2..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                let ch = self.buffer.chars[row][col].read();
                self.buffer.chars[row - 1][col].write(ch);
            }
        }
        for col in 0..BUFFER_WIDTH {
            self.buffer.chars[BUFFER_HEIGHT - 1][col].write(Self::blank());
        }
        self.column = 0;
    }

    /// Put `ch` at a fixed spot on the status row.
    pub fn put_at(&mut self, col: usize, ch: u8) {
        if col < BUFFER_WIDTH {
            self.buffer.chars[0][col].write(ScreenChar { ascii: ch, attr: DEFAULT_ATTR });
        }
    }

    pub fn clear(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                self.buffer.chars[row][col].write(Self::blank());
            }
        }
        self.column = 0;
    }
}

lazy_static! {
    pub static ref WRITER: Mutex<Writer> = Mutex::new(Writer {
        column: 0,
        // SAFETY: the VGA text buffer is identity mapped and only touched
        // through this writer.
        buffer: unsafe { &mut *(VGA_BUFFER as *mut Buffer) },
    });
}

pub fn init() {
    WRITER.lock().clear();
}

/// Draw the clock's pinwheel in the top-right corner.
pub fn show_pinwheel(ch: char) {
    WRITER.lock().put_at(BUFFER_WIDTH - 1, ch as u8);
}

/// The console channel: keyboard input buffered for the user shell, output
/// to the screen.
pub struct ConsoleDevice {
    input: InputQueue,
}

impl ConsoleDevice {
    pub fn new() -> Self {
        ConsoleDevice { input: InputQueue::new() }
    }
}

impl Default for ConsoleDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CharDevice for ConsoleDevice {
    fn available(&self) -> usize {
        self.input.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.input.drain_into(buf)
    }

    fn write(&mut self, data: &[u8]) {
        let mut writer = WRITER.lock();
        for byte in data {
            writer.write_byte(*byte);
        }
    }

    fn receive(&mut self, byte: u8) {
        // echo
        WRITER.lock().write_byte(byte);
        self.input.push(byte);
    }
}
