//! PS/2 keyboard: scancode set 1 to ASCII.

use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::instructions::port::Port;

const DATA_PORT: u16 = 0x60;

const LSHIFT: u8 = 0x2A;
const RSHIFT: u8 = 0x36;
const CAPS_LOCK: u8 = 0x3A;
const EXTENDED: u8 = 0xE0;
const RELEASE: u8 = 0x80;

/// Unshifted keys, indexed by make code.
const PLAIN: [u8; 0x3A] = *b"\0\x1b1234567890-=\x08\tqwertyuiop[]\n\0asdfghjkl;'`\0\\zxcvbnm,./\0*\0 ";
const SHIFTED: [u8; 0x3A] = *b"\0\x1b!@#$%^&*()_+\x08\tQWERTYUIOP{}\n\0ASDFGHJKL:\"~\0|ZXCVBNM<>?\0*\0 ";

pub struct KeyboardState {
    shift: bool,
    caps_lock: bool,
    extended: bool,
}

impl KeyboardState {
    pub const fn new() -> Self {
        KeyboardState { shift: false, caps_lock: false, extended: false }
    }

    /// Feed one scancode; returns the character it completes, if any.
    pub fn translate(&mut self, scancode: u8) -> Option<u8> {
        if scancode == EXTENDED {
            self.extended = true;
            return None;
        }
        if core::mem::take(&mut self.extended) {
            // arrows and the right-hand modifiers carry no character
            return None;
        }

        let released = scancode & RELEASE != 0;
        let code = scancode & !RELEASE;
        match code {
            LSHIFT | RSHIFT => {
                self.shift = !released;
                None
            }
            CAPS_LOCK => {
                if !released {
                    self.caps_lock = !self.caps_lock;
                }
                None
            }
            _ if released => None,
            _ => {
                let plain = *PLAIN.get(code as usize)?;
                let mut ch = if self.shift { SHIFTED[code as usize] } else { plain };
                if self.caps_lock && plain.is_ascii_lowercase() {
                    ch = if self.shift { plain } else { plain.to_ascii_uppercase() };
                }
                (ch != 0).then_some(ch)
            }
        }
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref STATE: Mutex<KeyboardState> = Mutex::new(KeyboardState::new());
}

/// Discard any scancode left over from the firmware.
pub fn init() {
    let mut port: Port<u8> = Port::new(DATA_PORT);
    let _ = unsafe { port.read() };
}

/// Read the pending scancode (keyboard interrupt) and translate it.
pub fn read_key() -> Option<u8> {
    let mut port: Port<u8> = Port::new(DATA_PORT);
    let scancode = unsafe { port.read() };
    STATE.lock().translate(scancode)
}
