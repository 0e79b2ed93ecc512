//! Character devices behind the console and serial channels.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

#[cfg(target_os = "none")]
pub mod console;
#[cfg(target_os = "none")]
pub mod keyboard;
#[cfg(target_os = "none")]
pub mod pit;
#[cfg(target_os = "none")]
pub mod uart;

/// A byte-stream device as the system calls see it.
pub trait CharDevice {
    /// Bytes of input waiting to be read.
    fn available(&self) -> usize;

    /// Move up to `buf.len()` waiting bytes into `buf`; returns the count.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write synchronously.
    fn write(&mut self, data: &[u8]);

    /// Queue a byte that arrived from the hardware.
    fn receive(&mut self, byte: u8);
}

/// Input side shared by every device: a byte FIFO.
#[derive(Debug)]
pub struct InputQueue {
    bytes: VecDeque<u8>,
    limit: usize,
}

impl InputQueue {
    /// Input past this many unread bytes is dropped.
    pub const DEFAULT_LIMIT: usize = 256;

    pub fn new() -> Self {
        InputQueue { bytes: VecDeque::new(), limit: Self::DEFAULT_LIMIT }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn push(&mut self, byte: u8) -> bool {
        if self.bytes.len() >= self.limit {
            return false;
        }
        self.bytes.push_back(byte);
        true
    }

    pub fn drain_into(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            let Some(byte) = self.bytes.pop_front() else {
                break;
            };
            buf[n] = byte;
            n += 1;
        }
        n
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory device: input is fed by hand, output is collected.
#[derive(Debug, Default)]
pub struct BufferedDevice {
    input: InputQueue,
    output: Vec<u8>,
}

impl BufferedDevice {
    pub fn new() -> Self {
        BufferedDevice { input: InputQueue::new(), output: Vec::new() }
    }

    /// A device shared with the caller, who can feed and inspect it while
    /// the kernel owns the other handle.
    pub fn shared() -> Arc<Mutex<BufferedDevice>> {
        Arc::new(Mutex::new(BufferedDevice::new()))
    }

    pub fn feed(&mut self, data: &[u8]) {
        for byte in data {
            self.input.push(*byte);
        }
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

impl CharDevice for BufferedDevice {
    fn available(&self) -> usize {
        self.input.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.input.drain_into(buf)
    }

    fn write(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data);
    }

    fn receive(&mut self, byte: u8) {
        self.input.push(byte);
    }
}

impl<D: CharDevice> CharDevice for Arc<Mutex<D>> {
    fn available(&self) -> usize {
        self.lock().available()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.lock().read(buf)
    }

    fn write(&mut self, data: &[u8]) {
        self.lock().write(data)
    }

    fn receive(&mut self, byte: u8) {
        self.lock().receive(byte)
    }
}
