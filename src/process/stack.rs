//! Process stacks and the initial frame a new process resumes into.

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;

use crate::config::{self, Trace, MAX_ARG_LEN, PAGE_SIZE, STACK_PAGES};
use crate::pool::Clear;
use crate::{log_info, log_trace};
use super::context::{Context, SZ_CONTEXT};

/// Bytes in one process stack (16 KiB).
pub const SZ_STACK: usize = PAGE_SIZE * STACK_PAGES;
pub const STACK_WORDS: usize = SZ_STACK / 8;

const CONTEXT_WORDS: usize = SZ_CONTEXT / 8;

/// Entry point a process "returns" into when its main routine returns
/// without calling `exit`.
pub type Trampoline = extern "C" fn() -> !;

/// Issues `exit(FAKE_EXIT)` through the system call gate.
#[cfg(target_os = "none")]
#[unsafe(naked)]
pub extern "C" fn fallback_exit() -> ! {
    core::arch::naked_asm!(
        "mov edi, {status}",
        "mov eax, {exit}",
        "int 0x80",
        "ud2",
        status = const config::FAKE_EXIT,
        exit = const crate::syscalls::Syscall::Exit as u32,
    );
}

#[cfg(not(target_os = "none"))]
pub extern "C" fn fallback_exit() -> ! {
    // Host builds never run process code.
    panic!("fallback_exit({}) reached on the host", config::FAKE_EXIT);
}

pub const FALLBACK_EXIT: Trampoline = fallback_exit;

/// Word offset of a saved `Context` inside its stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSlot(usize);

impl ContextSlot {
    pub fn word_offset(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// The argument buffer is longer than `MAX_ARG_LEN`.
    ArgTooLong,
    /// Length and buffer disagree (one present without the other, or a
    /// buffer shorter than the stated length).
    ArgMismatch,
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StackError::ArgTooLong => write!(f, "argument buffer too long"),
            StackError::ArgMismatch => write!(f, "argument length/buffer mismatch"),
        }
    }
}

/// A process stack. The memory is boxed so its address stays put while
/// the stack pool grows.
pub struct Stack {
    words: Box<[u64]>,
}

impl Default for Stack {
    fn default() -> Self {
        Stack { words: vec![0u64; STACK_WORDS].into_boxed_slice() }
    }
}

impl Clear for Stack {
    fn clear(&mut self) {
        self.words.fill(0);
    }
}

impl Stack {
    pub fn base(&self) -> u64 {
        self.words.as_ptr() as u64
    }

    /// One past the highest byte of the stack.
    pub fn top(&self) -> u64 {
        self.base() + SZ_STACK as u64
    }

    fn addr_of(&self, index: usize) -> u64 {
        self.base() + (index * 8) as u64
    }

    fn index_of(&self, addr: u64) -> usize {
        ((addr - self.base()) / 8) as usize
    }

    pub fn word(&self, index: usize) -> u64 {
        self.words[index]
    }

    /// Lay out a new process's initial stack.
    ///
    /// From the top down the stack ends up holding:
    ///
    /// ```text
    ///            0              <- last word in the stack
    ///            ....           <- filler
    ///   args ->  b.b.b.b.       <- argument bytes (16-byte aligned)
    ///            argptr         <- second argument to main()
    ///            arglen         <- first argument (16-byte aligned)
    ///            fallback_exit  <- return address for main()
    ///   ctx ->   context        <- initial register snapshot
    /// ```
    ///
    /// The context's `rsp` points at the return-address slot so `iretq`
    /// enters the process exactly as if `fallback_exit` had called it; `rdi`
    /// and `rsi` also carry the length and pointer for a SysV entry point.
    pub fn setup(&mut self, len: usize, buffer: Option<&[u8]>) -> Result<ContextSlot, StackError> {
        log_trace!(Trace::STACK, "stack setup {:#x}, args {} {:?}", self.base(), len, buffer.map(|b| b.as_ptr()));

        if len > MAX_ARG_LEN {
            return Err(StackError::ArgTooLong);
        }
        let args = match buffer {
            Some(buf) if len > 0 && buf.len() >= len => Some(&buf[..len]),
            None if len == 0 => None,
            _ => return Err(StackError::ArgMismatch),
        };

        self.clear();

        // Back up from the zero word by the buffer length and round down to
        // a multiple of 16.
        let last = self.top() - 8;
        let args_addr = (last - len as u64) & !0xf;
        let args_index = self.index_of(args_addr);

        if let Some(bytes) = args {
            let offset = (args_addr - self.base()) as usize;
            // SAFETY: `offset + len` stays below the zero word at the top of
            // this stack, and the stack is exclusively borrowed.
            let dst = unsafe {
                core::slice::from_raw_parts_mut((self.words.as_mut_ptr() as *mut u8).add(offset), len)
            };
            dst.copy_from_slice(bytes);
        }

        let arg_ptr = if len > 0 { args_addr } else { 0 };
        self.words[args_index - 2] = len as u64;
        self.words[args_index - 1] = arg_ptr;

        let ret_index = args_index - 3;
        self.words[ret_index] = FALLBACK_EXIT as usize as u64;

        let slot = ContextSlot(ret_index - CONTEXT_WORDS);
        let mut ctx = Context::initial(0, self.addr_of(ret_index));
        ctx.rdi = len as u64;
        ctx.rsi = arg_ptr;
        *self.context_mut(slot) = ctx;

        log_trace!(Trace::STACK, "stack ret @ {:#x}, context @ {:#x}", self.addr_of(ret_index), self.addr_of(slot.0));
        Ok(slot)
    }

    fn check_slot(&self, slot: ContextSlot) {
        if slot.0 + CONTEXT_WORDS > STACK_WORDS {
            panic!("stack: context slot {} outside the stack", slot.0);
        }
    }

    pub fn context(&self, slot: ContextSlot) -> &Context {
        self.check_slot(slot);
        // SAFETY: the slot lies inside `words` (checked above); `Context` is
        // `repr(C)` of u64 fields, so word alignment suffices and every bit
        // pattern is valid.
        unsafe { &*(self.words.as_ptr().add(slot.0) as *const Context) }
    }

    pub fn context_mut(&mut self, slot: ContextSlot) -> &mut Context {
        self.check_slot(slot);
        // SAFETY: as in `context`, with the stack exclusively borrowed.
        unsafe { &mut *(self.words.as_mut_ptr().add(slot.0) as *mut Context) }
    }

    /// Address of the saved context; the interrupt exit path loads this
    /// into `rsp` before popping the registers.
    pub fn context_addr(&self, slot: ContextSlot) -> u64 {
        self.addr_of(slot.0)
    }

    /// Locate the context slot that starts at `addr`, if it is inside this
    /// stack.
    pub fn slot_at(&self, addr: u64) -> Option<ContextSlot> {
        if addr < self.base() || addr + SZ_CONTEXT as u64 > self.top() || addr % 8 != 0 {
            return None;
        }
        Some(ContextSlot(self.index_of(addr)))
    }

    /// Dump the top `limit` words (all of them if 0), two per line, eliding
    /// runs of identical lines.
    pub fn dump(&self, msg: &str, limit: usize) {
        let mut words = if limit == 0 || limit > STACK_WORDS { STACK_WORDS } else { limit };
        words = (words + 1) & !1;
        let start = STACK_WORDS - words;

        log_info!("*** stack ({})", msg);
        let mut previous: Option<(u64, u64)> = None;
        let mut eliding = false;
        for index in (start..STACK_WORDS).step_by(2) {
            let pair = (self.words[index], self.words[index + 1]);
            if previous == Some(pair) {
                eliding = true;
                continue;
            }
            let mut chars = [b'.'; 16];
            for (i, byte) in pair.0.to_le_bytes().iter().chain(pair.1.to_le_bytes().iter()).enumerate() {
                if (b' '..0x7f).contains(byte) {
                    chars[i] = *byte;
                }
            }
            log_info!(
                "{:016x}{}  {:016x}  {:016x}  {}",
                self.addr_of(index),
                if eliding { '*' } else { ' ' },
                pair.0,
                pair.1,
                core::str::from_utf8(&chars).unwrap_or("")
            );
            eliding = false;
            previous = Some(pair);
        }
    }
}
