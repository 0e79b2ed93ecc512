use bitflags::bitflags;

use crate::log_info;

/// Code segment selector processes run with (second GDT entry).
pub const CODE_SELECTOR: u64 = 0x08;
/// Stack/data segment selector (third GDT entry).
pub const DATA_SELECTOR: u64 = 0x10;

bitflags! {
    /// The RFLAGS bits the kernel cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RFlags: u64 {
        const CARRY = 1 << 0;
        /// Reserved bit, always reads as one.
        const MB1 = 1 << 1;
        const ZERO = 1 << 6;
        const INTERRUPT = 1 << 9;
        const DIRECTION = 1 << 11;
    }
}

/// Flags a new process starts with: interrupts enabled.
pub const DEFAULT_RFLAGS: RFlags = RFlags::MB1.union(RFlags::INTERRUPT);

/// Register snapshot saved on a process's stack at every interrupt or trap.
///
/// The field order is the interrupt entry stub's push order read upward
/// from the final stack pointer: general-purpose registers, then the
/// vector and error code, then the frame the CPU pushes itself. Resuming a
/// process pops it in the same order and finishes with `iretq`.
///
/// System calls pass their code in `rax` and arguments 1..4 in `rdi`,
/// `rsi`, `rdx` and `rcx`; the result goes back in `rax`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub vector: u64,
    pub code: u64,
    // pushed by the hardware
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Size of a saved context in bytes.
pub const SZ_CONTEXT: usize = core::mem::size_of::<Context>();

const _: () = assert!(SZ_CONTEXT % 16 == 0);

impl Context {
    /// Initial register state for a process entering at `entry` with its
    /// stack pointer at `rsp`.
    pub fn initial(entry: u64, rsp: u64) -> Self {
        Context {
            rip: entry,
            cs: CODE_SELECTOR,
            rflags: DEFAULT_RFLAGS.bits(),
            rsp,
            ss: DATA_SELECTOR,
            ..Context::default()
        }
    }

    /// System call argument `n` (1-based).
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            1 => self.rdi,
            2 => self.rsi,
            3 => self.rdx,
            4 => self.rcx,
            _ => 0,
        }
    }

    pub fn set_arg(&mut self, n: usize, value: u64) {
        match n {
            1 => self.rdi = value,
            2 => self.rsi = value,
            3 => self.rdx = value,
            4 => self.rcx = value,
            _ => {}
        }
    }

    /// The system call code the process trapped with.
    pub fn syscall_code(&self) -> u64 {
        self.rax
    }

    pub fn set_return(&mut self, value: u64) {
        self.rax = value;
    }

    pub fn dump(&self, msg: &str) {
        log_info!("{} cs {:04x} ss {:04x} rflags {:08x}", msg, self.cs, self.ss, self.rflags);
        log_info!("  rdi {:016x} rsi {:016x} rbp {:016x} rsp {:016x}", self.rdi, self.rsi, self.rbp, self.rsp);
        log_info!("  rbx {:016x} rdx {:016x} rcx {:016x} rax {:016x}", self.rbx, self.rdx, self.rcx, self.rax);
        log_info!("  vec {:08x} cod {:08x} rip {:016x}", self.vector, self.code, self.rip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn layout_matches_entry_stub() {
        assert_eq!(SZ_CONTEXT, 22 * 8);
        assert_eq!(offset_of!(Context, r15), 0);
        assert_eq!(offset_of!(Context, rax), 14 * 8);
        assert_eq!(offset_of!(Context, vector), 15 * 8);
        assert_eq!(offset_of!(Context, rip), 17 * 8);
        assert_eq!(offset_of!(Context, ss), 21 * 8);
    }

    #[test]
    fn initial_context_enables_interrupts() {
        let ctx = Context::initial(0x1000, 0x2000);
        assert_eq!(ctx.rip, 0x1000);
        assert_eq!(ctx.rsp, 0x2000);
        assert!(RFlags::from_bits_truncate(ctx.rflags).contains(RFlags::INTERRUPT | RFlags::MB1));
        assert_eq!(ctx.rax, 0);
    }

    #[test]
    fn syscall_arguments_map_to_registers() {
        let mut ctx = Context::default();
        ctx.set_arg(1, 11);
        ctx.set_arg(4, 44);
        assert_eq!(ctx.rdi, 11);
        assert_eq!(ctx.arg(4), 44);
        assert_eq!(ctx.arg(5), 0);
    }
}
