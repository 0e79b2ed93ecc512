//! Compile-time kernel configuration.

use bitflags::bitflags;

/// Upper bound on the number of simultaneous processes.
pub const MAX_PROCS: usize = 25;

/// Maximum number of bytes in an argument buffer handed to `spawn`.
pub const MAX_ARG_LEN: usize = 1024;

/// Clock ticks a process runs before it is preempted.
pub const QUANTUM_DEFAULT: u8 = 3;

/// Timer interrupts per second (10 ms per tick).
pub const CLOCK_FREQUENCY: u32 = 100;

pub const PAGE_SIZE: usize = 4096;

/// Granularity of pool growth, in bytes.
pub const SLICE_SIZE: usize = 1024;

/// Each process stack is this many pages (16 KiB).
pub const STACK_PAGES: usize = 4;

/// PID of the root process; orphans are reparented to it.
pub const PID_INIT: u32 = 1;

/// PID of the idle process created at boot.
pub const PID_IDLE: u32 = 2;

/// Exit status recorded for processes whose main routine returns.
pub const FAKE_EXIT: i32 = 0xbad;

/// Seconds between status line reports from the clock; 0 disables them.
pub const STATUS_INTERVAL_SECS: u32 = 0;

bitflags! {
    /// Selects which kernel paths emit `log_trace!` output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Trace: u32 {
        const PCB      = 0x0001;
        const STACK    = 0x0002;
        const QUEUE    = 0x0004;
        const SCHED    = 0x0008;
        const SYSCALLS = 0x0010;
        const SYSRETS  = 0x0020;
        const EXIT     = 0x0040;
        const DISPATCH = 0x0080;
        const CONSOLE  = 0x0100;
        const SPAWN    = 0x0800;
        const SIO      = 0x1000;
    }
}

/// Trace mask compiled into this kernel.
pub const TRACE: Trace = Trace::empty();

/// Convert milliseconds to clock ticks.
pub const fn ms_to_ticks(ms: u32) -> u32 {
    ((ms as u64 * CLOCK_FREQUENCY as u64) / 1000) as u32
}

/// Convert seconds to clock ticks.
pub const fn sec_to_ticks(secs: u32) -> u32 {
    secs * CLOCK_FREQUENCY
}
