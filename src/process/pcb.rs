use core::fmt;

use crate::pool::{Clear, Slot};
use super::stack::ContextSlot;

/// Unique process identifier. Never 0 for a live process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum State {
    #[default]
    Unused = 0,
    New,
    Ready,
    Running,
    Sleeping,
    Waiting,
    Blocked,
    Zombie,
    Killed,
}

impl State {
    pub const COUNT: usize = 9;

    pub const ALL: [State; State::COUNT] = [
        State::Unused,
        State::New,
        State::Ready,
        State::Running,
        State::Sleeping,
        State::Waiting,
        State::Blocked,
        State::Zombie,
        State::Killed,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            State::Unused => "Unused",
            State::New => "New",
            State::Ready => "Ready",
            State::Running => "Running",
            State::Sleeping => "Sleeping",
            State::Waiting => "Waiting",
            State::Blocked => "Blocked",
            State::Zombie => "Zombie",
            State::Killed => "Killed",
        }
    }

    pub const fn short_name(self) -> &'static str {
        match self {
            State::Unused => "Unu",
            State::New => "New",
            State::Ready => "Rdy",
            State::Running => "Run",
            State::Sleeping => "Slp",
            State::Waiting => "Wtg",
            State::Blocked => "Blk",
            State::Zombie => "Zom",
            State::Killed => "Kil",
        }
    }
}

/// Scheduling band. Lower numeric value runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Priority {
    System = 0,
    #[default]
    User = 1,
    Deferred = 2,
}

impl Priority {
    pub const COUNT: usize = 3;

    pub const ALL: [Priority; Priority::COUNT] =
        [Priority::System, Priority::User, Priority::Deferred];

    pub fn from_raw(raw: u64) -> Option<Priority> {
        match raw {
            0 => Some(Priority::System),
            1 => Some(Priority::User),
            2 => Some(Priority::Deferred),
            _ => None,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Priority::System => "System",
            Priority::User => "User",
            Priority::Deferred => "Deferred",
        }
    }
}

/// Process control block.
#[derive(Debug, Clone, Default)]
pub struct Pcb {
    pub pid: Pid,
    pub ppid: Pid,
    pub state: State,
    pub priority: Priority,
    /// Clock ticks left before preemption.
    pub quantum: u8,
    /// Exit status, valid once the process is a Zombie.
    pub status: i32,
    /// Absolute tick at which a sleeping process becomes ready.
    pub wakeup: u32,
    /// The process's stack in the stack pool.
    pub stack: Option<Slot>,
    /// Where the saved context lives inside that stack.
    pub context: Option<ContextSlot>,
}

impl Clear for Pcb {
    fn clear(&mut self) {
        *self = Pcb::default();
    }
}

impl fmt::Display for Pcb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "pids {}/{} state {} prio {} quant {} xit {} wake {:08x}",
            self.pid,
            self.ppid,
            self.state.name(),
            self.priority.name(),
            self.quantum,
            self.status,
            self.wakeup
        )?;
        match (self.stack, self.context) {
            (Some(stack), Some(ctx)) => write!(f, " stack #{} ctx @{:#x}", stack.0, ctx.word_offset() * 8),
            _ => write!(f, " stack -"),
        }
    }
}
