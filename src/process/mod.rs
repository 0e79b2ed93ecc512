//! Process table, PCB management and the exit/reap protocol.

pub mod context;
pub mod pcb;
pub mod stack;

use crate::config::{Trace, MAX_PROCS, PID_INIT};
use crate::kernel::Kernel;
use crate::pool::Slot;
use crate::syscalls::user;
use crate::{log_info, log_trace};

pub use context::Context;
pub use pcb::{Pcb, Pid, Priority, State};
pub use stack::{ContextSlot, Stack};

/// Fixed-size table of active processes, indexed arbitrarily.
pub struct ProcessTable {
    slots: [Option<Slot>; MAX_PROCS],
    count: usize,
}

impl ProcessTable {
    pub const fn new() -> Self {
        ProcessTable { slots: [None; MAX_PROCS], count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= MAX_PROCS
    }

    /// PCB handle in table slot `index`.
    pub fn entry(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied().flatten()
    }

    /// Occupied entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = Slot> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }

    /// Record `pcb` in the first empty slot; `None` if the table is full.
    fn insert(&mut self, pcb: Slot) -> Option<usize> {
        let index = self.slots.iter().position(|s| s.is_none())?;
        self.slots[index] = Some(pcb);
        self.count += 1;
        Some(index)
    }

    fn remove(&mut self, pcb: Slot) -> Option<usize> {
        let index = self.slots.iter().position(|s| *s == Some(pcb))?;
        self.slots[index] = None;
        self.count -= 1;
        Some(index)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of active processes in each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessCounts {
    pub by_state: [u32; State::COUNT],
    /// Empty process table slots.
    pub unused: usize,
}

impl ProcessCounts {
    pub fn of(&self, state: State) -> u32 {
        self.by_state[state as usize]
    }
}

impl Kernel {
    /// Claim a clean PCB. Running out of PCB memory is fatal.
    pub fn alloc_pcb(&mut self) -> Slot {
        match self.pcbs.alloc() {
            Ok(slot) => {
                log_trace!(Trace::PCB, "pcb alloc -> #{}", slot.0);
                slot
            }
            Err(e) => self.fault(format_args!("PCB allocation failed: {}", e)),
        }
    }

    pub fn free_pcb(&mut self, pcb: Slot) {
        log_trace!(Trace::PCB, "pcb free #{}", pcb.0);
        self.pcbs.free(pcb);
    }

    pub fn alloc_stack(&mut self) -> Slot {
        match self.stacks.alloc() {
            Ok(slot) => slot,
            Err(e) => self.fault(format_args!("stack allocation failed: {}", e)),
        }
    }

    pub fn free_stack(&mut self, stack: Slot) {
        self.stacks.free(stack);
    }

    /// The PCB behind a handle the kernel holds. A dangling handle is a
    /// corrupted kernel.
    pub fn pcb(&self, slot: Slot) -> &Pcb {
        match self.pcbs.get(slot) {
            Some(pcb) => pcb,
            None => self.fault(format_args!("handle #{} names a free PCB", slot.0)),
        }
    }

    pub fn pcb_mut(&mut self, slot: Slot) -> &mut Pcb {
        if !self.pcbs.is_allocated(slot) {
            self.fault(format_args!("handle #{} names a free PCB", slot.0));
        }
        match self.pcbs.get_mut(slot) {
            Some(pcb) => pcb,
            None => unreachable!(),
        }
    }

    /// Locate an active process by PID.
    pub fn find_by_pid(&self, pid: Pid) -> Option<Slot> {
        let found = self.table.iter().find(|slot| self.pcbs.get(*slot).map(|p| p.pid) == Some(pid));
        log_trace!(Trace::PCB, "pcb find {} -> {:?}", pid, found);
        found
    }

    pub fn process(&self, pid: Pid) -> Option<&Pcb> {
        self.find_by_pid(pid).and_then(|slot| self.pcbs.get(slot))
    }

    pub fn process_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        let slot = self.find_by_pid(pid)?;
        self.pcbs.get_mut(slot)
    }

    /// Saved registers of a process.
    pub fn context(&self, pcb: Slot) -> &Context {
        let (stack, ctx) = match self.pcb(pcb) {
            Pcb { stack: Some(stack), context: Some(ctx), .. } => (*stack, *ctx),
            p => self.fault(format_args!("pid {} has no context", p.pid)),
        };
        match self.stacks.get(stack) {
            Some(s) => s.context(ctx),
            None => self.fault(format_args!("pid {} owns a free stack", self.pcb(pcb).pid)),
        }
    }

    pub fn context_mut(&mut self, pcb: Slot) -> &mut Context {
        let (stack, ctx) = match self.pcb(pcb) {
            Pcb { stack: Some(stack), context: Some(ctx), .. } => (*stack, *ctx),
            p => self.fault(format_args!("pid {} has no context", p.pid)),
        };
        if !self.stacks.is_allocated(stack) {
            self.fault(format_args!("pid {} owns a free stack", self.pcb(pcb).pid));
        }
        match self.stacks.get_mut(stack) {
            Some(s) => s.context_mut(ctx),
            None => unreachable!(),
        }
    }

    pub fn stack(&self, pcb: Slot) -> Option<&Stack> {
        self.pcb(pcb).stack.and_then(|s| self.stacks.get(s))
    }

    /// Add a process to the active table. The caller has already checked
    /// for room, so a full table is a consistency failure.
    pub fn register_process(&mut self, pcb: Slot) {
        if self.table.insert(pcb).is_none() {
            self.fault(format_args!("no empty slot in non-full process table"));
        }
    }

    /// Drop a process from the table and release its stack and PCB.
    pub fn deregister_process(&mut self, pcb: Slot) {
        log_trace!(Trace::PCB, "pcb cleanup #{} pid {}", pcb.0, self.pcb(pcb).pid);

        if self.table.remove(pcb).is_none() {
            self.fault(format_args!("pid {} not in the process table", self.pcb(pcb).pid));
        }
        if let Some(stack) = self.pcb(pcb).stack {
            self.free_stack(stack);
        }
        if self.current == Some(pcb) {
            self.current = None;
        }
        self.free_pcb(pcb);
    }

    /// True if `waiter`, blocked in `waitpid`, is waiting for `child`.
    fn wait_accepts(&self, waiter: Slot, child: Pid) -> bool {
        let target = self.context(waiter).arg(1) as u32;
        target == 0 || target == child.0
    }

    /// Hand a Zombie's exit status to a Waiting process, make the waiter
    /// runnable again, and reclaim the Zombie.
    fn deliver_exit(&mut self, waiter: Slot, zombie: Slot) {
        let (pid, status) = {
            let z = self.pcb(zombie);
            (z.pid, z.status)
        };
        log_trace!(Trace::EXIT, "exit: {} given to {}", pid, self.pcb(waiter).pid);

        let ctx = self.context_mut(waiter);
        ctx.set_return(pid.0 as u64);
        let status_ptr = ctx.arg(2);
        if status_ptr != 0 {
            // SAFETY: processes share the kernel's address space; the waiter
            // supplied this pointer to waitpid.
            unsafe { user::store_i32(status_ptr, status) };
        }

        self.schedule(waiter);
        self.deregister_process(zombie);
    }

    /// Terminate `victim`: make it a Zombie, reparent its children to init
    /// and hand exit statuses to anyone already waiting for them.
    ///
    /// Never picks a new current process; callers dispatch if they need to.
    pub fn perform_exit(&mut self, victim: Slot) {
        let (vpid, vppid) = {
            let v = self.pcb_mut(victim);
            v.state = State::Zombie;
            (v.pid, v.ppid)
        };
        log_trace!(Trace::EXIT, "exit: victim {} ppid {}", vpid, vppid);

        if self.user_shell == Some(vpid) {
            self.user_shell = None;
        }

        // Find the parent and reparent the children in one pass.
        let mut parent = None;
        let mut zombie = None;
        for index in 0..MAX_PROCS {
            let Some(slot) = self.table.entry(index) else {
                continue;
            };
            let curr = self.pcb_mut(slot);
            if curr.pid == vppid {
                parent = Some(slot);
            } else if curr.ppid == vpid {
                curr.ppid = Pid(PID_INIT);
                if curr.state == State::Zombie {
                    // any one will do; init collects the rest as it loops
                    zombie = Some(slot);
                }
            }
        }

        let Some(parent) = parent else {
            self.fault(format_args!("pid {} has no parent (ppid {})", vpid, vppid));
        };

        if let Some(zombie) = zombie {
            let Some(init) = self.find_by_pid(Pid(PID_INIT)) else {
                self.fault(format_args!("orphan zombie {} but no init", self.pcb(zombie).pid));
            };
            let zpid = self.pcb(zombie).pid;
            if self.pcb(init).state == State::Waiting && self.wait_accepts(init, zpid) {
                self.deliver_exit(init, zombie);
            }
        }

        if self.pcb(parent).state == State::Waiting && self.wait_accepts(parent, vpid) {
            self.deliver_exit(parent, victim);
        }
        // otherwise the victim stays a Zombie in the table until collected
    }

    /// Count active processes by state.
    pub fn count_by_state(&self) -> ProcessCounts {
        let mut counts = ProcessCounts::default();
        for index in 0..MAX_PROCS {
            match self.table.entry(index).and_then(|slot| self.pcbs.get(slot)) {
                Some(pcb) => counts.by_state[pcb.state as usize] += 1,
                None => counts.unused += 1,
            }
        }
        counts
    }

    pub fn pcb_dump(&self, msg: &str, pcb: Slot) {
        match self.pcbs.get(pcb) {
            Some(p) => {
                log_info!("{} #{}: {}", msg, pcb.0, p);
            }
            None => {
                log_info!("{} #{}: free", msg, pcb.0);
            }
        }
    }

    /// Dump the process table; `all` adds scheduling and context details.
    pub fn ptable_dump(&self, msg: &str, all: bool) {
        log_info!("{} ({} active)", msg, self.table.len());
        let mut used = 0;
        for index in 0..MAX_PROCS {
            let Some(slot) = self.table.entry(index) else {
                continue;
            };
            used += 1;
            let Some(p) = self.pcbs.get(slot) else {
                log_info!(" #{}: dangling PCB handle {}", index, slot.0);
                continue;
            };
            if all {
                let ctx = self.context(slot);
                log_info!(
                    " #{}: {}/{} {} wk {:08x} RSP {:016x} RIP {:016x}",
                    index, p.pid, p.ppid, p.state.name(), p.wakeup, ctx.rsp, ctx.rip
                );
            } else {
                log_info!(" #{}: {}/{} {}", index, p.pid, p.ppid, p.state.short_name());
            }
        }
        if used != self.table.len() {
            log_info!("Table count {} but {} slots in use???", self.table.len(), used);
        }
    }

    /// Dump the saved context of every active process.
    pub fn ctx_dump_all(&self, msg: &str) {
        log_info!("{} {} active processes", msg, self.table.len());
        for (n, slot) in self.table.iter().enumerate() {
            if self.pcb(slot).state != State::Unused {
                self.context(slot).dump(&alloc::format!("{:2} pid {}:", n + 1, self.pcb(slot).pid));
            }
        }
    }
}
