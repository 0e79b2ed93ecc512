//! The kernel's state and its boot sequence.
//!
//! Everything the process core touches lives in one `Kernel` value, and
//! every operation takes `&mut Kernel`. On bare metal the value sits in the
//! `KERNEL` global, which only the interrupt entry path locks.

use alloc::boxed::Box;
use core::fmt;

use crate::clock::Clock;
use crate::config::{self, Trace, MAX_ARG_LEN, MAX_PROCS, PID_IDLE, PID_INIT, QUANTUM_DEFAULT};
use crate::drivers::CharDevice;
use crate::error::{SysError, SysResult};
use crate::pool::{Pool, Slot};
use crate::process::stack::SZ_STACK;
use crate::process::{Pcb, Pid, Priority, ProcessTable, Stack, State};
use crate::queue::{ascending, Queue};
use crate::scheduler::ReadyQueues;
use crate::{log_error, log_info, log_trace, log_warn};

pub struct Kernel {
    pub(crate) pcbs: Pool<Pcb>,
    pub(crate) stacks: Pool<Stack>,
    pub(crate) table: ProcessTable,
    pub(crate) ready: ReadyQueues,
    /// Sleeping processes keyed by wakeup time.
    pub(crate) sleep_queue: Queue<Pid>,
    /// Processes blocked reading the serial line.
    pub(crate) sio_readers: Queue<Pid>,
    pub(crate) current: Option<Slot>,
    pub(crate) user_shell: Option<Pid>,
    /// Clock ticks since boot.
    pub(crate) system_time: u32,
    pub(crate) next_pid: u32,
    pub(crate) clock: Clock,
    pub(crate) console: Box<dyn CharDevice + Send>,
    pub(crate) serial: Box<dyn CharDevice + Send>,
}

impl Kernel {
    pub fn new(console: Box<dyn CharDevice + Send>, serial: Box<dyn CharDevice + Send>) -> Self {
        Kernel {
            pcbs: Pool::new(Pool::<Pcb>::units_per_slice(config::SLICE_SIZE)),
            stacks: Pool::new(1),
            table: ProcessTable::new(),
            ready: ReadyQueues::new(),
            sleep_queue: Queue::new(Some(ascending)),
            sio_readers: Queue::fifo(),
            current: None,
            user_shell: None,
            system_time: 0,
            next_pid: PID_IDLE + 1,
            clock: Clock::new(),
            console,
            serial,
        }
    }

    /// Build a process in state New and enter it in the table. The caller
    /// schedules it.
    pub fn create_process(
        &mut self,
        pid: Pid,
        ppid: Pid,
        priority: Priority,
        entry: u64,
        arg_len: usize,
        args: Option<&[u8]>,
    ) -> SysResult<Slot> {
        if self.table.is_full() {
            return Err(SysError::NoProcs);
        }

        let pcb = self.alloc_pcb();
        let stack = self.alloc_stack();
        let setup = match self.stacks.get_mut(stack) {
            Some(s) => s.setup(arg_len, args),
            None => self.fault(format_args!("fresh stack #{} is not allocated", stack.0)),
        };
        let context = match setup {
            Ok(context) => context,
            Err(e) => {
                log_warn!("process {}: stack setup failed: {}", pid, e);
                self.free_stack(stack);
                self.free_pcb(pcb);
                return Err(SysError::BadParam);
            }
        };

        *self.pcb_mut(pcb) = Pcb {
            pid,
            ppid,
            state: State::New,
            priority,
            quantum: QUANTUM_DEFAULT,
            stack: Some(stack),
            context: Some(context),
            ..Pcb::default()
        };
        self.context_mut(pcb).rip = entry;
        self.register_process(pcb);

        log_trace!(Trace::SPAWN, "created pid {} ppid {} entry {:#x}", pid, ppid, entry);
        Ok(pcb)
    }

    /// Create init and idle and make init the current process.
    pub fn boot(&mut self, init_entry: u64, idle_entry: u64) {
        let init_args: &[u8] = b"init";
        let init = match self.create_process(
            Pid(PID_INIT),
            Pid(PID_INIT),
            Priority::System,
            init_entry,
            init_args.len(),
            Some(init_args),
        ) {
            Ok(slot) => slot,
            Err(e) => self.fault(format_args!("cannot create init: {}", e)),
        };

        let idle_args: &[u8] = b"idle";
        let idle = match self.create_process(
            Pid(PID_IDLE),
            Pid(PID_INIT),
            Priority::Deferred,
            idle_entry,
            idle_args.len(),
            Some(idle_args),
        ) {
            Ok(slot) => slot,
            Err(e) => self.fault(format_args!("cannot create idle: {}", e)),
        };

        self.schedule(init);
        self.schedule(idle);
        self.dispatch();
        log_info!("Process core booted: init pid {}, idle pid {}", PID_INIT, PID_IDLE);
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.current.and_then(|slot| self.pcbs.get(slot)).map(|p| p.pid)
    }

    pub fn system_time(&self) -> u32 {
        self.system_time
    }

    pub fn user_shell(&self) -> Option<Pid> {
        self.user_shell
    }

    pub fn process_count(&self) -> usize {
        self.table.len()
    }

    /// Record where the interrupt entry path saved the current process's
    /// registers.
    pub fn save_context(&mut self, addr: u64) {
        let Some(current) = self.current else {
            return;
        };
        let slot = self.stack(current).and_then(|s| s.slot_at(addr));
        match slot {
            Some(slot) => self.pcb_mut(current).context = Some(slot),
            None => self.fault(format_args!(
                "pid {} trapped with context {:#x} outside its stack",
                self.pcb(current).pid,
                addr
            )),
        }
    }

    /// Address of the context to resume, if there is a current process.
    pub fn resume_context(&self) -> Option<u64> {
        let current = self.current?;
        let p = self.pcb(current);
        let stack = self.stacks.get(p.stack?)?;
        Some(stack.context_addr(p.context?))
    }

    /// Log what went wrong and the state around it, then panic.
    pub fn fault(&self, args: fmt::Arguments) -> ! {
        log_error!("*** kernel fault: {}", args);
        if let Some(current) = self.current {
            if self.pcbs.is_allocated(current) {
                self.pcb_dump("current", current);
            }
        }
        self.ptable_dump("process table", false);
        let [sys, usr, def] = self.ready_lengths();
        log_error!(
            "queues: ready {}/{}/{} sleep {} sio {}",
            sys,
            usr,
            def,
            self.sleep_queue.len(),
            self.sio_readers.len()
        );
        panic!("{}", args);
    }

    /// Configuration and pool usage.
    pub fn report(&self) {
        log_info!("Configuration:");
        log_info!("  {} procs max, quantum {} ticks, clock {} Hz", MAX_PROCS, QUANTUM_DEFAULT, config::CLOCK_FREQUENCY);
        log_info!("  stacks {} bytes, args {} bytes max, trace {:#06x}", SZ_STACK, MAX_ARG_LEN, config::TRACE.bits());
        log_info!(
            "  PCB pool {}/{} in use, stack pool {}/{} in use",
            self.pcbs.in_use(),
            self.pcbs.capacity(),
            self.stacks.in_use(),
            self.stacks.capacity()
        );
        log_info!(
            "  time {}, {} processes, user shell {:?}",
            self.system_time,
            self.table.len(),
            self.user_shell.map(|p| p.0)
        );
    }

    /// Dump every active process's stack.
    pub fn stack_dump_all(&self, words: usize) {
        for slot in self.table.iter() {
            if let Some(stack) = self.stack(slot) {
                stack.dump(&alloc::format!("pid {}", self.pcb(slot).pid), words);
            }
        }
    }
}

#[cfg(target_os = "none")]
lazy_static::lazy_static! {
    pub static ref KERNEL: spin::Mutex<Option<Kernel>> = spin::Mutex::new(None);
}

/// Run `f` on the global kernel, if it has been installed.
#[cfg(target_os = "none")]
pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
    KERNEL.lock().as_mut().map(f)
}
