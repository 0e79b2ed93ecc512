//! System call dispatch and handlers.
//!
//! A process traps through vector 0x80 with the call code in `rax` and up
//! to four arguments in `rdi`, `rsi`, `rdx` and `rcx`. The result (a count,
//! a PID or a negative `SysError` code) goes back in its saved `rax`.

pub mod user;

use crate::config::{ms_to_ticks, Trace, MAX_ARG_LEN, PID_IDLE, PID_INIT};
use crate::error::{SysError, SysResult};
use crate::kernel::Kernel;
use crate::pool::Slot;
use crate::process::{Pid, Priority, State};
use crate::{log_info, log_trace, log_warn};

/// System call codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Syscall {
    Exit = 0,
    Spawn = 1,
    Read = 2,
    Write = 3,
    Sleep = 4,
    Kill = 5,
    Waitpid = 6,
    Ushell = 7,
}

/// Reserved code that no handler answers; used to exercise the bad-code path.
pub const SYS_BOGUS: u64 = 0xbad;

impl TryFrom<u64> for Syscall {
    type Error = u64;

    fn try_from(code: u64) -> Result<Self, u64> {
        Ok(match code {
            0 => Syscall::Exit,
            1 => Syscall::Spawn,
            2 => Syscall::Read,
            3 => Syscall::Write,
            4 => Syscall::Sleep,
            5 => Syscall::Kill,
            6 => Syscall::Waitpid,
            7 => Syscall::Ushell,
            other => return Err(other),
        })
    }
}

/// I/O channels for `read` and `write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Console = 0,
    Serial = 1,
}

impl Channel {
    pub fn from_raw(raw: u64) -> SysResult<Channel> {
        match raw {
            0 => Ok(Channel::Console),
            1 => Ok(Channel::Serial),
            _ => Err(SysError::BadChannel),
        }
    }
}

/// How a call left its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    /// Still runnable; this goes in its `rax`.
    Value(u64),
    /// Blocked or gone. Whoever resumes it sets `rax`.
    Pending,
}

/// Arguments 1..4 of the trapping process.
#[derive(Debug, Clone, Copy)]
struct Args([u64; 4]);

impl Args {
    fn get(&self, n: usize) -> u64 {
        self.0[n - 1]
    }

    /// Argument `n` as a 32-bit value; `err` if the register holds more.
    fn get_u32(&self, n: usize, err: SysError) -> SysResult<u32> {
        u32::try_from(self.get(n)).map_err(|_| err)
    }
}

impl Kernel {
    /// Service the system call the current process just trapped with.
    pub fn syscall(&mut self) {
        let Some(caller) = self.current else {
            self.fault(format_args!("system call with no current process"));
        };
        let (code, args) = {
            let ctx = self.context(caller);
            (ctx.syscall_code(), Args([ctx.arg(1), ctx.arg(2), ctx.arg(3), ctx.arg(4)]))
        };
        let pid = self.pcb(caller).pid;

        let result = match Syscall::try_from(code) {
            Ok(call) => {
                log_trace!(Trace::SYSCALLS, "--> pid {} {:?} {:x?}", pid, call, args.0);
                match call {
                    Syscall::Exit => self.sys_exit(caller, args.get(1) as i32),
                    Syscall::Spawn => self.sys_spawn(caller, args),
                    Syscall::Read => self.sys_read(caller, args),
                    Syscall::Write => self.sys_write(args),
                    Syscall::Sleep => args
                        .get_u32(1, SysError::BadParam)
                        .and_then(|ms| self.sys_sleep(caller, ms)),
                    Syscall::Kill => args
                        .get_u32(1, SysError::BadPid)
                        .and_then(|pid| self.sys_kill(caller, pid)),
                    Syscall::Waitpid => self.sys_waitpid(caller, args),
                    Syscall::Ushell => self.sys_ushell(caller),
                }
            }
            Err(code) => {
                log_warn!("pid {}: bad syscall code {:#x}", pid, code);
                self.sys_exit(caller, SysError::BadSyscall.code())
            }
        };

        match result {
            Ok(Reply::Value(value)) => {
                log_trace!(Trace::SYSRETS, "<-- pid {} ret {:#x}", pid, value);
                self.context_mut(caller).set_return(value);
            }
            Err(e) => {
                log_trace!(Trace::SYSRETS, "<-- pid {} err {}", pid, e);
                self.context_mut(caller).set_return(e.as_reg());
            }
            Ok(Reply::Pending) => {
                log_trace!(Trace::SYSRETS, "<-- pid {} pending", pid);
            }
        }
    }

    fn sys_exit(&mut self, caller: Slot, status: i32) -> SysResult<Reply> {
        let pid = self.pcb(caller).pid;
        if pid.0 == PID_INIT || pid.0 == PID_IDLE {
            self.fault(format_args!("pid {} exited with status {}", pid, status));
        }
        self.pcb_mut(caller).status = status;
        self.perform_exit(caller);
        self.dispatch();
        Ok(Reply::Pending)
    }

    /// spawn(entry, priority, arg_len, arg_buffer)
    fn sys_spawn(&mut self, caller: Slot, args: Args) -> SysResult<Reply> {
        let (entry, raw_priority, len, buffer) = (args.get(1), args.get(2), args.get(3) as usize, args.get(4));

        if self.table.is_full() {
            return Err(SysError::NoProcs);
        }

        // A child may not outrank its parent.
        let parent = self.pcb(caller);
        let ppid = parent.pid;
        let priority = match Priority::from_raw(raw_priority) {
            Some(p) if p >= parent.priority => p,
            _ => return Err(SysError::BadPriority),
        };

        if len > MAX_ARG_LEN {
            return Err(SysError::BadParam);
        }
        let arguments = if buffer == 0 {
            None
        } else {
            // SAFETY: non-null and at most MAX_ARG_LEN bytes of the shared
            // address space, as supplied by the caller.
            Some(unsafe { user::bytes(buffer, len) })
        };

        let pid = Pid(self.next_pid);
        let child = self.create_process(pid, ppid, priority, entry, len, arguments)?;
        self.next_pid += 1;

        log_trace!(Trace::SPAWN, "spawn: pid {} -> child {} prio {}", ppid, pid, priority.name());
        self.schedule(child);
        Ok(Reply::Value(pid.0 as u64))
    }

    /// read(channel, buffer, length)
    fn sys_read(&mut self, caller: Slot, args: Args) -> SysResult<Reply> {
        let channel = Channel::from_raw(args.get(1))?;
        let (buffer, len) = (args.get(2), args.get(3) as usize);
        if len == 0 {
            return Ok(Reply::Value(0));
        }
        if buffer == 0 {
            return Err(SysError::BadParam);
        }

        match channel {
            Channel::Console => {
                if self.console.available() == 0 {
                    return Err(SysError::NoData);
                }
                // SAFETY: non-null, `len` bytes owned by the caller.
                let n = self.console.read(unsafe { user::bytes_mut(buffer, len) });
                Ok(Reply::Value(n as u64))
            }
            Channel::Serial => {
                if self.serial.available() > 0 {
                    // SAFETY: as above.
                    let n = self.serial.read(unsafe { user::bytes_mut(buffer, len) });
                    return Ok(Reply::Value(n as u64));
                }
                let pid = self.pcb(caller).pid;
                log_trace!(Trace::SIO, "sio: pid {} blocks for input", pid);
                self.pcb_mut(caller).state = State::Blocked;
                self.sio_readers.insert(pid, 0);
                self.dispatch();
                Ok(Reply::Pending)
            }
        }
    }

    /// write(channel, buffer, length)
    fn sys_write(&mut self, args: Args) -> SysResult<Reply> {
        let channel = Channel::from_raw(args.get(1))?;
        let (buffer, len) = (args.get(2), args.get(3) as usize);
        if len == 0 {
            return Ok(Reply::Value(0));
        }
        if buffer == 0 {
            return Err(SysError::BadParam);
        }

        // SAFETY: non-null, `len` readable bytes supplied by the caller.
        let data = unsafe { user::bytes(buffer, len) };
        match channel {
            Channel::Console => self.console.write(data),
            Channel::Serial => self.serial.write(data),
        }
        Ok(Reply::Value(len as u64))
    }

    /// sleep(ms); 0 just yields.
    fn sys_sleep(&mut self, caller: Slot, ms: u32) -> SysResult<Reply> {
        if ms == 0 {
            self.schedule(caller);
        } else {
            let pid = self.pcb(caller).pid;
            self.pcb_mut(caller).state = State::Sleeping;
            // the user shell waits for a console event instead
            if self.user_shell != Some(pid) {
                let wakeup = self.system_time.wrapping_add(ms_to_ticks(ms));
                self.pcb_mut(caller).wakeup = wakeup;
                self.sleep_queue.insert(pid, wakeup);
            }
        }
        self.dispatch();
        Ok(Reply::Value(0))
    }

    /// kill(pid); 0 means the caller.
    fn sys_kill(&mut self, caller: Slot, raw: u32) -> SysResult<Reply> {
        let target = if raw == 0 { self.pcb(caller).pid } else { Pid(raw) };
        if target.0 == PID_INIT || target.0 == PID_IDLE {
            return Err(SysError::BadPid);
        }
        let Some(victim) = self.find_by_pid(target) else {
            return Err(SysError::NotFound);
        };

        match self.pcb(victim).state {
            // off the CPU; any queue entry it leaves is dropped later
            State::Ready | State::Sleeping | State::Blocked | State::Waiting => {
                self.pcb_mut(victim).status = SysError::Killed.code();
                self.perform_exit(victim);
                Ok(Reply::Value(0))
            }
            State::Running => {
                self.pcb_mut(victim).status = SysError::Killed.code();
                self.perform_exit(victim);
                self.dispatch();
                Ok(Reply::Pending)
            }
            State::Zombie | State::Killed => Ok(Reply::Value(0)),
            other => self.fault(format_args!("kill: victim {} in state {}", target, other.name())),
        }
    }

    /// waitpid(pid, status_out); pid 0 means any child.
    fn sys_waitpid(&mut self, caller: Slot, args: Args) -> SysResult<Reply> {
        let me = self.pcb(caller).pid;
        let target = Pid(args.get_u32(1, SysError::BadPid)?);
        let status_ptr = args.get(2);

        if target == me {
            return Err(SysError::BadParam);
        }

        let zombie = if target.0 != 0 {
            let Some(child) = self.find_by_pid(target) else {
                return Err(SysError::NotFound);
            };
            if self.pcb(child).ppid != me {
                return Err(SysError::BadPid);
            }
            Some(child).filter(|c| self.pcb(*c).state == State::Zombie)
        } else {
            let mut found = false;
            let mut zombie = None;
            for slot in self.table.iter() {
                let p = self.pcb(slot);
                if p.ppid == me && p.pid != me {
                    found = true;
                    if p.state == State::Zombie {
                        zombie = Some(slot);
                        break;
                    }
                }
            }
            if !found {
                return Err(SysError::NoChildren);
            }
            zombie
        };

        let Some(zombie) = zombie else {
            self.pcb_mut(caller).state = State::Waiting;
            self.dispatch();
            return Ok(Reply::Pending);
        };

        let (pid, status) = {
            let z = self.pcb(zombie);
            (z.pid, z.status)
        };
        if status_ptr != 0 {
            // SAFETY: non-null pointer the caller passed for its status.
            unsafe { user::store_i32(status_ptr, status) };
        }
        self.deregister_process(zombie);
        Ok(Reply::Value(pid.0 as u64))
    }

    fn sys_ushell(&mut self, caller: Slot) -> SysResult<Reply> {
        match self.user_shell {
            Some(shell) => Ok(Reply::Value(shell.0 as u64)),
            None => {
                let pid = self.pcb(caller).pid;
                self.user_shell = Some(pid);
                log_info!("PID {} registered as user shell", pid);
                Ok(Reply::Value(0))
            }
        }
    }

    /// Serial input arrived: hand it to blocked readers in arrival order.
    pub fn serial_input_ready(&mut self) {
        while self.serial.available() > 0 {
            let Some((_, pid)) = self.sio_readers.remove_front() else {
                break;
            };
            let Some(reader) = self.find_by_pid(pid).filter(|r| self.pcb(*r).state == State::Blocked) else {
                log_trace!(Trace::SIO, "sio: dropping stale reader {}", pid);
                continue;
            };

            let (buffer, len) = {
                let ctx = self.context(reader);
                (ctx.arg(2), ctx.arg(3) as usize)
            };
            // SAFETY: the reader validated this buffer when it blocked and
            // has not run since.
            let n = self.serial.read(unsafe { user::bytes_mut(buffer, len) });
            log_trace!(Trace::SIO, "sio: {} bytes to pid {}", n, pid);
            self.context_mut(reader).set_return(n as u64);
            self.schedule(reader);
        }
    }

    /// Console event for the user shell: put it back on the ready queue if
    /// it is sleeping. Returns whether it was woken.
    pub fn wake_user_shell(&mut self) -> bool {
        let Some(shell) = self.user_shell.and_then(|pid| self.find_by_pid(pid)) else {
            return false;
        };
        if self.pcb(shell).state != State::Sleeping {
            return false;
        }
        self.schedule(shell);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QUANTUM_DEFAULT;
    use crate::drivers::CharDevice;
    use crate::kernel::tests::{booted, booted_with_devices, spawn_child, trap};

    fn current_pid(k: &Kernel) -> Pid {
        k.pcb(k.current.unwrap()).pid
    }

    fn ret(k: &Kernel, slot: Slot) -> u64 {
        k.context(slot).rax
    }

    fn err(e: SysError) -> u64 {
        e.as_reg()
    }

    #[test]
    fn codes_decode() {
        assert_eq!(Syscall::try_from(6), Ok(Syscall::Waitpid));
        assert_eq!(Syscall::try_from(SYS_BOGUS), Err(SYS_BOGUS));
        assert_eq!(Syscall::Ushell as u64, 7);
    }

    #[test]
    fn waitpid_any_collects_children_in_exit_order() {
        let mut k = booted();
        let init = k.current.unwrap();
        let p = spawn_child(&mut k, init, Priority::System);
        trap(&mut k, Syscall::Sleep, &[0]);
        let parent = k.current.unwrap();
        assert_eq!(k.pcb(parent).pid, p);

        trap(&mut k, Syscall::Spawn, &[0x1000, Priority::User as u64, 0, 0]);
        let c1 = Pid(ret(&k, parent) as u32);
        trap(&mut k, Syscall::Spawn, &[0x2000, Priority::User as u64, 0, 0]);
        let c2 = Pid(ret(&k, parent) as u32);
        assert_ne!(c1, c2);
        assert_eq!(k.process(c1).unwrap().ppid, p);

        let mut status: i32 = 0;
        let status_ptr = &mut status as *mut i32 as u64;

        // nothing to collect yet, so P waits; init waits on its own children
        trap(&mut k, Syscall::Waitpid, &[0, status_ptr]);
        assert_eq!(k.pcb(parent).state, State::Waiting);
        assert_eq!(current_pid(&k), Pid(PID_INIT));
        trap(&mut k, Syscall::Waitpid, &[0, 0]);
        assert_eq!(current_pid(&k), c1);

        trap(&mut k, Syscall::Exit, &[5]);
        assert_eq!(current_pid(&k), p);
        assert_eq!(ret(&k, parent), c1.0 as u64);
        assert_eq!(status, 5);
        assert!(k.process(c1).is_none());

        trap(&mut k, Syscall::Waitpid, &[0, status_ptr]);
        assert_eq!(current_pid(&k), c2);
        trap(&mut k, Syscall::Exit, &[9]);
        assert_eq!(current_pid(&k), p);
        assert_eq!(ret(&k, parent), c2.0 as u64);
        assert_eq!(status, 9);

        trap(&mut k, Syscall::Waitpid, &[0, status_ptr]);
        assert_eq!(ret(&k, parent), err(SysError::NoChildren));
        assert_eq!(k.current, Some(parent));
    }

    #[test]
    fn waitpid_collects_an_existing_zombie_immediately() {
        let mut k = booted();
        let parent = k.current.unwrap();
        let child = spawn_child(&mut k, parent, Priority::User);
        let slot = k.find_by_pid(child).unwrap();
        k.pcb_mut(slot).status = 42;
        k.perform_exit(slot);

        let mut status: i32 = 0;
        trap(&mut k, Syscall::Waitpid, &[child.0 as u64, &mut status as *mut i32 as u64]);
        assert_eq!(ret(&k, parent), child.0 as u64);
        assert_eq!(status, 42);
        assert_eq!(k.current, Some(parent));

        trap(&mut k, Syscall::Waitpid, &[child.0 as u64, 0]);
        assert_eq!(ret(&k, parent), err(SysError::NotFound));
    }

    #[test]
    fn waitpid_rejects_self_and_strangers() {
        let mut k = booted();
        let init = k.current.unwrap();
        let me = current_pid(&k);
        trap(&mut k, Syscall::Waitpid, &[me.0 as u64, 0]);
        assert_eq!(ret(&k, init), err(SysError::BadParam));

        let child = spawn_child(&mut k, init, Priority::User);
        let cslot = k.find_by_pid(child).unwrap();
        let grandchild = spawn_child(&mut k, cslot, Priority::User);
        trap(&mut k, Syscall::Waitpid, &[grandchild.0 as u64, 0]);
        assert_eq!(ret(&k, init), err(SysError::BadPid));
    }

    #[test]
    fn waitpid_for_a_specific_child_ignores_others() {
        let mut k = booted();
        let parent = k.current.unwrap();
        let first = spawn_child(&mut k, parent, Priority::User);
        let second = spawn_child(&mut k, parent, Priority::User);

        trap(&mut k, Syscall::Waitpid, &[second.0 as u64, 0]);
        assert_eq!(current_pid(&k), first);

        // first exits but the parent only wants second
        trap(&mut k, Syscall::Exit, &[1]);
        assert_eq!(k.pcb(parent).state, State::Waiting);
        assert_eq!(k.process(first).unwrap().state, State::Zombie);
        assert_eq!(current_pid(&k), second);

        trap(&mut k, Syscall::Exit, &[2]);
        assert_eq!(current_pid(&k), k.pcb(parent).pid);
        assert_eq!(ret(&k, parent), second.0 as u64);
    }

    #[test]
    fn sleep_zero_yields_without_the_sleep_queue() {
        let mut k = booted();
        let init = k.current.unwrap();
        let peer = spawn_child(&mut k, init, Priority::System);

        trap(&mut k, Syscall::Sleep, &[0]);
        assert!(k.sleep_queue.is_empty());
        assert_eq!(k.pcb(init).state, State::Ready);
        assert_eq!(current_pid(&k), peer);
    }

    #[test]
    fn sleep_sets_absolute_wakeup() {
        let mut k = booted();
        let init = k.current.unwrap();
        k.system_time = 50;
        trap(&mut k, Syscall::Sleep, &[1000]);
        assert_eq!(k.pcb(init).state, State::Sleeping);
        assert_eq!(k.pcb(init).wakeup, 150);
        assert_eq!(k.sleep_queue.peek_front().map(|(key, _)| key), Some(150));
        assert_eq!(current_pid(&k), Pid(PID_IDLE));

        for _ in 0..100 {
            k.tick();
        }
        assert_eq!(k.pcb(init).state, State::Ready);
        // idle finishes its quantum, then init runs
        for _ in 0..QUANTUM_DEFAULT {
            k.tick();
        }
        assert_eq!(k.current, Some(init));
    }

    #[test]
    fn user_shell_sleeps_until_woken() {
        let mut k = booted();
        let init = k.current.unwrap();
        let shell = spawn_child(&mut k, init, Priority::User);
        trap(&mut k, Syscall::Waitpid, &[0, 0]);
        assert_eq!(current_pid(&k), shell);

        trap(&mut k, Syscall::Ushell, &[]);
        let sslot = k.find_by_pid(shell).unwrap();
        assert_eq!(ret(&k, sslot), 0);
        assert_eq!(k.user_shell, Some(shell));

        trap(&mut k, Syscall::Sleep, &[500]);
        assert_eq!(k.pcb(sslot).state, State::Sleeping);
        assert!(k.sleep_queue.is_empty());

        assert!(k.wake_user_shell());
        assert_eq!(k.pcb(sslot).state, State::Ready);
        assert!(!k.wake_user_shell());
    }

    #[test]
    fn ushell_registration_is_first_come() {
        let mut k = booted();
        let init = k.current.unwrap();
        trap(&mut k, Syscall::Ushell, &[]);
        assert_eq!(ret(&k, init), 0);
        trap(&mut k, Syscall::Ushell, &[]);
        assert_eq!(ret(&k, init), PID_INIT as u64);
    }

    #[test]
    fn kill_of_a_ready_process_stops_it_running() {
        let mut k = booted();
        let init = k.current.unwrap();
        let victim = spawn_child(&mut k, init, Priority::System);

        trap(&mut k, Syscall::Kill, &[victim.0 as u64]);
        assert_eq!(ret(&k, init), 0);
        let p = k.process(victim).unwrap();
        assert_eq!(p.state, State::Zombie);
        assert_eq!(p.status, SysError::Killed.code());

        // idempotent
        trap(&mut k, Syscall::Kill, &[victim.0 as u64]);
        assert_eq!(ret(&k, init), 0);

        // its stale ready entry is skipped
        trap(&mut k, Syscall::Sleep, &[0]);
        assert_eq!(k.current, Some(init));
    }

    #[test]
    fn kill_self_redispatches() {
        let mut k = booted();
        let init = k.current.unwrap();
        let child = spawn_child(&mut k, init, Priority::System);
        trap(&mut k, Syscall::Sleep, &[0]);
        assert_eq!(current_pid(&k), child);

        trap(&mut k, Syscall::Kill, &[0]);
        assert_eq!(k.process(child).unwrap().state, State::Zombie);
        assert_eq!(k.current, Some(init));
    }

    #[test]
    fn kill_guards_init_idle_and_unknown_pids() {
        let mut k = booted();
        let init = k.current.unwrap();
        trap(&mut k, Syscall::Kill, &[PID_IDLE as u64]);
        assert_eq!(ret(&k, init), err(SysError::BadPid));
        trap(&mut k, Syscall::Kill, &[0]);
        assert_eq!(ret(&k, init), err(SysError::BadPid));
        trap(&mut k, Syscall::Kill, &[999]);
        assert_eq!(ret(&k, init), err(SysError::NotFound));
    }

    #[test]
    fn kill_of_a_waiting_parent_reparents_its_children() {
        let mut k = booted();
        let init = k.current.unwrap();
        let parent = spawn_child(&mut k, init, Priority::System);
        trap(&mut k, Syscall::Sleep, &[0]);
        let pslot = k.current.unwrap();
        assert_eq!(k.pcb(pslot).pid, parent);

        let child = spawn_child(&mut k, pslot, Priority::User);
        trap(&mut k, Syscall::Waitpid, &[0, 0]);
        assert_eq!(k.pcb(pslot).state, State::Waiting);
        assert_eq!(k.current, Some(init));

        trap(&mut k, Syscall::Kill, &[parent.0 as u64]);
        assert_eq!(ret(&k, init), 0);
        assert_eq!(k.process(parent).unwrap().state, State::Zombie);
        assert_eq!(k.process(child).unwrap().ppid, Pid(PID_INIT));
    }

    #[test]
    fn spawn_enforces_priority_and_capacity() {
        let mut k = booted();
        let init = k.current.unwrap();
        trap(&mut k, Syscall::Spawn, &[0x1000, 7, 0, 0]);
        assert_eq!(ret(&k, init), err(SysError::BadPriority));

        // a User child may not spawn a System grandchild
        let child = spawn_child(&mut k, init, Priority::User);
        trap(&mut k, Syscall::Sleep, &[0]);
        assert_eq!(current_pid(&k), Pid(PID_INIT));
        k.pcb_mut(init).state = State::Sleeping; // keep init off the CPU
        k.dispatch();
        assert_eq!(current_pid(&k), child);
        let cslot = k.current.unwrap();
        trap(&mut k, Syscall::Spawn, &[0x1000, Priority::System as u64, 0, 0]);
        assert_eq!(ret(&k, cslot), err(SysError::BadPriority));
        trap(&mut k, Syscall::Spawn, &[0x1000, Priority::Deferred as u64, 0, 0]);
        assert!(k.process(Pid(ret(&k, cslot) as u32)).is_some());

        while !k.table.is_full() {
            spawn_child(&mut k, cslot, Priority::User);
        }
        trap(&mut k, Syscall::Spawn, &[0x1000, Priority::User as u64, 0, 0]);
        assert_eq!(ret(&k, cslot), err(SysError::NoProcs));
    }

    #[test]
    fn spawn_passes_arguments_and_zero_to_the_child() {
        let mut k = booted();
        let init = k.current.unwrap();
        let args = *b"child arg";
        trap(&mut k, Syscall::Spawn, &[0x4000, Priority::User as u64, args.len() as u64, args.as_ptr() as u64]);
        let pid = Pid(ret(&k, init) as u32);
        let slot = k.find_by_pid(pid).unwrap();
        let ctx = *k.context(slot);
        assert_eq!(ctx.rip, 0x4000);
        assert_eq!(ctx.rax, 0);
        assert_eq!(ctx.rdi, args.len() as u64);
        // SAFETY: rsi points into the child's live stack.
        let copied = unsafe { user::bytes(ctx.rsi, args.len()) };
        assert_eq!(copied, &args[..]);
        assert_eq!(k.pcb(slot).state, State::Ready);
        assert_eq!(k.pcb(slot).quantum, QUANTUM_DEFAULT);

        trap(&mut k, Syscall::Spawn, &[0x4000, Priority::User as u64, 4, 0]);
        assert_eq!(ret(&k, init), err(SysError::BadParam));
        // the failed spawn did not burn a pid or leak a slot
        trap(&mut k, Syscall::Spawn, &[0x4000, Priority::User as u64, 0, 0]);
        assert_eq!(ret(&k, init), pid.0 as u64 + 1);
    }

    #[test]
    fn bad_code_exits_the_caller() {
        let mut k = booted();
        let init = k.current.unwrap();
        let child = spawn_child(&mut k, init, Priority::System);
        trap(&mut k, Syscall::Sleep, &[0]);
        assert_eq!(current_pid(&k), child);

        let cslot = k.current.unwrap();
        k.context_mut(cslot).rax = SYS_BOGUS;
        k.syscall();
        let p = k.process(child).unwrap();
        assert_eq!(p.state, State::Zombie);
        assert_eq!(p.status, SysError::BadSyscall.code());
        assert_eq!(k.current, Some(init));
    }

    #[test]
    fn console_and_serial_io() {
        let (mut k, console, serial) = booted_with_devices();
        let init = k.current.unwrap();

        let msg = b"hello";
        trap(&mut k, Syscall::Write, &[0, msg.as_ptr() as u64, msg.len() as u64]);
        assert_eq!(ret(&k, init), 5);
        assert_eq!(console.lock().output(), &msg[..]);
        trap(&mut k, Syscall::Write, &[9, msg.as_ptr() as u64, 5]);
        assert_eq!(ret(&k, init), err(SysError::BadChannel));

        let mut buf = [0u8; 8];
        let buf_ptr = buf.as_mut_ptr() as u64;
        trap(&mut k, Syscall::Read, &[0, buf_ptr, 8]);
        assert_eq!(ret(&k, init), err(SysError::NoData));

        console.lock().feed(b"ls\n");
        trap(&mut k, Syscall::Read, &[0, buf_ptr, 8]);
        assert_eq!(ret(&k, init), 3);
        assert_eq!(&buf[..3], b"ls\n");

        serial.lock().feed(b"x");
        trap(&mut k, Syscall::Read, &[1, buf_ptr, 8]);
        assert_eq!(ret(&k, init), 1);
        assert_eq!(buf[0], b'x');
        trap(&mut k, Syscall::Write, &[1, msg.as_ptr() as u64, 2]);
        assert_eq!(serial.lock().output(), b"he");
    }

    #[test]
    fn serial_read_blocks_until_input_arrives() {
        let (mut k, _console, serial) = booted_with_devices();
        let init = k.current.unwrap();

        let mut buf = [0u8; 4];
        trap(&mut k, Syscall::Read, &[1, buf.as_mut_ptr() as u64, 4]);
        assert_eq!(k.pcb(init).state, State::Blocked);
        assert_eq!(k.sio_readers.len(), 1);
        assert_eq!(current_pid(&k), Pid(PID_IDLE));

        serial.lock().feed(b"ok");
        k.serial_input_ready();
        assert_eq!(k.pcb(init).state, State::Ready);
        assert_eq!(ret(&k, init), 2);
        assert_eq!(&buf[..2], b"ok");
        assert!(k.sio_readers.is_empty());
    }

    #[test]
    fn oversized_arguments_are_rejected_not_truncated() {
        let mut k = booted();
        let init = k.current.unwrap();
        let child = spawn_child(&mut k, init, Priority::System);
        trap(&mut k, Syscall::Sleep, &[0]);
        let cslot = k.current.unwrap();
        assert_eq!(k.pcb(cslot).pid, child);

        // would read as kill(0), the caller itself
        trap(&mut k, Syscall::Kill, &[1u64 << 32]);
        assert_eq!(ret(&k, cslot), err(SysError::BadPid));
        assert_eq!(k.pcb(cslot).state, State::Running);

        // would read as sleep(0), a yield
        trap(&mut k, Syscall::Sleep, &[1u64 << 32]);
        assert_eq!(ret(&k, cslot), err(SysError::BadParam));
        assert_eq!(k.current, Some(cslot));
        assert!(k.sleep_queue.is_empty());

        // would read as waitpid(0), any child
        spawn_child(&mut k, cslot, Priority::User);
        trap(&mut k, Syscall::Waitpid, &[(1u64 << 32) | 3, 0]);
        assert_eq!(ret(&k, cslot), err(SysError::BadPid));
        assert_eq!(k.pcb(cslot).state, State::Running);
    }

    #[test]
    fn killed_sleeper_never_runs_again() {
        let mut k = booted();
        let init = k.current.unwrap();
        let sleeper = spawn_child(&mut k, init, Priority::System);
        trap(&mut k, Syscall::Sleep, &[0]);
        assert_eq!(current_pid(&k), sleeper);
        let sslot = k.current.unwrap();

        trap(&mut k, Syscall::Sleep, &[50]);
        assert_eq!(k.pcb(sslot).state, State::Sleeping);
        assert_eq!(k.sleep_queue.len(), 1);
        assert_eq!(k.current, Some(init));

        trap(&mut k, Syscall::Kill, &[sleeper.0 as u64]);
        assert_eq!(ret(&k, init), 0);
        assert_eq!(k.process(sleeper).unwrap().state, State::Zombie);

        for _ in 0..2 * ms_to_ticks(50) {
            k.tick();
            assert_ne!(k.current_pid(), Some(sleeper));
        }
        assert!(k.sleep_queue.is_empty());
        assert_eq!(k.process(sleeper).unwrap().state, State::Zombie);
    }

    #[test]
    fn killed_serial_reader_gets_no_data() {
        let (mut k, _console, serial) = booted_with_devices();
        let init = k.current.unwrap();
        let reader = spawn_child(&mut k, init, Priority::System);
        trap(&mut k, Syscall::Sleep, &[0]);
        let rslot = k.current.unwrap();
        assert_eq!(k.pcb(rslot).pid, reader);

        let mut buf = [0u8; 4];
        trap(&mut k, Syscall::Read, &[1, buf.as_mut_ptr() as u64, 4]);
        assert_eq!(k.pcb(rslot).state, State::Blocked);
        assert_eq!(k.current, Some(init));

        trap(&mut k, Syscall::Kill, &[reader.0 as u64]);
        assert_eq!(ret(&k, init), 0);

        serial.lock().feed(b"hi");
        k.serial_input_ready();
        assert!(k.sio_readers.is_empty());
        assert_eq!(buf, [0u8; 4]);
        assert_eq!(serial.lock().available(), 2);
        assert_eq!(k.process(reader).unwrap().state, State::Zombie);
    }

    #[test]
    #[should_panic(expected = "pid 1 exited")]
    fn init_exit_is_fatal() {
        let mut k = booted();
        trap(&mut k, Syscall::Exit, &[0]);
    }

    #[test]
    #[should_panic(expected = "pid 1 exited")]
    fn init_bad_code_is_fatal() {
        let mut k = booted();
        let init = k.current.unwrap();
        k.context_mut(init).rax = SYS_BOGUS;
        k.syscall();
    }
}
