//! Clock-driven preemption.
//!
//! Every timer interrupt advances system time, wakes sleepers that are due
//! and charges the running process one tick of its quantum.

use crate::config::{sec_to_ticks, Trace, CLOCK_FREQUENCY, STATUS_INTERVAL_SECS};
use crate::kernel::Kernel;
use crate::process::State;
use crate::{log_info, log_trace};

const PINWHEEL: [char; 4] = ['|', '/', '-', '\\'];

/// Progress indicator and status line bookkeeping.
#[derive(Debug, Default)]
pub struct Clock {
    pinwheel: usize,
}

impl Clock {
    pub const fn new() -> Self {
        Clock { pinwheel: 0 }
    }

    /// Turn the pinwheel every tenth of a second.
    fn advance(&mut self, now: u32) {
        if now % (CLOCK_FREQUENCY / 10) == 0 {
            self.pinwheel = (self.pinwheel + 1) % PINWHEEL.len();
        }
    }

    /// Character the console shows in its corner.
    pub fn pinwheel(&self) -> char {
        PINWHEEL[self.pinwheel]
    }
}

impl Kernel {
    /// Handle one clock tick.
    pub fn tick(&mut self) {
        self.system_time = self.system_time.wrapping_add(1);
        let now = self.system_time;
        self.clock.advance(now);

        let every = sec_to_ticks(STATUS_INTERVAL_SECS);
        if every != 0 && now.checked_rem(every) == Some(0) {
            self.status_line();
        }

        // Sleepers due now; equal wakeup times leave in sleep order.
        while let Some((key, _)) = self.sleep_queue.peek_front() {
            if key > now {
                break;
            }
            let Some((key, pid)) = self.sleep_queue.remove_front() else {
                break;
            };
            match self.find_by_pid(pid) {
                Some(slot) if self.pcb(slot).state == State::Sleeping && self.pcb(slot).wakeup == key => {
                    log_trace!(Trace::SCHED, "clock: waking pid {} at {}", pid, now);
                    self.schedule(slot);
                }
                _ => {
                    log_trace!(Trace::SCHED, "clock: dropping stale sleeper {}", pid);
                }
            }
        }

        let Some(current) = self.current else {
            return;
        };
        let p = self.pcb_mut(current);
        p.quantum = p.quantum.saturating_sub(1);
        if p.quantum == 0 {
            self.schedule(current);
            self.dispatch();
        }
    }

    /// Process counts and queue lengths on one line.
    pub fn status_line(&self) {
        let counts = self.count_by_state();
        let [sys, usr, def] = self.ready_lengths();
        log_info!(
            "@{:08x} procs {} (Rdy {} Run {} Slp {} Wtg {} Blk {} Zom {}) ready {}/{}/{} sleep {} sio {}",
            self.system_time,
            self.table.len(),
            counts.of(State::Ready),
            counts.of(State::Running),
            counts.of(State::Sleeping),
            counts.of(State::Waiting),
            counts.of(State::Blocked),
            counts.of(State::Zombie),
            sys,
            usr,
            def,
            self.sleep_queue.len(),
            self.sio_readers.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ms_to_ticks, QUANTUM_DEFAULT};
    use crate::kernel::tests::{booted, spawn_child};
    use crate::process::{Pid, Priority};

    fn put_to_sleep(k: &mut Kernel, pid: Pid, wakeup: u32) {
        let p = k.process_mut(pid).unwrap();
        p.state = State::Sleeping;
        p.wakeup = wakeup;
        k.sleep_queue.insert(pid, wakeup);
    }

    #[test]
    fn sleepers_wake_in_wakeup_order() {
        let mut k = booted();
        let init = k.current.unwrap();
        let a = spawn_child(&mut k, init, Priority::User);
        let b = spawn_child(&mut k, init, Priority::User);
        // drain the ready queue entries from spawning
        k.ready = crate::scheduler::ReadyQueues::new();

        let t = k.system_time + 5;
        put_to_sleep(&mut k, b, t + 1);
        put_to_sleep(&mut k, a, t);

        for _ in 0..5 {
            k.tick();
        }
        assert_eq!(k.process(a).unwrap().state, State::Ready);
        assert_eq!(k.process(b).unwrap().state, State::Sleeping);

        k.tick();
        assert_eq!(k.process(b).unwrap().state, State::Ready);
        assert!(k.sleep_queue.is_empty());
    }

    #[test]
    fn quantum_exhaustion_requeues_behind_earlier_peers() {
        let mut k = booted();
        let init = k.current.unwrap();
        let init_pid = k.pcb(init).pid;
        let peer = spawn_child(&mut k, init, Priority::System);

        for _ in 0..QUANTUM_DEFAULT - 1 {
            k.tick();
            assert_eq!(k.current, Some(init));
        }
        k.tick();
        assert_eq!(k.pcb(k.current.unwrap()).pid, peer);
        assert_eq!(k.pcb(init).state, State::Ready);

        // peer's slice ends, init was queued first so it runs next
        for _ in 0..QUANTUM_DEFAULT {
            k.tick();
        }
        assert_eq!(k.pcb(k.current.unwrap()).pid, init_pid);
    }

    #[test]
    fn sleep_of_a_second_wakes_on_the_hundredth_tick() {
        let mut k = booted();
        let init = k.current.unwrap();
        let x = spawn_child(&mut k, init, Priority::User);
        k.system_time = 50;
        let wakeup = k.system_time + ms_to_ticks(1000);
        assert_eq!(wakeup, 150);
        put_to_sleep(&mut k, x, wakeup);

        for _ in 0..99 {
            k.tick();
        }
        assert_eq!(k.process(x).unwrap().state, State::Sleeping);
        k.tick();
        assert_eq!(k.system_time, 150);
        assert_ne!(k.process(x).unwrap().state, State::Sleeping);
    }

    #[test]
    fn pinwheel_turns_every_tenth_of_a_second() {
        let mut k = booted();
        let first = k.clock.pinwheel();
        for _ in 0..CLOCK_FREQUENCY / 10 {
            k.tick();
        }
        assert_ne!(k.clock.pinwheel(), first);
    }
}
