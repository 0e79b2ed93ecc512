//! Multi-level ready queues and the dispatcher.
//!
//! One FIFO queue per priority band. Queues hold PIDs, so an entry left
//! behind by a killed or reaped process is recognised and dropped when it
//! reaches the front.

use crate::config::{Trace, QUANTUM_DEFAULT};
use crate::kernel::Kernel;
use crate::pool::Slot;
use crate::process::{Pid, Priority, State};
use crate::queue::Queue;
use crate::{log_info, log_trace};

pub struct ReadyQueues {
    bands: [Queue<Pid>; Priority::COUNT],
}

impl ReadyQueues {
    pub fn new() -> Self {
        ReadyQueues { bands: [Queue::fifo(), Queue::fifo(), Queue::fifo()] }
    }

    pub fn enqueue(&mut self, priority: Priority, pid: Pid) {
        self.bands[priority.index()].insert(pid, pid.0);
    }

    /// Front entry of the highest non-empty band.
    pub fn dequeue(&mut self) -> Option<(Priority, Pid)> {
        Priority::ALL
            .iter()
            .find_map(|p| self.bands[p.index()].remove_front().map(|(_, pid)| (*p, pid)))
    }

    pub fn band(&self, priority: Priority) -> &Queue<Pid> {
        &self.bands[priority.index()]
    }

    pub fn band_len(&self, priority: Priority) -> usize {
        self.bands[priority.index()].len()
    }

    pub fn len(&self) -> usize {
        self.bands.iter().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dump(&self) {
        for p in Priority::ALL {
            self.band(p).dump(p.name());
        }
    }
}

impl Default for ReadyQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Make a process runnable at the tail of its band. A process that was
    /// killed while off the CPU is terminated here instead.
    pub fn schedule(&mut self, pcb: Slot) {
        let (pid, priority, state) = {
            let p = self.pcb(pcb);
            (p.pid, p.priority, p.state)
        };
        log_trace!(Trace::SCHED, "schedule pid {} prio {}", pid, priority.name());

        if state == State::Killed {
            self.perform_exit(pcb);
            return;
        }

        self.pcb_mut(pcb).state = State::Ready;
        self.ready.enqueue(priority, pid);
    }

    /// Select the next process to run and make it current.
    pub fn dispatch(&mut self) {
        loop {
            let Some((band, pid)) = self.ready.dequeue() else {
                self.fault(format_args!("no ready process to dispatch"));
            };

            let Some(slot) = self.find_by_pid(pid) else {
                log_trace!(Trace::DISPATCH, "dispatch: dropping stale entry {}", pid);
                continue;
            };

            match self.pcb(slot).state {
                State::Ready => {
                    let p = self.pcb_mut(slot);
                    p.state = State::Running;
                    p.quantum = QUANTUM_DEFAULT;
                    self.current = Some(slot);
                    log_trace!(Trace::DISPATCH, "dispatch: pid {} from {}", pid, band.name());
                    return;
                }
                State::Killed => {
                    log_trace!(Trace::DISPATCH, "dispatch: reaping killed pid {}", pid);
                    self.perform_exit(slot);
                }
                other => {
                    log_trace!(Trace::DISPATCH, "dispatch: pid {} is {}, skipped", pid, other.name());
                }
            }
        }
    }

    /// Queue lengths per band, for diagnostics.
    pub fn ready_lengths(&self) -> [usize; Priority::COUNT] {
        Priority::ALL.map(|p| self.ready.band_len(p))
    }

    pub fn queue_dump(&self) {
        log_info!("Queues at tick {}:", self.system_time);
        self.ready.dump();
        self.sleep_queue.dump("Sleep");
        self.sio_readers.dump("SIO readers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PID_IDLE;
    use crate::kernel::tests::{booted, spawn_child};

    #[test]
    fn same_band_dispatches_in_schedule_order() {
        let mut k = booted();
        let init = k.current.unwrap();
        let a = spawn_child(&mut k, init, Priority::User);
        let b = spawn_child(&mut k, init, Priority::User);
        let c = spawn_child(&mut k, init, Priority::User);

        let mut order = Vec::new();
        for _ in 0..3 {
            k.dispatch();
            order.push(k.pcb(k.current.unwrap()).pid);
        }
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn system_band_beats_deferred() {
        let mut k = booted();
        let init = k.current.unwrap();
        let low = spawn_child(&mut k, init, Priority::Deferred);
        let high = spawn_child(&mut k, init, Priority::System);

        k.dispatch();
        assert_eq!(k.pcb(k.current.unwrap()).pid, high);
        assert_eq!(k.ready.band_len(Priority::Deferred), 2);
        assert_eq!(k.process(low).unwrap().state, State::Ready);
    }

    #[test]
    fn dispatch_resets_quantum() {
        let mut k = booted();
        let init = k.current.unwrap();
        k.pcb_mut(init).quantum = 0;
        k.schedule(init);
        k.dispatch();
        assert_eq!(k.current, Some(init));
        assert_eq!(k.pcb(init).quantum, QUANTUM_DEFAULT);
        assert_eq!(k.pcb(init).state, State::Running);
    }

    #[test]
    fn killed_entries_are_reaped_not_run() {
        let mut k = booted();
        let init = k.current.unwrap();
        let victim = spawn_child(&mut k, init, Priority::System);
        let after = spawn_child(&mut k, init, Priority::System);
        k.process_mut(victim).unwrap().state = State::Killed;

        k.dispatch();
        assert_eq!(k.pcb(k.current.unwrap()).pid, after);
        assert_eq!(k.process(victim).unwrap().state, State::Zombie);
    }

    #[test]
    fn scheduling_a_killed_process_terminates_it() {
        let mut k = booted();
        let init = k.current.unwrap();
        let victim = spawn_child(&mut k, init, Priority::User);
        let slot = k.find_by_pid(victim).unwrap();
        k.pcb_mut(slot).state = State::Killed;
        k.schedule(slot);
        assert_eq!(k.pcb(slot).state, State::Zombie);
    }

    #[test]
    fn stale_entries_are_dropped() {
        let mut k = booted();
        let init = k.current.unwrap();
        let gone = spawn_child(&mut k, init, Priority::System);
        let slot = k.find_by_pid(gone).unwrap();
        k.deregister_process(slot);

        // init itself is not Ready, so its old entry is skipped too
        k.ready.enqueue(Priority::System, k.pcb(init).pid);
        k.dispatch();
        assert_eq!(k.pcb(k.current.unwrap()).pid, Pid(PID_IDLE));
    }

    #[test]
    #[should_panic(expected = "no ready process")]
    fn empty_ready_queues_are_fatal() {
        let mut k = booted();
        k.dispatch(); // idle
        k.dispatch();
    }
}
