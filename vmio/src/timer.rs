//! One deadline thread shared by every pending connect job.
//!
//! Tasks sit in a min-heap keyed by deadline. The thread starts on the first
//! [`Timer::schedule`] and sleeps on a condvar until the earliest deadline,
//! or until an earlier task is pushed. Tasks run outside the queue lock.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::thread;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

/// Deferred work.
type Task = Box<dyn FnOnce() + Send>;

/// Queued task. Ordered so the earliest deadline sits on top of the heap,
/// ties broken by scheduling order.
struct Entry {
    /// When the task runs.
    deadline: Instant,
    /// Scheduling sequence number.
    seq: u64,
    /// Work to run.
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queue state behind the timer lock.
struct Queue {
    /// Pending tasks.
    entries: BinaryHeap<Entry>,
    /// Next sequence number.
    next_seq: u64,
    /// Whether the thread was spawned.
    running: bool,
}

/// Deadline scheduler backed by a single named thread.
pub(crate) struct Timer {
    /// Thread name.
    name: &'static str,
    /// Pending tasks.
    queue: Mutex<Queue>,
    /// Signalled when a task is pushed.
    wake: Condvar,
}

impl Timer {
    /// Creates an idle timer. No thread runs until the first task.
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            queue: Mutex::new(Queue {
                entries: BinaryHeap::new(),
                next_seq: 0,
                running: false,
            }),
            wake: Condvar::new(),
        }
    }

    /// Process-wide timer for connect deadlines.
    pub(crate) fn global() -> &'static Self {
        static TIMER: Timer = Timer::new("vmio-connect-timer");
        &TIMER
    }

    /// Runs `task` on the timer thread once `deadline` passes.
    ///
    /// Fails only if the thread cannot be started, in which case `task` is
    /// dropped unrun.
    pub(crate) fn schedule(
        &'static self,
        deadline: Instant,
        task: impl FnOnce() + Send + 'static,
    ) -> io::Result<()> {
        let mut queue = self.queue.lock();
        if !queue.running {
            thread::Builder::new()
                .name(self.name.to_owned())
                .spawn(move || self.run())?;
            queue.running = true;
            debug!(thread = self.name, "timer: started");
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.push(Entry {
            deadline,
            seq,
            task: Box::new(task),
        });
        drop(queue);
        self.wake.notify_one();
        Ok(())
    }

    /// Thread body.
    fn run(&self) {
        let mut queue = self.queue.lock();
        loop {
            let Some(deadline) = queue.entries.peek().map(|e| e.deadline) else {
                self.wake.wait(&mut queue);
                continue;
            };
            if Instant::now() < deadline {
                self.wake.wait_until(&mut queue, deadline);
                continue;
            }
            if let Some(entry) = queue.entries.pop() {
                MutexGuard::unlocked(&mut queue, entry.task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::time::Duration;

    fn timer() -> &'static Timer {
        Box::leak(Box::new(Timer::new("vmio-timer-test")))
    }

    #[test]
    fn tasks_run_in_deadline_order() {
        let timer = timer();
        let (tx, rx) = channel::unbounded();
        let now = Instant::now();
        for (delay, tag) in [(30, 3), (10, 1), (20, 2)] {
            let tx = tx.clone();
            timer
                .schedule(now + Duration::from_millis(delay), move || {
                    let _ = tx.send(tag);
                })
                .unwrap();
        }
        let order: Vec<i32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, [1, 2, 3]);
        assert!(now.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn earlier_task_interrupts_long_sleep() {
        let timer = timer();
        let (tx, rx) = channel::unbounded();
        let far = tx.clone();
        timer
            .schedule(Instant::now() + Duration::from_secs(600), move || {
                let _ = far.send("far");
            })
            .unwrap();
        timer
            .schedule(Instant::now() + Duration::from_millis(10), move || {
                let _ = tx.send("near");
            })
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "near");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn one_thread_serves_many_tasks() {
        let timer = timer();
        let (tx, rx) = channel::unbounded();
        let deadline = Instant::now() + Duration::from_millis(5);
        for _ in 0..64 {
            let tx = tx.clone();
            timer
                .schedule(deadline, move || {
                    let _ = tx.send(thread::current().name().map(str::to_owned));
                })
                .unwrap();
        }
        for _ in 0..64 {
            let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(name.as_deref(), Some("vmio-timer-test"));
        }
    }
}
