//! Cooperative tick scheduler.
//!
//! Drives a fixed set of `(init, task, period_ms)` triples from an external
//! monotonic tick source: the embedder calls `tick(elapsed_ms)` once per
//! scheduler iteration (e.g. from a hardware timer ISR or an embassy
//! `Ticker`), and each registered task's `task_fn` runs once its period has
//! elapsed. There is no internal clock and no suspension point; this is the
//! mechanism the protocol engine's `poll` is normally hung off of.

use crate::error::{Error, Result};

pub type InitFn = fn();
pub type TaskFn = fn(elapsed_ms: u32);

struct Task {
    init_fn: Option<InitFn>,
    task_fn: TaskFn,
    period_ms: u32,
    accumulated_ms: u32,
}

struct Deferred {
    run_fn: TaskFn,
    remaining_ms: u32,
}

/// A cooperative scheduler over a fixed number of periodic tasks plus a
/// fixed number of one-shot deferred tasks (the mechanism an embedder uses
/// to flip an RS-485 direction pin some microseconds after `dir_ctrl`
/// returns).
pub struct Scheduler<const MAX_TASKS: usize, const MAX_DEFERRED: usize> {
    tasks: heapless::Vec<Task, MAX_TASKS>,
    deferred: heapless::Vec<Deferred, MAX_DEFERRED>,
    started: bool,
}

impl<const MAX_TASKS: usize, const MAX_DEFERRED: usize> Scheduler<MAX_TASKS, MAX_DEFERRED> {
    pub const fn new() -> Self {
        Self {
            tasks: heapless::Vec::new(),
            deferred: heapless::Vec::new(),
            started: false,
        }
    }

    /// Register a periodic task, with an optional one-time init function.
    /// Must be called before `start`.
    pub fn register(
        &mut self,
        init_fn: Option<InitFn>,
        task_fn: TaskFn,
        period_ms: u32,
    ) -> Result<()> {
        if period_ms == 0 {
            return Err(Error::InvalidArgument);
        }
        self.tasks
            .push(Task { init_fn, task_fn, period_ms, accumulated_ms: 0 })
            .map_err(|_| Error::ResourceExhausted)
    }

    /// Run each registered task's `init_fn`, once. Idempotent no-op if
    /// called more than once.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        for task in self.tasks.iter() {
            if let Some(init) = task.init_fn {
                init();
            }
        }
        self.started = true;
    }

    /// Schedule `run_fn` to fire once after `delay_ms`, once and only once.
    pub fn defer(&mut self, run_fn: TaskFn, delay_ms: u32) -> Result<()> {
        self.deferred
            .push(Deferred { run_fn, remaining_ms: delay_ms })
            .map_err(|_| Error::ResourceExhausted)
    }

    /// Advance the scheduler by `elapsed_ms`. Every task whose accumulated
    /// time reaches its period runs exactly once per elapsed period bucket
    /// (periods are not caught up in a burst; a caller that stalls for
    /// multiple periods only sees one invocation, matching a poll loop that
    /// cares about "did the period elapse", not "how many times").
    pub fn tick(&mut self, elapsed_ms: u32) {
        for task in self.tasks.iter_mut() {
            task.accumulated_ms += elapsed_ms;
            if task.accumulated_ms >= task.period_ms {
                task.accumulated_ms = 0;
                (task.task_fn)(elapsed_ms);
            }
        }

        let mut i = 0;
        while i < self.deferred.len() {
            if elapsed_ms >= self.deferred[i].remaining_ms {
                let d = self.deferred.swap_remove(i);
                (d.run_fn)(elapsed_ms);
            } else {
                self.deferred[i].remaining_ms -= elapsed_ms;
                i += 1;
            }
        }
    }
}

impl<const MAX_TASKS: usize, const MAX_DEFERRED: usize> Default
    for Scheduler<MAX_TASKS, MAX_DEFERRED>
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static FIRED: AtomicU32 = AtomicU32::new(0);
    fn bump(_elapsed: u32) {
        FIRED.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn task_fires_once_per_period() {
        FIRED.store(0, Ordering::Relaxed);
        let mut sched: Scheduler<4, 4> = Scheduler::new();
        sched.register(None, bump, 10).unwrap();
        for _ in 0..25 {
            sched.tick(1);
        }
        assert_eq!(FIRED.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn deferred_task_fires_once_after_delay() {
        FIRED.store(0, Ordering::Relaxed);
        let mut sched: Scheduler<4, 4> = Scheduler::new();
        sched.defer(bump, 5).unwrap();
        sched.tick(3);
        assert_eq!(FIRED.load(Ordering::Relaxed), 0);
        sched.tick(3);
        assert_eq!(FIRED.load(Ordering::Relaxed), 1);
        sched.tick(10);
        assert_eq!(FIRED.load(Ordering::Relaxed), 1);
    }

    static INIT_FIRED: AtomicU32 = AtomicU32::new(0);
    fn bump_init() {
        INIT_FIRED.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn start_runs_each_tasks_init_fn_once() {
        INIT_FIRED.store(0, Ordering::Relaxed);
        let mut sched: Scheduler<4, 4> = Scheduler::new();
        sched.register(Some(bump_init), bump, 10).unwrap();
        sched.register(Some(bump_init), bump, 20).unwrap();
        sched.register(None, bump, 30).unwrap();
        sched.start();
        assert_eq!(INIT_FIRED.load(Ordering::Relaxed), 2);
        sched.start();
        assert_eq!(INIT_FIRED.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn zero_period_is_rejected() {
        let mut sched: Scheduler<2, 2> = Scheduler::new();
        assert_eq!(sched.register(None, bump, 0), Err(Error::InvalidArgument));
    }

    #[test]
    fn registration_pool_exhaustion() {
        let mut sched: Scheduler<1, 1> = Scheduler::new();
        sched.register(None, bump, 10).unwrap();
        assert_eq!(sched.register(None, bump, 10), Err(Error::ResourceExhausted));
    }
}
