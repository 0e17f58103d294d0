//! Cooperative task scheduler.
//!
//! Tasks live in one of two places: the waiting set (deadline in the future,
//! unordered) or the due queue (the batch the armed timer is waiting for).
//! Each loop iteration calls [`Scheduler::prepare`] then [`Scheduler::run`];
//! neither does anything until the armed deadline has passed. Callbacks run
//! on the main thread and receive the scheduler back, so they can add or
//! cancel tasks, including themselves.

use crate::signal;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("could not create scheduler timer: {0}")]
    CreateTimer(std::io::Error),

    #[error("could not install SIGALRM handler: {0}")]
    Handler(std::io::Error),
}

/// Identifier handed out when a task is scheduled, unique per scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Clock plus one-shot alarm
pub trait Timer {
    fn now(&self) -> Instant;

    /// Fire once at `deadline`. Replaces any earlier arming.
    fn arm(&mut self, deadline: Instant);

    /// True once the last armed deadline has fired
    fn fired(&self) -> bool;
}

pub type Callback<C, T> = Box<dyn FnMut(&mut C, &mut Scheduler<C, T>)>;

struct Task<C, T: Timer> {
    id: TaskId,
    deadline: Instant,
    interval: Duration,
    callback: Callback<C, T>,
}

pub struct Scheduler<C, T: Timer = SignalTimer> {
    timer: T,
    waiting: Vec<Task<C, T>>,
    due: Vec<Task<C, T>>,
    armed: Option<Instant>,
    next_id: u64,
    /// Ids of the batch being executed right now
    running: Vec<TaskId>,
    /// Task whose callback is executing
    current: Option<TaskId>,
    cancelled: Vec<TaskId>,
}

impl<C, T: Timer> Scheduler<C, T> {
    pub fn with_timer(timer: T) -> Self {
        Self {
            timer,
            waiting: Vec::new(),
            due: Vec::new(),
            armed: None,
            next_id: 0,
            running: Vec::new(),
            current: None,
            cancelled: Vec::new(),
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    fn insert(&mut self, delay: Duration, interval: Duration, callback: Callback<C, T>) -> TaskId {
        let id = TaskId(self.next_id);
        let deadline = self.timer.now() + delay;
        self.next_id += 1;
        self.waiting.push(Task {
            id,
            deadline,
            interval,
            callback,
        });

        // Earlier than the armed batch: put the batch back and start over
        if self.armed.is_some_and(|armed| deadline < armed) {
            self.waiting.append(&mut self.due);
            self.armed = None;
        }

        log::trace!("scheduled {} in {:?} (interval {:?})", id, delay, interval);
        id
    }

    /// Run `callback` once, `delay` from now
    pub fn delayed<F>(&mut self, delay: Duration, callback: F) -> TaskId
    where
        F: FnMut(&mut C, &mut Scheduler<C, T>) + 'static,
    {
        self.insert(delay, Duration::ZERO, Box::new(callback))
    }

    /// Run `callback` every `interval`, the first time right away if
    /// `immediately` is set
    pub fn interval<F>(&mut self, interval: Duration, immediately: bool, callback: F) -> TaskId
    where
        F: FnMut(&mut C, &mut Scheduler<C, T>) + 'static,
    {
        assert!(!interval.is_zero(), "interval tasks need a non-zero interval");
        let delay = if immediately { Duration::ZERO } else { interval };
        self.insert(delay, interval, Box::new(callback))
    }

    /// Remove a task wherever it is. Cancelling a task that already finished
    /// is a no-op; cancelling an id this scheduler never issued panics.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        assert!(id.0 < self.next_id, "{} was never scheduled", id);

        let removed = if let Some(i) = self.due.iter().position(|task| task.id == id) {
            self.due.remove(i);
            true
        } else if let Some(i) = self.waiting.iter().position(|task| task.id == id) {
            self.waiting.remove(i);
            true
        } else {
            false
        };

        if removed {
            if self.due.is_empty() {
                self.armed = None;
            }
            log::trace!("cancelled {}", id);
            return true;
        }

        if self.running.contains(&id) && !self.cancelled.contains(&id) {
            self.cancelled.push(id);
            log::trace!("cancelled {} while its batch runs", id);
            return true;
        }
        false
    }

    fn expired(&self) -> bool {
        match self.armed {
            None => true,
            Some(deadline) => self.timer.fired() || self.timer.now() >= deadline,
        }
    }

    /// Move the next batch from the waiting set to the due queue and arm the
    /// timer for it.
    ///
    /// The batch is every task sharing the earliest deadline, plus any task
    /// already overdue. Does nothing while the armed deadline is pending.
    pub fn prepare(&mut self) {
        if !self.expired() || !self.due.is_empty() {
            return;
        }

        let Some(earliest) = self.waiting.iter().map(|task| task.deadline).min() else {
            self.armed = None;
            return;
        };
        let cutoff = earliest.max(self.timer.now());

        let (mut batch, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiting)
            .into_iter()
            .partition(|task| task.deadline <= cutoff);
        self.waiting = waiting;

        batch.sort_by_key(|task| (task.deadline, task.id));
        self.due = batch;

        self.timer.arm(earliest);
        self.armed = Some(earliest);
    }

    /// Execute the due queue once its deadline has passed
    pub fn run(&mut self, ctx: &mut C) {
        if !self.expired() || self.due.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.due);
        self.running = batch.iter().map(|task| task.id).collect();
        self.armed = None;

        for mut task in batch {
            if self.cancelled.contains(&task.id) {
                continue;
            }

            self.current = Some(task.id);
            (task.callback)(ctx, self);
            self.current = None;

            if task.interval.is_zero() || self.cancelled.contains(&task.id) {
                continue;
            }
            task.deadline = self.timer.now() + task.interval;
            self.waiting.push(task);
        }

        self.running.clear();
        self.cancelled.clear();
    }

    /// Id of the task whose callback is running, if called from one
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    /// How long the event loop may block before the scheduler needs another
    /// pass. `None` when nothing is scheduled.
    pub fn poll_timeout(&self) -> Option<Duration> {
        if self.waiting.is_empty() && self.due.is_empty() {
            return None;
        }
        if self.expired() {
            return Some(Duration::ZERO);
        }
        self.armed
            .map(|deadline| deadline.saturating_duration_since(self.timer.now()))
    }

    pub fn len(&self) -> usize {
        self.waiting.len() + self.due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tasks in the due queue
    pub fn due_len(&self) -> usize {
        self.due.len()
    }

    /// Deadlines of the due queue, in execution order
    pub fn due_deadlines(&self) -> Vec<Instant> {
        self.due.iter().map(|task| task.deadline).collect()
    }
}

impl<C> Scheduler<C, SignalTimer> {
    pub fn new() -> Result<Self, SchedulerError> {
        Ok(Self::with_timer(SignalTimer::new()?))
    }
}

/// POSIX timer on `CLOCK_MONOTONIC` delivering `SIGALRM`
pub struct SignalTimer {
    timer: libc::timer_t,
    deadline: Option<Instant>,
}

impl SignalTimer {
    pub fn new() -> Result<Self, SchedulerError> {
        signal::install_timer_handler().map_err(SchedulerError::Handler)?;

        let mut timer: libc::timer_t = std::ptr::null_mut();
        let rc = unsafe {
            let mut event: libc::sigevent = std::mem::zeroed();
            event.sigev_notify = libc::SIGEV_SIGNAL;
            event.sigev_signo = libc::SIGALRM;
            libc::timer_create(libc::CLOCK_MONOTONIC, &mut event, &mut timer)
        };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if let Err(e) = signal::restore_timer_handler() {
                log::warn!("could not restore SIGALRM handler: {}", e);
            }
            return Err(SchedulerError::CreateTimer(err));
        }

        signal::reset_timer_expired();
        Ok(Self {
            timer,
            deadline: None,
        })
    }
}

impl Timer for SignalTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn arm(&mut self, deadline: Instant) {
        // A zero it_value disarms, so an overdue deadline fires after 1ns
        let delay = deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_nanos(1));
        let spec = libc::itimerspec {
            it_interval: libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
            it_value: libc::timespec {
                tv_sec: delay.as_secs() as libc::time_t,
                tv_nsec: delay.subsec_nanos() as libc::c_long,
            },
        };

        self.deadline = Some(deadline);
        signal::reset_timer_expired();
        let rc = unsafe { libc::timer_settime(self.timer, 0, &spec, std::ptr::null_mut()) };
        if rc != 0 {
            // The loop still wakes up through its poll timeout
            log::error!(
                "could not arm scheduler timer: {}",
                std::io::Error::last_os_error()
            );
        }
    }

    /// The flag alone may come from an arming this one replaced, so the
    /// deadline must have passed too
    fn fired(&self) -> bool {
        signal::timer_expired() && self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Drop for SignalTimer {
    fn drop(&mut self) {
        unsafe {
            libc::timer_delete(self.timer);
        }
        if let Err(e) = signal::restore_timer_handler() {
            log::warn!("could not restore SIGALRM handler: {}", e);
        }
    }
}
