//! An interval task on a virtual clock.

use gaybar::sched::{Scheduler, Timer};
use std::cell::Cell;
use std::time::{Duration, Instant};

struct VirtualClock {
    start: Instant,
    now: Cell<Instant>,
    deadline: Option<Instant>,
}

impl VirtualClock {
    fn new() -> Self {
        let start = Instant::now();
        Self {
            start,
            now: Cell::new(start),
            deadline: None,
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.start + Duration::from_millis(ms)
    }

    fn set_ms(&self, ms: u64) {
        self.now.set(self.at(ms));
    }
}

impl Timer for VirtualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn arm(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    fn fired(&self) -> bool {
        self.deadline.is_some_and(|d| d <= self.now.get())
    }
}

#[test]
fn interval_runs_on_schedule() {
    let mut sched = Scheduler::with_timer(VirtualClock::new());
    let mut runs: Vec<Instant> = Vec::new();
    sched.interval(Duration::from_millis(1000), true, |runs: &mut Vec<Instant>, sched| {
        runs.push(sched.timer().now());
    });

    for ms in [0, 1000, 2000, 2500] {
        sched.timer().set_ms(ms);
        sched.prepare();
        sched.run(&mut runs);
    }

    let clock = sched.timer();
    assert_eq!(runs, vec![clock.at(0), clock.at(1000), clock.at(2000)]);
    assert_eq!(sched.due_deadlines(), vec![clock.at(3000)]);
    assert_eq!(sched.poll_timeout(), Some(Duration::from_millis(500)));

    sched.timer().set_ms(3000);
    sched.prepare();
    sched.run(&mut runs);
    assert_eq!(runs.len(), 4);
}

#[test]
fn idle_scheduler_blocks_forever() {
    let mut sched: Scheduler<(), VirtualClock> = Scheduler::with_timer(VirtualClock::new());
    assert_eq!(sched.poll_timeout(), None);

    let id = sched.delayed(Duration::from_millis(10), |_, _| {});
    sched.prepare();
    assert_eq!(sched.poll_timeout(), Some(Duration::from_millis(10)));
    assert!(sched.cancel(id));
    assert_eq!(sched.poll_timeout(), None);
    assert!(!sched.cancel(id));
}
