use std::cell::RefCell;

/// Identifies one scheduled task for cancellation.
pub type TaskId = u64;

///
/// Scheduler
///
/// Timer seam for `delay` and `buffer` listener options. The core never owns
/// a clock; hosts install whatever timing source they have, and tests drive
/// a [`ManualScheduler`] by hand.
///

pub trait Scheduler {
    /// Schedule `task` to run once after `delay_ms` milliseconds.
    fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TaskId;

    /// Cancel a pending task. Unknown or already-run ids are a no-op.
    fn cancel(&self, task: TaskId);
}

///
/// ManualScheduler
///
/// Deterministic scheduler driven by explicit `advance` calls.
///

#[derive(Default)]
pub struct ManualScheduler {
    inner: RefCell<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    now: u64,
    next_id: TaskId,
    tasks: Vec<ManualTask>,
}

struct ManualTask {
    id: TaskId,
    due: u64,
    task: Box<dyn FnOnce()>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current manual clock reading in milliseconds.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.inner.borrow().now
    }

    /// Number of tasks still pending.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// Advance the clock and run every task that falls due, in due order.
    ///
    /// Tasks scheduled by running tasks land in the pending set and only run
    /// if a later `advance` reaches them.
    pub fn advance(&self, ms: u64) {
        let due = {
            let mut inner = self.inner.borrow_mut();
            inner.now += ms;
            let now = inner.now;

            let mut due: Vec<ManualTask> = Vec::new();
            let mut remaining = Vec::new();
            for task in inner.tasks.drain(..) {
                if task.due <= now {
                    due.push(task);
                } else {
                    remaining.push(task);
                }
            }
            inner.tasks = remaining;
            due.sort_by_key(|task| (task.due, task.id));
            due
        };

        for entry in due {
            (entry.task)();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TaskId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        let due = inner.now + delay_ms;
        inner.tasks.push(ManualTask { id, due, task });
        id
    }

    fn cancel(&self, task: TaskId) {
        self.inner.borrow_mut().tasks.retain(|entry| entry.id != task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn advance_runs_due_tasks_in_order() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (delay, tag) in [(20_u64, "b"), (10, "a"), (30, "c")] {
            let log = Rc::clone(&log);
            scheduler.schedule(delay, Box::new(move || log.borrow_mut().push(tag)));
        }

        scheduler.advance(25);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(5);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn cancel_drops_a_pending_task() {
        let scheduler = ManualScheduler::new();
        let ran = Rc::new(Cell::new(false));

        let flag = Rc::clone(&ran);
        let id = scheduler.schedule(10, Box::new(move || flag.set(true)));
        scheduler.cancel(id);
        scheduler.advance(20);

        assert!(!ran.get());
    }
}
