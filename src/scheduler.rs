//! Commit-phase scheduling.
//!
//! While a commit pass is in flight, native side effects that must observe
//! the finished tree are queued by priority and drained at `end_commit`:
//! removals first (so a widget is unparented before it reparents), then
//! additions, then model syncs. Nested reconciliation-root destruction is a
//! separate queue drained at the start of the next commit pass, never left
//! to ambient scheduler timing.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use tracing::trace;

type Callback = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPriority {
    /// Removals; runs first so reparenting sees a detached widget.
    High,
    /// Additions.
    Normal,
    /// Model syncs that need all data in place.
    Low,
}

impl CommitPriority {
    fn index(self) -> usize {
        match self {
            CommitPriority::High => 0,
            CommitPriority::Normal => 1,
            CommitPriority::Low => 2,
        }
    }
}

#[derive(Default)]
pub struct Scheduler {
    queues: RefCell<[VecDeque<Callback>; 3]>,
    pending_flushes: RefCell<Vec<Callback>>,
    teardowns: RefCell<Vec<Callback>>,
    in_commit: Cell<bool>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_commit(&self) -> bool {
        self.in_commit.get()
    }

    /// Marks the beginning of a driver commit pass. Pending nested-root
    /// teardowns drain here, before any new edit can observe them.
    pub fn begin_commit(&self) {
        self.drain_teardowns();
        self.in_commit.set(true);
    }

    /// Marks the end of a commit pass: drains the priority queues, then runs
    /// flush callbacks deferred during the commit.
    pub fn end_commit(&self) {
        self.flush_after_commit();
        self.in_commit.set(false);

        let pending = std::mem::take(&mut *self.pending_flushes.borrow_mut());
        for callback in pending {
            callback();
        }
    }

    /// Queue a callback for the end of the current commit pass; outside a
    /// commit it runs immediately.
    pub fn schedule_after_commit(&self, priority: CommitPriority, callback: impl FnOnce() + 'static) {
        if self.in_commit.get() {
            self.queues.borrow_mut()[priority.index()].push_back(Box::new(callback));
        } else {
            callback();
        }
    }

    /// Run a native state flush now, or defer it past the commit if one is
    /// in flight.
    pub fn schedule_flush(&self, callback: impl FnOnce() + 'static) {
        if self.in_commit.get() {
            self.pending_flushes.borrow_mut().push(Box::new(callback));
        } else {
            callback();
        }
    }

    pub fn flush_after_commit(&self) {
        // Callbacks may schedule more work; loop until all queues settle.
        loop {
            let next = {
                let mut queues = self.queues.borrow_mut();
                queues.iter_mut().find_map(|queue| queue.pop_front())
            };
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Defer destruction of a nested reconciliation root.
    pub fn defer_teardown(&self, callback: impl FnOnce() + 'static) {
        self.teardowns.borrow_mut().push(Box::new(callback));
    }

    pub fn pending_teardowns(&self) -> usize {
        self.teardowns.borrow().len()
    }

    /// Drain the teardown queue synchronously. Tests call this directly;
    /// `begin_commit` calls it on every pass.
    pub fn drain_teardowns(&self) {
        loop {
            let drained = std::mem::take(&mut *self.teardowns.borrow_mut());
            if drained.is_empty() {
                break;
            }
            trace!(count = drained.len(), "draining deferred root teardowns");
            for callback in drained {
                callback();
            }
        }
    }
}

/// Coalesces repeated `schedule` calls into a single deferred run.
#[derive(Clone)]
pub struct DeferredAction {
    action: std::rc::Rc<dyn Fn()>,
    priority: CommitPriority,
    scheduled: std::rc::Rc<Cell<bool>>,
}

impl DeferredAction {
    pub fn new(priority: CommitPriority, action: impl Fn() + 'static) -> Self {
        Self {
            action: std::rc::Rc::new(action),
            priority,
            scheduled: std::rc::Rc::new(Cell::new(false)),
        }
    }

    pub fn schedule(&self, scheduler: &Scheduler) {
        if self.scheduled.get() {
            return;
        }
        self.scheduled.set(true);
        let action = self.action.clone();
        let scheduled = self.scheduled.clone();
        scheduler.schedule_after_commit(self.priority, move || {
            scheduled.set(false);
            action();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_priority_order() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.begin_commit();
        let l = log.clone();
        scheduler.schedule_after_commit(CommitPriority::Low, move || l.borrow_mut().push("low"));
        let l = log.clone();
        scheduler.schedule_after_commit(CommitPriority::Normal, move || l.borrow_mut().push("normal"));
        let l = log.clone();
        scheduler.schedule_after_commit(CommitPriority::High, move || l.borrow_mut().push("high"));
        scheduler.end_commit();

        assert_eq!(*log.borrow(), vec!["high", "normal", "low"]);
    }

    #[test]
    fn test_outside_commit_runs_immediately() {
        let scheduler = Scheduler::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        scheduler.schedule_after_commit(CommitPriority::Normal, move || flag.set(true));
        assert!(ran.get());
    }

    #[test]
    fn test_flush_deferred_until_end_commit() {
        let scheduler = Scheduler::new();
        let ran = Rc::new(Cell::new(false));

        scheduler.begin_commit();
        let flag = ran.clone();
        scheduler.schedule_flush(move || flag.set(true));
        assert!(!ran.get());
        scheduler.end_commit();
        assert!(ran.get());
    }

    #[test]
    fn test_teardowns_drain_on_next_begin_commit() {
        let scheduler = Scheduler::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        scheduler.defer_teardown(move || flag.set(true));

        assert_eq!(scheduler.pending_teardowns(), 1);
        scheduler.begin_commit();
        scheduler.end_commit();
        assert!(ran.get());
        assert_eq!(scheduler.pending_teardowns(), 0);
    }

    #[test]
    fn test_deferred_action_coalesces() {
        let scheduler = Scheduler::new();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let action = DeferredAction::new(CommitPriority::Low, move || counter.set(counter.get() + 1));

        scheduler.begin_commit();
        action.schedule(&scheduler);
        action.schedule(&scheduler);
        action.schedule(&scheduler);
        scheduler.end_commit();
        assert_eq!(runs.get(), 1);

        // Reusable after running.
        scheduler.begin_commit();
        action.schedule(&scheduler);
        scheduler.end_commit();
        assert_eq!(runs.get(), 2);
    }
}
