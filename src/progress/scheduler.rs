// file: src/progress/scheduler.rs
// description: scheduling turns for deferred producer execution and stop requests
// reference: single-threaded event loop model

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::trace;

/// A unit of work posted to a scheduler.
pub type Task = Box<dyn FnOnce()>;

/// Decides *when* producer execution and `stop()` requests run.
///
/// Implementations must run tasks in the order they were scheduled. A
/// [`Progress`](super::Progress) posts its producer at construction and every
/// `stop()` afterwards, so FIFO ordering guarantees the producer's teardown is
/// bound before it is invoked.
pub trait Scheduler {
    fn schedule(&self, task: Task);
}

/// Runs every task synchronously at the point it is scheduled.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl Scheduler for Immediate {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Explicit FIFO event loop. Tasks wait until the owner drives a turn.
#[derive(Default)]
pub struct TurnQueue {
    queue: RefCell<VecDeque<Task>>,
}

impl TurnQueue {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs the tasks that were queued when the turn started. Tasks scheduled
    /// while the turn is running wait for the next turn.
    pub fn run_turn(&self) -> usize {
        let batch: Vec<Task> = self.queue.borrow_mut().drain(..).collect();
        let count = batch.len();
        for task in batch {
            task();
        }
        trace!("Scheduler turn ran {} tasks", count);
        count
    }

    /// Runs turns until no task is left and returns the total executed.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_turn();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Scheduler for TurnQueue {
    fn schedule(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }
}

/// Posts each task onto the current tokio `LocalSet`.
///
/// Must be used from within `LocalSet::run_until` (or a task spawned on it).
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSpawner;

impl Scheduler for LocalSpawner {
    fn schedule(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}
