//! Cooperative task queue.
//!
//! Everything that has to happen "later" is a [`Task`] posted at one of a few
//! named [`Priority`] tiers, optionally behind a timer. Nothing runs on
//! another thread; the embedder drains the queue from the same loop that
//! delivers host notifications and key presses.
//!
//! Tasks carry the identity of what they were scheduled for (a surface, a
//! context stamp). Whoever runs a task re-checks that identity and drops the
//! task if it went stale in the meantime. There is no cancellation.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::time::Instant;

use crate::navigation::context::ContextId;
use crate::scanner::SurfaceId;

/// Execution tiers, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// As soon as pending input has been handled.
    Input,
    /// After the current layout pass.
    Layout,
    /// After freshly created surfaces have settled into position.
    Settled,
    /// When nothing else is pending. Teardown has finished by then.
    Idle,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Input,
        Priority::Layout,
        Priority::Settled,
        Priority::Idle,
    ];

    fn index(self) -> usize {
        match self {
            Priority::Input => 0,
            Priority::Layout => 1,
            Priority::Settled => 2,
            Priority::Idle => 3,
        }
    }
}

/// Deferred work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// A surface's trailing scan timer fired.
    TrailingScan { surface: SurfaceId },
    /// Pick the initial focus of a freshly pushed context.
    InitFocus { context: ContextId },
    /// Restore focus in a context that became the top again.
    RestoreFocus { context: ContextId },
    /// Re-pick focus after the focused node was unloaded.
    ReinitFocus { context: ContextId },
}

#[derive(Debug)]
struct Timer {
    due: Instant,
    seq: u64,
    priority: Priority,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Priority task queue with timers.
#[derive(Debug, Default)]
pub struct Scheduler {
    ready: [VecDeque<Task>; 4],
    timers: BinaryHeap<Reverse<Timer>>,
    seq: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task to run at the given tier.
    pub fn post(&mut self, priority: Priority, task: Task) {
        self.ready[priority.index()].push_back(task);
    }

    /// Queue a task to become ready at `due`.
    pub fn post_at(&mut self, due: Instant, priority: Priority, task: Task) {
        self.seq += 1;
        self.timers.push(Reverse(Timer {
            due,
            seq: self.seq,
            priority,
            task,
        }));
    }

    /// Next task to run at `now`, highest tier first, FIFO within a tier.
    pub fn pop_ready(&mut self, now: Instant) -> Option<Task> {
        while self
            .timers
            .peek()
            .is_some_and(|Reverse(timer)| timer.due <= now)
        {
            if let Some(Reverse(timer)) = self.timers.pop() {
                self.ready[timer.priority.index()].push_back(timer.task);
            }
        }
        self.ready.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Whether a task is runnable without waiting.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        self.ready.iter().any(|q| !q.is_empty())
    }

    /// Earliest timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.peek().map(|Reverse(timer)| timer.due)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ready.iter().map(VecDeque::len).sum::<usize>() + self.timers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        for queue in &mut self.ready {
            queue.clear();
        }
        self.timers.clear();
    }
}
