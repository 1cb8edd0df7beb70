//! Cooperative turn queue for deferred continuations.
//!
//! The shell calls `run_turn()` once per frame (or scheduling tick). Work
//! deferred during a turn runs on the next one, never inline, so a
//! continuation can't observe a viewport whose setup is still finishing in
//! the current turn.
//!
//! ```ignore
//! // On join:
//! turns.defer("catch-up viewer-2", move || coordinator.catch_up(..));
//!
//! // In update loop:
//! turns.run_turn();
//! ```

use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// FIFO queue of continuations, drained one turn at a time.
#[derive(Clone, Default)]
pub struct TurnQueue {
    pending: Arc<Mutex<Vec<(String, Continuation)>>>,
    turn: Arc<AtomicU64>,
}

impl std::fmt::Debug for TurnQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnQueue")
            .field("turn", &self.turn())
            .field("pending", &self.pending())
            .finish()
    }
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` for the next turn.
    pub fn defer<F>(&self, label: impl Into<String>, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let label = label.into();
        trace!("TurnQueue: deferred '{}'", label);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((label, Box::new(task)));
    }

    /// Run everything deferred before this call. Returns the number of tasks run.
    pub fn run_turn(&self) -> usize {
        let tasks = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        let turn = self.turn.fetch_add(1, Ordering::Relaxed) + 1;
        let count = tasks.len();
        for (label, task) in tasks {
            trace!("TurnQueue: turn {} running '{}'", turn, label);
            task();
        }
        count
    }

    /// Number of tasks waiting for the next turn
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop all pending tasks without running them. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        dropped.len()
    }

    /// Number of completed turns
    pub fn turn(&self) -> u64 {
        self.turn.load(Ordering::Relaxed)
    }
}
