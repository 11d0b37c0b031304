//! Grower
//!
//! Recursive growth of a tree from the root down. When a split is made, the
//! left subtree may be handed to a new thread while the current thread grows
//! the right one, as long as the worker budget allows it. Each call owns the
//! sample sets of its children, so a spawned worker shares nothing mutable
//! with its parent apart from the budget itself.
use crate::bitset::Bitset;
use crate::data::Matrix;
use crate::node::Node;
use crate::splitter::{partition, Splitter};
use log::debug;
use std::panic;
use std::sync::{Mutex, PoisonError};
use std::thread;

/// A bound on the number of threads growing subtrees at once.
///
/// The thread that starts training counts as the first worker, so a budget
/// of one never spawns.
#[derive(Debug)]
pub struct WorkerBudget {
    live: Mutex<usize>,
    max_workers: usize,
}

/// A reserved worker slot, released when dropped.
pub struct WorkerSlot<'a> {
    budget: &'a WorkerBudget,
}

impl WorkerBudget {
    pub fn new(max_workers: usize) -> Self {
        WorkerBudget {
            live: Mutex::new(1),
            max_workers,
        }
    }

    /// Reserve a slot for a new worker, if the budget is not exhausted.
    pub fn try_reserve(&self) -> Option<WorkerSlot<'_>> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if *live < self.max_workers {
            *live += 1;
            Some(WorkerSlot { budget: self })
        } else {
            None
        }
    }

    /// Number of workers currently alive, including the training thread.
    pub fn live(&self) -> usize {
        *self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        let mut live = self.budget.live.lock().unwrap_or_else(PoisonError::into_inner);
        *live -= 1;
    }
}

/// Grows a tree over a fixed dataset with a given splitter.
pub struct Grower<'a, S: Splitter> {
    pub data: &'a Matrix<'a, f32>,
    pub splitter: &'a S,
    pub max_depth: usize,
    pub budget: &'a WorkerBudget,
}

impl<S: Splitter> Grower<'_, S> {
    /// Grow the tree over all rows of the data.
    pub fn grow_root(&self) -> Node {
        self.grow(&Bitset::full(self.data.rows), 0)
    }

    /// Grow the subtree for the active samples, found at `depth` splits below the root.
    pub fn grow(&self, active: &Bitset, depth: usize) -> Node {
        if depth >= self.max_depth || self.splitter.is_pure(active) {
            return Node::leaf(self.splitter.leaf_value(active));
        }

        let Some(split) = self.splitter.best_split(self.data, active) else {
            return Node::leaf(self.splitter.leaf_value(active));
        };
        let (left_active, right_active) = partition(self.data, active, &split);

        let (left, right) = match self.budget.try_reserve() {
            Some(_slot) => {
                debug!(
                    "Growing left subtree at depth {} on a new worker ({} live).",
                    depth + 1,
                    self.budget.live()
                );
                thread::scope(|s| {
                    let handle = s.spawn(|| self.grow(&left_active, depth + 1));
                    let right = self.grow(&right_active, depth + 1);
                    let left = handle.join().unwrap_or_else(|e| panic::resume_unwind(e));
                    (left, right)
                })
            }
            None => (
                self.grow(&left_active, depth + 1),
                self.grow(&right_active, depth + 1),
            ),
        };

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            comparison: split.comparison,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
