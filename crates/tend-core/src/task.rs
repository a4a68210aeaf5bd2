//! Units of convergence work.
//!
//! Tasks are planned fresh every cycle and executed in key order:
//! resource priority (highest first), then operation rank, then the
//! sequence number assigned at creation.

use crate::resource::{GroupKey, Resource};
use std::cmp::{Ordering, Reverse};
use tend_schema::{ResourceState, ResourceUrl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOp {
    /// Put the content into the runtime; no runtime copy exists.
    Install,
    /// Replace the runtime copy with this resource's content.
    Update,
    /// Take the entity out of the runtime, then move to `target`.
    Remove { target: ResourceState },
    /// Record a state without touching the runtime.
    ChangeState(ResourceState),
}

impl TaskOp {
    /// Bookkeeping first, then removals, so that a replacement never lands
    /// on top of a copy that is about to be removed.
    fn rank(self) -> u8 {
        match self {
            Self::ChangeState(_) => 0,
            Self::Remove { .. } => 1,
            Self::Update => 2,
            Self::Install => 3,
        }
    }

    pub fn touches_runtime(self) -> bool {
        !matches!(self, Self::ChangeState(_))
    }
}

impl std::fmt::Display for TaskOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Update => f.write_str("update"),
            Self::Remove { target } => write!(f, "remove -> {target}"),
            Self::ChangeState(state) => write!(f, "state -> {state}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub key: GroupKey,
    pub url: ResourceUrl,
    pub op: TaskOp,
    pub priority: i32,
    pub sequence: u64,
}

impl Task {
    pub fn new(resource: &Resource, op: TaskOp, sequence: u64) -> Self {
        Self {
            key: resource.key(),
            url: resource.url.clone(),
            op,
            priority: resource.priority,
            sequence,
        }
    }

    fn sort_key(&self) -> (Reverse<i32>, u8, u64) {
        (Reverse(self.priority), self.op.rank(), self.sequence)
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.op, self.url, self.key)
    }
}

/// Hands out task sequence numbers.
#[derive(Debug, Default)]
pub struct TaskSequence(u64);

impl TaskSequence {
    pub fn next(&mut self) -> u64 {
        let n = self.0;
        self.0 += 1;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tend_schema::ResourceKind;

    fn task(priority: i32, op: TaskOp, sequence: u64) -> Task {
        Task {
            key: GroupKey::new(ResourceKind::Config, format!("e{sequence}")),
            url: ResourceUrl::from(format!("u{sequence}")),
            op,
            priority,
            sequence,
        }
    }

    #[test]
    fn executes_by_priority_then_rank_then_sequence() {
        let mut pending = BTreeSet::new();
        pending.insert(task(5, TaskOp::Install, 0));
        pending.insert(task(10, TaskOp::Install, 1));
        pending.insert(task(10, TaskOp::Remove { target: ResourceState::Ignored }, 2));
        pending.insert(task(10, TaskOp::Install, 3));
        pending.insert(task(10, TaskOp::ChangeState(ResourceState::Installed), 4));

        let order: Vec<u64> = std::iter::from_fn(|| pending.pop_first())
            .map(|t| t.sequence)
            .collect();
        assert_eq!(order, [4, 2, 1, 3, 0]);
    }
}
