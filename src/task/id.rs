// src/task/id.rs

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque ID that uniquely identifies a task within the process.
///
/// IDs are assigned at construction, increase monotonically and are never
/// reused. They exist mainly so log output can name tasks that were created
/// without a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        TaskId(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let n = 64;
        let ids: HashSet<TaskId> = (0..n).map(|_| TaskId::next()).collect();
        assert_eq!(ids.len(), n);
    }
}
