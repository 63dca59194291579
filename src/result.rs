//! The closed operation-result contract shared by every container.
//!
//! Every public container operation (`insert`, `pop`, `search`, `delete`,
//! `verify`) returns exactly one [`OpResult`] by value. It deliberately is
//! not `Result<T, E>` so its layout is stable across the arena boundary and
//! so callers can match on every outcome without an `Err` branch hiding the
//! transient-vs-fatal distinction described in spec.md §7.

/// Outcome of a single container operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpResult {
    /// The operation completed and any side effect is visible.
    Success,
    /// Dequeue on empty, search miss, or delete of an absent key.
    NotFound,
    /// A bounded container rejected an insert because it is full.
    Full,
    /// The arena allocator is exhausted.
    NoMem,
    /// Insert found an existing key in a container that forbids duplicates.
    Exists,
    /// A transient state was observed (stalled MPSC producer, flagged BST
    /// update); the caller should retry.
    Busy,
    /// An argument violated a precondition, or a bounded retry count was
    /// exceeded.
    Invalid,
    /// `verify` detected a broken invariant.
    Corrupt,
}

impl OpResult {
    /// True for `Success`.
    pub fn is_success(self) -> bool {
        matches!(self, OpResult::Success)
    }

    /// True for the transient outcomes a caller may reasonably retry:
    /// `Busy` (a stalled producer or an in-progress BST update was
    /// observed) and `Full` (a bounded container may have room again after
    /// a concurrent `pop`).
    pub fn is_transient(self) -> bool {
        matches!(self, OpResult::Busy | OpResult::Full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_classification() {
        assert!(OpResult::Success.is_success());
        assert!(!OpResult::Busy.is_success());
    }

    #[test]
    fn transient_classification() {
        assert!(OpResult::Busy.is_transient());
        assert!(OpResult::Full.is_transient());
        assert!(!OpResult::Corrupt.is_transient());
    }
}
