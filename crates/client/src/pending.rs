//! Queue of moves sent to the authority but not yet covered by a snapshot.
//!
//! The owning client appends one entry per simulation step and prunes on
//! every snapshot arrival: a snapshot's `last_move.timestamp` acknowledges
//! every move at or before it. Entries are kept in timestamp order; after a
//! prune, every remaining move is strictly newer than the acknowledgement.

use std::collections::VecDeque;

use slipstream_sim::{MoveCommand, Seconds};

/// Ordered queue of unacknowledged moves.
///
/// There is no cancellation: a move leaves the queue only by being
/// acknowledged (directly or superseded by a later accepted move). A stalled
/// authority therefore grows the queue without bound; the predictor surfaces
/// that through a log warning rather than dropping input.
#[derive(Debug, Default)]
pub struct PendingMoves {
    queue: VecDeque<MoveCommand>,
}

impl PendingMoves {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Append a freshly sent move.
    ///
    /// Producers create moves with non-decreasing timestamps, which keeps the
    /// queue sorted without ever re-sorting.
    pub fn push(&mut self, mv: MoveCommand) {
        debug_assert!(
            self.queue.back().is_none_or(|last| last.timestamp <= mv.timestamp),
            "moves must be queued in timestamp order"
        );
        self.queue.push_back(mv);
    }

    /// Drop every move the given snapshot move accounts for.
    ///
    /// Returns how many entries were removed. Afterwards every remaining
    /// entry has `timestamp > last_move.timestamp`.
    pub fn clear_acknowledged(&mut self, last_move: &MoveCommand) -> usize {
        let before = self.queue.len();
        self.queue.retain(|mv| mv.timestamp > last_move.timestamp);
        before - self.queue.len()
    }

    /// Remaining moves, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MoveCommand> {
        self.queue.iter()
    }

    /// Timestamp of the newest queued move, if any.
    pub fn newest_timestamp(&self) -> Option<Seconds> {
        self.queue.back().map(|mv| mv.timestamp)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
