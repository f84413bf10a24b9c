//! Bounded undo-log of document states.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Default snapshot bound.
pub const DEFAULT_MAX_SNAPSHOTS: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => panic!("snapshot bound must be non-zero"),
};

/// A saved copy of the document, taken right before `stage_name` ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<D> {
    /// The stage this snapshot precedes.
    pub stage_name: String,
    /// The document state before the stage ran.
    pub document: D,
    /// Monotonically increasing sequence number.
    pub sequence_number: u64,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// An ordered, bounded history of [`Snapshot`]s.
///
/// Holds at most `max_snapshots` entries; the oldest (smallest sequence
/// number) is evicted first once the bound is exceeded.
#[derive(Debug, Clone)]
pub struct SnapshotStore<D> {
    snapshots: VecDeque<Snapshot<D>>,
    max_snapshots: NonZeroUsize,
    next_sequence: u64,
    evicted: u64,
}

impl<D> Default for SnapshotStore<D> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SNAPSHOTS)
    }
}

impl<D> SnapshotStore<D> {
    /// Creates an empty store with the given bound.
    #[must_use]
    pub fn new(max_snapshots: NonZeroUsize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            max_snapshots,
            next_sequence: 0,
            evicted: 0,
        }
    }

    /// Appends a snapshot and evicts the oldest ones beyond the bound.
    ///
    /// Returns the sequence number assigned to the new snapshot.
    pub fn push(&mut self, stage_name: impl Into<String>, document: D) -> u64 {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        self.snapshots.push_back(Snapshot {
            stage_name: stage_name.into(),
            document,
            sequence_number,
            taken_at: Utc::now(),
        });
        self.enforce_bound();

        sequence_number
    }

    /// Changes the bound, evicting oldest snapshots if it shrank.
    pub fn set_max_snapshots(&mut self, max_snapshots: NonZeroUsize) {
        self.max_snapshots = max_snapshots;
        self.enforce_bound();
    }

    fn enforce_bound(&mut self) {
        while self.snapshots.len() > self.max_snapshots.get() {
            if let Some(oldest) = self.snapshots.pop_front() {
                self.evicted += 1;
                tracing::debug!(
                    stage = %oldest.stage_name,
                    sequence = oldest.sequence_number,
                    "Evicted snapshot"
                );
            }
        }
    }

    /// Number of retained snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if no snapshot is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The configured bound.
    #[must_use]
    pub fn max_snapshots(&self) -> NonZeroUsize {
        self.max_snapshots
    }

    /// How many snapshots were evicted so far.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<&Snapshot<D>> {
        self.snapshots.back()
    }

    /// Retained snapshots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot<D>> {
        self.snapshots.iter()
    }

    /// Sequence numbers of the retained snapshots, oldest first.
    #[must_use]
    pub fn sequence_numbers(&self) -> Vec<u64> {
        self.snapshots.iter().map(|s| s.sequence_number).collect()
    }

    /// Drops every snapshot. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

impl<D: Clone> SnapshotStore<D> {
    /// Returns the document saved before the most recent run of `stage_name`.
    ///
    /// Snapshots newer than the match are discarded. Returns `None` when no
    /// snapshot for the stage is retained (never taken, or already evicted).
    pub fn restore_to(&mut self, stage_name: &str) -> Option<D> {
        let index = self
            .snapshots
            .iter()
            .rposition(|s| s.stage_name == stage_name)?;

        let discarded = self.snapshots.len() - index - 1;
        self.snapshots.truncate(index + 1);
        if discarded > 0 {
            tracing::debug!(stage = %stage_name, discarded, "Discarded newer snapshots");
        }

        self.snapshots.get(index).map(|s| s.document.clone())
    }
}
