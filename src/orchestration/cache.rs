//! Enrichment cache owned by the reconciler.
//!
//! An entry belongs to one accounting epoch: a `(position_key, share_count)`
//! pair stamped with a unique epoch id. Results computed for an epoch are only
//! applied while that epoch is still the current one for the key, so late
//! writes after a share-count change, removal or reset are discarded.

use crate::domain::{
    EnrichedPosition, Position, PositionKey, ReconciliationState, RetryState, TimeMs,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Published view of every tracked position.
pub type EnrichedSnapshot = BTreeMap<PositionKey, EnrichedPosition>;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub epoch: u64,
    pub enriched: EnrichedPosition,
    pub retry: Option<RetryState>,
}

impl CacheEntry {
    pub fn share_count(&self) -> u64 {
        self.enriched.position.share_count
    }

    pub fn state(&self) -> ReconciliationState {
        self.enriched.reconciliation_state
    }
}

/// A retry that has come due, handed out once per deadline.
#[derive(Debug, Clone)]
pub struct DueRetry {
    pub position: Position,
    pub epoch: u64,
    pub attempt: u32,
}

#[derive(Debug, Default)]
pub struct EnrichmentCache {
    entries: HashMap<PositionKey, CacheEntry>,
    next_epoch: u64,
}

impl EnrichmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &PositionKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// True when `position` needs no work: same share count and a stable state.
    pub fn is_reusable(&self, position: &Position) -> bool {
        self.entries.get(&position.position_key).is_some_and(|entry| {
            entry.share_count() == position.share_count && entry.state().is_stable()
        })
    }

    /// Start a new epoch for `position`, discarding whatever was cached for the key.
    pub fn begin_epoch(&mut self, position: &Position) -> u64 {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        self.entries.insert(
            position.position_key.clone(),
            CacheEntry {
                epoch,
                enriched: EnrichedPosition::loading(position.clone()),
                retry: None,
            },
        );
        epoch
    }

    /// The entry for `key`, only if `epoch` is still current.
    pub fn epoch_entry_mut(&mut self, key: &PositionKey, epoch: u64) -> Option<&mut CacheEntry> {
        self.entries
            .get_mut(key)
            .filter(|entry| entry.epoch == epoch)
    }

    /// Drop entries whose key is not in `keep`. Returns how many were dropped.
    pub fn retain_keys(&mut self, keep: &HashSet<PositionKey>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep.contains(key));
        before - self.entries.len()
    }

    /// Forget everything, pending retries included.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Claim every retry whose deadline has passed. Claimed retries have no
    /// deadline until their result is applied, so they are handed out once.
    pub fn take_due(&mut self, now: TimeMs) -> Vec<DueRetry> {
        let mut due = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.state() != ReconciliationState::WaitingOnIndex {
                continue;
            }
            let Some(retry) = entry.retry.as_mut() else {
                continue;
            };
            if retry.next_deadline.is_some_and(|deadline| deadline <= now) {
                retry.next_deadline = None;
                due.push(DueRetry {
                    position: entry.enriched.position.clone(),
                    epoch: entry.epoch,
                    attempt: retry.attempt,
                });
            }
        }
        due
    }

    /// Entries with a retry scheduled or in flight.
    pub fn pending_retries(&self) -> usize {
        self.entries.values().filter(|e| e.retry.is_some()).count()
    }

    /// Earliest scheduled retry deadline, if any.
    pub fn next_deadline(&self) -> Option<TimeMs> {
        self.entries
            .values()
            .filter_map(|e| e.retry.and_then(|r| r.next_deadline))
            .min()
    }

    pub fn snapshot(&self) -> EnrichedSnapshot {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.enriched.clone()))
            .collect()
    }
}
