// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer-side history cache.
//!
//! Ring of cache slots holding a contiguous run of sequence numbers
//! `[seq_min, seq_max]` for retransmission. Slot payload buffers reserve
//! their full capacity at construction and are reused on eviction, so the
//! publish path never reallocates.

use crate::config::{HISTORY_CAPACITY, MAX_PAYLOAD_SIZE};
use crate::error::Error;
use crate::protocol::types::{ChangeKind, SequenceNumber};

/// One published sample: lifecycle kind, sequence number, payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheChange {
    pub kind: ChangeKind,
    pub sequence_number: SequenceNumber,
    data: Vec<u8>,
}

impl CacheChange {
    fn with_buffer_capacity(capacity: usize) -> Self {
        Self {
            kind: ChangeKind::Invalid,
            sequence_number: SequenceNumber::Unknown,
            data: Vec::with_capacity(capacity),
        }
    }

    /// Serialized payload of the sample.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Ordered window of outgoing samples keyed by sequence number.
///
/// Invariant: either the cache is empty (both bounds `Unknown`) or
/// `seq_max - seq_min + 1 == len <= capacity`.
pub struct HistoryCache {
    slots: Box<[CacheChange]>,
    /// Slot index holding `seq_min`.
    head: usize,
    len: usize,
    seq_min: SequenceNumber,
    seq_max: SequenceNumber,
    max_payload: usize,
}

impl HistoryCache {
    /// Cache with the crate-wide capacity and payload bounds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(HISTORY_CAPACITY, MAX_PAYLOAD_SIZE)
    }

    /// Cache with explicit depth and per-slot payload bound.
    #[must_use]
    pub fn with_limits(depth: usize, max_payload: usize) -> Self {
        assert!(depth > 0, "history depth must be at least 1");
        Self {
            slots: (0..depth)
                .map(|_| CacheChange::with_buffer_capacity(max_payload))
                .collect(),
            head: 0,
            len: 0,
            seq_min: SequenceNumber::Unknown,
            seq_max: SequenceNumber::Unknown,
            max_payload,
        }
    }

    /// Store a new change under the next sequence number.
    ///
    /// When the window is full the oldest change is dropped first and
    /// `seq_min` advances. Returns a borrow of the stored change.
    pub fn add_change(&mut self, kind: ChangeKind, payload: &[u8]) -> Result<&CacheChange, Error> {
        if payload.len() > self.max_payload {
            return Err(Error::PayloadTooLarge(payload.len()));
        }

        if self.len == self.slots.len() {
            log::debug!(
                "[HistoryCache::add_change] window full, evicting {}",
                self.seq_min
            );
            self.head = (self.head + 1) % self.slots.len();
            self.seq_min = self.seq_min.next();
            self.len -= 1;
        }

        let sn = self.seq_max.next();
        let slot_idx = (self.head + self.len) % self.slots.len();
        let slot = &mut self.slots[slot_idx];
        slot.kind = kind;
        slot.sequence_number = sn;
        slot.data.clear();
        slot.data.extend_from_slice(payload);

        self.seq_max = sn;
        if self.len == 0 {
            self.seq_min = sn;
        }
        self.len += 1;

        Ok(&self.slots[slot_idx])
    }

    /// O(1) lookup by sequence number; `None` outside `[seq_min, seq_max]`.
    #[must_use]
    pub fn get_change_by_sn(&self, sn: SequenceNumber) -> Option<&CacheChange> {
        let offset = self.window_offset(sn)?;
        Some(&self.slots[(self.head + offset) % self.slots.len()])
    }

    /// Mark a stored sample disposed/unregistered in place.
    pub fn set_change_kind(&mut self, sn: SequenceNumber, kind: ChangeKind) -> bool {
        let Some(offset) = self.window_offset(sn) else {
            return false;
        };
        let idx = (self.head + offset) % self.slots.len();
        self.slots[idx].kind = kind;
        true
    }

    /// Oldest retained sequence number; `Unknown` when empty.
    #[must_use]
    pub fn seq_num_min(&self) -> SequenceNumber {
        self.seq_min
    }

    /// Newest retained sequence number; `Unknown` when empty.
    #[must_use]
    pub fn seq_num_max(&self) -> SequenceNumber {
        self.seq_max
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drop every change and reset the window bounds.
    ///
    /// After `clear` numbering restarts at the first valid sequence
    /// number.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.kind = ChangeKind::Invalid;
            slot.sequence_number = SequenceNumber::Unknown;
            slot.data.clear();
        }
        self.head = 0;
        self.len = 0;
        self.seq_min = SequenceNumber::Unknown;
        self.seq_max = SequenceNumber::Unknown;
    }

    fn window_offset(&self, sn: SequenceNumber) -> Option<usize> {
        if self.len == 0 || sn < self.seq_min || sn > self.seq_max {
            return None;
        }
        let offset = sn.distance_from(self.seq_min)?;
        usize::try_from(offset).ok()
    }
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sn(v: i64) -> SequenceNumber {
        SequenceNumber::Known(v)
    }

    fn assert_window_invariant(cache: &HistoryCache) {
        if cache.is_empty() {
            assert_eq!(cache.seq_num_min(), SequenceNumber::Unknown);
            assert_eq!(cache.seq_num_max(), SequenceNumber::Unknown);
        } else {
            let span = cache
                .seq_num_max()
                .distance_from(cache.seq_num_min())
                .expect("both bounds known");
            assert_eq!(span + 1, cache.len() as i64);
            assert!(cache.len() <= cache.capacity());
        }
    }

    #[test]
    fn test_starts_empty_with_unknown_bounds() {
        let cache = HistoryCache::with_limits(4, 64);
        assert!(cache.is_empty());
        assert_window_invariant(&cache);
        assert!(cache.get_change_by_sn(sn(1)).is_none());
    }

    #[test]
    fn test_first_change_is_sequence_one() {
        let mut cache = HistoryCache::with_limits(4, 64);
        let change = cache
            .add_change(ChangeKind::Alive, b"abc")
            .expect("insert");
        assert_eq!(change.sequence_number, SequenceNumber::FIRST);
        assert_eq!(change.sequence_number.to_wire(), (0, 1));
        assert_eq!(change.data(), b"abc");
        assert_eq!(cache.seq_num_min(), sn(1));
        assert_eq!(cache.seq_num_max(), sn(1));
    }

    #[test]
    fn test_sequence_numbers_are_contiguous() {
        let mut cache = HistoryCache::with_limits(8, 64);
        for i in 1..=5 {
            let change = cache
                .add_change(ChangeKind::Alive, &[i as u8])
                .expect("insert");
            assert_eq!(change.sequence_number, sn(i));
        }
        assert_window_invariant(&cache);
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn test_eviction_advances_min() {
        let mut cache = HistoryCache::with_limits(3, 64);
        for i in 1..=5 {
            cache
                .add_change(ChangeKind::Alive, &[i as u8])
                .expect("insert");
            assert_window_invariant(&cache);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.seq_num_min(), sn(3));
        assert_eq!(cache.seq_num_max(), sn(5));
        assert!(cache.get_change_by_sn(sn(2)).is_none());
        assert_eq!(
            cache.get_change_by_sn(sn(4)).expect("in window").data(),
            &[4]
        );
    }

    #[test]
    fn test_lookup_outside_window() {
        let mut cache = HistoryCache::with_limits(4, 64);
        cache.add_change(ChangeKind::Alive, b"x").expect("insert");
        assert!(cache.get_change_by_sn(sn(0)).is_none());
        assert!(cache.get_change_by_sn(sn(2)).is_none());
        assert!(cache.get_change_by_sn(SequenceNumber::Unknown).is_none());
    }

    #[test]
    fn test_set_change_kind_in_place() {
        let mut cache = HistoryCache::with_limits(4, 64);
        cache.add_change(ChangeKind::Alive, b"x").expect("insert");
        assert!(cache.set_change_kind(sn(1), ChangeKind::NotAliveDisposed));
        assert_eq!(
            cache.get_change_by_sn(sn(1)).expect("in window").kind,
            ChangeKind::NotAliveDisposed
        );
        assert!(!cache.set_change_kind(sn(9), ChangeKind::NotAliveDisposed));
    }

    #[test]
    fn test_payload_bound_enforced() {
        let mut cache = HistoryCache::with_limits(4, 8);
        let err = cache
            .add_change(ChangeKind::Alive, &[0u8; 9])
            .expect_err("over-size payload");
        assert!(matches!(err, Error::PayloadTooLarge(9)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_resets_bounds() {
        let mut cache = HistoryCache::with_limits(4, 64);
        cache.add_change(ChangeKind::Alive, b"x").expect("insert");
        cache.add_change(ChangeKind::Alive, b"y").expect("insert");
        cache.clear();
        assert!(cache.is_empty());
        assert_window_invariant(&cache);
        let change = cache.add_change(ChangeKind::Alive, b"z").expect("insert");
        assert_eq!(change.sequence_number, SequenceNumber::FIRST);
    }

    #[test]
    fn test_ring_wraps_without_gaps() {
        let mut cache = HistoryCache::with_limits(3, 64);
        for i in 1..=10 {
            cache
                .add_change(ChangeKind::Alive, &[i as u8])
                .expect("insert");
        }
        assert_eq!(cache.seq_num_min(), sn(8));
        assert_eq!(cache.seq_num_max(), sn(10));
        for i in 8..=10 {
            assert_eq!(
                cache.get_change_by_sn(sn(i)).expect("in window").data(),
                &[i as u8]
            );
        }
        assert_window_invariant(&cache);
    }
}
