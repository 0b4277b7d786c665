// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-matched-writer receive state kept by a stateful reader.
//!
//! The reader buffers nothing out of order: `expected_sn` is the single
//! cursor, advanced only on exact in-order delivery. Everything the
//! writer announces at or beyond the cursor is reported missing.

use crate::protocol::submessages::SequenceNumberSet;
use crate::protocol::types::{Count, Guid, Locator, SequenceNumber};

/// Receive-side record of one matched remote writer.
#[derive(Debug, Clone)]
pub struct WriterProxy {
    pub remote_writer_guid: Guid,
    pub remote_locator: Locator,
    /// Last accepted heartbeat count (anti-replay).
    pub hb_count: Option<Count>,
    /// Next in-order sequence number awaited from this writer.
    pub expected_sn: SequenceNumber,
    acknack_count: Count,
}

impl Default for WriterProxy {
    fn default() -> Self {
        Self {
            remote_writer_guid: Guid::default(),
            remote_locator: Locator::invalid(),
            hb_count: None,
            expected_sn: SequenceNumber::FIRST,
            acknack_count: 0,
        }
    }
}

impl WriterProxy {
    /// Proxy for a freshly matched writer; delivery starts at `{0,1}`.
    #[must_use]
    pub fn new(remote_writer_guid: Guid, remote_locator: Locator) -> Self {
        Self {
            remote_writer_guid,
            remote_locator,
            ..Self::default()
        }
    }

    /// Whether an incoming HEARTBEAT with `count` supersedes the last one.
    #[must_use]
    pub fn accepts_heartbeat_count(&self, count: Count) -> bool {
        match self.hb_count {
            None => true,
            Some(last) => count > last,
        }
    }

    /// Sequence-number set for the ACKNACK reply to a heartbeat
    /// announcing `[first_sn, last_sn]`.
    ///
    /// Base is `expected_sn`; a bit is set for every announced number at
    /// or beyond the cursor (nothing below `first_sn` can still arrive,
    /// and nothing below the cursor is wanted).
    #[must_use]
    pub fn missing(&self, first_sn: SequenceNumber, last_sn: SequenceNumber) -> SequenceNumberSet {
        let mut set = SequenceNumberSet::empty(self.expected_sn);
        let (Some(first), Some(last)) = (first_sn.value(), last_sn.value()) else {
            return set;
        };
        let Some(expected) = self.expected_sn.value() else {
            return set;
        };

        let mut sn = expected.max(first);
        while sn <= last {
            if !set.insert(SequenceNumber::Known(sn)) {
                // Past the 256-bit window; the rest rides the next round.
                break;
            }
            sn += 1;
        }
        set
    }

    /// Increment and return the outgoing ACKNACK counter.
    pub fn next_acknack_count(&mut self) -> Count {
        self.acknack_count = self.acknack_count.wrapping_add(1);
        self.acknack_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn proxy() -> WriterProxy {
        WriterProxy::new(
            Guid::new([3; 12], [0, 0, 0, 0x03]),
            Locator::udpv4(Ipv4Addr::LOCALHOST, 7413),
        )
    }

    fn sn(v: i64) -> SequenceNumber {
        SequenceNumber::Known(v)
    }

    #[test]
    fn test_fresh_proxy_expects_first() {
        let p = proxy();
        assert_eq!(p.expected_sn, SequenceNumber::FIRST);
        assert!(p.accepts_heartbeat_count(0));
    }

    #[test]
    fn test_missing_covers_whole_announced_window() {
        let p = proxy();
        let set = p.missing(sn(1), sn(5));
        assert_eq!(set.base(), sn(1));
        let members: Vec<_> = set.iter().collect();
        assert_eq!(members, vec![sn(1), sn(2), sn(3), sn(4), sn(5)]);
    }

    #[test]
    fn test_missing_starts_at_cursor() {
        let mut p = proxy();
        p.expected_sn = sn(4);
        let set = p.missing(sn(1), sn(6));
        assert_eq!(set.base(), sn(4));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![sn(4), sn(5), sn(6)]);
    }

    #[test]
    fn test_missing_empty_when_caught_up() {
        let mut p = proxy();
        p.expected_sn = sn(6);
        let set = p.missing(sn(1), sn(5));
        assert_eq!(set.base(), sn(6));
        assert!(set.is_empty());
    }

    #[test]
    fn test_missing_skips_below_first() {
        // Writer's window moved past the cursor; only [first, last] is
        // requestable, but the base still reports the cursor.
        let mut p = proxy();
        p.expected_sn = sn(1);
        let set = p.missing(sn(3), sn(4));
        assert_eq!(set.base(), sn(1));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![sn(3), sn(4)]);
    }

    #[test]
    fn test_acknack_count_strictly_increases() {
        let mut p = proxy();
        let a = p.next_acknack_count();
        let b = p.next_acknack_count();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_heartbeat_count_monotonic() {
        let mut p = proxy();
        p.hb_count = Some(7);
        assert!(!p.accepts_heartbeat_count(7));
        assert!(!p.accepts_heartbeat_count(3));
        assert!(p.accepts_heartbeat_count(8));
    }
}
