// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core RTPS value types: GUIDs, sequence numbers, counts, locators.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// GUID prefix length (12 bytes).
pub const GUID_PREFIX_LEN: usize = 12;
/// Entity ID length (4 bytes).
pub const ENTITY_ID_LEN: usize = 4;

/// Participant GUID prefix.
pub type GuidPrefix = [u8; GUID_PREFIX_LEN];

/// RTPS Entity ID (4 bytes: 3-byte key + kind octet).
pub type EntityId = [u8; ENTITY_ID_LEN];

/// RTPS constant: ENTITYID_UNKNOWN.
pub const ENTITYID_UNKNOWN: EntityId = [0x00, 0x00, 0x00, 0x00];

/// All-zero GUID prefix.
pub const GUIDPREFIX_UNKNOWN: GuidPrefix = [0; GUID_PREFIX_LEN];

/// 16-byte endpoint identifier: participant prefix + entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid {
    pub prefix: GuidPrefix,
    pub entity_id: EntityId,
}

impl Guid {
    /// Build a GUID from its two wire components.
    #[must_use]
    pub const fn new(prefix: GuidPrefix, entity_id: EntityId) -> Self {
        Self { prefix, entity_id }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.prefix {
            write!(f, "{:02X}", b)?;
        }
        write!(f, ".")?;
        for b in self.entity_id {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

// ============================================================================
// SequenceNumber
// ============================================================================

/// 64-bit RTPS sequence number, carried wire-side as `{high: i32, low: u32}`.
///
/// The reserved wire pattern `{-1, 0}` (SEQUENCENUMBER_UNKNOWN) is modeled
/// as a distinct variant instead of a magic value; everything `Known` is a
/// plain `i64`, so increments crossing the low-word boundary need no
/// special casing. Derived ordering puts `Unknown` below every `Known`
/// value, which matches the numeric order of the wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SequenceNumber {
    #[default]
    Unknown,
    Known(i64),
}

impl SequenceNumber {
    /// First valid publish number (wire `{0, 1}`).
    pub const FIRST: Self = Self::Known(1);

    /// Decode from the wire pair; `{-1, 0}` maps to `Unknown`.
    #[must_use]
    pub fn from_wire(high: i32, low: u32) -> Self {
        if high == -1 && low == 0 {
            Self::Unknown
        } else {
            Self::Known((i64::from(high) << 32) | i64::from(low))
        }
    }

    /// Encode to the wire pair; `Unknown` emits `{-1, 0}`.
    #[must_use]
    pub fn to_wire(self) -> (i32, u32) {
        match self {
            Self::Unknown => (-1, 0),
            Self::Known(v) => ((v >> 32) as i32, v as u32),
        }
    }

    /// Numeric value, when known.
    #[must_use]
    pub fn value(self) -> Option<i64> {
        match self {
            Self::Unknown => None,
            Self::Known(v) => Some(v),
        }
    }

    #[must_use]
    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Successor; `Unknown.next()` is the first valid publish number.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Unknown => Self::FIRST,
            Self::Known(v) => Self::Known(v.saturating_add(1)),
        }
    }

    /// Pre-increment: advance in place and return the new value.
    pub fn advance(&mut self) -> Self {
        *self = self.next();
        *self
    }

    /// Post-increment: return the current value, then advance in place.
    pub fn fetch_advance(&mut self) -> Self {
        let current = *self;
        *self = self.next();
        current
    }

    /// Saturating addition of an offset to a known number.
    #[must_use]
    pub fn add(self, offset: i64) -> Self {
        match self {
            Self::Unknown => Self::Unknown,
            Self::Known(v) => Self::Known(v.saturating_add(offset)),
        }
    }

    /// Distance `self - other` when both are known.
    #[must_use]
    pub fn distance_from(self, other: Self) -> Option<i64> {
        match (self, other) {
            (Self::Known(a), Self::Known(b)) => Some(a - b),
            _ => None,
        }
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "SN_UNKNOWN"),
            Self::Known(v) => write!(f, "SN({})", v),
        }
    }
}

// ============================================================================
// Count
// ============================================================================

/// Heartbeat / acknack counter.
///
/// Monotonically nondecreasing; a received message is dropped unless its
/// count strictly exceeds the last count seen from that peer.
pub type Count = u32;

// ============================================================================
// Locator
// ============================================================================

/// Locator kind for UDP over IPv4.
pub const LOCATOR_KIND_UDPV4: i32 = 1;
/// Locator kind marking an unset locator.
pub const LOCATOR_KIND_INVALID: i32 = -1;

/// Network destination: protocol kind + port + IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    pub kind: i32,
    pub port: u32,
    pub address: Ipv4Addr,
}

impl Locator {
    /// UDPv4 locator for the given destination.
    #[must_use]
    pub const fn udpv4(address: Ipv4Addr, port: u16) -> Self {
        Self {
            kind: LOCATOR_KIND_UDPV4,
            port: port as u32,
            address,
        }
    }

    /// Unset locator.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            kind: LOCATOR_KIND_INVALID,
            port: 0,
            address: Ipv4Addr::UNSPECIFIED,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.kind == LOCATOR_KIND_UDPV4 && self.port != 0 && self.port <= u32::from(u16::MAX)
    }

    /// Socket address, when this locator is a usable UDPv4 destination.
    #[must_use]
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        if !self.is_valid() {
            return None;
        }
        Some(SocketAddr::V4(SocketAddrV4::new(
            self.address,
            self.port as u16,
        )))
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::invalid()
    }
}

// ============================================================================
// ChangeKind / TopicKind
// ============================================================================

/// Lifecycle kind of a published sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeKind {
    #[default]
    Invalid,
    Alive,
    NotAliveDisposed,
    NotAliveUnregistered,
}

/// Whether the topic carries instance keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    NoKey,
    WithKey,
}

impl ChangeKind {
    /// Whether a writer on a topic of `topic_kind` accepts this kind.
    ///
    /// NO_KEY topics have no instances to dispose or unregister, so only
    /// `Alive` is relevant; WITH_KEY topics reject only `Invalid`.
    #[must_use]
    pub fn relevant_for(self, topic_kind: TopicKind) -> bool {
        match topic_kind {
            TopicKind::NoKey => matches!(self, Self::Alive),
            TopicKind::WithKey => !matches!(self, Self::Invalid),
        }
    }
}
