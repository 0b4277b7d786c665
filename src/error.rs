// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! Every public operation returns `Result`, an `Option`, or a bool; no
//! panic crosses the API boundary. Silent-drop conditions (stale counts,
//! unknown peers, out-of-window retransmit requests) are not errors --
//! they are normal operation of the reliability protocol and only show up
//! in the logs.

use std::fmt;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by endpoint operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Initialisation errors
    // ========================================================================
    /// Spawning the heartbeat / worker / receiver thread failed.
    ThreadSpawn(std::io::Error),
    /// Binding or configuring the transport socket failed.
    Transport(std::io::Error),

    // ========================================================================
    // Resource errors
    // ========================================================================
    /// A fixed-capacity proxy pool is full.
    PoolFull,
    /// All reader callback slots are occupied.
    CallbacksFull,
    /// Payload exceeds the per-slot buffer reserved at construction.
    PayloadTooLarge(usize),

    // ========================================================================
    // Wire errors
    // ========================================================================
    /// Outbound buffer is too small for the encoded submessage.
    BufferTooSmall,
    /// Inbound bytes do not form a valid RTPS message or submessage.
    InvalidMessage(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadSpawn(e) => write!(f, "thread spawn failed: {}", e),
            Self::Transport(e) => write!(f, "transport setup failed: {}", e),
            Self::PoolFull => write!(f, "proxy pool at capacity"),
            Self::CallbacksFull => write!(f, "all callback slots occupied"),
            Self::PayloadTooLarge(len) => {
                write!(f, "payload of {} bytes exceeds slot capacity", len)
            }
            Self::BufferTooSmall => write!(f, "buffer too small for encoding"),
            Self::InvalidMessage(msg) => write!(f, "invalid RTPS message: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ThreadSpawn(e) | Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}
