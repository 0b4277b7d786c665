// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rtps-micro - Embedded-profile RTPS reliable endpoints
//!
//! A small Rust implementation of the reliable stateful endpoint pair of
//! the RTPS wire protocol (the interoperability protocol underlying DDS),
//! built for hard resource bounds: fixed-capacity history, fixed-capacity
//! peer pools, no heap growth on the publish or receive paths.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rtps_micro::core::{ReaderProxy, StatefulWriter, WriterConfig};
//! use rtps_micro::dispatch::ThreadPoolDispatch;
//! use rtps_micro::protocol::types::{ChangeKind, Guid, Locator, TopicKind};
//! use rtps_micro::transport::UdpTransport;
//!
//! fn main() -> rtps_micro::Result<()> {
//!     let transport = Arc::new(UdpTransport::new(0)?);
//!     let dispatch = Arc::new(ThreadPoolDispatch::new()?);
//!
//!     let guid = Guid::new([1; 12], [0, 0, 0, 0x02]);
//!     let writer = StatefulWriter::new(
//!         WriterConfig::new(guid, "sensors/temperature", TopicKind::NoKey),
//!         transport,
//!         dispatch,
//!     )?;
//!
//!     // Matched readers arrive from discovery (external to this crate).
//!     writer.add_matched_reader(ReaderProxy::new(
//!         Guid::new([2; 12], [0, 0, 0, 0x04]),
//!         Locator::udpv4("192.168.1.20".parse().unwrap(), 7411),
//!     ))?;
//!
//!     let _ = writer.new_change(ChangeKind::Alive, &[0, 1, 2, 3, 4]);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Entity Layer (core)                     |
//! |   StatefulWriter / StatefulReader + proxies + dispatcher     |
//! +--------------------------------------------------------------+
//! |                     Storage Layer (storage)                  |
//! |   HistoryCache ring          |   MemoryPool bitmap container |
//! +--------------------------------------------------------------+
//! |                    Protocol Layer (protocol)                 |
//! |   Guid / SequenceNumber / Locator  |  submessage wire codec  |
//! +--------------------------------------------------------------+
//! |               Transport + Dispatch (transport, dispatch)     |
//! |   UDP/IPv4 driver behind a trait   |  bounded worker pool    |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Scope
//!
//! Discovery (SPDP/SEDP), CDR payload serialization, fragmentation,
//! security, and QoS beyond RELIABLE/BEST_EFFORT with history depth are
//! external collaborators; endpoint matching is fed in through
//! `add_matched_reader` / `add_matched_writer`.
//!
//! ## See Also
//!
//! - [RTPS Specification](https://www.omg.org/spec/DDSI-RTPS/2.5/)

/// Global configuration constants (resource bounds, ports, timing).
pub mod config;
/// Entity state machines (stateful writer/reader, message dispatcher).
pub mod core;
/// Worker dispatch contract and the bounded thread-pool implementation.
pub mod dispatch;
/// Crate-wide error type.
pub mod error;
/// RTPS protocol layer (value types, submessages, wire codec).
pub mod protocol;
/// Bounded storage primitives (history cache, memory pool).
pub mod storage;
/// Transport abstraction and the UDP/IPv4 driver.
pub mod transport;

pub use crate::core::{
    MessageReceiver, ReaderCacheChange, ReaderConfig, ReaderProxy, StatefulReader, StatefulWriter,
    WriterConfig, WriterProxy,
};
pub use dispatch::{ProgressUnit, ThreadPoolDispatch, WorkerDispatch};
pub use error::{Error, Result};
pub use protocol::types::{ChangeKind, Guid, Locator, SequenceNumber, TopicKind};
pub use storage::{CacheChange, HistoryCache, MemoryPool};
pub use transport::{PacketInfo, Transport, UdpTransport};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
