// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stateful reader: reliable reception state machine.
//!
//! Two locks, acquired in a fixed order: the proxies mutex first, then
//! the callbacks mutex. The callbacks mutex is a leaf; no other lock is
//! taken while it is held.
//!
//! The reader keeps no sample history. `expected_sn` is the only cursor:
//! a DATA submessage is delivered exactly when it carries the next
//! in-order number, everything else is dropped and recovered through the
//! heartbeat/acknack dialogue.

pub mod proxy;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{MAX_PROXIES_PER_ENDPOINT, MAX_READER_CALLBACKS};
use crate::error::{Error, Result};
use crate::protocol::codec;
use crate::protocol::submessages::HeartbeatSubmsg;
use crate::protocol::types::{ChangeKind, EntityId, Guid, GuidPrefix, SequenceNumber};
use crate::storage::MemoryPool;
use crate::transport::{PacketInfo, Transport};

pub use proxy::WriterProxy;

/// Static attributes of a reader endpoint.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub guid: Guid,
    pub topic: String,
}

impl ReaderConfig {
    #[must_use]
    pub fn new(guid: Guid, topic: &str) -> Self {
        Self {
            guid,
            topic: topic.to_owned(),
        }
    }
}

/// One received sample as handed to user callbacks.
#[derive(Debug, Clone, Copy)]
pub struct ReaderCacheChange<'a> {
    pub writer_guid: Guid,
    pub kind: ChangeKind,
    pub sequence_number: SequenceNumber,
    pub data: &'a [u8],
}

/// User callback fired for every in-order sample.
pub type ReaderCallback = Box<dyn Fn(&ReaderCacheChange<'_>) + Send + Sync>;

/// Token identifying a registered callback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle(usize);

struct CallbackTable {
    slots: [Option<ReaderCallback>; MAX_READER_CALLBACKS],
    count: usize,
}

impl CallbackTable {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            count: 0,
        }
    }
}

/// Reliable stateful reader endpoint.
pub struct StatefulReader {
    config: ReaderConfig,
    transport: Arc<dyn Transport>,
    proxies: Mutex<MemoryPool<WriterProxy, MAX_PROXIES_PER_ENDPOINT>>,
    callbacks: Mutex<CallbackTable>,
}

impl StatefulReader {
    /// Create the endpoint.
    pub fn new(config: ReaderConfig, transport: Arc<dyn Transport>) -> Self {
        log::debug!(
            "[StatefulReader::new] topic='{}' guid={}",
            config.topic,
            config.guid
        );
        Self {
            config,
            transport,
            proxies: Mutex::new(MemoryPool::new()),
            callbacks: Mutex::new(CallbackTable::new()),
        }
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.config.guid
    }

    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        self.config.guid.entity_id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Register a matched remote writer.
    pub fn add_matched_writer(&self, proxy: WriterProxy) -> Result<()> {
        let mut proxies = self.lock_proxies();
        if !proxies.add(proxy) {
            log::warn!(
                "[StatefulReader::add_matched_writer] proxy pool full on '{}'",
                self.config.topic
            );
            return Err(Error::PoolFull);
        }
        Ok(())
    }

    /// Remove the matched writer with the given GUID.
    pub fn remove_matched_writer(&self, guid: &Guid) -> bool {
        let mut proxies = self.lock_proxies();
        proxies.remove(|p| p.remote_writer_guid == *guid)
    }

    /// Remove every matched writer of a departed participant.
    pub fn remove_matched_writers_of(&self, prefix: &GuidPrefix) -> usize {
        let mut proxies = self.lock_proxies();
        proxies.remove_all(|p| p.remote_writer_guid.prefix == *prefix)
    }

    /// Number of currently matched writers.
    #[must_use]
    pub fn matched_writers(&self) -> usize {
        self.lock_proxies().len()
    }

    /// Install a callback; fired in slot order for every delivered sample.
    pub fn register_callback(&self, callback: ReaderCallback) -> Result<CallbackHandle> {
        let mut table = self.lock_callbacks();
        for (idx, slot) in table.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(callback);
                table.count += 1;
                return Ok(CallbackHandle(idx));
            }
        }
        log::warn!(
            "[StatefulReader::register_callback] all {} slots occupied on '{}'",
            MAX_READER_CALLBACKS,
            self.config.topic
        );
        Err(Error::CallbacksFull)
    }

    /// Remove a previously registered callback.
    pub fn remove_callback(&self, handle: CallbackHandle) -> bool {
        let mut table = self.lock_callbacks();
        if handle.0 >= table.slots.len() || table.slots[handle.0].is_none() {
            return false;
        }
        table.slots[handle.0] = None;
        table.count -= 1;
        true
    }

    /// Process one inbound sample.
    ///
    /// Delivered only when the writer is matched and the sequence number
    /// equals the proxy's `expected_sn`; the cursor advances after the
    /// callbacks ran. Any mismatch is a silent drop.
    pub fn on_new_change(&self, change: &ReaderCacheChange<'_>) {
        let mut proxies = self.lock_proxies();
        let Some(proxy) = proxies.find_mut(|p| p.remote_writer_guid == change.writer_guid) else {
            log::debug!(
                "[StatefulReader::on_new_change] unknown writer {} on '{}'",
                change.writer_guid,
                self.config.topic
            );
            return;
        };
        if change.sequence_number != proxy.expected_sn {
            log::debug!(
                "[StatefulReader::on_new_change] dropped {} (expected {}) on '{}'",
                change.sequence_number,
                proxy.expected_sn,
                self.config.topic
            );
            return;
        }

        {
            let table = self.lock_callbacks();
            if table.count == 0 {
                return;
            }
            for slot in table.slots.iter().flatten() {
                slot(change);
            }
        }

        proxy.expected_sn = proxy.expected_sn.next();
    }

    /// Process an inbound HEARTBEAT and answer with an ACKNACK.
    pub fn on_new_heartbeat(&self, submsg: &HeartbeatSubmsg, source_prefix: &GuidPrefix) {
        let packet = {
            let mut proxies = self.lock_proxies();
            let Some(proxy) = proxies.find_mut(|p| {
                p.remote_writer_guid.prefix == *source_prefix
                    && p.remote_writer_guid.entity_id == submsg.writer_id
            }) else {
                log::debug!(
                    "[StatefulReader::on_new_heartbeat] unknown writer on '{}'",
                    self.config.topic
                );
                return;
            };
            if !proxy.accepts_heartbeat_count(submsg.count) {
                log::debug!(
                    "[StatefulReader::on_new_heartbeat] stale count {} on '{}'",
                    submsg.count,
                    self.config.topic
                );
                return;
            }
            proxy.hb_count = Some(submsg.count);

            let missing = proxy.missing(submsg.first_sn, submsg.last_sn);
            let count = proxy.next_acknack_count();
            let Some(dest) = proxy
                .remote_locator
                .is_valid()
                .then_some(proxy.remote_locator)
            else {
                return;
            };

            let mut buf = Vec::with_capacity(codec::HEADER_SIZE + 48);
            codec::encode_header(&mut buf, &self.config.guid.prefix);
            codec::encode_acknack(
                &mut buf,
                &self.config.guid.entity_id,
                &submsg.writer_id,
                &missing,
                count,
                false,
            );
            PacketInfo {
                src_port: self.transport.local_port(),
                dest_addr: dest.address,
                dest_port: dest.port as u16,
                buffer: buf,
            }
        };

        if let Err(e) = self.transport.send_packet(&packet) {
            log::warn!(
                "[StatefulReader::on_new_heartbeat] acknack to {} failed: {}",
                packet.destination(),
                e
            );
        }
    }

    /// Cursor position for a matched writer (test/diagnostic aid).
    #[must_use]
    pub fn expected_sn(&self, writer_guid: &Guid) -> Option<SequenceNumber> {
        let proxies = self.lock_proxies();
        proxies
            .find(|p| p.remote_writer_guid == *writer_guid)
            .map(|p| p.expected_sn)
    }

    fn lock_proxies(&self) -> MutexGuard<'_, MemoryPool<WriterProxy, MAX_PROXIES_PER_ENDPOINT>> {
        match self.proxies.lock() {
            Ok(guard) => guard,
            Err(e) => {
                log::debug!("[StatefulReader] proxies lock poisoned, recovering");
                e.into_inner()
            }
        }
    }

    fn lock_callbacks(&self) -> MutexGuard<'_, CallbackTable> {
        match self.callbacks.lock() {
            Ok(guard) => guard,
            Err(e) => {
                log::debug!("[StatefulReader] callbacks lock poisoned, recovering");
                e.into_inner()
            }
        }
    }
}
