// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stateful writer: reliable publication state machine.
//!
//! One mutex guards the history cache, the proxy pool, and the send
//! cursor; producer threads (`new_change`), worker threads (`progress`),
//! the heartbeat thread, and the transport callback thread
//! (`on_acknack`) all serialise on it. Datagrams are handed to the
//! transport outside the lock so network back-pressure never blocks a
//! mutator.
//!
//! # Protocol Flow
//!
//! ```text
//! Writer                                    Reader
//!   |--- DATA (seq=n) ----------------------->|    progress()
//!   |--- HEARTBEAT (first, last, count) ----->|    heartbeat thread
//!   |<-- ACKNACK (base, bitmap, count) -------|
//!   |--- DATA (seq in bitmap) [retransmit] -->|    on_acknack()
//! ```

pub mod proxy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{HB_PERIOD_MS, HEARTBEAT_STACKSIZE, MAX_DATAGRAM_SIZE, MAX_PROXIES_PER_ENDPOINT};
use crate::dispatch::{ProgressUnit, WorkerDispatch};
use crate::error::{Error, Result};
use crate::protocol::codec;
use crate::protocol::submessages::{AckNackSubmsg, InfoTsSubmsg};
use crate::protocol::types::{
    ChangeKind, Count, EntityId, Guid, GuidPrefix, Locator, SequenceNumber, TopicKind,
    ENTITYID_UNKNOWN,
};
use crate::storage::{CacheChange, HistoryCache, MemoryPool};
use crate::transport::{PacketInfo, Transport};

pub use proxy::ReaderProxy;

/// Static attributes of a writer endpoint.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub guid: Guid,
    pub topic: String,
    pub topic_kind: TopicKind,
    /// Force unicast DATA even to proxies that advertise multicast.
    pub enforce_unicast: bool,
    pub heartbeat_period: Duration,
}

impl WriterConfig {
    #[must_use]
    pub fn new(guid: Guid, topic: &str, topic_kind: TopicKind) -> Self {
        Self {
            guid,
            topic: topic.to_owned(),
            topic_kind,
            enforce_unicast: false,
            heartbeat_period: Duration::from_millis(HB_PERIOD_MS),
        }
    }
}

struct WriterState {
    history: HistoryCache,
    proxies: MemoryPool<ReaderProxy, MAX_PROXIES_PER_ENDPOINT>,
    /// Next sequence number `progress` hands to the transport.
    next_unsent_sn: SequenceNumber,
    hb_count: Count,
}

pub(crate) struct WriterInner {
    config: WriterConfig,
    state: Mutex<WriterState>,
    transport: Arc<dyn Transport>,
    dispatch: Arc<dyn WorkerDispatch>,
    running: AtomicBool,
    /// Wakes the heartbeat task out of its period sleep on shutdown.
    shutdown: Mutex<bool>,
    shutdown_cv: Condvar,
}

/// Reliable stateful writer endpoint.
pub struct StatefulWriter {
    inner: Arc<WriterInner>,
    hb_thread: Option<JoinHandle<()>>,
}

impl StatefulWriter {
    /// Create the endpoint and start its heartbeat task.
    ///
    /// On failure nothing is left running.
    pub fn new(
        config: WriterConfig,
        transport: Arc<dyn Transport>,
        dispatch: Arc<dyn WorkerDispatch>,
    ) -> Result<Self> {
        let inner = Arc::new(WriterInner {
            config,
            state: Mutex::new(WriterState {
                history: HistoryCache::new(),
                proxies: MemoryPool::new(),
                next_unsent_sn: SequenceNumber::FIRST,
                hb_count: 0,
            }),
            transport,
            dispatch,
            running: AtomicBool::new(true),
            shutdown: Mutex::new(false),
            shutdown_cv: Condvar::new(),
        });

        let hb_inner = Arc::clone(&inner);
        let hb_thread = thread::Builder::new()
            .name(format!("rtps-hb-{}", inner.config.topic))
            .stack_size(HEARTBEAT_STACKSIZE)
            .spawn(move || heartbeat_loop(&hb_inner))
            .map_err(Error::ThreadSpawn)?;

        log::debug!(
            "[StatefulWriter::new] topic='{}' guid={}",
            inner.config.topic,
            inner.config.guid
        );

        Ok(Self {
            inner,
            hb_thread: Some(hb_thread),
        })
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.inner.config.guid
    }

    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        self.inner.config.guid.entity_id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.inner.config.topic
    }

    /// Register a matched remote reader.
    pub fn add_matched_reader(&self, proxy: ReaderProxy) -> Result<()> {
        let mut state = self.inner.lock_state();
        if !state.proxies.add(proxy) {
            log::warn!(
                "[StatefulWriter::add_matched_reader] proxy pool full on '{}'",
                self.inner.config.topic
            );
            return Err(Error::PoolFull);
        }
        Ok(())
    }

    /// Remove the matched reader with the given GUID.
    pub fn remove_matched_reader(&self, guid: &Guid) -> bool {
        let mut state = self.inner.lock_state();
        state.proxies.remove(|p| p.remote_reader_guid == *guid)
    }

    /// Remove every matched reader of a departed participant.
    pub fn remove_matched_readers_of(&self, prefix: &GuidPrefix) -> usize {
        let mut state = self.inner.lock_state();
        state
            .proxies
            .remove_all(|p| p.remote_reader_guid.prefix == *prefix)
    }

    /// Number of currently matched readers.
    #[must_use]
    pub fn matched_readers(&self) -> usize {
        self.inner.lock_state().proxies.len()
    }

    /// Publish a new sample.
    ///
    /// Rejects kinds irrelevant for the topic (a NO_KEY topic has no
    /// instances to dispose or unregister). On accept the change enters
    /// the history under the next sequence number and a progress unit is
    /// scheduled; the returned value is a snapshot of the stored change.
    pub fn new_change(&self, kind: ChangeKind, payload: &[u8]) -> Option<CacheChange> {
        if !kind.relevant_for(self.inner.config.topic_kind) {
            log::debug!(
                "[StatefulWriter::new_change] kind {:?} irrelevant on '{}'",
                kind,
                self.inner.config.topic
            );
            return None;
        }

        let change = {
            let mut state = self.inner.lock_state();
            match state.history.add_change(kind, payload) {
                Ok(change) => change.clone(),
                Err(e) => {
                    log::warn!(
                        "[StatefulWriter::new_change] rejected on '{}': {}",
                        self.inner.config.topic,
                        e
                    );
                    return None;
                }
            }
        };

        if !self
            .inner
            .dispatch
            .enqueue(Arc::clone(&self.inner) as Arc<dyn ProgressUnit>)
        {
            // Dropped unit: the next heartbeat/acknack round recovers.
            log::debug!(
                "[StatefulWriter::new_change] dispatch saturated on '{}'",
                self.inner.config.topic
            );
        }

        Some(change)
    }

    /// Drive one round of send progress (normally invoked by the worker
    /// dispatch).
    pub fn progress(&self) {
        WriterInner::run_progress(&self.inner);
    }

    /// Rewind the send cursor to the start of the retained window and
    /// reschedule progress. Used on matching events.
    pub fn set_all_changes_to_unsent(&self) {
        {
            let mut state = self.inner.lock_state();
            let seq_min = state.history.seq_num_min();
            if seq_min.is_unknown() {
                return;
            }
            state.next_unsent_sn = seq_min;
        }
        if !self
            .inner
            .dispatch
            .enqueue(Arc::clone(&self.inner) as Arc<dyn ProgressUnit>)
        {
            log::debug!("[StatefulWriter::set_all_changes_to_unsent] dispatch saturated");
        }
    }

    /// Process an inbound ACKNACK from `source_prefix`.
    pub fn on_acknack(&self, submsg: &AckNackSubmsg, source_prefix: &GuidPrefix) {
        self.inner.handle_acknack(submsg, source_prefix);
    }

    /// Mark a retained sample disposed/unregistered in place.
    pub fn set_change_kind(&self, sn: SequenceNumber, kind: ChangeKind) -> bool {
        let mut state = self.inner.lock_state();
        state.history.set_change_kind(sn, kind)
    }

    /// Oldest retained sequence number (`Unknown` when empty).
    #[must_use]
    pub fn seq_num_min(&self) -> SequenceNumber {
        self.inner.lock_state().history.seq_num_min()
    }

    /// Newest retained sequence number (`Unknown` when empty).
    #[must_use]
    pub fn seq_num_max(&self) -> SequenceNumber {
        self.inner.lock_state().history.seq_num_max()
    }

    /// Emit one heartbeat round immediately (the periodic task calls this
    /// on its own schedule).
    pub fn send_heartbeat(&self) {
        self.inner.send_heartbeats();
    }
}

impl Drop for StatefulWriter {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        {
            let mut stopped = match self.inner.shutdown.lock() {
                Ok(guard) => guard,
                Err(e) => e.into_inner(),
            };
            *stopped = true;
        }
        self.inner.shutdown_cv.notify_all();
        if let Some(handle) = self.hb_thread.take() {
            let _ = handle.join();
        }
    }
}

fn heartbeat_loop(inner: &Arc<WriterInner>) {
    let mut stopped = match inner.shutdown.lock() {
        Ok(guard) => guard,
        Err(e) => e.into_inner(),
    };
    while !*stopped {
        let (guard, timeout) = match inner
            .shutdown_cv
            .wait_timeout(stopped, inner.config.heartbeat_period)
        {
            Ok(result) => result,
            Err(e) => e.into_inner(),
        };
        stopped = guard;
        if *stopped {
            break;
        }
        if timeout.timed_out() {
            // Release the flag lock while the round runs; sends may block
            // on the transport.
            drop(stopped);
            inner.send_heartbeats();
            stopped = match inner.shutdown.lock() {
                Ok(guard) => guard,
                Err(e) => e.into_inner(),
            };
        }
    }
    log::trace!(
        "[StatefulWriter] heartbeat task for '{}' stopped",
        inner.config.topic
    );
}

impl WriterInner {
    fn lock_state(&self) -> MutexGuard<'_, WriterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(e) => {
                log::debug!("[StatefulWriter] state lock poisoned, recovering");
                e.into_inner()
            }
        }
    }

    /// One heartbeat round: announce the window to every proxy that is
    /// not yet fully synchronised, then bump the count once.
    fn send_heartbeats(&self) {
        let sends = {
            let mut state = self.lock_state();
            if state.history.is_empty() {
                return;
            }
            let first = state.history.seq_num_min();
            let last = state.history.seq_num_max();
            let count = state.hb_count;

            let mut sends: Vec<PacketInfo> = Vec::new();
            for proxy in state.proxies.iter() {
                // A final-flagged ack past the window means this reader
                // has everything and asked for silence.
                if proxy.final_flag && proxy.last_acknack_sn > last {
                    continue;
                }
                let Some(packet) = self.build_heartbeat_packet(
                    &proxy.remote_reader_guid.entity_id,
                    proxy.remote_locator,
                    first,
                    last,
                    count,
                ) else {
                    continue;
                };
                sends.push(packet);
            }

            if !sends.is_empty() {
                state.hb_count = state.hb_count.wrapping_add(1);
            }
            sends
        };

        for packet in &sends {
            if let Err(e) = self.transport.send_packet(packet) {
                log::warn!(
                    "[StatefulWriter::send_heartbeats] send to {} failed: {}",
                    packet.destination(),
                    e
                );
            }
        }
    }

    /// Send the sample at the cursor to every matched reader, advance the
    /// cursor, and reschedule while unsent samples remain.
    fn run_progress(inner: &Arc<Self>) {
        if !inner.running.load(Ordering::Acquire) {
            return;
        }

        let (sends, more) = {
            let mut state = inner.lock_state();
            if state.history.is_empty() {
                return;
            }
            let seq_min = state.history.seq_num_min();
            let seq_max = state.history.seq_num_max();
            if state.next_unsent_sn < seq_min {
                // The window moved past the cursor (eviction); readers
                // recover the gap through the heartbeat dialogue.
                state.next_unsent_sn = seq_min;
            }
            let sn = state.next_unsent_sn;
            if sn > seq_max {
                return;
            }

            let mut sends: Vec<PacketInfo> = Vec::new();
            {
                let Some(change) = state.history.get_change_by_sn(sn) else {
                    return;
                };
                let mut multicast_sent: Vec<Locator> = Vec::new();
                for proxy in state.proxies.iter() {
                    if !inner.config.enforce_unicast && proxy.use_multicast {
                        if multicast_sent.contains(&proxy.remote_multicast_locator) {
                            continue;
                        }
                        if let Some(packet) = inner.build_data_packet(
                            &ENTITYID_UNKNOWN,
                            proxy.remote_multicast_locator,
                            change,
                        ) {
                            multicast_sent.push(proxy.remote_multicast_locator);
                            sends.push(packet);
                        }
                        continue;
                    }
                    if !inner.config.enforce_unicast && proxy.suppress_unicast {
                        // Another proxy's multicast group already carries
                        // this reader.
                        continue;
                    }
                    if let Some(packet) = inner.build_data_packet(
                        &proxy.remote_reader_guid.entity_id,
                        proxy.remote_locator,
                        change,
                    ) {
                        sends.push(packet);
                    }
                }
            }

            state.next_unsent_sn = sn.next();
            (sends, state.next_unsent_sn <= seq_max)
        };

        for packet in &sends {
            if let Err(e) = inner.transport.send_packet(packet) {
                log::warn!(
                    "[StatefulWriter::progress] send to {} failed: {}",
                    packet.destination(),
                    e
                );
            }
        }

        if more
            && !inner
                .dispatch
                .enqueue(Arc::clone(inner) as Arc<dyn ProgressUnit>)
        {
            log::debug!("[StatefulWriter::progress] dispatch saturated, heartbeat recovers");
        }
    }

    fn handle_acknack(&self, submsg: &AckNackSubmsg, source_prefix: &GuidPrefix) {
        let sends = {
            let mut state = self.lock_state();

            let (reader_entity, dest) = {
                let Some(proxy) = state.proxies.find_mut(|p| {
                    p.remote_reader_guid.prefix == *source_prefix
                        && p.remote_reader_guid.entity_id == submsg.reader_id
                }) else {
                    log::debug!(
                        "[StatefulWriter::on_acknack] no proxy for reader on '{}'",
                        self.config.topic
                    );
                    return;
                };
                if !proxy.accepts_acknack_count(submsg.count) {
                    log::debug!(
                        "[StatefulWriter::on_acknack] stale count {} on '{}'",
                        submsg.count,
                        self.config.topic
                    );
                    return;
                }
                proxy.update_from_acknack(
                    submsg.count,
                    submsg.final_flag,
                    submsg.sn_state.base(),
                );
                (proxy.remote_reader_guid.entity_id, proxy.remote_locator)
            };

            let base = submsg.sn_state.base();
            if base <= SequenceNumber::Known(0) {
                // Preemptive acknack: counters refreshed, nothing to send.
                log::trace!(
                    "[StatefulWriter::on_acknack] preemptive ack on '{}'",
                    self.config.topic
                );
                return;
            }

            let seq_max = state.history.seq_num_max();
            let mut sends: Vec<PacketInfo> = Vec::new();

            for sn in submsg.sn_state.iter() {
                match state.history.get_change_by_sn(sn) {
                    Some(change) => {
                        if let Some(packet) = self.build_data_packet(&reader_entity, dest, change)
                        {
                            sends.push(packet);
                        }
                    }
                    None => {
                        // Evicted; the next heartbeat advances the reader.
                        log::debug!(
                            "[StatefulWriter::on_acknack] {} out of window on '{}'",
                            sn,
                            self.config.topic
                        );
                    }
                }
            }

            // Everything strictly beyond the bitmap range is unacked too.
            let mut sn = base.add(i64::from(submsg.sn_state.num_bits()));
            while sn <= seq_max {
                if let Some(change) = state.history.get_change_by_sn(sn) {
                    if let Some(packet) = self.build_data_packet(&reader_entity, dest, change) {
                        sends.push(packet);
                    }
                }
                sn = sn.next();
            }

            sends
        };

        for packet in &sends {
            if let Err(e) = self.transport.send_packet(packet) {
                log::warn!(
                    "[StatefulWriter::on_acknack] retransmit to {} failed: {}",
                    packet.destination(),
                    e
                );
            }
        }
    }

    fn build_data_packet(
        &self,
        reader_id: &EntityId,
        dest: Locator,
        change: &CacheChange,
    ) -> Option<PacketInfo> {
        if !dest.is_valid() {
            return None;
        }
        let mut buf = Vec::with_capacity(MAX_DATAGRAM_SIZE);
        codec::encode_header(&mut buf, &self.config.guid.prefix);
        codec::encode_info_ts(&mut buf, &InfoTsSubmsg::now());
        if let Err(e) = codec::encode_data(
            &mut buf,
            reader_id,
            &self.config.guid.entity_id,
            change.sequence_number,
            change.data(),
        ) {
            log::warn!("[StatefulWriter] DATA encode failed: {}", e);
            return None;
        }
        Some(PacketInfo {
            src_port: self.transport.local_port(),
            dest_addr: dest.address,
            dest_port: dest.port as u16,
            buffer: buf,
        })
    }

    fn build_heartbeat_packet(
        &self,
        reader_id: &EntityId,
        dest: Locator,
        first: SequenceNumber,
        last: SequenceNumber,
        count: Count,
    ) -> Option<PacketInfo> {
        if !dest.is_valid() {
            return None;
        }
        let mut buf = Vec::with_capacity(codec::HEADER_SIZE + 32);
        codec::encode_header(&mut buf, &self.config.guid.prefix);
        codec::encode_heartbeat(
            &mut buf,
            reader_id,
            &self.config.guid.entity_id,
            first,
            last,
            count,
            false,
        );
        Some(PacketInfo {
            src_port: self.transport.local_port(),
            dest_addr: dest.address,
            dest_port: dest.port as u16,
            buffer: buf,
        })
    }
}

impl ProgressUnit for WriterInner {
    fn progress(self: Arc<Self>) {
        WriterInner::run_progress(&self);
    }
}
