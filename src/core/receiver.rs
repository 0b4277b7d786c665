// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound RTPS message dispatcher.
//!
//! Sits between the transport receive callback and the endpoints:
//! validates the message header, walks the submessages, and routes each
//! one by its destination entity id. DATA and HEARTBEAT go to readers,
//! ACKNACK to writers; `ENTITYID_UNKNOWN` fans out to every endpoint of
//! the matching class (endpoints drop what is not theirs).

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::reader::{ReaderCacheChange, StatefulReader};
use crate::core::writer::StatefulWriter;
use crate::protocol::codec::{self, SubmessageIter};
use crate::protocol::submessages::{SUBMSG_ACKNACK, SUBMSG_DATA, SUBMSG_HEARTBEAT, SUBMSG_INFO_TS};
use crate::protocol::types::{ChangeKind, Guid, GuidPrefix, ENTITYID_UNKNOWN};
use crate::transport::ReceiveCallback;

/// Routes inbound datagrams to the registered endpoints.
pub struct MessageReceiver {
    own_prefix: GuidPrefix,
    writers: Mutex<Vec<Arc<StatefulWriter>>>,
    readers: Mutex<Vec<Arc<StatefulReader>>>,
}

impl MessageReceiver {
    /// Dispatcher for the participant with `own_prefix`.
    ///
    /// Messages carrying that prefix are dropped as multicast loopback.
    #[must_use]
    pub fn new(own_prefix: GuidPrefix) -> Self {
        Self {
            own_prefix,
            writers: Mutex::new(Vec::new()),
            readers: Mutex::new(Vec::new()),
        }
    }

    pub fn register_writer(&self, writer: Arc<StatefulWriter>) {
        self.lock_writers().push(writer);
    }

    pub fn register_reader(&self, reader: Arc<StatefulReader>) {
        self.lock_readers().push(reader);
    }

    /// Drop an endpoint from the routing tables.
    pub fn deregister(&self, guid: &Guid) {
        self.lock_writers().retain(|w| w.guid() != *guid);
        self.lock_readers().retain(|r| r.guid() != *guid);
    }

    /// Transport receive callback entry point.
    pub fn on_datagram(&self, peer_addr: Ipv4Addr, peer_port: u16, bytes: &[u8]) {
        log::trace!(
            "[MessageReceiver] {} bytes from {}:{}",
            bytes.len(),
            peer_addr,
            peer_port
        );
        self.process_message(bytes);
    }

    /// Parse and route one RTPS message.
    pub fn process_message(&self, bytes: &[u8]) {
        let source_prefix = match codec::decode_header(bytes) {
            Ok(prefix) => prefix,
            Err(e) => {
                log::debug!("[MessageReceiver] dropped message: {}", e);
                return;
            }
        };
        if source_prefix == self.own_prefix {
            return;
        }

        // Snapshot the routing tables; endpoint handlers run unlocked.
        let writers = self.lock_writers().clone();
        let readers = self.lock_readers().clone();

        for (header, payload) in SubmessageIter::new(bytes) {
            match header.id {
                SUBMSG_DATA => match codec::decode_data(header, payload) {
                    Ok(data) => {
                        let change = ReaderCacheChange {
                            writer_guid: Guid::new(source_prefix, data.writer_id),
                            kind: ChangeKind::Alive,
                            sequence_number: data.writer_sn,
                            data: data.serialized_payload,
                        };
                        for reader in &readers {
                            if data.reader_id == ENTITYID_UNKNOWN
                                || data.reader_id == reader.entity_id()
                            {
                                reader.on_new_change(&change);
                            }
                        }
                    }
                    Err(e) => log::debug!("[MessageReceiver] bad DATA: {}", e),
                },
                SUBMSG_HEARTBEAT => match codec::decode_heartbeat(header, payload) {
                    Ok(hb) => {
                        for reader in &readers {
                            if hb.reader_id == ENTITYID_UNKNOWN
                                || hb.reader_id == reader.entity_id()
                            {
                                reader.on_new_heartbeat(&hb, &source_prefix);
                            }
                        }
                    }
                    Err(e) => log::debug!("[MessageReceiver] bad HEARTBEAT: {}", e),
                },
                SUBMSG_ACKNACK => match codec::decode_acknack(header, payload) {
                    Ok(an) => {
                        for writer in &writers {
                            if an.writer_id == ENTITYID_UNKNOWN
                                || an.writer_id == writer.entity_id()
                            {
                                writer.on_acknack(&an, &source_prefix);
                            }
                        }
                    }
                    Err(e) => log::debug!("[MessageReceiver] bad ACKNACK: {}", e),
                },
                SUBMSG_INFO_TS => {
                    // Parsed for well-formedness; the core does not
                    // consume source timestamps.
                    if let Err(e) = codec::decode_info_ts(header, payload) {
                        log::debug!("[MessageReceiver] bad INFO_TS: {}", e);
                    }
                }
                other => {
                    log::trace!(
                        "[MessageReceiver] skipping submessage id=0x{:02X}",
                        other
                    );
                }
            }
        }
    }

    /// Adapter for [`crate::transport::UdpTransport::start_receiver`].
    #[must_use]
    pub fn into_callback(self: Arc<Self>) -> ReceiveCallback {
        Box::new(move |addr, port, bytes| self.on_datagram(addr, port, bytes))
    }

    fn lock_writers(&self) -> MutexGuard<'_, Vec<Arc<StatefulWriter>>> {
        match self.writers.lock() {
            Ok(guard) => guard,
            Err(e) => {
                log::debug!("[MessageReceiver] writers lock poisoned, recovering");
                e.into_inner()
            }
        }
    }

    fn lock_readers(&self) -> MutexGuard<'_, Vec<Arc<StatefulReader>>> {
        match self.readers.lock() {
            Ok(guard) => guard,
            Err(e) => {
                log::debug!("[MessageReceiver] readers lock poisoned, recovering");
                e.into_inner()
            }
        }
    }
}
