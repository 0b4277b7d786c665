// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTPS wire codec: message header plus the four submessages the reliable
//! core exchanges (DATA 0x15, HEARTBEAT 0x07, ACKNACK 0x06, INFO_TS 0x09).
//!
//! Encoding always emits little endian with the endianness flag set;
//! decoding honors whichever endianness the submessage declares.
//!
//! # RTPS Message Layout
//!
//! ```text
//! +-------------------+
//! | Header (20 bytes) |  "RTPS" + version(2) + vendorId(2) + guidPrefix(12)
//! +-------------------+
//! | Submessage        |  id(1) + flags(1) + octetsToNextHeader(2) + payload
//! +-------------------+
//! | Submessage ...    |  each submessage starts on a 4-byte boundary
//! +-------------------+
//! ```

use crate::config::{PROTOCOL_VERSION, VENDOR_ID};
use crate::error::Error;
use crate::protocol::submessages::{
    AckNackSubmsg, DataSubmsg, HeartbeatSubmsg, InfoTsSubmsg, SequenceNumberSet,
    FLAG_DATA_PRESENT, FLAG_ENDIANNESS_LE, FLAG_FINAL, FLAG_INLINE_QOS, SUBMSG_ACKNACK,
    SUBMSG_DATA, SUBMSG_HEARTBEAT, SUBMSG_INFO_TS,
};
use crate::protocol::types::{Count, EntityId, GuidPrefix, SequenceNumber, GUID_PREFIX_LEN};

/// RTPS header length in bytes.
pub const HEADER_SIZE: usize = 20;
/// Submessage header length in bytes.
pub const SUBMSG_HEADER_SIZE: usize = 4;

const RTPS_MAGIC: &[u8; 4] = b"RTPS";

// ============================================================================
// Endianness helpers
// ============================================================================

fn read_u16(bytes: &[u8], le: bool) -> u16 {
    let raw = [bytes[0], bytes[1]];
    if le {
        u16::from_le_bytes(raw)
    } else {
        u16::from_be_bytes(raw)
    }
}

fn read_u32(bytes: &[u8], le: bool) -> u32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if le {
        u32::from_le_bytes(raw)
    } else {
        u32::from_be_bytes(raw)
    }
}

fn read_i32(bytes: &[u8], le: bool) -> i32 {
    read_u32(bytes, le) as i32
}

fn read_sn(bytes: &[u8], le: bool) -> SequenceNumber {
    let high = read_i32(&bytes[0..4], le);
    let low = read_u32(&bytes[4..8], le);
    SequenceNumber::from_wire(high, low)
}

fn push_sn(buf: &mut Vec<u8>, sn: SequenceNumber) {
    let (high, low) = sn.to_wire();
    buf.extend_from_slice(&high.to_le_bytes());
    buf.extend_from_slice(&low.to_le_bytes());
}

// ============================================================================
// Header
// ============================================================================

/// Append the 20-byte RTPS header.
pub fn encode_header(buf: &mut Vec<u8>, prefix: &GuidPrefix) {
    buf.extend_from_slice(RTPS_MAGIC);
    buf.extend_from_slice(&PROTOCOL_VERSION);
    buf.extend_from_slice(&VENDOR_ID);
    buf.extend_from_slice(prefix);
}

/// Validate the header and extract the sender's GUID prefix.
pub fn decode_header(bytes: &[u8]) -> Result<GuidPrefix, Error> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::InvalidMessage("short header"));
    }
    if &bytes[0..4] != RTPS_MAGIC {
        return Err(Error::InvalidMessage("bad magic"));
    }
    if bytes[4] != PROTOCOL_VERSION[0] {
        return Err(Error::InvalidMessage("unsupported protocol major version"));
    }
    let mut prefix = [0u8; GUID_PREFIX_LEN];
    prefix.copy_from_slice(&bytes[8..20]);
    Ok(prefix)
}

// ============================================================================
// Submessage walk
// ============================================================================

/// Decoded submessage header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmessageHeader {
    pub id: u8,
    pub flags: u8,
}

impl SubmessageHeader {
    /// Endianness declared by the submessage.
    #[must_use]
    pub fn is_le(&self) -> bool {
        self.flags & FLAG_ENDIANNESS_LE != 0
    }
}

/// Walks the submessages of one RTPS message, yielding header + payload.
///
/// Malformed lengths terminate the walk; a zero `octetsToNextHeader` means
/// the submessage extends to the end of the message.
pub struct SubmessageIter<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> SubmessageIter<'a> {
    /// Start the walk just past the message header.
    #[must_use]
    pub fn new(message: &'a [u8]) -> Self {
        Self {
            bytes: message,
            offset: HEADER_SIZE,
        }
    }
}

impl<'a> Iterator for SubmessageIter<'a> {
    type Item = (SubmessageHeader, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + SUBMSG_HEADER_SIZE > self.bytes.len() {
            return None;
        }
        let header = SubmessageHeader {
            id: self.bytes[self.offset],
            flags: self.bytes[self.offset + 1],
        };
        let declared =
            read_u16(&self.bytes[self.offset + 2..self.offset + 4], header.is_le()) as usize;
        let payload_start = self.offset + SUBMSG_HEADER_SIZE;

        let payload_end = if declared == 0 {
            self.bytes.len()
        } else {
            payload_start + declared
        };
        if payload_end > self.bytes.len() {
            log::debug!(
                "[codec] submessage id=0x{:02X} overruns message ({} > {}), stopping walk",
                header.id,
                payload_end,
                self.bytes.len()
            );
            return None;
        }

        // Submessages start on 4-byte boundaries.
        let mut next = payload_end;
        if !next.is_multiple_of(4) {
            next += 4 - (next % 4);
        }
        self.offset = next;

        Some((header, &self.bytes[payload_start..payload_end]))
    }
}

// ============================================================================
// INFO_TS
// ============================================================================

/// Append an INFO_TS submessage carrying `ts`.
pub fn encode_info_ts(buf: &mut Vec<u8>, ts: &InfoTsSubmsg) {
    buf.push(SUBMSG_INFO_TS);
    buf.push(FLAG_ENDIANNESS_LE);
    buf.extend_from_slice(&8u16.to_le_bytes());
    buf.extend_from_slice(&ts.seconds.to_le_bytes());
    buf.extend_from_slice(&ts.fraction.to_le_bytes());
}

/// Decode INFO_TS. Returns `None` when the invalidate flag voids the
/// timestamp (empty payload).
pub fn decode_info_ts(
    header: SubmessageHeader,
    payload: &[u8],
) -> Result<Option<InfoTsSubmsg>, Error> {
    // Flag bit 1 on INFO_TS: timestamp invalidated, no payload follows.
    if header.flags & 0x02 != 0 {
        return Ok(None);
    }
    if payload.len() < 8 {
        return Err(Error::InvalidMessage("short INFO_TS"));
    }
    let le = header.is_le();
    Ok(Some(InfoTsSubmsg {
        seconds: read_i32(&payload[0..4], le),
        fraction: read_u32(&payload[4..8], le),
    }))
}

// ============================================================================
// DATA
// ============================================================================

/// Append a DATA submessage carrying one serialized sample.
///
/// The payload is not padded, so DATA must be the final submessage of
/// its message (the send paths here always order it last).
pub fn encode_data(
    buf: &mut Vec<u8>,
    reader_id: &EntityId,
    writer_id: &EntityId,
    writer_sn: SequenceNumber,
    payload: &[u8],
) -> Result<(), Error> {
    // extraFlags(2) + octetsToInlineQos(2) + entityIds(8) + SN(8) = 20
    let submsg_len = 20 + payload.len();
    let declared = u16::try_from(submsg_len).map_err(|_| Error::BufferTooSmall)?;

    buf.push(SUBMSG_DATA);
    buf.push(FLAG_ENDIANNESS_LE | FLAG_DATA_PRESENT);
    buf.extend_from_slice(&declared.to_le_bytes());

    buf.extend_from_slice(&0u16.to_le_bytes()); // extraFlags
    buf.extend_from_slice(&16u16.to_le_bytes()); // octetsToInlineQos
    buf.extend_from_slice(reader_id);
    buf.extend_from_slice(writer_id);
    push_sn(buf, writer_sn);
    buf.extend_from_slice(payload);
    Ok(())
}

/// Decode a DATA submessage, borrowing the payload from the receive buffer.
pub fn decode_data<'a>(
    header: SubmessageHeader,
    payload: &'a [u8],
) -> Result<DataSubmsg<'a>, Error> {
    if payload.len() < 20 {
        return Err(Error::InvalidMessage("short DATA"));
    }
    if header.flags & FLAG_INLINE_QOS != 0 {
        // The reliable core never emits inline QoS and has no use for it.
        return Err(Error::InvalidMessage("inline QoS not supported"));
    }
    let le = header.is_le();

    // octetsToInlineQos counts from just after itself to the payload.
    let octets_to_payload = read_u16(&payload[2..4], le) as usize;
    let data_start = 4 + octets_to_payload;
    if data_start > payload.len() {
        return Err(Error::InvalidMessage("DATA offset overruns submessage"));
    }

    let mut reader_id = [0u8; 4];
    let mut writer_id = [0u8; 4];
    reader_id.copy_from_slice(&payload[4..8]);
    writer_id.copy_from_slice(&payload[8..12]);
    let writer_sn = read_sn(&payload[12..20], le);

    let serialized_payload = if header.flags & FLAG_DATA_PRESENT != 0 {
        &payload[data_start..]
    } else {
        &[]
    };

    Ok(DataSubmsg {
        reader_id,
        writer_id,
        writer_sn,
        serialized_payload,
    })
}

// ============================================================================
// HEARTBEAT
// ============================================================================

/// Append a HEARTBEAT submessage announcing `[first_sn, last_sn]`.
pub fn encode_heartbeat(
    buf: &mut Vec<u8>,
    reader_id: &EntityId,
    writer_id: &EntityId,
    first_sn: SequenceNumber,
    last_sn: SequenceNumber,
    count: Count,
    final_flag: bool,
) {
    buf.push(SUBMSG_HEARTBEAT);
    buf.push(if final_flag {
        FLAG_ENDIANNESS_LE | FLAG_FINAL
    } else {
        FLAG_ENDIANNESS_LE
    });
    buf.extend_from_slice(&28u16.to_le_bytes());

    buf.extend_from_slice(reader_id);
    buf.extend_from_slice(writer_id);
    push_sn(buf, first_sn);
    push_sn(buf, last_sn);
    buf.extend_from_slice(&count.to_le_bytes());
}

/// Decode a HEARTBEAT submessage.
pub fn decode_heartbeat(
    header: SubmessageHeader,
    payload: &[u8],
) -> Result<HeartbeatSubmsg, Error> {
    if payload.len() < 28 {
        return Err(Error::InvalidMessage("short HEARTBEAT"));
    }
    let le = header.is_le();
    let mut reader_id = [0u8; 4];
    let mut writer_id = [0u8; 4];
    reader_id.copy_from_slice(&payload[0..4]);
    writer_id.copy_from_slice(&payload[4..8]);

    Ok(HeartbeatSubmsg {
        reader_id,
        writer_id,
        first_sn: read_sn(&payload[8..16], le),
        last_sn: read_sn(&payload[16..24], le),
        count: read_u32(&payload[24..28], le),
        final_flag: header.flags & FLAG_FINAL != 0,
    })
}

// ============================================================================
// ACKNACK
// ============================================================================

/// Append an ACKNACK submessage carrying `sn_state`.
pub fn encode_acknack(
    buf: &mut Vec<u8>,
    reader_id: &EntityId,
    writer_id: &EntityId,
    sn_state: &SequenceNumberSet,
    count: Count,
    final_flag: bool,
) {
    let word_count = sn_state.word_count();
    // entityIds(8) + base SN(8) + numBits(4) + bitmap + count(4)
    let submsg_len = 8 + 8 + 4 + word_count * 4 + 4;

    buf.push(SUBMSG_ACKNACK);
    buf.push(if final_flag {
        FLAG_ENDIANNESS_LE | FLAG_FINAL
    } else {
        FLAG_ENDIANNESS_LE
    });
    buf.extend_from_slice(&(submsg_len as u16).to_le_bytes());

    buf.extend_from_slice(reader_id);
    buf.extend_from_slice(writer_id);
    push_sn(buf, sn_state.base());
    buf.extend_from_slice(&sn_state.num_bits().to_le_bytes());
    for idx in 0..word_count {
        buf.extend_from_slice(&sn_state.bitmap_word(idx).to_le_bytes());
    }
    buf.extend_from_slice(&count.to_le_bytes());
}

/// Decode an ACKNACK submessage.
pub fn decode_acknack(header: SubmessageHeader, payload: &[u8]) -> Result<AckNackSubmsg, Error> {
    if payload.len() < 24 {
        return Err(Error::InvalidMessage("short ACKNACK"));
    }
    let le = header.is_le();
    let mut reader_id = [0u8; 4];
    let mut writer_id = [0u8; 4];
    reader_id.copy_from_slice(&payload[0..4]);
    writer_id.copy_from_slice(&payload[4..8]);

    let base = read_sn(&payload[8..16], le);
    let num_bits = read_u32(&payload[16..20], le);
    let word_count = SequenceNumberSet::word_count_for_bits(num_bits);
    let bitmap_end = 20 + word_count * 4;
    if payload.len() < bitmap_end + 4 {
        return Err(Error::InvalidMessage("ACKNACK bitmap overruns submessage"));
    }

    let mut words = [0u32; 8];
    for (idx, word) in words.iter_mut().enumerate().take(word_count) {
        *word = read_u32(&payload[20 + idx * 4..24 + idx * 4], le);
    }
    let sn_state = SequenceNumberSet::from_raw(base, num_bits, &words[..word_count])
        .ok_or(Error::InvalidMessage("ACKNACK bitmap too wide"))?;

    Ok(AckNackSubmsg {
        reader_id,
        writer_id,
        sn_state,
        count: read_u32(&payload[bitmap_end..bitmap_end + 4], le),
        final_flag: header.flags & FLAG_FINAL != 0,
    })
}
