//! # ZK Packet Framing
//!
//! Every message on the wire is a TCP top header followed by a packet
//! header and an optional payload.
//!
//! ## Frame Layout
//! ```text
//! ┌──────────────────────── top header ───────────────────────┐
//! │ 0x5050 (u16 LE) │ 0x7D82 (u16 LE) │ length (u32 LE)        │
//! └───────────────────────────────────────────────────────────┘
//! ┌────────────────────── packet header ──────────────────────┐
//! │ command (u16) │ checksum (u16) │ session (u16) │ reply (u16)│
//! └───────────────────────────────────────────────────────────┘
//! ┌──────────────── payload (length - 8 bytes) ───────────────┐
//! └───────────────────────────────────────────────────────────┘
//! ```

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Commands
// =============================================================================

pub const CMD_CONNECT: u16 = 1000;
pub const CMD_EXIT: u16 = 1001;
pub const CMD_REFRESHDATA: u16 = 1013;
pub const CMD_AUTH: u16 = 1102;
pub const CMD_GET_FREE_SIZES: u16 = 50;
pub const CMD_USER_WRQ: u16 = 8;
pub const CMD_USERTEMP_RRQ: u16 = 9;
pub const CMD_ATTLOG_RRQ: u16 = 13;

pub const CMD_PREPARE_DATA: u16 = 1500;
pub const CMD_DATA: u16 = 1501;
pub const CMD_FREE_DATA: u16 = 1502;
pub const CMD_PREPARE_BUFFER: u16 = 1503;
pub const CMD_READ_BUFFER: u16 = 1504;

pub const CMD_ACK_OK: u16 = 2000;
pub const CMD_ACK_ERROR: u16 = 2001;
pub const CMD_ACK_UNAUTH: u16 = 2005;

/// Function code selecting user records in a buffered read.
pub const FCT_USER: i32 = 5;

// =============================================================================
// Framing Constants
// =============================================================================

const MACHINE_PREPARE_DATA_1: u16 = 0x5050;
const MACHINE_PREPARE_DATA_2: u16 = 0x7D82;

pub const USHRT_MAX: u16 = 65_535;

pub const TOP_HEADER_LEN: usize = 8;
pub const HEADER_LEN: usize = 8;

/// Largest chunk requested per buffered read.
pub const MAX_CHUNK: usize = 0xFFC0;

/// Upper bound on a single frame; anything larger is treated as garbage.
pub const MAX_FRAME_LEN: usize = MAX_CHUNK + 1024;

/// Reply counter value before the first command of a session.
pub const INITIAL_REPLY_ID: u16 = USHRT_MAX - 1;

// =============================================================================
// Packet Header
// =============================================================================

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub command: u16,
    pub checksum: u16,
    pub session_id: u16,
    pub reply_id: u16,
}

impl PacketHeader {
    /// Decodes the first eight bytes of a packet body.
    pub fn decode(buf: &[u8]) -> SyncResult<Self> {
        if buf.len() < HEADER_LEN {
            return Err(SyncError::Protocol(format!(
                "packet of {} bytes is shorter than its header",
                buf.len()
            )));
        }
        Ok(PacketHeader {
            command: u16_le(buf, 0),
            checksum: u16_le(buf, 2),
            session_id: u16_le(buf, 4),
            reply_id: u16_le(buf, 6),
        })
    }
}

/// A reply read off the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub header: PacketHeader,
    pub data: Vec<u8>,
}

impl Reply {
    /// Splits a packet body (everything after the top header).
    pub fn decode(mut body: Vec<u8>) -> SyncResult<Self> {
        let header = PacketHeader::decode(&body)?;
        let data = body.split_off(HEADER_LEN);
        Ok(Reply { header, data })
    }

    /// True for the replies that mean "command accepted".
    pub fn is_ok(&self) -> bool {
        matches!(
            self.header.command,
            CMD_ACK_OK | CMD_PREPARE_DATA | CMD_DATA
        )
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Ones-complement style checksum over little-endian 16-bit words.
pub fn checksum(buf: &[u8]) -> u16 {
    let max = i64::from(USHRT_MAX);
    let mut sum: i64 = 0;

    let mut words = buf.chunks_exact(2);
    for word in &mut words {
        sum += i64::from(u16::from_le_bytes([word[0], word[1]]));
        if sum > max {
            sum -= max;
        }
    }
    if let [last] = words.remainder() {
        sum += i64::from(*last);
    }

    while sum > max {
        sum -= max;
    }
    sum = !sum;
    while sum < 0 {
        sum += max;
    }
    sum as u16
}

/// Advances the reply counter, wrapping below `USHRT_MAX`.
pub fn next_reply_id(reply_id: u16) -> u16 {
    let next = u32::from(reply_id) + 1;
    if next >= u32::from(USHRT_MAX) {
        (next - u32::from(USHRT_MAX)) as u16
    } else {
        next as u16
    }
}

/// Builds a complete frame (top header included).
///
/// The checksum is computed with the current `reply_id` and the header
/// then carries the advanced one; firmware accepts frames built this way.
/// Returns the frame and the reply id it carries.
pub fn encode_packet(
    command: u16,
    payload: &[u8],
    session_id: u16,
    reply_id: u16,
) -> (Vec<u8>, u16) {
    let mut body = Vec::with_capacity(HEADER_LEN + payload.len());
    body.extend_from_slice(&command.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&session_id.to_le_bytes());
    body.extend_from_slice(&reply_id.to_le_bytes());
    body.extend_from_slice(payload);

    let sum = checksum(&body);
    let next = next_reply_id(reply_id);
    body[2..4].copy_from_slice(&sum.to_le_bytes());
    body[6..8].copy_from_slice(&next.to_le_bytes());

    let mut frame = Vec::with_capacity(TOP_HEADER_LEN + body.len());
    frame.extend_from_slice(&MACHINE_PREPARE_DATA_1.to_le_bytes());
    frame.extend_from_slice(&MACHINE_PREPARE_DATA_2.to_le_bytes());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    (frame, next)
}

/// Validates a top header and returns the body length it announces.
pub fn decode_top_header(top: &[u8; TOP_HEADER_LEN]) -> SyncResult<usize> {
    if u16_le(top, 0) != MACHINE_PREPARE_DATA_1 || u16_le(top, 2) != MACHINE_PREPARE_DATA_2 {
        return Err(SyncError::Protocol("bad frame magic".into()));
    }

    let len = u32_le(top, 4) as usize;
    if !(HEADER_LEN..=MAX_FRAME_LEN).contains(&len) {
        return Err(SyncError::Protocol(format!("implausible frame length {}", len)));
    }
    Ok(len)
}

// =============================================================================
// Authentication
// =============================================================================

/// Salt byte mixed into the comm key.
pub const COMMKEY_TICKS: u8 = 50;

/// Scrambles the comm key with the session id for `CMD_AUTH`.
pub fn make_commkey(key: u32, session_id: u16, ticks: u8) -> [u8; 4] {
    let k = key.reverse_bits().wrapping_add(u32::from(session_id));
    let b = k.to_le_bytes();
    let x = [b[0] ^ b'Z', b[1] ^ b'K', b[2] ^ b'S', b[3] ^ b'O'];
    let swapped = [x[2], x[3], x[0], x[1]];
    [swapped[0] ^ ticks, swapped[1] ^ ticks, ticks, swapped[3] ^ ticks]
}

// =============================================================================
// Byte Helpers
// =============================================================================

pub(crate) fn u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
