//! # ZK TCP Client
//!
//! `ZkTransport` speaks the terminal protocol over a plain TCP socket.
//!
//! ## Buffered Read
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PREPARE_BUFFER(cmd, fct) ──► DATA(payload)           small tables     │
//! │                          └──► ACK_OK(size)            large tables     │
//! │                                  │                                      │
//! │          ┌───────────────────────┘                                      │
//! │          ▼                                                              │
//! │  READ_BUFFER(start, len) ──► DATA(chunk)                               │
//! │                          └──► PREPARE_DATA(len), DATA..., ACK_OK       │
//! │          │   (repeat per MAX_CHUNK)                                    │
//! │          ▼                                                              │
//! │  FREE_DATA ──► ACK_OK                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use primesync_core::{PunchEvent, TerminalUser};

use super::packet::{
    decode_top_header, encode_packet, make_commkey, u32_le, Reply, CMD_ACK_ERROR, CMD_ACK_OK,
    CMD_ACK_UNAUTH, CMD_ATTLOG_RRQ, CMD_AUTH, CMD_CONNECT, CMD_DATA, CMD_EXIT, CMD_FREE_DATA,
    CMD_GET_FREE_SIZES, CMD_PREPARE_BUFFER, CMD_PREPARE_DATA, CMD_READ_BUFFER, CMD_REFRESHDATA,
    CMD_USERTEMP_RRQ, CMD_USER_WRQ, COMMKEY_TICKS, FCT_USER, INITIAL_REPLY_ID, MAX_CHUNK,
    TOP_HEADER_LEN,
};
use super::records::{decode_attendance, decode_users, encode_user, USER_RECORD_LEN};
use crate::error::{SyncError, SyncResult};
use crate::transport::{TerminalEndpoint, TerminalTransport};

// =============================================================================
// Transport
// =============================================================================

/// Production transport for ZK-compatible attendance terminals.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZkTransport;

impl ZkTransport {
    pub fn new() -> Self {
        ZkTransport
    }
}

#[async_trait]
impl TerminalTransport for ZkTransport {
    type Session = ZkSession;

    async fn connect(&self, endpoint: &TerminalEndpoint, timeout: Duration) -> SyncResult<ZkSession> {
        ZkSession::open(endpoint, timeout).await
    }

    async fn disconnect(&self, session: ZkSession) -> SyncResult<()> {
        session.close().await
    }

    async fn fetch_users(&self, session: &mut ZkSession) -> SyncResult<Vec<TerminalUser>> {
        session.read_users().await
    }

    async fn fetch_attendance(&self, session: &mut ZkSession) -> SyncResult<Vec<PunchEvent>> {
        session.read_attendance().await
    }

    async fn upsert_user(&self, session: &mut ZkSession, user: &TerminalUser) -> SyncResult<()> {
        session.write_user(user).await
    }
}

// =============================================================================
// Session
// =============================================================================

/// Record counts reported by `CMD_GET_FREE_SIZES`.
#[derive(Debug, Clone, Copy, Default)]
struct TableSizes {
    users: usize,
    records: usize,
}

/// Where a uid lives on the terminal.
#[derive(Debug, Clone)]
struct Slot {
    index: u16,
    wire_user_id: String,
}

/// An open connection to one terminal.
#[derive(Debug)]
pub struct ZkSession {
    stream: TcpStream,
    address: String,
    timeout: Duration,
    session_id: u16,
    reply_id: u16,
    /// Record layout observed on the last user read.
    user_record_len: usize,
    /// uid -> terminal slot, filled by the last user read.
    slots: Option<HashMap<u32, Slot>>,
}

impl ZkSession {
    /// Connects and performs the CONNECT / AUTH handshake.
    async fn open(endpoint: &TerminalEndpoint, limit: Duration) -> SyncResult<Self> {
        let address = endpoint.socket_addr();
        debug!(address = %address, "Opening terminal socket");

        let stream = match timeout(limit, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SyncError::ConnectionFailed {
                    address,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SyncError::Timeout {
                    address,
                    secs: limit.as_secs(),
                })
            }
        };

        let mut session = ZkSession {
            stream,
            address,
            timeout: limit,
            session_id: 0,
            reply_id: INITIAL_REPLY_ID,
            user_record_len: USER_RECORD_LEN,
            slots: None,
        };

        match session.handshake(endpoint.comm_key).await {
            Ok(()) => {
                info!(address = %session.address, session_id = session.session_id, "Terminal session open");
                Ok(session)
            }
            Err(e @ (SyncError::Timeout { .. } | SyncError::AuthRejected { .. })) => Err(e),
            Err(e) => Err(SyncError::ConnectionFailed {
                address: session.address.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn handshake(&mut self, comm_key: u32) -> SyncResult<()> {
        let mut reply = self.command(CMD_CONNECT, &[]).await?;
        self.session_id = reply.header.session_id;

        if reply.header.command == CMD_ACK_UNAUTH {
            debug!(address = %self.address, "Terminal requires comm key");
            let key = make_commkey(comm_key, self.session_id, COMMKEY_TICKS);
            reply = self.command(CMD_AUTH, &key).await?;
        }

        match reply.header.command {
            CMD_ACK_OK => Ok(()),
            CMD_ACK_UNAUTH => Err(SyncError::AuthRejected {
                address: self.address.clone(),
            }),
            other => Err(SyncError::UnexpectedReply {
                expected: "ACK_OK".into(),
                actual: other,
            }),
        }
    }

    /// Sends `CMD_EXIT` and closes the socket.
    async fn close(mut self) -> SyncResult<()> {
        let result = self.command(CMD_EXIT, &[]).await;
        let _ = self.stream.shutdown().await;
        debug!(address = %self.address, "Terminal session closed");
        result.map(|_| ())
    }

    // =========================================================================
    // Framing
    // =========================================================================

    async fn send(&mut self, command: u16, payload: &[u8]) -> SyncResult<()> {
        let (frame, next) = encode_packet(command, payload, self.session_id, self.reply_id);
        self.reply_id = next;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    async fn receive(&mut self) -> SyncResult<Reply> {
        let reply = match timeout(self.timeout, read_frame(&mut self.stream)).await {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(SyncError::Timeout {
                    address: self.address.clone(),
                    secs: self.timeout.as_secs(),
                })
            }
        };
        self.reply_id = reply.header.reply_id;
        Ok(reply)
    }

    async fn command(&mut self, command: u16, payload: &[u8]) -> SyncResult<Reply> {
        self.send(command, payload).await?;
        self.receive().await
    }

    /// Sends a command that must be accepted.
    async fn command_ok(&mut self, command: u16, payload: &[u8]) -> SyncResult<Reply> {
        let reply = self.command(command, payload).await?;
        if reply.is_ok() {
            return Ok(reply);
        }
        if reply.header.command == CMD_ACK_ERROR {
            return Err(SyncError::Protocol(format!(
                "terminal refused command {}",
                command
            )));
        }
        Err(SyncError::UnexpectedReply {
            expected: "ACK_OK".into(),
            actual: reply.header.command,
        })
    }

    // =========================================================================
    // Buffered Reads
    // =========================================================================

    async fn read_sizes(&mut self) -> SyncResult<TableSizes> {
        let reply = self.command_ok(CMD_GET_FREE_SIZES, &[]).await?;
        if reply.data.len() < 80 {
            return Err(SyncError::Protocol(format!(
                "free sizes reply of {} bytes",
                reply.data.len()
            )));
        }

        let field = |i: usize| (u32_le(&reply.data, i * 4) as i32).max(0) as usize;
        Ok(TableSizes {
            users: field(4),
            records: field(8),
        })
    }

    async fn read_with_buffer(&mut self, command: u16, fct: i32, ext: i32) -> SyncResult<Vec<u8>> {
        let mut request = Vec::with_capacity(11);
        request.push(1u8);
        request.extend_from_slice(&command.to_le_bytes());
        request.extend_from_slice(&fct.to_le_bytes());
        request.extend_from_slice(&ext.to_le_bytes());

        let reply = self.command(CMD_PREPARE_BUFFER, &request).await?;
        match reply.header.command {
            CMD_DATA => return Ok(reply.data),
            CMD_ACK_OK => {}
            other => {
                return Err(SyncError::UnexpectedReply {
                    expected: "DATA or ACK_OK".into(),
                    actual: other,
                })
            }
        }

        if reply.data.len() < 5 {
            return Err(SyncError::Protocol("buffer size missing from reply".into()));
        }
        let size = u32_le(&reply.data, 1) as usize;
        debug!(address = %self.address, command, size, "Reading terminal buffer");

        let mut data = Vec::new();
        let mut start = 0;
        while start < size {
            let len = (size - start).min(MAX_CHUNK);
            let chunk = self.read_chunk(start, len).await?;
            data.extend_from_slice(&chunk);
            start += len;
        }

        self.command_ok(CMD_FREE_DATA, &[]).await?;
        Ok(data)
    }

    async fn read_chunk(&mut self, start: usize, len: usize) -> SyncResult<Vec<u8>> {
        let mut request = Vec::with_capacity(8);
        request.extend_from_slice(&(start as i32).to_le_bytes());
        request.extend_from_slice(&(len as i32).to_le_bytes());

        let reply = self.command(CMD_READ_BUFFER, &request).await?;
        match reply.header.command {
            CMD_DATA => Ok(reply.data),
            CMD_PREPARE_DATA => {
                if reply.data.len() < 4 {
                    return Err(SyncError::Protocol("chunk size missing from reply".into()));
                }
                let expected = u32_le(&reply.data, 0) as usize;

                let mut data = Vec::new();
                while data.len() < expected {
                    let packet = self.receive().await?;
                    if packet.header.command != CMD_DATA {
                        return Err(SyncError::UnexpectedReply {
                            expected: "DATA".into(),
                            actual: packet.header.command,
                        });
                    }
                    if packet.data.is_empty() {
                        return Err(SyncError::Protocol("empty data packet".into()));
                    }
                    data.extend_from_slice(&packet.data);
                }

                let ack = self.receive().await?;
                if ack.header.command != CMD_ACK_OK {
                    return Err(SyncError::UnexpectedReply {
                        expected: "ACK_OK".into(),
                        actual: ack.header.command,
                    });
                }
                Ok(data)
            }
            other => Err(SyncError::UnexpectedReply {
                expected: "DATA or PREPARE_DATA".into(),
                actual: other,
            }),
        }
    }

    // =========================================================================
    // Tables
    // =========================================================================

    async fn read_users(&mut self) -> SyncResult<Vec<TerminalUser>> {
        let sizes = self.read_sizes().await?;
        if sizes.users == 0 {
            self.slots = Some(HashMap::new());
            return Ok(Vec::new());
        }

        let data = self.read_with_buffer(CMD_USERTEMP_RRQ, FCT_USER, 0).await?;
        if data.len() <= 4 {
            self.slots = Some(HashMap::new());
            return Ok(Vec::new());
        }

        let total = u32_le(&data, 0) as usize;
        let record_len = total / sizes.users;
        let wire = decode_users(&data[4..], record_len)?;

        self.user_record_len = record_len;
        self.slots = Some(
            wire.iter()
                .map(|w| {
                    (
                        w.user.uid,
                        Slot {
                            index: w.index,
                            wire_user_id: w.wire_user_id.clone(),
                        },
                    )
                })
                .collect(),
        );

        debug!(address = %self.address, count = wire.len(), record_len, "Read terminal users");
        Ok(wire.into_iter().map(|w| w.user).collect())
    }

    async fn read_attendance(&mut self) -> SyncResult<Vec<PunchEvent>> {
        let sizes = self.read_sizes().await?;
        if sizes.records == 0 {
            return Ok(Vec::new());
        }

        let data = self.read_with_buffer(CMD_ATTLOG_RRQ, 0, 0).await?;
        if data.len() < 4 {
            return Ok(Vec::new());
        }

        let total = u32_le(&data, 0) as usize;
        let record_len = total / sizes.records;
        let events = decode_attendance(&data[4..], record_len)?;
        debug!(address = %self.address, count = events.len(), record_len, "Read terminal punches");
        Ok(events)
    }

    async fn write_user(&mut self, user: &TerminalUser) -> SyncResult<()> {
        if self.slots.is_none() {
            self.read_users().await?;
        }
        let slot = self.slot_for(user)?;

        let record = encode_user(slot.index, &slot.wire_user_id, user, self.user_record_len)?;
        self.command_ok(CMD_USER_WRQ, &record).await?;
        self.command_ok(CMD_REFRESHDATA, &[]).await?;

        debug!(address = %self.address, uid = user.uid, index = slot.index, "Wrote terminal user");
        if let Some(slots) = self.slots.as_mut() {
            slots.insert(user.uid, slot);
        }
        Ok(())
    }

    /// Reuses the slot a uid already occupies, otherwise claims the index
    /// equal to the uid, otherwise the next free index.
    fn slot_for(&self, user: &TerminalUser) -> SyncResult<Slot> {
        let empty = HashMap::new();
        let slots = self.slots.as_ref().unwrap_or(&empty);

        if let Some(slot) = slots.get(&user.uid) {
            return Ok(slot.clone());
        }

        let taken = |index: u16| slots.values().any(|s| s.index == index);
        let index = match u16::try_from(user.uid) {
            Ok(index) if index > 0 && !taken(index) => index,
            _ => {
                let next = slots.values().map(|s| s.index).max().unwrap_or(0);
                next.checked_add(1).ok_or_else(|| SyncError::InvalidRecord {
                    uid: user.uid,
                    reason: "terminal has no free user slot".into(),
                })?
            }
        };

        if u32::from(index) != user.uid {
            warn!(uid = user.uid, index, "uid does not fit its own terminal slot");
        }

        Ok(Slot {
            index,
            wire_user_id: user.uid.to_string(),
        })
    }
}

/// Reads one frame: top header, then exactly the announced body.
async fn read_frame(stream: &mut TcpStream) -> SyncResult<Reply> {
    let mut top = [0u8; TOP_HEADER_LEN];
    stream.read_exact(&mut top).await?;
    let len = decode_top_header(&top)?;

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Reply::decode(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use primesync_core::PunchDirection;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const SESSION: u16 = 42;

    async fn answer(stream: &mut TcpStream, request: &Reply, command: u16, payload: &[u8]) {
        let (frame, _) = encode_packet(command, payload, SESSION, request.header.reply_id);
        stream.write_all(&frame).await.unwrap();
    }

    /// 2024-03-15 packed the way the terminal stores it.
    fn packed_time(hour: u32, minute: u32) -> u32 {
        (((24 * 12 * 31) + (2 * 31) + 14) * 86_400) + (hour * 60 + minute) * 60
    }

    fn punch_record(user_id: &str, raw_time: u32, punch: u8) -> Vec<u8> {
        let mut r = vec![0u8; 40];
        r[2..2 + user_id.len()].copy_from_slice(user_id.as_bytes());
        r[27..31].copy_from_slice(&raw_time.to_le_bytes());
        r[31] = punch;
        r
    }

    /// Terminal holding two punches for uid 7; returns the commands it saw.
    async fn scripted_terminal(listener: TcpListener) -> Vec<u16> {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut seen = Vec::new();

        loop {
            let request = read_frame(&mut stream).await.unwrap();
            seen.push(request.header.command);

            match request.header.command {
                CMD_CONNECT => answer(&mut stream, &request, CMD_ACK_OK, &[]).await,
                CMD_GET_FREE_SIZES => {
                    let mut sizes = vec![0u8; 80];
                    sizes[32..36].copy_from_slice(&2u32.to_le_bytes());
                    answer(&mut stream, &request, CMD_ACK_OK, &sizes).await;
                }
                CMD_PREPARE_BUFFER => {
                    let mut data = 80u32.to_le_bytes().to_vec();
                    data.extend(punch_record("7", packed_time(8, 30), 0));
                    data.extend(punch_record("7", packed_time(17, 5), 1));
                    answer(&mut stream, &request, CMD_DATA, &data).await;
                }
                CMD_EXIT => {
                    answer(&mut stream, &request, CMD_ACK_OK, &[]).await;
                    break;
                }
                _ => answer(&mut stream, &request, CMD_ACK_ERROR, &[]).await,
            }
        }
        seen
    }

    async fn listen() -> (TcpListener, TerminalEndpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, TerminalEndpoint::new("127.0.0.1", port, 0))
    }

    #[tokio::test]
    async fn test_reads_attendance_from_terminal() {
        let (listener, endpoint) = listen().await;
        let terminal: JoinHandle<Vec<u16>> = tokio::spawn(scripted_terminal(listener));

        let transport = ZkTransport::new();
        let mut session = transport
            .connect(&endpoint, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(session.session_id, SESSION);

        let events = transport.fetch_attendance(&mut session).await.unwrap();
        transport.disconnect(session).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uid, 7);
        assert_eq!(
            events[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap()
        );
        assert_eq!(events[0].punch, PunchDirection::In);
        assert_eq!(events[1].punch, PunchDirection::Out);

        let seen = terminal.await.unwrap();
        assert_eq!(
            seen,
            vec![CMD_CONNECT, CMD_GET_FREE_SIZES, CMD_PREPARE_BUFFER, CMD_EXIT]
        );
    }

    #[tokio::test]
    async fn test_rejected_comm_key() {
        let (listener, endpoint) = listen().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for _ in 0..2 {
                let request = read_frame(&mut stream).await.unwrap();
                answer(&mut stream, &request, CMD_ACK_UNAUTH, &[]).await;
            }
        });

        let err = ZkTransport::new()
            .connect(&endpoint, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AuthRejected { .. }));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let (listener, endpoint) = listen().await;
        drop(listener);

        let err = ZkTransport::new()
            .connect(&endpoint, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_silent_terminal_times_out() {
        let (listener, endpoint) = listen().await;
        let hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let err = ZkTransport::new()
            .connect(&endpoint, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout { .. }));
        hold.abort();
    }
}
