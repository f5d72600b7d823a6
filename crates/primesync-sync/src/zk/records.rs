//! # ZK Record Layouts
//!
//! Fixed-width user and attendance records returned by buffered reads.
//!
//! ## Identity Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Terminal record                        Local view                      │
//! │  ───────────────                        ──────────                      │
//! │  index 3, user_id "7"        ──────►    uid 7, user_id ""               │
//! │  index 3, user_id "EMP-A"    ──────►    uid 3, user_id "EMP-A"          │
//! │                                                                         │
//! │  The terminal's own index is internal to the terminal. The enrolled    │
//! │  user id, when numeric, is what operators see on the keypad and is     │
//! │  used as the uid.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## User Record (72 bytes)
//! ```text
//! ┌─────┬────┬──────────┬───────────┬──────┬───┬─────────┬───┬───────────┐
//! │index│priv│ password │   name    │ card │ - │  group  │ - │  user_id  │
//! │ u16 │ u8 │    8     │    24     │ u32  │ 1 │    7    │ 1 │    24     │
//! └─────┴────┴──────────┴───────────┴──────┴───┴─────────┴───┴───────────┘
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use primesync_core::{PunchDirection, PunchEvent, TerminalUser};

use super::packet::{u16_le, u32_le};
use crate::error::{SyncError, SyncResult};

pub const USER_RECORD_LEN: usize = 72;
pub const COMPACT_USER_RECORD_LEN: usize = 28;

pub const ATTENDANCE_RECORD_LEN: usize = 40;
pub const COMPACT_ATTENDANCE_RECORD_LEN: usize = 16;
pub const LEGACY_ATTENDANCE_RECORD_LEN: usize = 8;

/// Privilege code of a terminal administrator. Anything else is sent as 0.
pub const USER_ADMIN: u8 = 14;

// =============================================================================
// Users
// =============================================================================

/// A user record together with the terminal's own addressing for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireUser {
    /// Terminal-internal record index.
    pub index: u16,
    /// Enrolled user id exactly as stored on the terminal.
    pub wire_user_id: String,
    pub user: TerminalUser,
}

/// Decodes every complete record in `data`.
pub fn decode_users(data: &[u8], record_len: usize) -> SyncResult<Vec<WireUser>> {
    match record_len {
        USER_RECORD_LEN => Ok(data.chunks_exact(USER_RECORD_LEN).map(decode_user).collect()),
        COMPACT_USER_RECORD_LEN => Ok(data
            .chunks_exact(COMPACT_USER_RECORD_LEN)
            .map(decode_compact_user)
            .collect()),
        other => Err(SyncError::Protocol(format!(
            "unsupported user record size {}",
            other
        ))),
    }
}

fn decode_user(record: &[u8]) -> WireUser {
    let index = u16_le(record, 0);
    let wire_user_id = c_string(&record[48..72]);
    let (uid, user_id) = local_identity(index, &wire_user_id);

    WireUser {
        index,
        user: TerminalUser {
            uid,
            name: c_string(&record[11..35]).trim().to_string(),
            privilege: record[2],
            password: c_string(&record[3..11]),
            card: card_text(u32_le(record, 35)),
            group_id: c_string(&record[40..47]).trim().to_string(),
            user_id,
        },
        wire_user_id,
    }
}

fn decode_compact_user(record: &[u8]) -> WireUser {
    let index = u16_le(record, 0);
    let wire_user_id = u32_le(record, 24).to_string();
    let (uid, user_id) = local_identity(index, &wire_user_id);

    WireUser {
        index,
        user: TerminalUser {
            uid,
            name: c_string(&record[8..16]).trim().to_string(),
            privilege: record[2],
            password: c_string(&record[3..8]),
            card: card_text(u32_le(record, 16)),
            group_id: record[21].to_string(),
            user_id,
        },
        wire_user_id,
    }
}

/// Numeric enrolled ids become the uid; anything else keeps the terminal
/// index as uid and the text as user_id.
fn local_identity(index: u16, wire_user_id: &str) -> (u32, String) {
    match wire_user_id.trim().parse::<u32>() {
        Ok(uid) if uid > 0 => (uid, String::new()),
        _ => (u32::from(index), wire_user_id.trim().to_string()),
    }
}

fn card_text(card: u32) -> Option<String> {
    (card != 0).then(|| card.to_string())
}

/// Encodes a user for `CMD_USER_WRQ` in the terminal's record layout.
///
/// ## Errors
/// `SyncError::InvalidRecord` when a field does not fit or is not numeric
/// where the layout needs a number.
pub fn encode_user(
    index: u16,
    wire_user_id: &str,
    user: &TerminalUser,
    record_len: usize,
) -> SyncResult<Vec<u8>> {
    let privilege = if user.privilege == USER_ADMIN {
        USER_ADMIN
    } else {
        0
    };
    let card = match user.card.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(card) => card
            .parse::<u32>()
            .map_err(|_| invalid(user.uid, "card must be numeric"))?,
    };

    let mut buf = Vec::with_capacity(record_len);
    buf.extend_from_slice(&index.to_le_bytes());
    buf.push(privilege);

    if record_len == COMPACT_USER_RECORD_LEN {
        let group = match user.group_id.trim() {
            "" => 0,
            group => group
                .parse::<u8>()
                .map_err(|_| invalid(user.uid, "group must be numeric on this terminal"))?,
        };
        let user_id = wire_user_id
            .trim()
            .parse::<u32>()
            .map_err(|_| invalid(user.uid, "user_id must be numeric on this terminal"))?;

        put_field(&mut buf, &user.password, 5, user.uid, "password")?;
        put_field(&mut buf, truncate_to(&user.name, 8), 8, user.uid, "name")?;
        buf.extend_from_slice(&card.to_le_bytes());
        buf.push(0);
        buf.push(group);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&user_id.to_le_bytes());
    } else {
        put_field(&mut buf, &user.password, 8, user.uid, "password")?;
        put_field(&mut buf, &user.name, 24, user.uid, "name")?;
        buf.extend_from_slice(&card.to_le_bytes());
        buf.push(0);
        put_field(&mut buf, &user.group_id, 7, user.uid, "group")?;
        buf.push(0);
        put_field(&mut buf, wire_user_id, 24, user.uid, "user_id")?;
    }

    Ok(buf)
}

fn put_field(buf: &mut Vec<u8>, value: &str, width: usize, uid: u32, field: &str) -> SyncResult<()> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(invalid(uid, &format!("{} exceeds {} bytes", field, width)));
    }
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + width - bytes.len(), 0);
    Ok(())
}

fn truncate_to(value: &str, width: usize) -> &str {
    if value.len() <= width {
        return value;
    }
    let mut end = width;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn invalid(uid: u32, reason: &str) -> SyncError {
    SyncError::InvalidRecord {
        uid,
        reason: reason.to_string(),
    }
}

// =============================================================================
// Attendance
// =============================================================================

/// Decodes every complete punch in `data`.
///
/// Records whose packed timestamp is not a real date are skipped.
pub fn decode_attendance(data: &[u8], record_len: usize) -> SyncResult<Vec<PunchEvent>> {
    let decode: fn(&[u8]) -> (u32, u32, u8) = match record_len {
        ATTENDANCE_RECORD_LEN => |r| {
            let (uid, _) = local_identity(u16_le(r, 0), &c_string(&r[2..26]));
            (uid, u32_le(r, 27), r[31])
        },
        COMPACT_ATTENDANCE_RECORD_LEN => |r| (u32_le(r, 0), u32_le(r, 4), r[9]),
        LEGACY_ATTENDANCE_RECORD_LEN => |r| (u32::from(u16_le(r, 0)), u32_le(r, 3), r[7]),
        other => {
            return Err(SyncError::Protocol(format!(
                "unsupported attendance record size {}",
                other
            )))
        }
    };

    let mut events = Vec::with_capacity(data.len() / record_len);
    for record in data.chunks_exact(record_len) {
        let (uid, raw_time, punch) = decode(record);
        match decode_time(raw_time) {
            Some(timestamp) => events.push(PunchEvent {
                uid,
                timestamp,
                punch: PunchDirection::from_device_code(punch),
            }),
            None => warn!(uid, raw_time, "Skipping punch with invalid timestamp"),
        }
    }
    Ok(events)
}

/// Unpacks the terminal's mixed-radix timestamp (31-day months, years
/// since 2000).
pub fn decode_time(raw: u32) -> Option<NaiveDateTime> {
    let mut t = raw;
    let second = t % 60;
    t /= 60;
    let minute = t % 60;
    t /= 60;
    let hour = t % 24;
    t /= 24;
    let day = t % 31 + 1;
    t /= 31;
    let month = t % 12 + 1;
    t /= 12;
    let year = t as i32 + 2000;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

// =============================================================================
// Helpers
// =============================================================================

/// Text up to the first NUL, lossily decoded as UTF-8.
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn encode_time(t: NaiveDateTime) -> u32 {
        ((((t.year() as u32 % 100) * 12 * 31) + ((t.month() - 1) * 31) + t.day() - 1)
            * (24 * 60 * 60))
            + (t.hour() * 60 + t.minute()) * 60
            + t.second()
    }

    fn user(uid: u32, name: &str) -> TerminalUser {
        TerminalUser {
            uid,
            name: name.into(),
            privilege: 0,
            password: "12".into(),
            card: Some("998877".into()),
            group_id: "1".into(),
            user_id: String::new(),
        }
    }

    fn attendance_record(index: u16, user_id: &str, raw_time: u32, punch: u8) -> Vec<u8> {
        let mut r = vec![0u8; ATTENDANCE_RECORD_LEN];
        r[0..2].copy_from_slice(&index.to_le_bytes());
        r[2..2 + user_id.len()].copy_from_slice(user_id.as_bytes());
        r[26] = 1;
        r[27..31].copy_from_slice(&raw_time.to_le_bytes());
        r[31] = punch;
        r
    }

    #[test]
    fn test_decode_time_epoch() {
        let t = decode_time(0).unwrap();
        assert_eq!(t.to_string(), "2000-01-01 00:00:00");

        let t = decode_time(12 * 31 * 86_400).unwrap();
        assert_eq!(t.to_string(), "2001-01-01 00:00:00");
    }

    #[test]
    fn test_decode_time_known_punch() {
        let when = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(8, 30, 5)
            .unwrap();
        assert_eq!(decode_time(encode_time(when)), Some(when));
    }

    #[test]
    fn test_decode_time_rejects_impossible_date() {
        // February 31st exists in the packed format but not on a calendar.
        let raw = ((24 * 12 * 31) + 31 + 30) * 86_400;
        assert!(decode_time(raw).is_none());
    }

    #[test]
    fn test_user_record_numeric_user_id() {
        let mut record = encode_user(3, "7", &user(7, "Alice"), USER_RECORD_LEN).unwrap();
        assert_eq!(record.len(), USER_RECORD_LEN);

        record.extend(encode_user(4, "EMP-A", &user(4, ""), USER_RECORD_LEN).unwrap());
        let users = decode_users(&record, USER_RECORD_LEN).unwrap();

        assert_eq!(users[0].index, 3);
        assert_eq!(users[0].user.uid, 7);
        assert_eq!(users[0].user.user_id, "");
        assert_eq!(users[0].user.name, "Alice");
        assert_eq!(users[0].user.password, "12");
        assert_eq!(users[0].user.card.as_deref(), Some("998877"));
        assert_eq!(users[0].user.group_id, "1");

        assert_eq!(users[1].user.uid, 4);
        assert_eq!(users[1].user.user_id, "EMP-A");
        assert_eq!(users[1].wire_user_id, "EMP-A");
        assert_eq!(users[1].user.name, "");
    }

    #[test]
    fn test_compact_user_record() {
        let mut u = user(9, "Bartholomew");
        u.card = None;
        let record = encode_user(9, "9", &u, COMPACT_USER_RECORD_LEN).unwrap();
        assert_eq!(record.len(), COMPACT_USER_RECORD_LEN);

        let decoded = decode_users(&record, COMPACT_USER_RECORD_LEN).unwrap();
        assert_eq!(decoded[0].user.uid, 9);
        assert_eq!(decoded[0].user.name, "Bartholo");
        assert_eq!(decoded[0].user.card, None);
    }

    #[test]
    fn test_encode_rejects_oversized_password() {
        let mut u = user(7, "Alice");
        u.password = "123456789".into();
        let err = encode_user(7, "7", &u, USER_RECORD_LEN).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRecord { uid: 7, .. }));
    }

    #[test]
    fn test_encode_coerces_privilege() {
        let mut u = user(7, "Alice");
        u.privilege = 3;
        assert_eq!(encode_user(7, "7", &u, USER_RECORD_LEN).unwrap()[2], 0);
        u.privilege = USER_ADMIN;
        assert_eq!(encode_user(7, "7", &u, USER_RECORD_LEN).unwrap()[2], USER_ADMIN);
    }

    #[test]
    fn test_unsupported_record_size() {
        assert!(decode_users(&[0u8; 30], 30).is_err());
        assert!(decode_attendance(&[0u8; 30], 30).is_err());
    }

    #[test]
    fn test_attendance_records() {
        let when = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(17, 2, 0)
            .unwrap();
        let mut data = attendance_record(3, "7", encode_time(when), 0);
        data.extend(attendance_record(5, "", encode_time(when), 1));
        data.extend([0u8; 12]); // trailing partial record

        let events = decode_attendance(&data, ATTENDANCE_RECORD_LEN).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uid, 7);
        assert_eq!(events[0].punch, PunchDirection::In);
        assert_eq!(events[0].timestamp, when);
        assert_eq!(events[1].uid, 5);
        assert_eq!(events[1].punch, PunchDirection::Out);
    }

    #[test]
    fn test_attendance_skips_bad_timestamp() {
        let raw = ((24 * 12 * 31) + 31 + 30) * 86_400;
        let data = attendance_record(1, "1", raw, 0);
        assert!(decode_attendance(&data, ATTENDANCE_RECORD_LEN)
            .unwrap()
            .is_empty());
    }
}
