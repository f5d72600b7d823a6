//! # Sync Outcomes
//!
//! Typed results handed to the presentation layer.
//!
//! ## From Devices to One Report
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Device 10.0.0.5  ──► DeviceOutcome { success: true,  count: 3 }       │
//! │  Device 10.0.0.6  ──► DeviceOutcome { success: false, "timeout" }      │
//! │  Device 10.0.0.7  ──► DeviceOutcome { success: true,  count: 0 }       │
//! │                              │                                          │
//! │                              ▼  FleetReport::aggregate                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ Failed {                                                        │   │
//! │  │   total: 3,                       ← successful counts summed   │   │
//! │  │   messages: ["Device 10.0.0.6: ...timeout..."]                 │   │
//! │  │ }                                                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Writes made by 10.0.0.5 stay in the store even though the report      │
//! │  as a whole is a failure.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

// =============================================================================
// Fleet Operation
// =============================================================================

/// A reconciliation run that can be applied to every registered terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FleetOperation {
    /// Pull punches from every terminal into the attendance ledger.
    PullAttendance,
    /// Pull enrolled users from every terminal into the local store.
    PullUsers,
    /// Push locally owned users to every terminal.
    PushUsers,
    /// Push users after a local create/update/delete/import.
    SyncAfterMutation,
}

impl FleetOperation {
    /// Short verb phrase used in log lines and empty-fleet messages.
    pub fn describe(&self) -> &'static str {
        match self {
            FleetOperation::PullAttendance => "pull attendance from",
            FleetOperation::PullUsers => "pull users from",
            FleetOperation::PushUsers => "push users to",
            FleetOperation::SyncAfterMutation => "sync users to",
        }
    }
}

impl fmt::Display for FleetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FleetOperation::PullAttendance => "pull_attendance",
            FleetOperation::PullUsers => "pull_users",
            FleetOperation::PushUsers => "push_users",
            FleetOperation::SyncAfterMutation => "sync_after_mutation",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Device Outcome
// =============================================================================

/// Per-punch bookkeeping for one attendance pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AttendanceCounters {
    /// Punches appended to the ledger.
    pub inserted: u64,
    /// Punches already present under the dedup key.
    pub duplicates: u64,
    /// Punches whose uid has no local user.
    pub unknown_uid: u64,
}

/// Result of one reconciliation against one terminal.
///
/// `count` is what the operation observed or wrote on that terminal: raw
/// punches for attendance pulls, device users for user pulls, users sent
/// for pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeviceOutcome {
    pub success: bool,
    pub message: String,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceCounters>,
}

impl DeviceOutcome {
    /// A successful run that handled `count` records.
    pub fn succeeded(count: u64, message: impl Into<String>) -> Self {
        DeviceOutcome {
            success: true,
            message: message.into(),
            count,
            attendance: None,
        }
    }

    /// A failed run with a diagnostic.
    pub fn failed(message: impl Into<String>) -> Self {
        DeviceOutcome {
            success: false,
            message: message.into(),
            count: 0,
            attendance: None,
        }
    }

    /// Attaches attendance counters.
    pub fn with_attendance(mut self, counters: AttendanceCounters) -> Self {
        self.attendance = Some(counters);
        self
    }
}

// =============================================================================
// Fleet Report
// =============================================================================

/// Aggregate of one fleet operation across every registered terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FleetReport {
    /// No terminal is registered; nothing was attempted.
    NoDevices { operation: FleetOperation },

    /// Every terminal succeeded.
    Succeeded { operation: FleetOperation, total: u64 },

    /// At least one terminal failed. `total` still sums the successful
    /// terminals, whose writes remain in the store.
    Failed {
        operation: FleetOperation,
        total: u64,
        messages: Vec<String>,
    },
}

impl FleetReport {
    /// Folds per-device outcomes, keyed by device address, into a report.
    ///
    /// Failing devices contribute one `Device <address>: <message>` line
    /// each, in the order given.
    pub fn aggregate<'a, I>(operation: FleetOperation, outcomes: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a DeviceOutcome)>,
    {
        let mut seen = false;
        let mut total = 0u64;
        let mut messages = Vec::new();

        for (address, outcome) in outcomes {
            seen = true;
            if outcome.success {
                total += outcome.count;
            } else {
                messages.push(format!("Device {}: {}", address, outcome.message));
            }
        }

        if !seen {
            FleetReport::NoDevices { operation }
        } else if messages.is_empty() {
            FleetReport::Succeeded { operation, total }
        } else {
            FleetReport::Failed {
                operation,
                total,
                messages,
            }
        }
    }

    /// `true` only when at least one terminal ran and none failed.
    pub fn is_success(&self) -> bool {
        matches!(self, FleetReport::Succeeded { .. })
    }

    /// Sum of counts over successful terminals.
    pub fn total(&self) -> u64 {
        match self {
            FleetReport::NoDevices { .. } => 0,
            FleetReport::Succeeded { total, .. } | FleetReport::Failed { total, .. } => *total,
        }
    }

    pub fn operation(&self) -> FleetOperation {
        match self {
            FleetReport::NoDevices { operation }
            | FleetReport::Succeeded { operation, .. }
            | FleetReport::Failed { operation, .. } => *operation,
        }
    }

    /// Human-readable summary for a dialog or the terminal.
    pub fn message(&self) -> String {
        match self {
            FleetReport::NoDevices { operation } => {
                format!("No devices found to {}.", operation.describe())
            }
            FleetReport::Succeeded { operation, total } => match operation {
                FleetOperation::PullAttendance => {
                    format!("Pulled {} attendance records from all devices", total)
                }
                FleetOperation::PullUsers => format!("Pulled {} users from all devices", total),
                FleetOperation::PushUsers | FleetOperation::SyncAfterMutation => {
                    format!("Pushed {} users to all devices", total)
                }
            },
            FleetReport::Failed { messages, .. } => messages.join("\n"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
