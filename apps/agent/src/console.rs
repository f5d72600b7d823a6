//! # Console Output
//!
//! Progress lines while a fleet operation runs, then the report.
//!
//! ```text
//! Pull attendance from 2 device(s)
//!   [1] 192.168.1.201 ... ok   Pulled 3 attendance records
//!   [2] 192.168.1.202 ... FAIL Failed to connect to device: Connection timeout ...
//!
//! Device 192.168.1.202: Failed to connect to device: Connection timeout ...
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

use primesync_core::{Attendance, Device, DeviceOutcome, FleetOperation, FleetReport, User};
use primesync_sync::FleetEventEmitter;

// =============================================================================
// Progress
// =============================================================================

/// Prints one line per device as the fleet operation progresses.
#[derive(Debug, Default)]
pub struct ConsoleEmitter {
    finished: AtomicUsize,
}

impl ConsoleEmitter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FleetEventEmitter for ConsoleEmitter {
    fn device_started(&self, _operation: FleetOperation, device: &Device) {
        tracing::debug!(address = %device.ip_address, "Device started");
    }

    fn device_finished(&self, _operation: FleetOperation, device: &Device, outcome: &DeviceOutcome) {
        let n = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        let mark = if outcome.success { "ok  " } else { "FAIL" };
        println!("  [{}] {} ... {} {}", n, device.ip_address, mark, outcome.message);
    }
}

// =============================================================================
// Reports and Listings
// =============================================================================

pub fn print_report(report: &FleetReport) {
    println!();
    println!("{}", report.message());
}

/// Pretty JSON for `--json`.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("No devices registered.");
        return;
    }

    println!("{:<36}  {:<15}  {:>5}  {:<7}  {}", "ID", "ADDRESS", "PORT", "STATUS", "MODEL");
    for device in devices {
        println!(
            "{:<36}  {:<15}  {:>5}  {:<7}  {}",
            device.id,
            device.ip_address,
            device.port,
            device.status.as_str(),
            device.device_model.as_deref().unwrap_or("-"),
        );
    }
}

pub fn print_users(users: &[User]) {
    if users.is_empty() {
        println!("No users enrolled.");
        return;
    }

    println!("{:>6}  {:<12}  {:<24}  {:>4}  {}", "UID", "USER ID", "NAME", "PRIV", "DEVICE");
    for user in users {
        println!(
            "{:>6}  {:<12}  {:<24}  {:>4}  {}",
            user.uid,
            user.user_id,
            user.name,
            user.privilege,
            user.device_id.as_deref().unwrap_or("-"),
        );
    }
}

pub fn print_attendance(records: &[Attendance]) {
    if records.is_empty() {
        println!("No attendance recorded.");
        return;
    }

    println!("{:>6}  {:<19}  {}", "UID", "TIMESTAMP", "STATUS");
    for record in records {
        println!(
            "{:>6}  {:<19}  {}",
            record.user_uid,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.status,
        );
    }
}
