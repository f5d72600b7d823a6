//! # Seed Data Generator
//!
//! Populates a local store with a demo terminal, enrolled users and a few
//! days of punches, so the agent and a UI have something to show without
//! hardware on the desk.
//!
//! ## Usage
//! ```bash
//! # 50 users (default)
//! cargo run -p primesync-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p primesync-db --bin seed -- --users 200 --db ./data/primesync.db
//! ```
//!
//! Each user gets uid `1..=N`, user_id `U001...`, and one check-in plus one
//! check-out per day for the last `--days` days.

use chrono::{Duration, Local, NaiveTime};
use std::env;
use primesync_core::terminal::synthesize_user_id;
use primesync_core::{NewDevice, NewUser, PunchDirection, PunchEvent};
use primesync_db::{Database, DbConfig};

const FIRST_NAMES: &[&str] = &[
    "Amina", "Bilal", "Chen", "Dana", "Emeka", "Farah", "Goran", "Hina", "Ivan", "Jana",
    "Kofi", "Lina", "Mateo", "Noor", "Omar", "Priya", "Quinn", "Rosa", "Sami", "Tariq",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut users: u32 = 50;
    let mut days: i64 = 5;
    let mut db_path = String::from("./primesync_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--users" | "-u" => {
                if i + 1 < args.len() {
                    users = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--days" => {
                if i + 1 < args.len() {
                    days = args[i + 1].parse().unwrap_or(5);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("PrimeSync Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -u, --users <N>    Number of users to enroll (default: 50)");
                println!("      --days <N>     Days of punches per user (default: 5)");
                println!("  -d, --db <PATH>    Database file path (default: ./primesync_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("PrimeSync Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!("Users:    {}", users);
    println!("Days:     {}", days);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.users().count().await?;
    if existing > 0 {
        println!("Database already has {} users", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let device = db
        .devices()
        .insert(&NewDevice::new("192.168.1.201").device_model("Demo"))
        .await?;
    println!("Registered demo device {} ({})", device.ip_address, device.id);

    let start = std::time::Instant::now();
    let today = Local::now().date_naive();
    let mut punches = 0u64;

    for uid in 1..=users {
        let name = format!("{} {}", FIRST_NAMES[(uid as usize - 1) % FIRST_NAMES.len()], uid);
        let user = NewUser {
            uid,
            name,
            privilege: 0,
            password: None,
            group_id: Some("1".to_string()),
            user_id: synthesize_user_id(uid),
            card: None,
            device_id: Some(device.id.clone()),
        };

        if let Err(e) = db.users().insert(&user).await {
            eprintln!("Failed to insert uid {}: {}", uid, e);
            continue;
        }

        for day in 0..days {
            let date = today - Duration::days(day);
            let jitter = (uid * 7 + day as u32 * 13) % 30;
            let shifts = [
                (NaiveTime::from_hms_opt(8, 30 + jitter % 30, 0), PunchDirection::In),
                (NaiveTime::from_hms_opt(17, jitter, 0), PunchDirection::Out),
            ];

            for (time, direction) in shifts {
                let Some(time) = time else { continue };
                let event = PunchEvent {
                    uid,
                    timestamp: date.and_time(time),
                    punch: direction,
                };
                if db.attendance().insert_if_absent(&event).await? {
                    punches += 1;
                }
            }
        }
    }

    println!();
    println!(
        "Enrolled {} users and {} punches in {:?}",
        db.users().count().await?,
        punches,
        start.elapsed()
    );

    Ok(())
}
