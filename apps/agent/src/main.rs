//! # PrimeSync Agent Entry Point
//!
//! `primesync` registers terminals and users in the local store and runs
//! fleet operations against the terminals.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Agent Startup                                  │
//! │                                                                         │
//! │  1. Parse arguments ──────────────────────────────────────────────────► │
//! │     • clap; usage errors exit with status 2                            │
//! │                                                                         │
//! │  2. Initialize Logging ───────────────────────────────────────────────► │
//! │     • tracing-subscriber with env filter                                │
//! │     • Default: info,primesync=debug,sqlx=warn; RUST_LOG overrides       │
//! │                                                                         │
//! │  3. Load Config ──────────────────────────────────────────────────────► │
//! │     • primesync.toml, then PRIMESYNC_* environment overrides            │
//! │                                                                         │
//! │  4. Open Local Store ─────────────────────────────────────────────────► │
//! │     • SQLite with WAL mode, pending migrations applied                  │
//! │                                                                         │
//! │  5. Dispatch ─────────────────────────────────────────────────────────► │
//! │     • a failed fleet report exits with status 1                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cli;
mod console;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use primesync_core::terminal::synthesize_user_id;
use primesync_core::validation::{validate_new_device, validate_new_user};
use primesync_core::{AppSettings, Device, FleetOperation, FleetReport, NewDevice, NewUser};
use primesync_db::{Database, DbConfig};
use primesync_sync::{
    FleetEventEmitter, FleetSync, NoOpEmitter, SettingsService, SyncConfig, ZkTransport,
};

use clap::Parser;

use cli::{Cli, Command, ConfigCommand, DeviceCommand, SettingsCommand, UserArgs, UserCommand};
use console::ConsoleEmitter;

type AgentResult<T> = Result<T, Box<dyn Error>>;

#[tokio::main]
async fn main() -> AgentResult<ExitCode> {
    let cli = Cli::parse();

    init_tracing();

    let config = SyncConfig::load(cli.config_path.clone())?;

    if cli.command == Command::Config(ConfigCommand::Init) {
        config.save(cli.config_path.clone())?;
        if let Some(path) = cli.config_path.clone().or_else(SyncConfig::default_config_path) {
            println!("Wrote {}", path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let db = open_database(&config).await?;
    let result = run(&cli, config, &db).await;
    db.close().await;
    result
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=primesync_sync=trace` - Trace the sync core only
/// - Default: INFO, DEBUG for PrimeSync crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,primesync=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_database(config: &SyncConfig) -> AgentResult<Database> {
    let path = config.db_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    info!(path = %path.display(), "Opening local store");

    Ok(Database::new(DbConfig::new(path)).await?)
}

// =============================================================================
// Dispatch
// =============================================================================

async fn run(cli: &Cli, config: SyncConfig, db: &Database) -> AgentResult<ExitCode> {
    if let Some(operation) = cli.command.fleet_operation() {
        return run_fleet(cli.json, config, db, operation).await;
    }

    match &cli.command {
        Command::PullAttendance | Command::PullUsers | Command::PushUsers => {}
        Command::Config(ConfigCommand::Init) => {}

        Command::Devices(DeviceCommand::List) => {
            let devices: Vec<Device> = db
                .devices()
                .list()
                .await?
                .into_iter()
                .map(masked_device)
                .collect();
            if cli.json {
                console::print_json(&devices)?;
            } else {
                console::print_devices(&devices);
            }
        }

        Command::Devices(DeviceCommand::Add(args)) => {
            let mut new = NewDevice::new(args.address.trim())
                .port(args.port.unwrap_or(config.terminal.default_port));
            if let Some(password) = &args.password {
                new = new.password(password.trim());
            }
            if let Some(model) = &args.model {
                new = new.device_model(model.trim());
            }
            validate_new_device(&new)?;

            let device = db.devices().insert(&new).await?;
            info!(id = %device.id, address = %device.ip_address, "Device registered");
            if cli.json {
                console::print_json(&masked_device(device))?;
            } else {
                println!(
                    "Registered device {} ({}:{})",
                    device.id, device.ip_address, device.port
                );
            }
        }

        Command::Devices(DeviceCommand::Remove { id }) => {
            db.devices().delete(id).await?;
            println!("Removed device {}", id);
        }

        Command::Users(UserCommand::List) => {
            let users = db.users().list().await?;
            if cli.json {
                console::print_json(&users)?;
            } else {
                console::print_users(&users);
            }
        }

        Command::Users(UserCommand::Add(args)) => {
            let new = new_user(args);
            validate_new_user(&new)?;
            if let Some(device_id) = &new.device_id {
                if db.devices().get_by_id(device_id).await?.is_none() {
                    return Err(format!("no device with id {}", device_id).into());
                }
            }

            let user = db.users().insert(&new).await?;
            println!("Enrolled user {} ({})", user.uid, user.name);
            return run_fleet(cli.json, config, db, FleetOperation::SyncAfterMutation).await;
        }

        Command::Users(UserCommand::Remove { uid }) => {
            db.users().delete(*uid).await?;
            println!("Removed user {}", uid);
            return run_fleet(cli.json, config, db, FleetOperation::SyncAfterMutation).await;
        }

        Command::Attendance { limit } => {
            let records = db.attendance().list_recent(*limit).await?;
            if cli.json {
                console::print_json(&records)?;
            } else {
                console::print_attendance(&records);
            }
        }

        Command::Settings(SettingsCommand::Show) => {
            let service = SettingsService::load(db.clone()).await?;
            console::print_json(&masked_settings(service.current()))?;
        }

        Command::Settings(SettingsCommand::Set { key, value }) => {
            let service = SettingsService::load(db.clone()).await?;
            let mut settings = service.current();
            cli::apply_setting(&mut settings, key, value)?;
            service.save(settings.clone()).await?;
            console::print_json(&masked_settings(settings))?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Runs one fleet operation with progress output and prints its report.
async fn run_fleet(
    json: bool,
    config: SyncConfig,
    db: &Database,
    operation: FleetOperation,
) -> AgentResult<ExitCode> {
    let emitter: Arc<dyn FleetEventEmitter> = if json {
        Arc::new(NoOpEmitter)
    } else {
        println!("Starting: {} all devices", operation.describe());
        Arc::new(ConsoleEmitter::new())
    };

    let fleet = FleetSync::with_emitter(config, db.clone(), ZkTransport::new(), emitter);
    let report = fleet.run(operation).await?;

    if json {
        console::print_json(&report)?;
    } else {
        console::print_report(&report);
    }

    Ok(match report {
        FleetReport::Failed { .. } => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn new_user(args: &UserArgs) -> NewUser {
    NewUser {
        uid: args.uid,
        name: args.name.trim().to_string(),
        privilege: args.privilege,
        password: args.password.clone(),
        group_id: args.group_id.clone(),
        user_id: args
            .user_id
            .clone()
            .unwrap_or_else(|| synthesize_user_id(args.uid)),
        card: args.card.clone(),
        device_id: args.device_id.clone(),
    }
}

const MASK: &str = "********";

fn masked_settings(mut settings: AppSettings) -> AppSettings {
    if !settings.password.is_empty() {
        settings.password = MASK.to_string();
    }
    settings
}

/// Hides the comm key. Status and listing output never shows it.
fn masked_device(mut device: Device) -> Device {
    if !device.password.is_empty() {
        device.password = MASK.to_string();
    }
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_device_hides_comm_key() {
        let device = Device {
            id: "d1".to_string(),
            ip_address: "10.0.0.5".to_string(),
            port: 4370,
            password: "1234".to_string(),
            device_model: None,
            status: Default::default(),
            created_at: chrono::Utc::now(),
        };
        let shown = serde_json::to_value(masked_device(device)).unwrap();
        assert_eq!(shown["password"], "********");
        assert_eq!(shown["ip_address"], "10.0.0.5");
    }

    #[test]
    fn test_masked_settings_keeps_blank_password_blank() {
        assert_eq!(masked_settings(AppSettings::default()).password, "");

        let mut settings = AppSettings::default();
        settings.password = "hunter2".to_string();
        assert_eq!(masked_settings(settings).password, MASK);
    }
}
