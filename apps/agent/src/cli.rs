//! # Command Line
//!
//! clap derive tree for the `primesync` binary. Global switches may appear
//! before or after the subcommand.
//!
//! ```text
//! primesync [--config PATH] [--json] <command> [args]
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use primesync_core::{AppSettings, FleetOperation};

/// PrimeSync attendance terminal sync agent
#[derive(Debug, Parser)]
#[command(name = "primesync")]
#[command(version, about, long_about = None)]
#[command(after_help = "Logging follows RUST_LOG (default: info,primesync=debug,sqlx=warn).")]
pub struct Cli {
    /// Config file (default: primesync.toml in the platform config dir)
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    /// Print JSON instead of tables and progress lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Manage registered terminals
    #[command(subcommand)]
    Devices(DeviceCommand),

    /// Manage locally enrolled users
    #[command(subcommand)]
    Users(UserCommand),

    /// Pull punches from every terminal
    PullAttendance,

    /// Pull enrolled users from every terminal
    PullUsers,

    /// Push each terminal's own users to it
    PushUsers,

    /// Most recent punches
    Attendance {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show or change application settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Agent configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Command {
    /// The fleet operation this command runs, if any.
    pub fn fleet_operation(&self) -> Option<FleetOperation> {
        match self {
            Command::PullAttendance => Some(FleetOperation::PullAttendance),
            Command::PullUsers => Some(FleetOperation::PullUsers),
            Command::PushUsers => Some(FleetOperation::PushUsers),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum DeviceCommand {
    /// List registered terminals
    List,
    /// Register a terminal
    Add(DeviceArgs),
    /// Forget a terminal
    Remove { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DeviceArgs {
    /// IPv4 or IPv6 address of the terminal
    pub address: String,

    /// TCP port (default from config, normally 4370)
    #[arg(long)]
    pub port: Option<u16>,

    /// Numeric comm key
    #[arg(long)]
    pub password: Option<String>,

    /// Model label
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum UserCommand {
    /// List enrolled users
    List,
    /// Enroll a user, then push users to every terminal
    Add(UserArgs),
    /// Remove a user, then push users to every terminal
    Remove { uid: u32 },
}

/// Fields of a local enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct UserArgs {
    pub uid: u32,
    pub name: String,

    /// Application-level id (default: U + uid padded to three digits)
    #[arg(long = "user-id")]
    pub user_id: Option<String>,

    /// Owning terminal id
    #[arg(long = "device")]
    pub device_id: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub privilege: u8,

    #[arg(long)]
    pub password: Option<String>,

    #[arg(long)]
    pub card: Option<String>,

    #[arg(long = "group")]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum SettingsCommand {
    /// Print the settings document
    Show,
    /// Change one setting
    Set { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum ConfigCommand {
    /// Write the default config file
    Init,
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("unknown setting: {0}")]
    UnknownSetting(String),
}

/// Applies `settings set <key> <value>` to a settings document.
pub fn apply_setting(
    settings: &mut AppSettings,
    key: &str,
    value: &str,
) -> Result<(), SettingError> {
    match key {
        "cloud_api_url" => settings.cloud_api_url = value.trim().to_string(),
        "username" => settings.username = value.to_string(),
        "password" => settings.password = value.to_string(),
        "auto_check_interval" => settings.auto_check_interval = parse_value(key, value)?,
        "enable_auto_sync" => settings.enable_auto_sync = parse_value(key, value)?,
        "periodic_sync_time" => settings.periodic_sync_time = value.trim().to_string(),
        "enable_periodic_sync" => settings.enable_periodic_sync = parse_value(key, value)?,
        other => return Err(SettingError::UnknownSetting(other.to_string())),
    }
    Ok(())
}

fn parse_value<T: FromStr>(field: &str, value: &str) -> Result<T, SettingError> {
    value.trim().parse().map_err(|_| SettingError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    fn parse(line: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("primesync").chain(line.split_whitespace()))
    }

    #[test]
    fn test_command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fleet_commands() {
        let cli = parse("--json pull-attendance").unwrap();
        assert!(cli.json);
        assert_eq!(
            cli.command.fleet_operation(),
            Some(FleetOperation::PullAttendance)
        );

        let cli = parse("push-users --config /etc/primesync.toml").unwrap();
        assert_eq!(cli.config_path, Some(PathBuf::from("/etc/primesync.toml")));
        assert_eq!(cli.command, Command::PushUsers);
        assert_eq!(cli.command.fleet_operation(), Some(FleetOperation::PushUsers));
    }

    #[test]
    fn test_device_add() {
        let cli = parse("devices add 192.168.1.201 --port 4371 --password 1234").unwrap();
        assert_eq!(
            cli.command,
            Command::Devices(DeviceCommand::Add(DeviceArgs {
                address: "192.168.1.201".into(),
                port: Some(4371),
                password: Some("1234".into()),
                model: None,
            }))
        );
        assert_eq!(cli.command.fleet_operation(), None);
    }

    #[test]
    fn test_user_add_defaults() {
        let cli = parse("users add 7 Alice --device abc").unwrap();
        match cli.command {
            Command::Users(UserCommand::Add(user)) => {
                assert_eq!(user.uid, 7);
                assert_eq!(user.name, "Alice");
                assert_eq!(user.device_id.as_deref(), Some("abc"));
                assert_eq!(user.privilege, 0);
                assert_eq!(user.user_id, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_attendance_limit_default() {
        assert_eq!(parse("attendance").unwrap().command, Command::Attendance { limit: 20 });
        assert_eq!(
            parse("attendance --limit 5").unwrap().command,
            Command::Attendance { limit: 5 }
        );
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse("devices add 10.0.0.5 --port").is_err());
        assert_eq!(
            parse("devices add 10.0.0.5 --port abc").unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            parse("pull-users --limit 5").unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
        assert_eq!(
            parse("sync everything").unwrap_err().kind(),
            ErrorKind::InvalidSubcommand
        );
        assert_eq!(parse("users add 0x7 Alice").unwrap_err().exit_code(), 2);
    }

    #[test]
    fn test_apply_setting() {
        let mut settings = AppSettings::default();
        apply_setting(&mut settings, "auto_check_interval", "30").unwrap();
        apply_setting(&mut settings, "enable_auto_sync", "false").unwrap();
        assert_eq!(settings.auto_check_interval, 30);
        assert!(!settings.enable_auto_sync);

        assert!(apply_setting(&mut settings, "enable_auto_sync", "maybe").is_err());
        assert_eq!(
            apply_setting(&mut settings, "theme", "dark").unwrap_err(),
            SettingError::UnknownSetting("theme".into())
        );
    }
}
