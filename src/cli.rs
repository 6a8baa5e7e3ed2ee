use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

use crate::{config::StatusLabel, instance::DEFAULT_LOCK_PORT};

/// Schedule-driven Blynclight status daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding config.json and status.json
    #[arg(short = 'c', long = "config-dir", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Loopback port used as the single-instance lock
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_LOCK_PORT, global = true)]
    pub port: u16,

    /// Detach from the terminal (run only)
    #[arg(short = 'd', long = "daemonize", default_value = "false", global = true)]
    pub daemonize: bool,

    /// Log debug messages
    #[arg(short = 'v', long = "verbose", default_value = "false", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the daemon, or show the settings if one is already running
    Run,
    /// Print the settings and device status as JSON
    Settings,
    /// Print a short status report
    Status,
    /// Force a status until `resume`
    Force {
        /// open, focused, away or off
        label: StatusLabel,
    },
    /// Clear the forced status and follow the schedule again
    Resume,
    /// Replace the schedule from a JSON file with `default_state` and `rules`
    Apply { file: PathBuf },
    /// Print the status the schedule gives for a moment
    Preview {
        /// Local time as YYYY-MM-DDTHH:MM, defaults to now
        #[arg(long, value_parser = parse_local_minute)]
        at: Option<NaiveDateTime>,
    },
    /// Change the polling interval
    SetPoll { seconds: u64 },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

fn parse_local_minute(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use pretty_assertions::assert_eq;

    #[test]
    fn run_is_the_default() {
        let cli = Cli::parse_from(["blyncd"]);
        assert_eq!(cli.command(), Command::Run);
        assert_eq!(cli.port, DEFAULT_LOCK_PORT);
        assert!(!cli.daemonize);
    }

    #[test]
    fn force_accepts_legacy_colors() {
        let cli = Cli::parse_from(["blyncd", "force", "red"]);
        assert_eq!(
            cli.command(),
            Command::Force {
                label: StatusLabel::Focused
            }
        );
    }

    #[test]
    fn force_rejects_unknown_labels() {
        assert!(Cli::try_parse_from(["blyncd", "force", "purple"]).is_err());
    }

    #[test]
    fn preview_parses_local_minute() {
        let cli = Cli::parse_from(["blyncd", "preview", "--at", "2026-02-02T22:15"]);
        let Command::Preview { at: Some(at) } = cli.command() else {
            panic!("expected preview with a time");
        };
        assert_eq!((at.day(), at.hour(), at.minute()), (2, 22, 15));

        assert!(Cli::try_parse_from(["blyncd", "preview", "--at", "tomorrow"]).is_err());
    }

    #[test]
    fn global_options() {
        let cli = Cli::parse_from(["blyncd", "-c", "/tmp/b", "-p", "9000", "-v", "status"]);
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/b")));
        assert_eq!(cli.port, 9000);
        assert!(cli.verbose);
        assert_eq!(cli.command(), Command::Status);
    }

    #[test]
    fn options_are_accepted_after_the_subcommand() {
        let cli = Cli::parse_from(["blyncd", "status", "-v", "--port", "9100"]);
        assert_eq!(cli.command(), Command::Status);
        assert!(cli.verbose);
        assert_eq!(cli.port, 9100);

        let cli = Cli::parse_from(["blyncd", "run", "--daemonize", "-c", "/tmp/b"]);
        assert_eq!(cli.command(), Command::Run);
        assert!(cli.daemonize);
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/b")));
    }
}
