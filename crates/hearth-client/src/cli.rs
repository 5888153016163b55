//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// hearth - today's family calendar on the kitchen display
#[derive(Debug, Parser)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "HEARTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one sync cycle for the selected calendar
    Sync,

    /// Select the calendar to sync
    Select {
        /// Calendar ID as reported by `hearth calendars`
        calendar_id: String,
    },

    /// Forget the selected calendar
    Deselect,

    /// List calendars the signed-in account can read
    Calendars {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the selected calendar and cache freshness
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show today's events from the local cache
    Today {
        /// Keep printing as the day changes
        #[arg(long, short)]
        watch: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Credential commands
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Run the periodic sync scheduler in the foreground
    Daemon,
}

/// Credential actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Store an OAuth token obtained elsewhere
    Token {
        /// Access token
        #[arg(long, env = "HEARTH_ACCESS_TOKEN")]
        access_token: String,

        /// Refresh token, needed to renew the access token
        #[arg(long, env = "HEARTH_REFRESH_TOKEN")]
        refresh_token: Option<String>,

        /// Seconds until the access token expires
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Remove the stored token
    Logout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select() {
        let cli = Cli::try_parse_from(["hearth", "select", "family@group.calendar.google.com"])
            .unwrap();
        match cli.command {
            Command::Select { calendar_id } => {
                assert_eq!(calendar_id, "family@group.calendar.google.com")
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["hearth", "today", "--watch", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Command::Today {
                watch: true,
                json: false
            }
        ));
    }

    #[test]
    fn parses_auth_token() {
        let cli = Cli::try_parse_from([
            "hearth",
            "auth",
            "token",
            "--access-token",
            "ya29.a0",
            "--refresh-token",
            "1//0g",
            "--expires-in",
            "3599",
        ])
        .unwrap();
        match cli.command {
            Command::Auth {
                action:
                    AuthAction::Token {
                        access_token,
                        refresh_token,
                        expires_in,
                    },
            } => {
                assert_eq!(access_token, "ya29.a0");
                assert_eq!(refresh_token.as_deref(), Some("1//0g"));
                assert_eq!(expires_in, Some(3599));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["hearth"]).is_err());
        assert!(Cli::try_parse_from(["hearth", "select"]).is_err());
    }
}
