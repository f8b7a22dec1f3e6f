//! # Waypoint CLI Module
//!
//! This module implements the CLI interface for Waypoint.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `status` - Show per-level goal statistics
//! - `tree` - Print the goal hierarchy
//! - `today` - Show today's events and goals
//! - `overdue` - Show overdue goals and events
//! - `export` - Export one owner's data to JSON
//! - `import` - Import a JSON export into one owner's account
//!
//! `status`, `tree`, `today` and `overdue` talk to a running server when
//! `--server` is given, and open the database directly otherwise.

mod commands;

use crate::config::{BackendKind, Config};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use waypoint_core::{OwnerId, WaypointError};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Waypoint - goals and calendar server
///
/// Long-term goals break down into yearly, monthly and daily goals; progress
/// flows back up from the leaves.
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (overrides the config file)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Owner id for local commands
    #[arg(short, long, global = true, default_value = "1")]
    pub owner: u64,

    /// Base URL of a running server; read commands go through the HTTP client
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Bearer token for `--server`
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show per-level goal statistics
    Status,

    /// Print the goal hierarchy
    Tree,

    /// Show today's events and goals
    Today {
        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Show overdue goals and events, most urgent first
    Overdue {
        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Maximum number of items
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Export one owner's data to a JSON file
    Export {
        /// Output file path
        #[arg(short = 'O', long)]
        output: PathBuf,
    },

    /// Import a JSON export into the owner's account
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolved settings shared by every command.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub owner: OwnerId,
    pub json_mode: bool,
}

impl Context {
    fn from_cli(cli: &Cli) -> Result<Self, WaypointError> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(database) = &cli.database {
            config.storage.database.clone_from(database);
        }
        if let Some(backend) = cli.backend {
            config.storage.backend = backend;
        }
        Ok(Self {
            config,
            owner: OwnerId(cli.owner),
            json_mode: cli.json_mode,
        })
    }
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), WaypointError> {
    let mut ctx = Context::from_cli(&cli)?;

    if let Some(url) = cli.server {
        let remote = Remote::new(url, cli.token, ctx.json_mode);
        return match cli.command {
            Some(Commands::Status) | None => remote.status().await,
            Some(Commands::Tree) => remote.tree().await,
            Some(Commands::Today { .. }) => remote.today().await,
            Some(Commands::Overdue { limit, .. }) => remote.overdue(limit).await,
            Some(_) => Err(WaypointError::InvalidInput(
                "only status, tree, today and overdue can run against --server".to_string(),
            )),
        };
    }

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                ctx.config.server.host = host;
            }
            if let Some(port) = port {
                ctx.config.server.port = port;
            }
            cmd_server(&ctx).await
        }
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Status) => cmd_status(&ctx),
        Some(Commands::Tree) => cmd_tree(&ctx),
        Some(Commands::Today { now }) => cmd_today(&ctx, now.unwrap_or_else(Utc::now)),
        Some(Commands::Overdue { now, limit }) => {
            cmd_overdue(&ctx, now.unwrap_or_else(Utc::now), limit)
        }
        Some(Commands::Export { output }) => cmd_export(&ctx, &output),
        Some(Commands::Import { input }) => cmd_import(&ctx, &input),
        None => {
            // No subcommand - show status by default
            cmd_status(&ctx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "waypoint",
            "overdue",
            "--limit",
            "3",
            "--backend",
            "memory",
            "--owner",
            "9",
        ])
        .expect("parse");
        assert_eq!(cli.backend, Some(BackendKind::Memory));
        assert_eq!(cli.owner, 9);
        assert!(matches!(
            cli.command,
            Some(Commands::Overdue { limit: Some(3), now: None })
        ));
    }

    #[test]
    fn reference_time_is_rfc3339() {
        let cli = Cli::try_parse_from(["waypoint", "today", "--now", "2024-01-15T09:00:00Z"])
            .expect("parse");
        let Some(Commands::Today { now: Some(now) }) = cli.command else {
            unreachable!("today with --now");
        };
        assert_eq!(now.to_rfc3339(), "2024-01-15T09:00:00+00:00");
    }
}
