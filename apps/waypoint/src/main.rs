//! # Waypoint - Goals and Calendar Server
//!
//! The main binary for Waypoint.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for planner operations, local or remote
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                  apps/waypoint (THE BINARY)                │
//! │                                                            │
//! │  ┌─────────────┐    ┌─────────────┐    ┌───────────────┐   │
//! │  │   CLI       │    │   HTTP API  │    │  HTTP Client  │   │
//! │  │  (clap)     │    │   (axum)    │    │  (reqwest)    │   │
//! │  └──────┬──────┘    └──────┬──────┘    └───────┬───────┘   │
//! │         │                  │                   │           │
//! │         └──────────────────┼───────────────────┘           │
//! │                            ▼                               │
//! │                   ┌────────────────┐                       │
//! │                   │ waypoint-core  │                       │
//! │                   │  (THE LOGIC)   │                       │
//! │                   └────────────────┘                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! waypoint server --host 0.0.0.0 --port 8080
//!
//! # Local operations
//! waypoint tree
//! waypoint overdue --limit 5
//!
//! # Against a running server
//! waypoint --server http://localhost:8080 --token secret today
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypoint::cli;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // WAYPOINT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("WAYPOINT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose {
        "waypoint=debug,waypoint_core=debug,tower_http=debug"
    } else {
        "waypoint=info,waypoint_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Waypoint startup banner.
fn print_banner() {
    println!(
        r#"
  ██╗    ██╗ █████╗ ██╗   ██╗██████╗  ██████╗ ██╗███╗   ██╗████████╗
  ██║    ██║██╔══██╗╚██╗ ██╔╝██╔══██╗██╔═══██╗██║████╗  ██║╚══██╔══╝
  ██║ █╗ ██║███████║ ╚████╔╝ ██████╔╝██║   ██║██║██╔██╗ ██║   ██║
  ██║███╗██║██╔══██║  ╚██╔╝  ██╔═══╝ ██║   ██║██║██║╚██╗██║   ██║
  ╚███╔███╔╝██║  ██║   ██║   ██║     ╚██████╔╝██║██║ ╚████║   ██║
   ╚══╝╚══╝ ╚═╝  ╚═╝   ╚═╝   ╚═╝      ╚═════╝ ╚═╝╚═╝  ╚═══╝   ╚═╝

  Goals and Calendar Server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
