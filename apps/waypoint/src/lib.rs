//! # waypoint
//!
//! The server, CLI and HTTP client built on `waypoint-core`.
//!
//! - `api`: axum REST server, one owner per request
//! - `cli`: clap commands, local or against a running server
//! - `client`: reqwest client with a query cache and optimistic updates
//! - `config`: TOML file plus `WAYPOINT_*` environment overrides

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
