//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::Context;
use crate::api;
use crate::client::WaypointClient;
use crate::config::BackendKind;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use waypoint_core::{
    Backend, GoalNode, GoalStatistics, ItemKind, OverdueItem, Planner, Snapshot, TodayItem,
    WaypointError,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for import (64 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), WaypointError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| WaypointError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(WaypointError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path: canonical, existing, and a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, WaypointError> {
    let canonical = path.canonicalize().map_err(|e| {
        WaypointError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(WaypointError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, WaypointError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        WaypointError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(WaypointError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| WaypointError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

/// Basis points as a percentage with two decimals.
fn format_bp(bp: u32) -> String {
    format!("{}.{:02}%", bp / 100, bp % 100)
}

// =============================================================================
// PLANNER
// =============================================================================

/// Open the planner on the configured backend.
pub fn open_planner(ctx: &Context) -> Result<Planner, WaypointError> {
    let backend = match ctx.config.storage.backend {
        BackendKind::Memory => Backend::default(),
        BackendKind::Redb => Backend::redb(&ctx.config.storage.database)?,
    };
    tracing::debug!(
        backend = backend.name(),
        database = %ctx.config.storage.database.display(),
        "planner opened"
    );
    Ok(Planner::new(backend))
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(ctx: &Context) -> Result<(), WaypointError> {
    let planner = open_planner(ctx)?;
    let config = &ctx.config;

    println!("Waypoint Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", planner.store().name());
    println!("  Database: {:?}", config.storage.database);
    println!("  Accounts: {}", config.accounts.len());
    println!();
    println!("Endpoints:");
    println!("  GET|POST /goals          - List / create goals");
    println!("  GET      /goals/tree     - Goal hierarchy");
    println!("  GET|POST /events         - List / create events");
    println!("  GET|POST /categories     - List / create categories");
    println!("  GET      /profile        - Profile and preferences");
    println!("  GET      /dashboard      - Stats, today, overdue, metrics");
    println!("  GET      /health         - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(config, planner).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), WaypointError> {
    let db_path = &ctx.config.storage.database;
    match ctx.config.storage.backend {
        BackendKind::Memory => {
            println!("Memory backend needs no initialization");
        }
        BackendKind::Redb => {
            if db_path.exists() {
                if !force {
                    return Err(WaypointError::InvalidInput(
                        "Database already exists. Use --force to overwrite.".to_string(),
                    ));
                }
                std::fs::remove_file(db_path)
                    .map_err(|e| WaypointError::Io(format!("Remove database: {}", e)))?;
            }
            let _backend = Backend::redb(db_path)?;
            println!("Initialized new redb database at {:?}", db_path);
        }
    }
    Ok(())
}

// =============================================================================
// READ COMMANDS
// =============================================================================

/// Show per-level goal statistics.
pub fn cmd_status(ctx: &Context) -> Result<(), WaypointError> {
    let planner = open_planner(ctx)?;
    let stats = planner.goal_stats(ctx.owner)?;
    print_status(&stats, ctx.json_mode);
    Ok(())
}

/// Print the goal hierarchy.
pub fn cmd_tree(ctx: &Context) -> Result<(), WaypointError> {
    let planner = open_planner(ctx)?;
    let tree = planner.goal_tree(ctx.owner)?;
    print_tree(&tree, ctx.json_mode);
    Ok(())
}

/// Show today's events and goals.
pub fn cmd_today(ctx: &Context, now: DateTime<Utc>) -> Result<(), WaypointError> {
    let planner = open_planner(ctx)?;
    let items = planner.today(ctx.owner, now)?;
    print_today(&items, ctx.json_mode);
    Ok(())
}

/// Show overdue items, most urgent first.
pub fn cmd_overdue(
    ctx: &Context,
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Result<(), WaypointError> {
    let planner = open_planner(ctx)?;
    let items = planner.overdue(ctx.owner, now, limit)?;
    print_overdue(&items, ctx.json_mode);
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT COMMANDS
// =============================================================================

/// Export the owner's data as JSON.
pub fn cmd_export(ctx: &Context, output: &Path) -> Result<(), WaypointError> {
    let validated_output = validate_output_path(output)?;
    let planner = open_planner(ctx)?;

    let snapshot = planner.export(ctx.owner, Utc::now())?;
    let data = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| WaypointError::Serialization(e.to_string()))?;

    std::fs::write(&validated_output, &data)
        .map_err(|e| WaypointError::Io(format!("Write file: {}", e)))?;

    println!(
        "Exported {} goals, {} events, {} categories ({} bytes) to {:?}",
        snapshot.goals.len(),
        snapshot.events.len(),
        snapshot.categories.len(),
        data.len(),
        validated_output
    );
    Ok(())
}

/// Import a JSON export into the owner's account.
pub fn cmd_import(ctx: &Context, input: &Path) -> Result<(), WaypointError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| WaypointError::Io(format!("Read file: {}", e)))?;
    let snapshot: Snapshot = serde_json::from_slice(&data)
        .map_err(|e| WaypointError::Serialization(format!("Invalid export file: {}", e)))?;

    let mut planner = open_planner(ctx)?;
    if !planner.store().is_persistent() {
        tracing::warn!("importing into the memory backend; data is lost on exit");
    }
    let report = planner.import(ctx.owner, &snapshot, Utc::now())?;

    if ctx.json_mode {
        print_json(&report);
    } else {
        println!(
            "Imported {} goals, {} events, {} categories{}",
            report.goals,
            report.events,
            report.categories,
            if report.profile { " and profile" } else { "" }
        );
    }
    Ok(())
}

// =============================================================================
// REMOTE COMMANDS
// =============================================================================

/// Read commands served by a running server through the HTTP client.
#[derive(Debug)]
pub struct Remote {
    client: WaypointClient,
    json_mode: bool,
}

impl Remote {
    #[must_use]
    pub fn new(url: String, token: Option<String>, json_mode: bool) -> Self {
        Self {
            client: WaypointClient::new(url, token),
            json_mode,
        }
    }

    fn failed(e: crate::client::ClientError) -> WaypointError {
        WaypointError::Io(format!("Server request failed: {}", e))
    }

    pub async fn status(mut self) -> Result<(), WaypointError> {
        let health = self.client.health().await.map_err(Self::failed)?;
        tracing::debug!(version = %health.version, backend = %health.backend, "server reachable");
        let stats = self.client.goal_stats().await.map_err(Self::failed)?;
        print_status(&stats, self.json_mode);
        Ok(())
    }

    pub async fn tree(mut self) -> Result<(), WaypointError> {
        let tree = self.client.goal_tree().await.map_err(Self::failed)?;
        print_tree(&tree, self.json_mode);
        Ok(())
    }

    pub async fn today(mut self) -> Result<(), WaypointError> {
        let items = self.client.today().await.map_err(Self::failed)?;
        print_today(&items, self.json_mode);
        Ok(())
    }

    pub async fn overdue(mut self, limit: Option<usize>) -> Result<(), WaypointError> {
        let mut items = self.client.overdue().await.map_err(Self::failed)?;
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        print_overdue(&items, self.json_mode);
        Ok(())
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_status(stats: &GoalStatistics, json_mode: bool) {
    if json_mode {
        print_json(stats);
        return;
    }

    println!("Waypoint Goal Status");
    println!("====================");
    for level in &stats.levels {
        println!(
            "{:<10} {:>4} total  {:>4} done  {:>8}",
            level.name,
            level.total,
            level.completed,
            format_bp(level.completion_rate_bp)
        );
    }
    println!();
    println!(
        "All goals: {} total, {} done, {}",
        stats.total,
        stats.completed,
        format_bp(stats.completion_rate_bp)
    );
}

fn print_tree(tree: &[GoalNode], json_mode: bool) {
    if json_mode {
        print_json(&tree);
        return;
    }
    if tree.is_empty() {
        println!("No goals yet");
        return;
    }
    for node in tree {
        print_node(node, 0);
    }
}

fn print_node(node: &GoalNode, depth: usize) {
    let goal = &node.goal;
    println!(
        "{}[{}] {} ({}%, {}) #{}",
        "  ".repeat(depth),
        goal.level.name(),
        goal.title,
        goal.progress.percent(),
        goal.status.as_str(),
        goal.id.0
    );
    for child in &node.children {
        print_node(child, depth.saturating_add(1));
    }
}

fn print_today(items: &[TodayItem], json_mode: bool) {
    if json_mode {
        print_json(&items);
        return;
    }
    if items.is_empty() {
        println!("Nothing scheduled today");
        return;
    }
    for item in items {
        let when = if item.all_day {
            "all day".to_string()
        } else {
            item.at.format("%H:%M").to_string()
        };
        match item.kind {
            ItemKind::Event => println!("{:>8}  {}", when, item.title),
            ItemKind::Goal => println!(
                "{:>8}  {} ({}%)",
                when,
                item.title,
                item.progress_bp.map(|p| p.percent()).unwrap_or(0)
            ),
        }
    }
}

fn print_overdue(items: &[OverdueItem], json_mode: bool) {
    if json_mode {
        print_json(&items);
        return;
    }
    if items.is_empty() {
        println!("Nothing overdue");
        return;
    }
    for item in items {
        println!(
            "{:<9} {:>3}d  {} (due {})",
            format!("{:?}", item.urgency),
            item.days_overdue,
            item.title,
            item.due.format("%Y-%m-%d")
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================
