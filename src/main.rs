// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Imago: Local AI Image Catalog & Organizer

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use imago::catalog::Catalog;
use imago::commit::{CommitExecutor, CommitMode};
use imago::config::AppConfig;
use imago::engine::{VisionClient, VisionTagger};
use imago::plan::{Plan, PlanBuilder};
use imago::scan::{ScanEvent, ScanPipeline};
use imago::tagdb::TagIndex;
use imago::{ImagoError, Result};

/// Imago CLI - Local AI Image Catalog & Organizer
#[derive(Parser, Debug)]
#[command(name = "imago")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Local AI-powered image catalog and folder organizer", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a directory, build an organization plan, optionally commit it
    Scan {
        /// Directory to scan (defaults to the configured source)
        source: Option<PathBuf>,

        /// Do not recurse into subdirectories
        #[arg(long)]
        flat: bool,

        /// Confidence threshold override (0.0-1.0)
        #[arg(long)]
        threshold: Option<f64>,

        /// Commit the plan to the destination after scanning
        #[arg(long)]
        commit: bool,

        /// Move files instead of copying when committing
        #[arg(long = "move")]
        move_files: bool,

        /// Destination base directory (defaults to the configured one)
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Skip the engine health check on startup
        #[arg(long)]
        skip_health_check: bool,

        /// Print the plan as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Catalog operations
    Catalog {
        #[command(subcommand)]
        action: CatalogCommands,
    },

    /// Tag index operations
    Db {
        #[command(subcommand)]
        action: DbCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show engine and catalog status
    Status,
}

#[derive(Subcommand, Debug)]
enum CatalogCommands {
    /// Create a new empty catalog
    Init {
        /// Catalog file to create (defaults to the configured path)
        path: Option<PathBuf>,
    },

    /// Set the base directory keys are computed against
    SetBase {
        dir: PathBuf,
    },

    /// Search the catalog by path, filename or tag
    Search {
        query: String,
    },

    /// List every tag in the catalog
    Tags,
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    /// Show index statistics
    Stats,

    /// List tags with usage counts
    Tags {
        /// Maximum number to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Search indexed images
    Search {
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Scan {
            source,
            flat,
            threshold,
            commit,
            move_files,
            dest,
            skip_health_check,
            json,
        } => {
            run_scan(
                config,
                source,
                flat,
                threshold,
                commit,
                move_files,
                dest,
                skip_health_check,
                json,
            )
            .await
        }
        Commands::Catalog { action } => run_catalog_command(config, action),
        Commands::Db { action } => run_db_command(config, action),
        Commands::Config { action } => run_config_command(config, action, &cli.config),
        Commands::Status => run_status(config).await,
    }?;
    Ok(())
}

/// Open the configured catalog, creating it when it does not exist
fn open_catalog(config: &AppConfig) -> Result<Arc<Catalog>> {
    let path = PathBuf::from(&config.catalog_path);
    let catalog = Catalog::new();
    if path.exists() {
        catalog.load(&path)?;
    } else {
        catalog.create(&path)?;
        info!("Created new catalog at {}", path.display());
    }
    Ok(Arc::new(catalog))
}

#[allow(clippy::too_many_arguments)]
async fn run_scan(
    config: AppConfig,
    source: Option<PathBuf>,
    flat: bool,
    threshold: Option<f64>,
    commit: bool,
    move_files: bool,
    dest: Option<PathBuf>,
    skip_health_check: bool,
    json: bool,
) -> Result<()> {
    let source = source.unwrap_or_else(|| PathBuf::from(&config.default_source));
    let recursive = if flat { false } else { config.scan.recursive };
    let threshold = threshold.unwrap_or(config.ai_threshold).clamp(0.0, 1.0);

    let tagger = VisionTagger::new(&config.engine)?;
    if !skip_health_check {
        info!("Checking vision engine availability...");
        tagger.client().health_check().await.map_err(|e| {
            ImagoError::EngineUnavailable(format!("Failed to connect to engine: {}", e))
        })?;
        info!("Vision engine is running");
    } else {
        warn!("Skipping engine health check");
    }

    let catalog = open_catalog(&config)?;
    if catalog.base_dir().is_none() {
        // A fresh catalog adopts the scanned directory as its root
        catalog.set_base_dir(&source)?;
    }

    let builder = Arc::new(
        PlanBuilder::new(Arc::new(tagger), threshold)
            .with_catalog(Arc::clone(&catalog), config.scan.write_through),
    );
    let pipeline = ScanPipeline::new(builder, config.scan.extensions.clone());

    info!("Scanning {} (recursive: {})", source.display(), recursive);
    let mut handle = pipeline.start(source, recursive);
    let token = handle.token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, cancelling scan...");
            token.cancel();
        }
    });

    let mut outcome = None;
    while let Some(event) = handle.next_event().await {
        match event {
            ScanEvent::Progress {
                index,
                total,
                percent,
                file,
            } => {
                info!("Scanning {}/{} ({}%): {}", index, total, percent, file);
            }
            terminal => {
                outcome = Some(terminal);
            }
        }
    }
    handle.join().await;

    let plan = match outcome {
        Some(ScanEvent::Completed(plan)) => plan,
        Some(ScanEvent::Cancelled(plan)) => {
            warn!("Scan cancelled; continuing with {} partial entries", plan.entry_count());
            plan
        }
        Some(ScanEvent::Failed(msg)) => return Err(ImagoError::Scan(msg)),
        _ => return Err(ImagoError::Scan("Scan produced no result".to_string())),
    };

    if catalog.is_dirty() {
        catalog.save()?;
        info!("Catalog saved");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }

    if commit {
        let dest = dest.unwrap_or_else(|| PathBuf::from(&config.default_dest));
        let mode = if move_files { CommitMode::Move } else { CommitMode::Copy };
        let index = TagIndex::open(&config.database.path)?;
        let stats = CommitExecutor::new(dest.clone(), mode)
            .with_index(index)
            .execute(&plan)?;
        println!(
            "Committed to {}: {} processed, {} renamed on collision, {} failed",
            dest.display(),
            stats.processed,
            stats.merged,
            stats.failed
        );
    }

    Ok(())
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("No images found.");
        return;
    }
    println!("Plan: {} images in {} folders", plan.entry_count(), plan.folders().len());
    for (folder, entries) in plan.folders() {
        println!("  {}/ ({})", folder, entries.len());
        for entry in entries {
            let tags: Vec<&str> = entry.tags.iter().map(String::as_str).collect();
            println!("    {} [{}]", entry.new_filename, tags.join(", "));
        }
    }
}

fn run_catalog_command(config: AppConfig, action: CatalogCommands) -> Result<()> {
    match action {
        CatalogCommands::Init { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(&config.catalog_path));
            if path.exists() {
                return Err(ImagoError::Catalog(format!(
                    "{} already exists",
                    path.display()
                )));
            }
            let catalog = Catalog::new();
            catalog.create(&path)?;
            println!("Created catalog at {}", path.display());
        }
        CatalogCommands::SetBase { dir } => {
            let catalog = open_catalog(&config)?;
            catalog.set_base_dir(&dir)?;
            catalog.save()?;
            println!("Base directory set to {}", dir.display());
        }
        CatalogCommands::Search { query } => {
            let catalog = open_catalog(&config)?;
            let results = catalog.search(&query);
            println!("{} matches for '{}':", results.len(), query);
            for rel_path in results {
                let meta = match catalog.base_dir() {
                    Some(base) => catalog.get(&base.join(&rel_path)),
                    None => continue,
                };
                let tags: Vec<String> = meta.tags.into_iter().collect();
                println!("  {} ({}) [{}]", rel_path, meta.filename, tags.join(", "));
            }
        }
        CatalogCommands::Tags => {
            let catalog = open_catalog(&config)?;
            for tag in catalog.all_tags() {
                println!("  {}", tag);
            }
        }
    }
    Ok(())
}

fn run_db_command(config: AppConfig, action: DbCommands) -> Result<()> {
    let index = TagIndex::open(&config.database.path)?;

    match action {
        DbCommands::Stats => {
            let stats = index.stats()?;
            println!("Tag index statistics:");
            println!("  Images: {}", stats.image_count);
            println!("  Tags: {}", stats.tag_count);
            println!("  Folders: {}", stats.folder_count);
        }
        DbCommands::Tags { limit } => {
            println!("Tags:");
            for tag in index.all_tags()?.into_iter().take(limit) {
                println!("  {} ({})", tag.name, tag.count);
            }
        }
        DbCommands::Search { query, limit } => {
            let results = index.search(&query, limit)?;
            println!("Search results for '{}':", query);
            for image in results {
                println!("  {} -> {}", image.folder, image.organized_path);
            }
        }
    }
    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {}", output.display());
        }
        ConfigCommands::Validate => {
            println!("Configuration at {} is valid", config_path.display());
            println!("  Source: {}", config.default_source);
            println!("  Destination: {}", config.default_dest);
            println!("  Catalog: {}", config.catalog_path);
            println!("  Threshold: {}", config.threshold());
        }
    }
    Ok(())
}

async fn run_status(config: AppConfig) -> Result<()> {
    println!("Imago v1.0.0 Status");
    println!("===================");

    let client = VisionClient::new(&config.engine)?;
    match client.health_check().await {
        Ok(()) => println!("Engine: Running"),
        Err(e) => println!("Engine: Error - {}", e),
    }

    match client.list_models().await {
        Ok(models) => {
            println!("\nAvailable models:");
            for m in &models {
                let marker = if m.starts_with(&config.engine.vision_model) {
                    "→"
                } else {
                    " "
                };
                println!("  {} {}", marker, m);
            }
        }
        Err(e) => println!("  Error listing models: {}", e),
    }

    let catalog_path = PathBuf::from(&config.catalog_path);
    if catalog_path.exists() {
        let catalog = Catalog::new();
        match catalog.load(&catalog_path) {
            Ok(()) => {
                println!("\nCatalog ({}):", catalog_path.display());
                println!("  Images: {}", catalog.len());
                println!("  Tags: {}", catalog.all_tags().len());
                match catalog.base_dir() {
                    Some(base) => println!("  Base dir: {}", base.display()),
                    None => println!("  Base dir: (unset)"),
                }
            }
            Err(e) => println!("\nCatalog: Error - {}", e),
        }
    } else {
        println!("\nCatalog: not created yet ({})", catalog_path.display());
    }

    match TagIndex::open(&config.database.path) {
        Ok(index) => {
            let stats = index.stats()?;
            println!("\nTag index ({}):", config.database.path);
            println!("  Images: {}", stats.image_count);
            println!("  Tags: {}", stats.tag_count);
        }
        Err(e) => println!("\nTag index: Error - {}", e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_scan_command() {
        let cli = Cli::try_parse_from([
            "imago", "scan", "/tmp/pics", "--commit", "--move", "--flat",
        ])
        .unwrap();

        match cli.command {
            Commands::Scan {
                source,
                commit,
                move_files,
                flat,
                ..
            } => {
                assert_eq!(source, Some(PathBuf::from("/tmp/pics")));
                assert!(commit);
                assert!(move_files);
                assert!(flat);
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_catalog_search() {
        let cli = Cli::try_parse_from(["imago", "catalog", "search", "sunset"]).unwrap();

        match cli.command {
            Commands::Catalog {
                action: CatalogCommands::Search { query },
            } => assert_eq!(query, "sunset"),
            _ => panic!("Expected Catalog Search command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from(["imago", "--verbose", "status"]).unwrap();
        assert!(cli.verbose);
        assert!(!cli.quiet);
    }
}
