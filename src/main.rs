//! Archive-Dispatch main entry point
//!
//! This is the command-line interface for submitting URLs to web-archiving
//! services, looking up snapshots and working with WARC captures.

use anyhow::{bail, Context};
use archive_dispatch::config::{load_config_with_hash, Config, ServiceKind};
use archive_dispatch::dispatch::build_http_client;
use archive_dispatch::output::{
    fetch_text, format_json_report, format_markdown_report, unified_diff_labeled,
    write_markdown_report,
};
use archive_dispatch::services::ServiceProfile;
use archive_dispatch::upload::prepare_upload;
use archive_dispatch::warc::{
    archive_page, compress_container, list_containers, summarize_container, WarcReader,
};
use archive_dispatch::{validate_target_url, Orchestrator};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Timeout for fetching a page to diff
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Archive-Dispatch: submit URLs to web-archiving services
///
/// Archive-Dispatch submits a URL to several archiving services at once,
/// respecting each service's rate limits and retrying where that can help.
/// It also captures pages into WARC containers and reads them back.
#[derive(Parser, Debug)]
#[command(name = "archive-dispatch")]
#[command(version)]
#[command(about = "Submit URLs to web-archiving services", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in services when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a URL to archiving services
    Submit {
        url: String,

        /// Services to use (comma-separated; all submitting services by default)
        #[arg(short, long, value_delimiter = ',')]
        services: Vec<String>,

        /// Overall deadline in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Write a markdown report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print the report as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Look up historical snapshots of a URL
    Lookup {
        url: String,

        /// Services to query (comma-separated; all services by default)
        #[arg(short, long, value_delimiter = ',')]
        services: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Capture a page into a new WARC container
    Capture {
        url: String,

        /// Screenshot taken by another tool, recorded in a metadata record
        #[arg(long)]
        screenshot: Option<PathBuf>,
    },

    /// Summarize a WARC container
    Read {
        path: PathBuf,

        /// List every record
        #[arg(long)]
        records: bool,

        #[arg(long)]
        json: bool,
    },

    /// Recompress a plain container as .warc.gz
    Compress { path: PathBuf },

    /// List the containers in the WARC directory
    List {
        /// Directory to list (the configured WARC directory by default)
        dir: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Show a unified diff of the visible text of two pages (files or URLs)
    Diff {
        old: String,
        new: String,

        /// Unchanged lines shown around each change
        #[arg(short = 'U', long, default_value_t = 3)]
        context: usize,
    },

    /// Verify a container and print its upload metadata
    UploadPrep {
        path: PathBuf,

        /// Metadata override as key=value (repeatable)
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Validate config and show the requests a submission would make
    DryRun {
        /// Example target (https://example.com/ by default)
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load(cli.config.as_deref())?;

    match cli.command {
        Command::Submit {
            url,
            services,
            deadline_ms,
            report,
            json,
        } => handle_submit(&config, &url, services, deadline_ms, report, json).await,
        Command::Lookup {
            url,
            services,
            json,
        } => handle_lookup(&config, &url, services, json).await,
        Command::Capture { url, screenshot } => {
            let path = archive_page(&config, &url, screenshot.as_deref()).await?;
            println!("✓ Captured {} into {}", url, path.display());
            Ok(())
        }
        Command::Read {
            path,
            records,
            json,
        } => handle_read(&path, records, json),
        Command::Compress { path } => {
            let compressed = compress_container(&path)
                .with_context(|| format!("Failed to compress {}", path.display()))?;
            if compressed == path {
                println!("✓ {} is already compressed", path.display());
            } else {
                println!("✓ Compressed {} into {}", path.display(), compressed.display());
            }
            Ok(())
        }
        Command::List { dir, json } => handle_list(&config, dir, json),
        Command::Diff { old, new, context } => handle_diff(&config, &old, &new, context).await,
        Command::UploadPrep { path, meta } => handle_upload_prep(&path, &meta),
        Command::DryRun { url } => handle_dry_run(&config, url.as_deref()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("archive_dispatch=info,warn"),
            1 => EnvFilter::new("archive_dispatch=debug,info"),
            2 => EnvFilter::new("archive_dispatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the configuration file, or the built-in defaults without one
fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        None => {
            tracing::debug!("No configuration file given, using built-in services");
            Ok(Config::default())
        }
    }
}

/// Default submission selection: every service that accepts submissions
fn submitting_services(config: &Config) -> Vec<String> {
    config
        .services
        .iter()
        .filter(|s| s.kind != ServiceKind::Aggregate)
        .map(|s| s.name.clone())
        .collect()
}

/// Handles the submit command
async fn handle_submit(
    config: &Config,
    url: &str,
    services: Vec<String>,
    deadline_ms: Option<u64>,
    report_path: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let services = if services.is_empty() {
        submitting_services(config)
    } else {
        services
    };

    let orchestrator = Orchestrator::from_config(config)?;
    let deadline = deadline_ms
        .map(Duration::from_millis)
        .or(orchestrator.default_deadline());
    let report = orchestrator
        .submit_all_with_deadline(url, &services, deadline)
        .await?;

    if json {
        println!("{}", format_json_report(&report)?);
    } else {
        println!("{}", format_markdown_report(&report, None, None));
    }

    let report_path = report_path.or_else(|| config.output.report_path.as_ref().map(PathBuf::from));
    if let Some(path) = report_path {
        write_markdown_report(&report, None, None, &path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }

    if report.success_count() == 0 {
        bail!("No service archived {}", report.target);
    }
    Ok(())
}

/// Handles the lookup command
async fn handle_lookup(
    config: &Config,
    url: &str,
    services: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    let services = if services.is_empty() {
        config.service_names()
    } else {
        services
    };

    let orchestrator = Orchestrator::from_config(config)?;
    let report = orchestrator.lookup_all(url, &services).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== Snapshots of {} ===\n", report.target);
    for result in report.results.values() {
        println!("{}: {}", result.service, result.summary());
        for source in &result.sources {
            for snapshot in &source.snapshots {
                println!("  - [{}] {}", source.source, snapshot);
            }
        }
    }
    Ok(())
}

/// Handles the read command
fn handle_read(path: &Path, records: bool, json: bool) -> anyhow::Result<()> {
    let summary = summarize_container(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Container: {}", path.display());
        println!("  Compressed: {}", summary.compressed);
        println!("  Records: {}", summary.records);
        for (record_type, count) in &summary.by_type {
            println!("    {}: {}", record_type, count);
        }
        println!("  Targets:");
        for target in &summary.targets {
            println!("    - {}", target);
        }
        if !summary.is_clean() {
            println!("  Damaged records: {}", summary.errors.len());
            for error in &summary.errors {
                println!("    ! {}", error);
            }
        }
    }

    if records {
        let reader = WarcReader::open(path)?;
        for (index, item) in reader.enumerate() {
            match item {
                Ok(record) => println!(
                    "#{:<4} {:<9} {:>8}B  {}  {}",
                    index,
                    record.record_type(),
                    record.block().len(),
                    record.http_status().map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                    record.target_uri().unwrap_or("-")
                ),
                Err(e) => println!("#{:<4} error: {}", index, e),
            }
        }
    }
    Ok(())
}

/// Handles the list command
fn handle_list(config: &Config, dir: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| PathBuf::from(&config.output.warc_dir));
    let containers = list_containers(&dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&containers)?);
        return Ok(());
    }

    println!("=== Containers in {} ({}) ===\n", dir.display(), containers.len());
    for container in &containers {
        println!(
            "{:<48} {:>9.2} MB  {}",
            container.file_name(),
            container.size_mib(),
            container.modified.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Reads one side of a diff: a URL is fetched, anything else is a local HTML file
async fn load_text(client: &reqwest::Client, source: &str) -> anyhow::Result<String> {
    match validate_target_url(source) {
        Ok(url) => Ok(fetch_text(client, &url, FETCH_TIMEOUT)
            .await
            .with_context(|| format!("Failed to fetch {}", source))?),
        Err(_) => {
            let html = std::fs::read_to_string(source)
                .with_context(|| format!("Failed to read {}", source))?;
            Ok(archive_dispatch::output::extract_text(&html))
        }
    }
}

/// Handles the diff command
async fn handle_diff(config: &Config, old: &str, new: &str, context: usize) -> anyhow::Result<()> {
    let client = build_http_client(&config.user_agent)?;
    let old_text = load_text(&client, old).await?;
    let new_text = load_text(&client, new).await?;

    let diff = unified_diff_labeled(&old_text, &new_text, old, new, context);
    if diff.is_empty() {
        println!("No differences in visible text");
    } else {
        println!("{}", diff);
    }
    Ok(())
}

/// Handles the upload-prep command
fn handle_upload_prep(path: &Path, meta: &[String]) -> anyhow::Result<()> {
    let mut overrides = BTreeMap::new();
    for entry in meta {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Metadata override '{}' is not KEY=VALUE", entry);
        };
        overrides.insert(key.trim().to_string(), value.trim().to_string());
    }

    let handoff = prepare_upload(path, &overrides)
        .with_context(|| format!("{} is not ready for upload", path.display()))?;

    println!("=== Upload Handoff ===\n");
    println!("File: {}", handoff.path.display());
    println!("Identifier: {}", handoff.identifier);
    println!("\nMetadata:");
    for (key, value) in &handoff.metadata {
        println!("  {}: {}", key, value);
    }
    Ok(())
}

/// Handles the dry-run command: validates config and shows planned requests
fn handle_dry_run(config: &Config, url: Option<&str>) -> anyhow::Result<()> {
    let target = validate_target_url(url.unwrap_or("https://example.com/"))?;

    println!("=== Archive-Dispatch Dry Run ===\n");

    println!("Dispatcher:");
    println!("  Mode: {:?}", config.dispatcher.mode);
    match config.dispatcher.deadline_ms {
        Some(ms) => println!("  Deadline: {}ms", ms),
        None => println!("  Deadline: none"),
    }

    println!("\nUser Agent:");
    println!("  Identity: {}", config.user_agent.identity);
    println!("  Accept-Language: {}", config.user_agent.accept_language);

    println!("\nOutput:");
    println!("  WARC directory: {}", config.output.warc_dir);
    println!("  Compressed: {}", config.output.compress);

    println!("\nServices ({}):", config.services.len());
    for service in &config.services {
        let profile = ServiceProfile::from_config(service);
        let policy = profile.retry_policy(config.dispatcher.mode);
        println!(
            "  - {} ({:?}, {} req/s, burst {}, {} attempt(s))",
            profile.name,
            profile.kind,
            profile.rate,
            profile.burst,
            policy.attempt_limit()
        );
        for request in profile.planned_requests(&target) {
            println!("    * {}", request);
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would submit {} to {} service(s)",
        target,
        submitting_services(config).len()
    );

    Ok(())
}
