//! RF Signal Detector - wireless network scanner and analyzer
//!
//! A CLI tool that polls the host's wireless adapter for nearby access
//! points, aggregates what it sees per BSSID, and renders live views,
//! summaries and offline analyses of exported scans.
//!
//! Exit codes:
//!   0   - Success
//!   1   - Runtime error (configuration, I/O, capture failure, etc.)
//!   2   - Wireless adapter unavailable (no interface, tool or privilege)
//!   3   - Malformed results file
//!   4   - Unsupported results schema version
//!   130 - Interrupted (partial results were still reported)

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod monitor;
mod report;
mod scanner;

use analysis::Aggregator;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cli::{AnalyzeArgs, Args, Command, MonitorArgs, ScanArgs};
use config::{Config, CONFIG_FILE_NAME};
use error::ScanError;
use indicatif::{ProgressBar, ProgressStyle};
use models::{Band, ScanSession, SessionMetadata};
use monitor::{Cancellation, CycleReport, PollConfig, StopReason};
use scanner::{BandFilter, ScanGuard, ScanSource};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit code after a user interrupt.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("RF Signal Detector v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(exit_code_for(&e));
        }
    }
}

/// Map a failure to its exit code via the typed error inside it, if any.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ScanError>())
        .map_or(1, ScanError::exit_code)
}

/// Handle init-config: generate a default .rf-detector.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to choose the interface, backend, poll interval and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so they never interleave with the live view on stdout.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the subcommand. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    match &args.command {
        Command::Scan(scan) => run_scan(scan, &config, args.quiet).await,
        Command::Monitor(monitor) => run_monitor(monitor, &config, args.quiet).await,
        Command::Analyze(analyze) => run_analyze(analyze, &config),
        Command::InitConfig => handle_init_config().map(|_| 0),
    }
}

/// `scan`: poll the selected bands for a fixed time, then summarize.
async fn run_scan(scan: &ScanArgs, config: &Config, quiet: bool) -> Result<i32> {
    let filter = BandFilter::from(scan.band);
    let metadata = SessionMetadata::new(
        Utc::now(),
        filter.bands(),
        config.session.stale_after_secs,
    );
    let poll = PollConfig {
        duration: Duration::from_secs(scan.time),
        interval: config.scanner.poll_interval(),
        filter,
        channel: None,
    };

    if !quiet {
        println!("🔍 Scanning {} for {}s (Ctrl+C to stop)\n", filter, scan.time);
    }

    // The live view owns the screen, so the bar and discovery lines stay hidden.
    let live = scan.visualize && !quiet;
    let pb = if quiet || live {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(scan.time);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}s {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(200));
        pb
    };
    pb.println(report::discovery_header());

    let (session, reason) = capture_session(config, metadata, &poll, |engine, cycle| {
        if live {
            draw_live(engine, cycle);
            return;
        }
        for bssid in &cycle.new_networks {
            if let Some(record) = engine.session().get(bssid) {
                pb.println(report::discovery_line(record));
            }
        }
        pb.set_position(cycle.elapsed.as_secs().min(scan.time));
        pb.set_message(format!("{} networks", engine.len()));
    })
    .await?;
    pb.finish_and_clear();

    finish_session(&session, reason, scan.output.as_deref(), config, quiet)
}

/// `monitor`: watch one channel with a live, redrawn view.
async fn run_monitor(monitor: &MonitorArgs, config: &Config, quiet: bool) -> Result<i32> {
    let filter = BandFilter::for_channel(monitor.channel)
        .with_context(|| format!("Unknown WiFi channel: {}", monitor.channel))?;
    let band = Band::from_channel(monitor.channel)
        .with_context(|| format!("Unknown WiFi channel: {}", monitor.channel))?;

    let mut metadata =
        SessionMetadata::new(Utc::now(), vec![band], config.session.stale_after_secs);
    metadata.channel_filter = Some(monitor.channel);

    let poll = PollConfig {
        duration: Duration::from_secs(monitor.time),
        interval: config.scanner.poll_interval(),
        filter,
        channel: Some(monitor.channel),
    };

    info!(
        "Monitoring channel {} for {}s",
        monitor.channel, monitor.time
    );

    let (session, reason) = capture_session(config, metadata, &poll, |engine, cycle| {
        if !quiet {
            draw_live(engine, cycle);
        }
    })
    .await?;

    finish_session(&session, reason, monitor.output.as_deref(), config, quiet)
}

/// One redraw of the live view, ending with the cycle's status line.
fn live_frame(engine: &Aggregator, cycle: &CycleReport, now: DateTime<Utc>) -> String {
    let mut frame = format!(
        "{}{}",
        report::CLEAR_SCREEN,
        report::render_live(&engine.snapshot_at(now), now)
    );
    match cycle.error {
        Some(ref err) => frame.push_str(&format!("⚠️  Cycle {} skipped: {}\n", cycle.cycle, err)),
        None => frame.push_str(&format!(
            "Cycle {}: {} sightings\n",
            cycle.cycle, cycle.observed
        )),
    }
    frame
}

fn draw_live(engine: &Aggregator, cycle: &CycleReport) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(live_frame(engine, cycle, Utc::now()).as_bytes());
    let _ = stdout.flush();
}

/// Open the configured scan source and run a capture session on it.
async fn capture_session<F>(
    config: &Config,
    metadata: SessionMetadata,
    poll: &PollConfig,
    on_cycle: F,
) -> Result<(ScanSession, StopReason)>
where
    F: FnMut(&Aggregator, &CycleReport),
{
    let cancel = Cancellation::on_ctrl_c();
    let source = scanner::open_source(&config.scanner)?;
    capture_with_source(source, config, metadata, poll, &cancel, on_cycle).await
}

/// Acquire the adapter, run the poll loop, and always restore the interface.
async fn capture_with_source<F>(
    source: Box<dyn ScanSource>,
    config: &Config,
    metadata: SessionMetadata,
    poll: &PollConfig,
    cancel: &Cancellation,
    on_cycle: F,
) -> Result<(ScanSession, StopReason)>
where
    F: FnMut(&Aggregator, &CycleReport),
{
    let mut guard = ScanGuard::acquire(source, config.scanner.capture_timeout()).await?;
    info!(
        "Using {} backend{}",
        guard.source_name(),
        guard
            .interface()
            .map(|i| format!(" on {}", i))
            .unwrap_or_default()
    );

    let mut engine = Aggregator::new(SessionMetadata {
        interface: guard.interface(),
        ..metadata
    });

    let outcome = monitor::run(&mut guard, &mut engine, poll, cancel, on_cycle).await;

    if let Err(e) = guard.teardown().await {
        warn!("Failed to restore interface state: {}", e);
    }

    let reason = outcome?;
    Ok((engine.finalize(Utc::now()), reason))
}

/// Print the summary, export if requested, and pick the exit code.
fn finish_session(
    session: &ScanSession,
    reason: StopReason,
    output: Option<&Path>,
    config: &Config,
    quiet: bool,
) -> Result<i32> {
    if reason == StopReason::Cancelled {
        eprintln!("\n⛔ Interrupted, reporting partial results.");
    }

    if !quiet {
        println!("\n{}", report::render_summary(session, &config.report));
    }

    if let Some(path) = output {
        report::write_export(session, path)?;
        if !quiet {
            println!("💾 Results saved to: {}", path.display());
        }
    }

    Ok(match reason {
        StopReason::Completed => 0,
        StopReason::Cancelled => EXIT_INTERRUPTED,
    })
}

/// `analyze`: re-analyze an exported scan without touching the adapter.
fn run_analyze(analyze: &AnalyzeArgs, config: &Config) -> Result<i32> {
    info!("Analyzing results from: {}", analyze.file.display());

    let session = report::read_export(&analyze.file)?;
    println!(
        "{}",
        report::render_analysis(&session, &config.report, analyze.plot)
    );
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
