//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::check_secs;
use crate::models::is_known_channel;
use crate::scanner::BandFilter;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// RF Signal Detector - wireless network scanning and analysis
///
/// Scan for nearby access points, watch a single channel live, or
/// re-analyze a previously exported scan.
///
/// Examples:
///   rf-detector scan                          # Basic scan
///   rf-detector scan -b 2.4G                  # Scan 2.4GHz band
///   rf-detector scan -b 5G -t 30              # Scan 5GHz for 30 seconds
///   rf-detector scan -b both --visualize      # Scan with a live signal view
///   rf-detector monitor -c 6 -o output.json   # Monitor channel 6 and save results
///   rf-detector analyze -f scan_results.json  # Analyze previous scan
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .rf-detector.toml in the current directory
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Command to execute.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan for wireless networks
    Scan(ScanArgs),
    /// Monitor a specific channel with a live view
    Monitor(MonitorArgs),
    /// Analyze a previously exported scan
    Analyze(AnalyzeArgs),
    /// Generate a default .rf-detector.toml configuration file
    InitConfig,
}

/// Options shared by the commands that talk to the wireless adapter.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CaptureOptions {
    /// Wireless interface to scan with (default: from config, wlan0)
    #[arg(long, value_name = "IFACE")]
    pub interface: Option<String>,

    /// Seconds between poll cycles (default: from config, 3)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Seconds without a sighting before a network is flagged stale
    #[arg(long, value_name = "SECS")]
    pub stale_after: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ScanArgs {
    /// Frequency band to scan
    #[arg(short, long, value_enum, default_value = "2.4G")]
    pub band: BandArg,

    /// Scan duration in seconds
    #[arg(short, long, default_value = "60", value_name = "SECS")]
    pub time: u64,

    /// Export the finished session to this JSON file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Redraw a live signal view each cycle instead of a progress bar
    #[arg(long)]
    pub visualize: bool,

    #[command(flatten)]
    pub capture: CaptureOptions,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MonitorArgs {
    /// WiFi channel to monitor
    #[arg(short, long, value_name = "N")]
    pub channel: u16,

    /// Monitoring duration in seconds
    #[arg(short, long, default_value = "300", value_name = "SECS")]
    pub time: u64,

    /// Export the finished session to this JSON file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub capture: CaptureOptions,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Exported scan results file
    #[arg(short, long, value_name = "FILE")]
    pub file: PathBuf,

    /// Include text histograms in the analysis
    #[arg(short, long)]
    pub plot: bool,
}

/// Band selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BandArg {
    #[value(name = "2.4G", alias = "2.4g")]
    TwoPointFour,
    #[value(name = "5G", alias = "5g")]
    Five,
    #[value(name = "both", alias = "all")]
    Both,
}

impl From<BandArg> for BandFilter {
    fn from(arg: BandArg) -> Self {
        match arg {
            BandArg::TwoPointFour => BandFilter::TwoPointFour,
            BandArg::Five => BandFilter::Five,
            BandArg::Both => BandFilter::Both,
        }
    }
}

impl Command {
    /// Adapter options, for commands that capture.
    pub fn capture_options(&self) -> Option<&CaptureOptions> {
        match self {
            Command::Scan(scan) => Some(&scan.capture),
            Command::Monitor(monitor) => Some(&monitor.capture),
            Command::Analyze(_) | Command::InitConfig => None,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Scan(scan) => check_secs("Scan duration", scan.time)?,
            Command::Monitor(monitor) => {
                check_secs("Monitoring duration", monitor.time)?;
                if !is_known_channel(monitor.channel) {
                    return Err(format!("Unknown WiFi channel: {}", monitor.channel));
                }
            }
            Command::Analyze(analyze) => {
                if !analyze.file.is_file() {
                    return Err(format!(
                        "Results file does not exist: {}",
                        analyze.file.display()
                    ));
                }
            }
            Command::InitConfig => {}
        }

        if let Some(capture) = self.command.capture_options() {
            if let Some(interval) = capture.interval {
                check_secs("Poll interval", interval)?;
            }
            if let Some(stale_after) = capture.stale_after {
                check_secs("Staleness timeout", stale_after)?;
            }
            if let Some(ref iface) = capture.interface {
                if iface.trim().is_empty() {
                    return Err("Interface name cannot be empty".to_string());
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
