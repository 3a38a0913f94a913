//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rf-detector.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".rf-detector.toml";

/// Longest accepted duration, interval or timeout: one year.
pub const MAX_SECS: u64 = 365 * 24 * 60 * 60;

/// Widest accepted histogram bar.
pub const MAX_HISTOGRAM_WIDTH: usize = 500;

/// Check a user-supplied number of seconds against `1..=MAX_SECS`.
pub fn check_secs(what: &str, secs: u64) -> Result<(), String> {
    if secs == 0 {
        Err(format!("{} must be at least 1 second", what))
    } else if secs > MAX_SECS {
        Err(format!("{} must be at most {} seconds (one year)", what, MAX_SECS))
    } else {
        Ok(())
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scan source settings.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Aggregation session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Which OS mechanism is used to obtain scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pick by target OS.
    #[default]
    Auto,
    /// `iw dev <iface> scan` (Linux).
    Iw,
    /// `netsh wlan show networks mode=bssid` (Windows).
    Netsh,
}

/// Scan source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Scan backend.
    #[serde(default)]
    pub backend: Backend,

    /// Wireless interface to scan with.
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Upper bound for a single capture, in seconds.
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: u64,

    /// Delay between poll cycles, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Read the driver's cached results instead of triggering a new scan.
    /// Works without root on most systems but may return older data.
    #[serde(default)]
    pub use_cached: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            interface: default_interface(),
            capture_timeout_secs: default_capture_timeout(),
            poll_interval_secs: default_poll_interval(),
            use_cached: false,
        }
    }
}

fn default_interface() -> String {
    "wlan0".to_string()
}

fn default_capture_timeout() -> u64 {
    15
}

fn default_poll_interval() -> u64 {
    3
}

impl ScannerConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Aggregation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds without a sighting before a network is flagged stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
        }
    }
}

fn default_stale_after() -> u64 {
    30
}

/// Report rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of networks listed in the ranked signal table.
    #[serde(default = "default_top_networks")]
    pub top_networks: usize,

    /// Width of the longest bar in text histograms.
    #[serde(default = "default_histogram_width")]
    pub histogram_width: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_networks: default_top_networks(),
            histogram_width: default_histogram_width(),
        }
    }
}

fn default_top_networks() -> usize {
    10
}

fn default_histogram_width() -> usize {
    40
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.rf-detector.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge the options of the invoked subcommand into this configuration.
    ///
    /// Only values the user actually passed on the command line override
    /// the file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        let Some(capture) = args.command.capture_options() else {
            return;
        };

        if let Some(ref interface) = capture.interface {
            self.scanner.interface = interface.clone();
        }
        if let Some(interval) = capture.interval {
            self.scanner.poll_interval_secs = interval;
        }
        if let Some(stale_after) = capture.stale_after {
            self.session.stale_after_secs = stale_after;
        }
    }

    /// Validate the merged settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.scanner.interface.trim().is_empty() {
            return Err("scanner.interface cannot be empty".to_string());
        }
        check_secs("scanner.capture_timeout_secs", self.scanner.capture_timeout_secs)?;
        check_secs("scanner.poll_interval_secs", self.scanner.poll_interval_secs)?;
        check_secs("session.stale_after_secs", self.session.stale_after_secs)?;

        if self.report.histogram_width == 0 || self.report.histogram_width > MAX_HISTOGRAM_WIDTH {
            return Err(format!(
                "report.histogram_width must be between 1 and {}",
                MAX_HISTOGRAM_WIDTH
            ));
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, BandArg, CaptureOptions, Command, ScanArgs};
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scanner.backend, Backend::Auto);
        assert_eq!(config.scanner.interface, "wlan0");
        assert_eq!(config.session.stale_after_secs, 30);
        assert_eq!(config.report.top_networks, 10);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[scanner]
backend = "iw"
interface = "wlp2s0"
poll_interval_secs = 5
use_cached = true

[session]
stale_after_secs = 90
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.scanner.backend, Backend::Iw);
        assert_eq!(config.scanner.interface, "wlp2s0");
        assert_eq!(config.scanner.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.scanner.capture_timeout_secs, 15);
        assert!(config.scanner.use_cached);
        assert_eq!(config.session.stale_after_secs, 90);
        assert_eq!(config.report.histogram_width, 40);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[scanner]"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[report]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scanner.interface, "wlan0");
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[report]\ntop_networks = 3\n",
        )
        .unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.report.top_networks, 3);

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[report\n").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_merge_with_args_overrides_only_given_values() {
        let mut config = Config::default();
        config.scanner.poll_interval_secs = 7;

        let args = Args {
            config: None,
            verbose: false,
            quiet: false,
            command: Command::Scan(ScanArgs {
                band: BandArg::Both,
                time: 10,
                output: None,
                visualize: false,
                capture: CaptureOptions {
                    interface: Some("wlan1".to_string()),
                    interval: None,
                    stale_after: Some(12),
                },
            }),
        };
        config.merge_with_args(&args);

        assert_eq!(config.scanner.interface, "wlan1");
        assert_eq!(config.scanner.poll_interval_secs, 7);
        assert_eq!(config.session.stale_after_secs, 12);
    }

    #[test]
    fn test_validate_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_file_values() {
        let cases = [
            "[scanner]\npoll_interval_secs = 0\n",
            "[scanner]\ncapture_timeout_secs = 0\n",
            "[scanner]\ninterface = \"  \"\n",
            "[scanner]\npoll_interval_secs = 9223372036854775807\n",
            "[session]\nstale_after_secs = 0\n",
            "[session]\nstale_after_secs = 10000000000000000\n",
            "[report]\nhistogram_width = 0\n",
            "[report]\nhistogram_width = 9223372036854775807\n",
        ];
        for content in cases {
            let config: Config = toml::from_str(content).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", content);
        }

        let config: Config = toml::from_str("[scanner]\npoll_interval_secs = 31536000\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_after_merge() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[scanner]\npoll_interval_secs = 0\n").unwrap();

        let mut config = Config::load(&path).unwrap();
        assert!(config.validate().is_err());

        // An explicit --interval fixes up the file value.
        let args = Args::try_parse_from(["rf-detector", "scan", "--interval", "2"]).unwrap();
        config.merge_with_args(&args);
        assert!(config.validate().is_ok());
    }
}
