//! Scan sources for discovering nearby access points.
//!
//! A [`ScanSource`] turns one OS scan into a list of [`Observation`]s.
//! Sources are always driven through a [`ScanGuard`], which prepares the
//! interface once per command and restores it on every exit path.

pub mod iw;
pub mod netsh;

use crate::config::{Backend, ScannerConfig};
use crate::error::ScanError;
use crate::models::{Band, Observation};
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub use iw::IwScanner;
pub use netsh::NetshScanner;

/// Which bands a capture should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandFilter {
    TwoPointFour,
    Five,
    Both,
}

impl BandFilter {
    pub fn accepts(&self, band: Band) -> bool {
        match self {
            BandFilter::TwoPointFour => band == Band::TwoPointFour,
            BandFilter::Five => band == Band::Five,
            BandFilter::Both => true,
        }
    }

    /// Bands covered by this filter, in ascending order.
    pub fn bands(&self) -> Vec<Band> {
        match self {
            BandFilter::TwoPointFour => vec![Band::TwoPointFour],
            BandFilter::Five => vec![Band::Five],
            BandFilter::Both => vec![Band::TwoPointFour, Band::Five],
        }
    }

    /// Narrowest filter containing the given channel.
    pub fn for_channel(channel: u16) -> Option<Self> {
        match Band::from_channel(channel)? {
            Band::TwoPointFour => Some(BandFilter::TwoPointFour),
            Band::Five => Some(BandFilter::Five),
        }
    }
}

impl fmt::Display for BandFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandFilter::TwoPointFour => write!(f, "2.4GHz"),
            BandFilter::Five => write!(f, "5GHz"),
            BandFilter::Both => write!(f, "2.4GHz+5GHz"),
        }
    }
}

/// Platform mechanism that yields scan results.
#[async_trait]
pub trait ScanSource: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Interface the source scans with, if it is bound to one.
    fn interface(&self) -> Option<&str> {
        None
    }

    /// Make the interface ready for scanning. Called once before the first capture.
    async fn prepare(&mut self) -> Result<(), ScanError> {
        Ok(())
    }

    /// Run one scan and return the access points visible on the filtered bands.
    async fn capture(&mut self, filter: BandFilter) -> Result<Vec<Observation>, ScanError>;

    /// Undo whatever [`prepare`](Self::prepare) changed.
    async fn restore(&mut self) -> Result<(), ScanError> {
        Ok(())
    }

    /// Blocking variant of [`restore`](Self::restore) for the drop path.
    fn restore_blocking(&mut self) {}
}

/// Scoped ownership of a prepared scan source.
///
/// Call [`teardown`](Self::teardown) at the end of a command. If the guard is
/// dropped without it (early return, panic) the interface is restored
/// synchronously.
pub struct ScanGuard {
    source: Box<dyn ScanSource>,
    capture_timeout: Duration,
    armed: bool,
}

impl ScanGuard {
    /// Prepare the source. Fails fast if the adapter cannot be used.
    pub async fn acquire(
        mut source: Box<dyn ScanSource>,
        capture_timeout: Duration,
    ) -> Result<Self, ScanError> {
        debug!("Preparing scan source: {}", source.name());
        source.prepare().await?;

        Ok(Self {
            source,
            capture_timeout,
            armed: true,
        })
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn interface(&self) -> Option<String> {
        self.source.interface().map(str::to_string)
    }

    /// Capture once, bounded by the configured timeout.
    pub async fn capture(&mut self, filter: BandFilter) -> Result<Vec<Observation>, ScanError> {
        match tokio::time::timeout(self.capture_timeout, self.source.capture(filter)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::CaptureTimeout {
                seconds: self.capture_timeout.as_secs(),
            }),
        }
    }

    /// Restore the interface to the state it was in before [`acquire`](Self::acquire).
    pub async fn teardown(mut self) -> Result<(), ScanError> {
        self.armed = false;
        info!("Restoring interface state ({})", self.source.name());
        self.source.restore().await
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Scan source {} dropped without teardown, restoring interface",
                self.source.name()
            );
            self.source.restore_blocking();
        }
    }
}

/// Build the scan source selected by the configuration.
pub fn open_source(config: &ScannerConfig) -> Result<Box<dyn ScanSource>, ScanError> {
    let backend = match config.backend {
        Backend::Auto if cfg!(target_os = "windows") => Backend::Netsh,
        Backend::Auto if cfg!(target_os = "linux") => Backend::Iw,
        Backend::Auto => {
            return Err(ScanError::adapter_unavailable(format!(
                "no scan backend for {}",
                std::env::consts::OS
            )))
        }
        explicit => explicit,
    };

    Ok(match backend {
        Backend::Netsh => Box::new(NetshScanner::new()),
        _ => {
            let scanner = IwScanner::with_interface(&config.interface);
            if config.use_cached {
                Box::new(scanner.use_cached())
            } else {
                Box::new(scanner)
            }
        }
    })
}

/// Run an external tool to completion.
///
/// A missing binary or a permission failure to spawn it means the adapter is
/// unusable. The child is killed if the returned future is dropped, so a
/// timed-out capture does not leave a scan running.
pub(crate) async fn run_tool(program: &str, args: &[&str]) -> Result<Output, ScanError> {
    debug!("Running: {} {}", program, args.join(" "));

    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| spawn_error(program, e))
}

/// Blocking counterpart of [`run_tool`] for drop-time cleanup.
pub(crate) fn run_tool_blocking(program: &str, args: &[&str]) -> Result<Output, ScanError> {
    std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|e| spawn_error(program, e))
}

fn spawn_error(program: &str, e: std::io::Error) -> ScanError {
    match e.kind() {
        ErrorKind::NotFound => {
            ScanError::adapter_unavailable(format!("`{}` is not installed", program))
        }
        ErrorKind::PermissionDenied => {
            ScanError::adapter_unavailable(format!("not permitted to run `{}`", program))
        }
        _ => ScanError::CaptureFailed {
            reason: format!("failed to run `{}`: {}", program, e),
        },
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;

    #[test]
    fn test_band_filter() {
        assert!(BandFilter::Both.accepts(Band::Five));
        assert!(!BandFilter::TwoPointFour.accepts(Band::Five));
        assert_eq!(BandFilter::for_channel(6), Some(BandFilter::TwoPointFour));
        assert_eq!(BandFilter::for_channel(36), Some(BandFilter::Five));
        assert_eq!(BandFilter::for_channel(0), None);
        assert_eq!(
            BandFilter::Both.bands(),
            vec![Band::TwoPointFour, Band::Five]
        );
    }

    #[test]
    fn test_explicit_backend_selection() {
        let config = ScannerConfig {
            backend: Backend::Iw,
            interface: "wlp3s0".to_string(),
            ..Default::default()
        };
        let source = open_source(&config).unwrap();
        assert_eq!(source.name(), "iw");
        assert_eq!(source.interface(), Some("wlp3s0"));

        let config = ScannerConfig {
            backend: Backend::Netsh,
            ..Default::default()
        };
        assert_eq!(open_source(&config).unwrap().name(), "netsh");
    }

    #[test]
    fn test_guard_teardown_restores_once() {
        tokio_test::block_on(async {
            let source = ScriptedSource::new(vec![]);
            let lifecycle = source.lifecycle.clone();

            let guard = ScanGuard::acquire(Box::new(source), Duration::from_secs(1))
                .await
                .unwrap();
            guard.teardown().await.unwrap();

            let calls = lifecycle.lock().unwrap().clone();
            assert_eq!(calls.prepared, 1);
            assert_eq!(calls.restored, 1);
            assert_eq!(calls.restored_blocking, 0);
        });
    }

    #[test]
    fn test_guard_drop_restores_blocking() {
        tokio_test::block_on(async {
            let source = ScriptedSource::new(vec![]);
            let lifecycle = source.lifecycle.clone();

            {
                let mut guard = ScanGuard::acquire(Box::new(source), Duration::from_secs(1))
                    .await
                    .unwrap();
                let _ = guard.capture(BandFilter::Both).await;
            }

            let calls = lifecycle.lock().unwrap().clone();
            assert_eq!(calls.restored, 0);
            assert_eq!(calls.restored_blocking, 1);
        });
    }

    #[test]
    fn test_prepare_failure_is_adapter_unavailable() {
        tokio_test::block_on(async {
            let mut source = ScriptedSource::new(vec![]);
            source.fail_prepare = true;

            let err = ScanGuard::acquire(Box::new(source), Duration::from_secs(1))
                .await
                .err()
                .unwrap();
            assert!(matches!(err, ScanError::AdapterUnavailable { .. }));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_capture_times_out() {
        let mut source = ScriptedSource::new(vec![]);
        source.capture_delay = Some(Duration::from_secs(30));

        let mut guard = ScanGuard::acquire(Box::new(source), Duration::from_secs(5))
            .await
            .unwrap();
        let err = guard.capture(BandFilter::Both).await.unwrap_err();
        assert!(matches!(err, ScanError::CaptureTimeout { seconds: 5 }));
        guard.teardown().await.unwrap();
    }
}
