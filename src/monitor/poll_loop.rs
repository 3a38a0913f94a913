//! The cooperative poll loop.
//!
//! Each cycle blocks only on one bounded capture, folds the results into the
//! aggregator, hands control to the caller for rendering, then sleeps until
//! the next tick. Cancellation is honoured between cycles.

use super::Cancellation;
use crate::analysis::Aggregator;
use crate::error::ScanError;
use crate::models::Bssid;
use crate::scanner::{BandFilter, ScanGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timing and filtering for one polling session.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Total wall time for the session.
    pub duration: Duration,
    /// Delay between the starts of consecutive captures.
    pub interval: Duration,
    pub filter: BandFilter,
    /// Keep only observations on this channel.
    pub channel: Option<u16>,
}

/// Outcome of one poll cycle, passed to the caller's render hook.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u32,
    /// Time since the loop started.
    pub elapsed: Duration,
    /// Observations kept after filtering.
    pub observed: usize,
    /// BSSIDs seen for the first time this cycle, in capture order.
    pub new_networks: Vec<Bssid>,
    /// Set when the capture failed and the cycle was skipped.
    pub error: Option<String>,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured duration elapsed.
    Completed,
    /// The user interrupted the session.
    Cancelled,
}

/// Poll `guard` until the duration elapses or `cancel` fires.
///
/// Recoverable capture failures are logged and counted as failed polls.
/// Any other error ends the loop and is returned; the caller still owns the
/// guard and is responsible for tearing it down.
pub async fn run<F>(
    guard: &mut ScanGuard,
    engine: &mut Aggregator,
    config: &PollConfig,
    cancel: &Cancellation,
    mut on_cycle: F,
) -> Result<StopReason, ScanError>
where
    F: FnMut(&Aggregator, &CycleReport),
{
    let started = Instant::now();
    let deadline = offset(started, config.duration);
    let mut cycle: u32 = 0;

    info!(
        "Polling {} every {:?} for {:?}",
        config.filter, config.interval, config.duration
    );

    loop {
        if cancel.is_cancelled() {
            info!("Polling cancelled after {} cycles", cycle);
            return Ok(StopReason::Cancelled);
        }
        if Instant::now() >= deadline {
            debug!("Polling finished after {} cycles", cycle);
            return Ok(StopReason::Completed);
        }

        cycle += 1;
        let next_tick = offset(Instant::now(), config.interval);

        let report = match guard.capture(config.filter).await {
            Ok(observations) => {
                let kept: Vec<_> = observations
                    .into_iter()
                    .filter(|obs| config.channel.map_or(true, |ch| obs.channel == ch))
                    .collect();
                let new_networks = engine.ingest_all(&kept);
                engine.record_poll(true);
                debug!(
                    "Cycle {}: {} observations, {} new",
                    cycle,
                    kept.len(),
                    new_networks.len()
                );

                CycleReport {
                    cycle,
                    elapsed: started.elapsed(),
                    observed: kept.len(),
                    new_networks,
                    error: None,
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!("Cycle {} skipped: {}", cycle, e);
                engine.record_poll(false);

                CycleReport {
                    cycle,
                    elapsed: started.elapsed(),
                    observed: 0,
                    new_networks: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
            Err(e) => return Err(e),
        };

        on_cycle(engine, &report);

        tokio::select! {
            _ = tokio::time::sleep_until(next_tick.min(deadline)) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

/// `base + delay`, saturating roughly 30 years out instead of overflowing.
fn offset(base: Instant, delay: Duration) -> Instant {
    base.checked_add(delay)
        .unwrap_or_else(|| base + Duration::from_secs(86_400 * 365 * 30))
}
