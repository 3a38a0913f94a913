//! Observation aggregation and session statistics.
//!
//! The [`Aggregator`] owns the live [`ScanSession`] and is the only code
//! that mutates it. Readers get point-in-time copies through
//! [`Aggregator::snapshot_at`]; the free functions below compute statistics on
//! any session, live or imported.

use crate::models::{
    Band, Bssid, NetworkRecord, NetworkStatus, Observation, ScanSession, SecurityType,
    SessionMetadata,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Folds observations into a scan session, one record per BSSID.
#[derive(Debug)]
pub struct Aggregator {
    session: ScanSession,
    stale_after: chrono::Duration,
}

impl Aggregator {
    pub fn new(metadata: SessionMetadata) -> Self {
        // Timeouts beyond chrono's range mean "never stale".
        let stale_after = i64::try_from(metadata.stale_after_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        Self {
            session: ScanSession::new(metadata),
            stale_after,
        }
    }

    /// Update or create the record for the observation's BSSID.
    ///
    /// Returns true when the BSSID had not been seen before.
    pub fn ingest(&mut self, obs: &Observation) -> bool {
        match self.session.networks.get_mut(&obs.bssid) {
            Some(record) => {
                record.apply(obs);
                false
            }
            None => {
                debug!("New network {} ({:?}) on channel {}", obs.bssid, obs.ssid, obs.channel);
                self.session
                    .networks
                    .insert(obs.bssid, NetworkRecord::from_observation(obs));
                true
            }
        }
    }

    /// Ingest a whole capture, returning the BSSIDs seen for the first time.
    pub fn ingest_all<'a, I>(&mut self, observations: I) -> Vec<Bssid>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        observations
            .into_iter()
            .filter(|obs| self.ingest(obs))
            .map(|obs| obs.bssid)
            .collect()
    }

    /// Count a poll cycle in the session metadata.
    pub fn record_poll(&mut self, success: bool) {
        self.session.metadata.polls += 1;
        if !success {
            self.session.metadata.failed_polls += 1;
        }
    }

    /// Live session, without staleness marking.
    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn len(&self) -> usize {
        self.session.len()
    }

    /// Consistent copy of the current state, with records not seen since
    /// `now - stale_after` flagged stale.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> ScanSession {
        let mut snapshot = self.session.clone();
        mark_stale(&mut snapshot, now, self.stale_after);
        snapshot
    }

    /// Close the session and hand it over for reporting and export.
    pub fn finalize(self, finished_at: DateTime<Utc>) -> ScanSession {
        let stale_after = self.stale_after;
        let mut session = self.session;

        let elapsed = finished_at - session.metadata.started_at;
        session.metadata.finished_at = Some(finished_at);
        session.metadata.duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);
        mark_stale(&mut session, finished_at, stale_after);
        session
    }
}

/// Flag records whose last sighting is older than the timeout. Nothing is removed.
fn mark_stale(session: &mut ScanSession, now: DateTime<Utc>, stale_after: chrono::Duration) {
    for record in session.networks.values_mut() {
        record.status = if now - record.last_seen > stale_after {
            NetworkStatus::Stale
        } else {
            NetworkStatus::Active
        };
    }
}

/// Number of distinct BSSIDs per channel.
pub fn channel_distribution(session: &ScanSession) -> BTreeMap<u16, usize> {
    let mut dist = BTreeMap::new();
    for record in session.records() {
        *dist.entry(record.channel).or_default() += 1;
    }
    dist
}

/// Channel with the most networks. Ties go to the lowest channel number.
pub fn most_congested_channel(session: &ScanSession) -> Option<(u16, usize)> {
    // Ascending iteration plus a strict comparison keeps the first (lowest) maximum.
    channel_distribution(session)
        .into_iter()
        .fold(None, |best, (channel, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((channel, count)),
        })
}

/// Records ordered strongest first: best strength, then current, then BSSID.
pub fn ranked_by_signal(session: &ScanSession) -> Vec<&NetworkRecord> {
    let mut ranked: Vec<&NetworkRecord> = session.records().collect();
    ranked.sort_by(|a, b| {
        b.best_dbm
            .cmp(&a.best_dbm)
            .then(b.current_dbm.cmp(&a.current_dbm))
            .then(a.bssid.cmp(&b.bssid))
    });
    ranked
}

/// Count of records per security type, strongest type first.
pub fn security_distribution(session: &ScanSession) -> Vec<(SecurityType, usize)> {
    SecurityType::all()
        .into_iter()
        .map(|security| {
            let count = session.records().filter(|r| r.security == security).count();
            (security, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}

/// Count of records per band.
pub fn band_distribution(session: &ScanSession) -> BTreeMap<Band, usize> {
    let mut dist = BTreeMap::new();
    for record in session.records() {
        *dist.entry(record.band).or_default() += 1;
    }
    dist
}

/// Aggregate signal figures over the current strength of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSummary {
    /// Rounded towards negative infinity so the value stays an integer dBm.
    pub average_dbm: i32,
    pub strongest_dbm: i32,
    pub weakest_dbm: i32,
}

/// Returns `None` for an empty session.
pub fn signal_summary(session: &ScanSession) -> Option<SignalSummary> {
    let count = i64::try_from(session.len()).ok().filter(|&n| n > 0)?;
    let sum: i64 = session.records().map(|r| i64::from(r.current_dbm)).sum();

    Some(SignalSummary {
        average_dbm: i32::try_from(sum.div_euclid(count)).unwrap_or(i32::MIN),
        strongest_dbm: session.records().map(|r| r.current_dbm).max()?,
        weakest_dbm: session.records().map(|r| r.current_dbm).min()?,
    })
}

/// Current strengths bucketed into 10 dB bins, keyed by the bin's lower edge.
///
/// -55 dBm lands in the `-60` bin (covering -60..=-51).
pub fn strength_histogram(session: &ScanSession) -> BTreeMap<i32, usize> {
    let mut bins = BTreeMap::new();
    for record in session.records() {
        *bins.entry(record.current_dbm.div_euclid(10) * 10).or_default() += 1;
    }
    bins
}

/// Number of records with a known SSID and with an empty one.
pub fn visibility_counts(session: &ScanSession) -> (usize, usize) {
    let hidden = session.records().filter(|r| r.is_hidden()).count();
    (session.len() - hidden, hidden)
}
