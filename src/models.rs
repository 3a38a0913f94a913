//! Data models for the signal detector.
//!
//! This module contains the core data structures shared by the scan
//! sources, the aggregation engine and the report layer: observations,
//! per-BSSID network records and the scan session that owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 2.4 GHz channels the detector knows about.
pub const CHANNELS_2G: [u16; 14] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14];

/// 5 GHz channels the detector knows about.
pub const CHANNELS_5G: [u16; 25] = [
    36, 40, 44, 48, 52, 56, 60, 64, 100, 104, 108, 112, 116, 120, 124, 128, 132, 136, 140, 144,
    149, 153, 157, 161, 165,
];

/// Hardware address of an access point radio.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bssid([u8; 6]);

impl Bssid {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Bssid {
    type Err = String;

    /// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated) into a BSSID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(format!("invalid BSSID '{}': expected 6 octets", s));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(format!("invalid BSSID '{}': bad octet '{}'", s, part));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| format!("invalid BSSID '{}': bad octet '{}'", s, part))?;
        }
        Ok(Self::new(bytes))
    }
}

impl TryFrom<String> for Bssid {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bssid> for String {
    fn from(value: Bssid) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bssid({})", self)
    }
}

/// Frequency band of an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    TwoPointFour,
    #[serde(rename = "5GHz")]
    Five,
}

impl Band {
    /// Band of a centre frequency, `None` outside 2.4/5 GHz.
    pub fn from_frequency(freq_mhz: u32) -> Option<Self> {
        match freq_mhz {
            2400..=2500 => Some(Band::TwoPointFour),
            5150..=5900 => Some(Band::Five),
            _ => None,
        }
    }

    /// Band of an 802.11 channel number, `None` for channels outside 2.4/5 GHz.
    pub fn from_channel(channel: u16) -> Option<Self> {
        match channel {
            1..=14 => Some(Band::TwoPointFour),
            32..=177 => Some(Band::Five),
            _ => None,
        }
    }

    /// Channels scanned on this band.
    pub fn channels(&self) -> &'static [u16] {
        match self {
            Band::TwoPointFour => &CHANNELS_2G,
            Band::Five => &CHANNELS_5G,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::TwoPointFour => write!(f, "2.4GHz"),
            Band::Five => write!(f, "5GHz"),
        }
    }
}

/// Convert a centre frequency in MHz to an 802.11 channel number.
pub fn frequency_to_channel(freq_mhz: u32) -> Option<u16> {
    match freq_mhz {
        2412..=2472 => Some(((freq_mhz - 2407) / 5) as u16),
        2484 => Some(14),
        5160..=5885 => Some(((freq_mhz - 5000) / 5) as u16),
        _ => None,
    }
}

/// Convert an 802.11 channel number to its centre frequency in MHz.
pub fn channel_to_frequency(channel: u16) -> Option<u32> {
    match channel {
        1..=13 => Some(2407 + 5 * channel as u32),
        14 => Some(2484),
        32..=177 => Some(5000 + 5 * channel as u32),
        _ => None,
    }
}

/// Whether the channel is one the detector can scan or monitor.
pub fn is_known_channel(channel: u16) -> bool {
    CHANNELS_2G.contains(&channel) || CHANNELS_5G.contains(&channel)
}

/// Security classification of an access point.
///
/// Adapters report every standard an AP advertises; [`SecurityType::classify`]
/// resolves the list to the strongest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityType {
    Open,
    Wep,
    Wpa2,
    Wpa3,
    Unknown,
}

impl SecurityType {
    /// Resolution priority, higher wins: WPA3 > WPA2 > WEP > OPEN > UNKNOWN.
    pub fn priority(&self) -> u8 {
        match self {
            SecurityType::Wpa3 => 4,
            SecurityType::Wpa2 => 3,
            SecurityType::Wep => 2,
            SecurityType::Open => 1,
            SecurityType::Unknown => 0,
        }
    }

    /// Classify a set of advertised capability flags.
    pub fn classify(flags: &[SecurityType]) -> SecurityType {
        flags
            .iter()
            .copied()
            .max_by_key(SecurityType::priority)
            .unwrap_or(SecurityType::Unknown)
    }

    /// All variants in descending priority.
    pub fn all() -> [SecurityType; 5] {
        [
            SecurityType::Wpa3,
            SecurityType::Wpa2,
            SecurityType::Wep,
            SecurityType::Open,
            SecurityType::Unknown,
        ]
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityType::Open => write!(f, "OPEN"),
            SecurityType::Wep => write!(f, "WEP"),
            SecurityType::Wpa2 => write!(f, "WPA2"),
            SecurityType::Wpa3 => write!(f, "WPA3"),
            SecurityType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Coarse human label for a signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalQuality {
    VeryStrong,
    Strong,
    Good,
    Fair,
    Weak,
}

impl SignalQuality {
    pub fn from_dbm(dbm: i32) -> Self {
        match dbm {
            d if d >= -50 => SignalQuality::VeryStrong,
            d if d >= -60 => SignalQuality::Strong,
            d if d >= -67 => SignalQuality::Good,
            d if d >= -75 => SignalQuality::Fair,
            _ => SignalQuality::Weak,
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalQuality::VeryStrong => write!(f, "Very Strong"),
            SignalQuality::Strong => write!(f, "Strong"),
            SignalQuality::Good => write!(f, "Good"),
            SignalQuality::Fair => write!(f, "Fair"),
            SignalQuality::Weak => write!(f, "Weak"),
        }
    }
}

/// One radio snapshot of a single access point.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub bssid: Bssid,
    /// Empty for hidden networks.
    pub ssid: String,
    pub band: Band,
    pub channel: u16,
    pub frequency_mhz: u32,
    pub signal_dbm: i32,
    /// Raw capability flags as advertised by the AP.
    pub capabilities: Vec<SecurityType>,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn security(&self) -> SecurityType {
        SecurityType::classify(&self.capabilities)
    }
}

/// A single signal strength reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSample {
    pub at: DateTime<Utc>,
    pub dbm: i32,
}

/// Whether a network has been re-observed recently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    #[default]
    Active,
    Stale,
}

/// Direction of the most recent signal change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Steady,
}

impl Trend {
    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Rising => "↑",
            Trend::Falling => "↓",
            Trend::Steady => "→",
        }
    }
}

/// Aggregated view of one BSSID across a scan session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub bssid: Bssid,
    pub ssid: String,
    pub band: Band,
    pub channel: u16,
    pub frequency_mhz: u32,
    pub security: SecurityType,
    pub current_dbm: i32,
    pub best_dbm: i32,
    pub worst_dbm: i32,
    /// Strength samples in ingestion order.
    pub samples: Vec<SignalSample>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub status: NetworkStatus,
}

/// Changes smaller than this are reported as steady.
const TREND_DEAD_BAND_DB: i32 = 3;

impl NetworkRecord {
    /// Create a record from the first observation of a BSSID.
    pub fn from_observation(obs: &Observation) -> Self {
        Self {
            bssid: obs.bssid,
            ssid: obs.ssid.clone(),
            band: obs.band,
            channel: obs.channel,
            frequency_mhz: obs.frequency_mhz,
            security: obs.security(),
            current_dbm: obs.signal_dbm,
            best_dbm: obs.signal_dbm,
            worst_dbm: obs.signal_dbm,
            samples: vec![SignalSample {
                at: obs.timestamp,
                dbm: obs.signal_dbm,
            }],
            first_seen: obs.timestamp,
            last_seen: obs.timestamp,
            status: NetworkStatus::Active,
        }
    }

    /// Fold a later observation of the same BSSID into this record.
    pub fn apply(&mut self, obs: &Observation) {
        debug_assert_eq!(self.bssid, obs.bssid);

        self.samples.push(SignalSample {
            at: obs.timestamp,
            dbm: obs.signal_dbm,
        });
        self.current_dbm = obs.signal_dbm;
        self.best_dbm = self.best_dbm.max(obs.signal_dbm);
        self.worst_dbm = self.worst_dbm.min(obs.signal_dbm);

        self.security = obs.security();
        self.band = obs.band;
        self.channel = obs.channel;
        self.frequency_mhz = obs.frequency_mhz;
        if !obs.ssid.is_empty() {
            self.ssid = obs.ssid.clone();
        }

        self.first_seen = self.first_seen.min(obs.timestamp);
        self.last_seen = self.last_seen.max(obs.timestamp);
        self.status = NetworkStatus::Active;
    }

    pub fn is_hidden(&self) -> bool {
        self.ssid.is_empty()
    }

    /// SSID for display, with a placeholder for hidden networks.
    pub fn display_ssid(&self) -> &str {
        if self.is_hidden() {
            "Hidden Network"
        } else {
            &self.ssid
        }
    }

    pub fn is_stale(&self) -> bool {
        self.status == NetworkStatus::Stale
    }

    pub fn quality(&self) -> SignalQuality {
        SignalQuality::from_dbm(self.current_dbm)
    }

    /// Compare the last two samples.
    pub fn trend(&self) -> Trend {
        match self.samples.as_slice() {
            [.., prev, last] => {
                let delta = last.dbm - prev.dbm;
                if delta >= TREND_DEAD_BAND_DB {
                    Trend::Rising
                } else if delta <= -TREND_DEAD_BAND_DB {
                    Trend::Falling
                } else {
                    Trend::Steady
                }
            }
            _ => Trend::Steady,
        }
    }
}

/// Session-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Bands covered by the session's captures.
    pub bands: Vec<Band>,
    pub interface: Option<String>,
    /// Set for single-channel monitoring sessions.
    pub channel_filter: Option<u16>,
    pub stale_after_secs: u64,
    pub polls: u32,
    pub failed_polls: u32,
}

impl SessionMetadata {
    pub fn new(started_at: DateTime<Utc>, bands: Vec<Band>, stale_after_secs: u64) -> Self {
        Self {
            started_at,
            finished_at: None,
            duration_ms: 0,
            bands,
            interface: None,
            channel_filter: None,
            stale_after_secs,
            polls: 0,
            failed_polls: 0,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_ms / 1000
    }
}

/// Root aggregate: one record per BSSID plus session metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    pub metadata: SessionMetadata,
    /// Keyed by the record's own BSSID.
    pub networks: BTreeMap<Bssid, NetworkRecord>,
}

impl ScanSession {
    pub fn new(metadata: SessionMetadata) -> Self {
        Self {
            metadata,
            networks: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn get(&self, bssid: &Bssid) -> Option<&NetworkRecord> {
        self.networks.get(bssid)
    }

    pub fn records(&self) -> impl Iterator<Item = &NetworkRecord> {
        self.networks.values()
    }

    pub fn stale_count(&self) -> usize {
        self.records().filter(|r| r.is_stale()).count()
    }
}
