//! Windows scan source built on `netsh wlan show networks mode=bssid`.
//!
//! netsh only reports what the WLAN service has cached, so consecutive
//! captures closer than ~10 s apart may return identical data. It reports
//! signal as a percentage, converted here with `dBm = pct / 2 - 100`.
//! The source does not change interface state, so there is nothing to
//! restore.

use super::{run_tool, BandFilter, ScanSource};
use crate::error::ScanError;
use crate::models::{channel_to_frequency, Band, Bssid, Observation, SecurityType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Scan source that shells out to `netsh`.
#[derive(Debug, Default)]
pub struct NetshScanner;

impl NetshScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScanSource for NetshScanner {
    fn name(&self) -> &str {
        "netsh"
    }

    async fn prepare(&mut self) -> Result<(), ScanError> {
        let output = run_tool("netsh", &["wlan", "show", "interfaces"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() || reports_unavailable(&stdout) {
            return Err(ScanError::adapter_unavailable(first_line(&stdout)));
        }
        Ok(())
    }

    async fn capture(&mut self, filter: BandFilter) -> Result<Vec<Observation>, ScanError> {
        let output = run_tool("netsh", &["wlan", "show", "networks", "mode=bssid"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if reports_unavailable(&stdout) {
            return Err(ScanError::adapter_unavailable(first_line(&stdout)));
        }
        if !output.status.success() {
            return Err(ScanError::CaptureFailed {
                reason: format!("netsh exited with {}: {}", output.status, first_line(&stdout)),
            });
        }

        Ok(parse_netsh_output(&stdout, Utc::now())
            .into_iter()
            .filter(|o| filter.accepts(o.band))
            .collect())
    }
}

/// Messages netsh prints instead of results when WLAN is unusable.
fn reports_unavailable(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    (lower.contains("wlansvc") && lower.contains("not running"))
        || lower.contains("there is no wireless interface")
        || lower.contains("location permission")
        || lower.contains("access is denied")
}

fn first_line(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
        .to_string()
}

/// Security settings shared by every BSSID of an SSID block.
#[derive(Debug, Default, Clone)]
struct SsidContext {
    ssid: String,
    authentication: Option<String>,
    encryption: Option<String>,
}

impl SsidContext {
    fn capabilities(&self) -> Vec<SecurityType> {
        let auth = self
            .authentication
            .as_deref()
            .unwrap_or("")
            .to_ascii_uppercase();
        let enc = self.encryption.as_deref().unwrap_or("").to_ascii_uppercase();

        let mut caps = Vec::new();
        if auth.contains("WPA3") {
            caps.push(SecurityType::Wpa3);
        }
        if auth.contains("WPA2") {
            caps.push(SecurityType::Wpa2);
        }
        if enc.contains("WEP") || auth.contains("SHARED") {
            caps.push(SecurityType::Wep);
        } else if auth == "OPEN" {
            caps.push(SecurityType::Open);
        }
        caps
    }
}

/// Fields of one `BSSID n` sub-block.
#[derive(Debug, Default)]
struct BssidBlock {
    mac: Option<Bssid>,
    signal_pct: Option<i32>,
    band: Option<Band>,
    /// A band line naming something other than 2.4/5 GHz (6 GHz).
    unsupported_band: bool,
    channel: Option<u16>,
}

impl BssidBlock {
    fn into_observation(
        self,
        context: &SsidContext,
        captured_at: DateTime<Utc>,
    ) -> Option<Observation> {
        if self.unsupported_band {
            return None;
        }
        let bssid = self.mac?;
        let channel = self.channel?;
        let band = self.band.or_else(|| Band::from_channel(channel))?;
        let frequency_mhz = channel_to_frequency(channel)?;
        let signal_pct = self.signal_pct?.clamp(0, 100);

        Some(Observation {
            bssid,
            ssid: context.ssid.clone(),
            band,
            channel,
            frequency_mhz,
            signal_dbm: pct_to_dbm(signal_pct),
            capabilities: context.capabilities(),
            timestamp: captured_at,
        })
    }
}

/// Convert a netsh signal percentage to dBm.
fn pct_to_dbm(pct: i32) -> i32 {
    pct / 2 - 100
}

/// Parse the output of `netsh wlan show networks mode=bssid`.
///
/// ```text
/// SSID 1 : MyNetwork
///     Network type            : Infrastructure
///     Authentication          : WPA2-Personal
///     Encryption              : CCMP
///     BSSID 1                 : aa:bb:cc:dd:ee:ff
///          Signal             : 84%
///          Radio type         : 802.11ax
///          Band               : 5 GHz
///          Channel            : 36
/// ```
///
/// Unrecognised lines are skipped so localised headers never fail a scan.
pub fn parse_netsh_output(output: &str, captured_at: DateTime<Utc>) -> Vec<Observation> {
    let mut results = Vec::new();
    let mut context = SsidContext::default();
    let mut block: Option<BssidBlock> = None;

    let mut flush = |block: &mut Option<BssidBlock>, context: &SsidContext| {
        if let Some(obs) = block
            .take()
            .and_then(|b| b.into_observation(context, captured_at))
        {
            results.push(obs);
        }
    };

    for line in output.lines() {
        let trimmed = line.trim();
        let Some((key, value)) = split_kv(trimmed) else {
            continue;
        };
        let key = key.to_ascii_uppercase();

        if key.starts_with("SSID") {
            flush(&mut block, &context);
            context = SsidContext {
                ssid: value.to_string(),
                ..Default::default()
            };
        } else if key.starts_with("BSSID") {
            flush(&mut block, &context);
            block = Some(BssidBlock {
                mac: value.parse().ok(),
                ..Default::default()
            });
        } else if key == "AUTHENTICATION" {
            context.authentication = Some(value.to_string());
        } else if key == "ENCRYPTION" {
            context.encryption = Some(value.to_string());
        } else if let Some(b) = block.as_mut() {
            match key.as_str() {
                "SIGNAL" => b.signal_pct = value.trim_end_matches('%').trim().parse().ok(),
                "CHANNEL" => b.channel = value.parse().ok(),
                "BAND" => {
                    b.band = parse_band(value);
                    b.unsupported_band = b.band.is_none();
                }
                _ => {}
            }
        }
    }
    flush(&mut block, &context);

    results
}

fn parse_band(value: &str) -> Option<Band> {
    if value.contains("2.4") {
        Some(Band::TwoPointFour)
    } else if value.starts_with('5') {
        Some(Band::Five)
    } else {
        None
    }
}

/// Split on the first `" : "` so colons in MACs and SSIDs survive.
fn split_kv(line: &str) -> Option<(&str, &str)> {
    if let Some(idx) = line.find(" : ") {
        return Some((line[..idx].trim(), line[idx + 3..].trim()));
    }
    line.strip_suffix(" :").map(|key| (key.trim(), ""))
}
