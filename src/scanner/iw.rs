//! Linux scan source built on `iw dev <iface> scan`.
//!
//! `iw dev <iface> scan` needs `CAP_NET_ADMIN`; `scan dump` reads the
//! driver's cached results and usually works unprivileged. If the interface
//! is administratively down when the command starts, it is brought up for
//! the duration of the command and taken down again on teardown.

use super::{run_tool, run_tool_blocking, BandFilter, ScanSource};
use crate::error::ScanError;
use crate::models::{
    channel_to_frequency, frequency_to_channel, Band, Bssid, Observation, SecurityType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Scan source that shells out to `iw`.
pub struct IwScanner {
    interface: String,
    use_dump: bool,
    /// Set when `prepare` had to bring the link up.
    brought_up: bool,
}

impl IwScanner {
    pub fn with_interface(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            use_dump: false,
            brought_up: false,
        }
    }

    /// Read cached results instead of triggering a fresh scan.
    pub fn use_cached(mut self) -> Self {
        self.use_dump = true;
        self
    }

    fn scan_args(&self, filter: BandFilter) -> Vec<String> {
        let mut args: Vec<String> = vec!["dev".into(), self.interface.clone(), "scan".into()];

        if self.use_dump {
            args.push("dump".into());
            return args;
        }

        // Restricting frequencies shortens the scan considerably.
        if filter != BandFilter::Both {
            args.push("freq".into());
            for band in filter.bands() {
                args.extend(
                    band.channels()
                        .iter()
                        .filter_map(|ch| channel_to_frequency(*ch))
                        .map(|f| f.to_string()),
                );
            }
        }
        args
    }

    async fn set_link(&self, state: &str) -> Result<(), ScanError> {
        let output = run_tool("ip", &["link", "set", "dev", &self.interface, state]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ScanError::adapter_unavailable(format!(
                "cannot set {} {}: {}",
                self.interface,
                state,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl ScanSource for IwScanner {
    fn name(&self) -> &str {
        "iw"
    }

    fn interface(&self) -> Option<&str> {
        Some(&self.interface)
    }

    async fn prepare(&mut self) -> Result<(), ScanError> {
        let output = run_tool("ip", &["link", "show", "dev", &self.interface]).await?;
        if !output.status.success() {
            return Err(ScanError::adapter_unavailable(format!(
                "interface {} not found: {}",
                self.interface,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if link_is_up(&stdout) {
            debug!("Interface {} already up", self.interface);
            return Ok(());
        }

        info!("Bringing interface {} up for scanning", self.interface);
        self.set_link("up").await?;
        self.brought_up = true;
        Ok(())
    }

    async fn capture(&mut self, filter: BandFilter) -> Result<Vec<Observation>, ScanError> {
        let args = self.scan_args(filter);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = run_tool("iw", &arg_refs).await?;

        if !output.status.success() {
            return Err(classify_iw_failure(
                &self.interface,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let observations = parse_iw_scan_output(&stdout, Utc::now());
        Ok(observations
            .into_iter()
            .filter(|o| filter.accepts(o.band))
            .collect())
    }

    async fn restore(&mut self) -> Result<(), ScanError> {
        if self.brought_up {
            self.set_link("down").await?;
            self.brought_up = false;
        }
        Ok(())
    }

    fn restore_blocking(&mut self) {
        if !self.brought_up {
            return;
        }
        match run_tool_blocking("ip", &["link", "set", "dev", &self.interface, "down"]) {
            Ok(output) if output.status.success() => self.brought_up = false,
            Ok(output) => warn!(
                "Failed to restore {}: {}",
                self.interface,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!("Failed to restore {}: {}", self.interface, e),
        }
    }
}

/// True when `ip link show` reports the administrative UP flag.
fn link_is_up(ip_link_output: &str) -> bool {
    let Some(start) = ip_link_output.find('<') else {
        return false;
    };
    let Some(end) = ip_link_output[start..].find('>') else {
        return false;
    };
    ip_link_output[start + 1..start + end]
        .split(',')
        .any(|flag| flag == "UP")
}

/// Map an `iw` error message onto the error taxonomy.
fn classify_iw_failure(interface: &str, stderr: &str) -> ScanError {
    let message = stderr.trim();
    let lower = message.to_ascii_lowercase();

    // -1 EPERM, -19 ENODEV, -100 ENETDOWN
    if lower.contains("not permitted")
        || lower.contains("no such device")
        || lower.contains("network is down")
        || lower.contains("(-1)")
        || lower.contains("(-19)")
    {
        ScanError::adapter_unavailable(format!("{}: {}", interface, message))
    } else {
        ScanError::CaptureFailed {
            reason: format!("iw on {}: {}", interface, message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Rsn,
    Wpa,
    Other,
}

/// Fields accumulated while walking one BSS stanza.
#[derive(Debug, Default)]
struct BssStanza {
    bssid: Option<Bssid>,
    ssid: Option<String>,
    signal_dbm: Option<i32>,
    freq_mhz: Option<u32>,
    ds_channel: Option<u16>,
    privacy: Option<bool>,
    rsn: bool,
    rsn_sae: bool,
    wpa: bool,
}

impl BssStanza {
    fn capabilities(&self) -> Vec<SecurityType> {
        let mut caps = Vec::new();
        if self.rsn_sae {
            caps.push(SecurityType::Wpa3);
        }
        if self.rsn {
            caps.push(SecurityType::Wpa2);
        }
        match self.privacy {
            Some(true) if !self.rsn && !self.wpa => caps.push(SecurityType::Wep),
            Some(false) => caps.push(SecurityType::Open),
            _ => {}
        }
        caps
    }

    fn flush(self, captured_at: DateTime<Utc>) -> Option<Observation> {
        let Some(bssid) = self.bssid else {
            return None;
        };
        let Some(signal_dbm) = self.signal_dbm else {
            debug!("Skipping {}: no signal reported", bssid);
            return None;
        };

        let channel = self
            .freq_mhz
            .and_then(frequency_to_channel)
            .or(self.ds_channel)?;
        // A reported frequency outside 2.4/5 GHz (6 GHz) drops the stanza.
        let band = match self.freq_mhz {
            Some(freq) => Band::from_frequency(freq)?,
            None => Band::from_channel(channel)?,
        };
        let frequency_mhz = self.freq_mhz.or_else(|| channel_to_frequency(channel))?;

        Some(Observation {
            bssid,
            ssid: self.ssid.clone().unwrap_or_default(),
            band,
            channel,
            frequency_mhz,
            signal_dbm,
            capabilities: self.capabilities(),
            timestamp: captured_at,
        })
    }
}

/// Parse the text output of `iw dev <iface> scan [dump]`.
///
/// Stanzas start with `BSS aa:bb:cc:dd:ee:ff(on wlan0)` at column 0 and are
/// followed by indented key-value lines. Stanzas without a signal, or on a
/// band other than 2.4/5 GHz, are dropped.
pub fn parse_iw_scan_output(output: &str, captured_at: DateTime<Utc>) -> Vec<Observation> {
    let mut results = Vec::new();
    let mut current: Option<BssStanza> = None;
    let mut section = Section::Other;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("BSS ") {
            if let Some(obs) = current.take().and_then(|s| s.flush(captured_at)) {
                results.push(obs);
            }

            let mac_end = rest
                .find(|c: char| !c.is_ascii_hexdigit() && c != ':')
                .unwrap_or(rest.len());
            current = rest[..mac_end].parse::<Bssid>().ok().map(|bssid| BssStanza {
                bssid: Some(bssid),
                ..Default::default()
            });
            section = Section::Other;
            continue;
        }

        let Some(stanza) = current.as_mut() else {
            continue;
        };
        let trimmed = line.trim();

        if trimmed.starts_with("RSN:") {
            stanza.rsn = true;
            section = Section::Rsn;
            continue;
        }
        if trimmed.starts_with("WPA:") {
            stanza.wpa = true;
            section = Section::Wpa;
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("* ") {
            if section == Section::Rsn {
                if let Some(suites) = item.strip_prefix("Authentication suites:") {
                    if suites.contains("SAE") || suites.contains("SUITE-B") {
                        stanza.rsn_sae = true;
                    }
                }
            }
            continue;
        }
        section = Section::Other;

        if let Some(rest) = trimmed.strip_prefix("SSID:") {
            stanza.ssid = Some(rest.trim().to_string());
        } else if let Some(rest) = trimmed.strip_prefix("signal:") {
            stanza.signal_dbm = parse_signal_dbm(rest);
        } else if let Some(rest) = trimmed.strip_prefix("freq:") {
            stanza.freq_mhz = rest
                .trim()
                .parse::<f64>()
                .ok()
                .map(|f| f.round() as u32);
        } else if let Some(rest) = trimmed.strip_prefix("DS Parameter set: channel") {
            stanza.ds_channel = rest.trim().parse().ok();
        } else if let Some(rest) = trimmed.strip_prefix("capability:") {
            stanza.privacy = Some(rest.split_whitespace().any(|w| w == "Privacy"));
        }
    }

    if let Some(obs) = current.take().and_then(|s| s.flush(captured_at)) {
        results.push(obs);
    }

    results
}

/// Parse `-52.00 dBm` into whole dBm.
fn parse_signal_dbm(s: &str) -> Option<i32> {
    let number = s.split_whitespace().next()?;
    number.parse::<f64>().ok().map(|v| v.round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_IW_OUTPUT: &str = "\
BSS aa:bb:cc:dd:ee:ff(on wlan0)
\tTSF: 123456789 usec
\tfreq: 5180
\tbeacon interval: 100 TUs
\tcapability: ESS Privacy SpectrumMgmt (0x0111)
\tsignal: -52.00 dBm
\tSSID: HomeNetwork
\tRSN:\t * Version: 1
\t\t * Group cipher: CCMP
\t\t * Pairwise ciphers: CCMP
\t\t * Authentication suites: PSK SAE
\t\t * Capabilities: 16-PTKSA-RC 1-GTKSA-RC (0x000c)
\tHT operation:
\t\t * primary channel: 36
BSS 11:22:33:44:55:66(on wlan0)
\tfreq: 2437
\tcapability: ESS ShortSlotTime (0x0401)
\tsignal: -71.00 dBm
\tSSID: Public_WiFi
\tDS Parameter set: channel 6
BSS de:ad:be:ef:ca:fe(on wlan0) -- associated
\tfreq: 2412.0
\tcapability: ESS Privacy ShortSlotTime (0x0411)
\tsignal: -45.50 dBm
\tSSID: OfficeNet
\tRSN:\t * Version: 1
\t\t * Authentication suites: PSK
BSS 01:02:03:04:05:06(on wlan0)
\tfreq: 2462
\tcapability: ESS Privacy (0x0011)
\tsignal: -80.00 dBm
\tSSID:
BSS 0a:0b:0c:0d:0e:0f(on wlan0)
\tfreq: 2422
\tcapability: ESS Privacy (0x0011)
\tsignal: -66.00 dBm
\tSSID: LegacyAP
\tWPA:\t * Version: 1
\t\t * Authentication suites: PSK
";

    fn parse(output: &str) -> Vec<Observation> {
        parse_iw_scan_output(output, Utc::now())
    }

    #[test]
    fn test_parse_stanzas() {
        let obs = parse(SAMPLE_IW_OUTPUT);
        assert_eq!(obs.len(), 5);

        assert_eq!(obs[0].bssid.to_string(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(obs[0].ssid, "HomeNetwork");
        assert_eq!(obs[0].signal_dbm, -52);
        assert_eq!(obs[0].channel, 36);
        assert_eq!(obs[0].band, Band::Five);
        assert_eq!(obs[0].frequency_mhz, 5180);

        assert_eq!(obs[1].channel, 6);
        assert_eq!(obs[1].band, Band::TwoPointFour);

        assert_eq!(obs[2].bssid.to_string(), "de:ad:be:ef:ca:fe");
        assert_eq!(obs[2].frequency_mhz, 2412);
        assert_eq!(obs[2].signal_dbm, -46);
    }

    #[test]
    fn test_security_flags() {
        let obs = parse(SAMPLE_IW_OUTPUT);

        // Transition mode advertises both; strongest wins.
        assert_eq!(
            obs[0].capabilities,
            vec![SecurityType::Wpa3, SecurityType::Wpa2]
        );
        assert_eq!(obs[0].security(), SecurityType::Wpa3);
        assert_eq!(obs[1].security(), SecurityType::Open);
        assert_eq!(obs[2].security(), SecurityType::Wpa2);
        assert_eq!(obs[3].security(), SecurityType::Wep);
        assert_eq!(obs[4].security(), SecurityType::Unknown);
    }

    #[test]
    fn test_hidden_ssid_is_empty() {
        let obs = parse(SAMPLE_IW_OUTPUT);
        assert_eq!(obs[3].ssid, "");
    }

    #[test]
    fn test_channel_from_ds_parameter_when_freq_missing() {
        let output = "\
BSS 11:22:33:44:55:66(on wlan0)
\tsignal: -60.00 dBm
\tDS Parameter set: channel 11
";
        let obs = parse(output);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].channel, 11);
        assert_eq!(obs[0].frequency_mhz, 2462);
        assert!(obs[0].capabilities.is_empty());
    }

    #[test]
    fn test_drops_unusable_stanzas() {
        let output = "\
BSS 11:22:33:44:55:66(on wlan0)
\tfreq: 2437
\tSSID: NoSignal
BSS aa:aa:aa:aa:aa:aa(on wlan0)
\tfreq: 5975
\tsignal: -50.00 dBm
\tSSID: SixGig
BSS not-a-mac(on wlan0)
\tfreq: 2437
\tsignal: -50.00 dBm
";
        assert!(parse(output).is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_scan_args_restrict_frequencies() {
        let scanner = IwScanner::with_interface("wlan0");
        let args = scanner.scan_args(BandFilter::TwoPointFour);
        assert_eq!(&args[..4], &["dev", "wlan0", "scan", "freq"]);
        assert!(args.contains(&"2412".to_string()));
        assert!(!args.contains(&"5180".to_string()));

        let args = scanner.scan_args(BandFilter::Both);
        assert_eq!(args, vec!["dev", "wlan0", "scan"]);

        let cached = IwScanner::with_interface("wlan1").use_cached();
        assert_eq!(
            cached.scan_args(BandFilter::Five),
            vec!["dev", "wlan1", "scan", "dump"]
        );
    }

    #[test]
    fn test_link_is_up() {
        let up = "3: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP";
        let down = "3: wlan0: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN";
        let lower_only = "3: wlan0: <NO-CARRIER,LOWER_UP> mtu 1500";
        assert!(link_is_up(up));
        assert!(!link_is_up(down));
        assert!(!link_is_up(lower_only));
        assert!(!link_is_up(""));
    }

    #[test]
    fn test_classify_iw_failure() {
        let err = classify_iw_failure("wlan0", "command failed: Operation not permitted (-1)");
        assert!(matches!(err, ScanError::AdapterUnavailable { .. }));

        let err = classify_iw_failure("wlan9", "command failed: No such device (-19)");
        assert!(matches!(err, ScanError::AdapterUnavailable { .. }));

        let err = classify_iw_failure("wlan0", "command failed: Device or resource busy (-16)");
        assert!(err.is_recoverable());
    }
}
