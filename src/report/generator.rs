//! Console report generation.
//!
//! Plain-text views of a scan session: the live monitor table, the final
//! scan summary and the offline analysis report (optionally with text
//! histograms standing in for plots).

use crate::analysis::{
    band_distribution, channel_distribution, most_congested_channel, ranked_by_signal,
    security_distribution, signal_summary, strength_histogram, visibility_counts,
};
use crate::config::{ReportConfig, MAX_HISTOGRAM_WIDTH};
use crate::models::{NetworkRecord, ScanSession};
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// ANSI sequence that clears the terminal and homes the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

const RULE_WIDTH: usize = 78;

fn rule(c: char) -> String {
    std::iter::repeat(c).take(RULE_WIDTH).collect()
}

/// Column header for [`discovery_line`].
pub fn discovery_header() -> String {
    format!("{:<5}\t{:<9}\t{}", "CHAN", "STRENGTH", "SSID")
}

/// One line announcing a newly discovered network.
pub fn discovery_line(record: &NetworkRecord) -> String {
    format!(
        "{:<5}\t{:<9}\t{}",
        record.channel,
        format!("{} dBm", record.current_dbm),
        record.display_ssid()
    )
}

/// Human-readable duration, e.g. `2m 05s`.
fn format_duration(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

fn scope(session: &ScanSession) -> String {
    match session.metadata.channel_filter {
        Some(channel) => format!("channel {}", channel),
        None => session
            .metadata
            .bands
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(" + "),
    }
}

/// SSIDs are cut to keep the table aligned.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

fn network_table(records: &[&NetworkRecord], with_trend: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<17}  {:<24}  {:>4}  {:>5}  {:>5}  {:<11}  {:<7}  {}",
        "BSSID", "SSID", "CH", "dBm", "BEST", "QUALITY", "SEC", "STATUS"
    );
    for record in records {
        let status = if record.is_stale() { "STALE" } else { "" };
        let trend = if with_trend { record.trend().arrow() } else { " " };
        let _ = writeln!(
            out,
            "{:<17}  {:<24}  {:>4}  {:>4}{}  {:>5}  {:<11}  {:<7}  {}",
            record.bssid.to_string(),
            truncate(record.display_ssid(), 24),
            record.channel,
            record.current_dbm,
            trend,
            record.best_dbm,
            record.quality().to_string(),
            record.security.to_string(),
            status
        );
    }
    out
}

/// Live monitor view. Meant to overwrite the previous frame, not append to it.
pub fn render_live(snapshot: &ScanSession, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let meta = &snapshot.metadata;
    let elapsed = (now - meta.started_at).num_seconds().max(0).unsigned_abs();

    let _ = writeln!(out, "RF Signal Detector - monitoring {}", scope(snapshot));
    let _ = writeln!(
        out,
        "Elapsed {}  |  {} networks ({} stale)  |  polls {} ({} failed)",
        format_duration(elapsed),
        snapshot.len(),
        snapshot.stale_count(),
        meta.polls,
        meta.failed_polls
    );
    out.push_str(&rule('─'));
    out.push('\n');

    if snapshot.is_empty() {
        out.push_str("No networks detected yet...\n");
    } else {
        out.push_str(&network_table(&ranked_by_signal(snapshot), true));
    }

    out.push_str(&rule('─'));
    out.push('\n');
    out.push_str("Press Ctrl+C to stop\n");
    out
}

/// Final report for `scan` and `monitor`.
pub fn render_summary(session: &ScanSession, config: &ReportConfig) -> String {
    let mut out = String::new();
    let meta = &session.metadata;

    out.push_str(&rule('='));
    out.push('\n');
    out.push_str("SCAN SUMMARY\n");
    out.push_str(&rule('='));
    out.push('\n');

    let _ = writeln!(out, "Scope:            {}", scope(session));
    if let Some(ref interface) = meta.interface {
        let _ = writeln!(out, "Interface:        {}", interface);
    }
    let _ = writeln!(out, "Duration:         {}", format_duration(meta.duration_secs()));
    let _ = writeln!(
        out,
        "Polls:            {} ({} failed)",
        meta.polls, meta.failed_polls
    );
    let _ = writeln!(out, "Total networks:   {}", session.len());

    let Some(signal) = signal_summary(session) else {
        out.push_str("\nNo networks detected.\n");
        return out;
    };

    let channels = channel_distribution(session);
    let _ = writeln!(out, "Average signal:   {} dBm", signal.average_dbm);
    let _ = writeln!(out, "Strongest signal: {} dBm", signal.strongest_dbm);
    let _ = writeln!(out, "Weakest signal:   {} dBm", signal.weakest_dbm);
    let _ = writeln!(out, "Unique channels:  {}", channels.len());
    if session.stale_count() > 0 {
        let _ = writeln!(out, "Stale networks:   {}", session.stale_count());
    }

    out.push_str("\nChannel distribution:\n");
    for (channel, count) in &channels {
        let _ = writeln!(out, "  Channel {:>3}: {}", channel, count);
    }
    if let Some((channel, count)) = most_congested_channel(session) {
        let _ = writeln!(
            out,
            "  Most congested: channel {} ({} networks)",
            channel, count
        );
    }

    let ranked = ranked_by_signal(session);
    let top: Vec<_> = ranked.into_iter().take(config.top_networks).collect();
    let _ = writeln!(out, "\nTop {} networks by signal:", top.len());
    out.push_str(&network_table(&top, false));

    out
}

/// Offline analysis of an imported session.
pub fn render_analysis(session: &ScanSession, config: &ReportConfig, plot: bool) -> String {
    let mut out = String::new();
    let meta = &session.metadata;

    out.push_str(&rule('='));
    out.push('\n');
    out.push_str("ANALYSIS REPORT\n");
    out.push_str(&rule('='));
    out.push('\n');

    let _ = writeln!(
        out,
        "Session:          {} ({})",
        meta.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        format_duration(meta.duration_secs())
    );
    let _ = writeln!(out, "Scope:            {}", scope(session));
    let _ = writeln!(out, "Total networks:   {}", session.len());

    let Some(signal) = signal_summary(session) else {
        out.push_str("\nNo networks in results file.\n");
        return out;
    };

    let channels = channel_distribution(session);
    let active: Vec<String> = channels.keys().map(|c| c.to_string()).collect();
    let _ = writeln!(out, "Active channels:  {}", active.join(", "));
    if let Some((channel, count)) = most_congested_channel(session) {
        let _ = writeln!(out, "Most congested:   channel {} ({} networks)", channel, count);
    }
    let _ = writeln!(
        out,
        "Signal range:     {} to {} dBm (average {} dBm)",
        signal.weakest_dbm, signal.strongest_dbm, signal.average_dbm
    );

    let (visible, hidden) = visibility_counts(session);
    let _ = writeln!(out, "Visible networks: {}", visible);
    let _ = writeln!(out, "Hidden networks:  {}", hidden);
    let _ = writeln!(out, "Stale networks:   {}", session.stale_count());

    out.push_str("\nSecurity types:\n");
    for (security, count) in security_distribution(session) {
        let _ = writeln!(out, "  {:<8} {}", security.to_string(), count);
    }

    out.push_str("\nBands:\n");
    for (band, count) in band_distribution(session) {
        let _ = writeln!(out, "  {:<8} {}", band.to_string(), count);
    }

    let ranked = ranked_by_signal(session);
    let top: Vec<_> = ranked.into_iter().take(config.top_networks).collect();
    let _ = writeln!(out, "\nTop {} networks by signal:", top.len());
    out.push_str(&network_table(&top, false));

    if plot {
        let width = config.histogram_width;

        out.push_str("\nChannel distribution\n");
        let rows: Vec<_> = channels
            .iter()
            .map(|(channel, count)| (format!("ch {}", channel), *count))
            .collect();
        out.push_str(&histogram(&rows, width));

        out.push_str("\nSignal strength distribution\n");
        let rows: Vec<_> = strength_histogram(session)
            .into_iter()
            .rev()
            .map(|(low, count)| (format!("{}..{} dBm", low, low + 9), count))
            .collect();
        out.push_str(&histogram(&rows, width));

        out.push_str("\nSecurity types\n");
        let rows: Vec<_> = security_distribution(session)
            .into_iter()
            .map(|(security, count)| (security.to_string(), count))
            .collect();
        out.push_str(&histogram(&rows, width));
    }

    out
}

/// Horizontal bar chart; the largest count gets `width` cells.
///
/// `width` is capped at [`MAX_HISTOGRAM_WIDTH`].
pub fn histogram(rows: &[(String, usize)], width: usize) -> String {
    let width = width.min(MAX_HISTOGRAM_WIDTH);
    let max = rows.iter().map(|(_, count)| *count).max().unwrap_or(0);
    let label_width = rows.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    for (label, count) in rows {
        let cells = if max == 0 {
            0
        } else {
            // Non-zero rows always get at least one cell.
            let scaled = *count as u128 * width as u128 / max as u128;
            usize::try_from(scaled)
                .unwrap_or(width)
                .max(usize::from(*count > 0))
        };
        let _ = writeln!(
            out,
            "  {:<lw$} │{} {}",
            label,
            "█".repeat(cells),
            count,
            lw = label_width
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Aggregator;
    use crate::models::{Band, Observation, SecurityType, SessionMetadata};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn observation(bssid: &str, ssid: &str, channel: u16, dbm: i32, secs: i64) -> Observation {
        Observation {
            bssid: bssid.parse().unwrap(),
            ssid: ssid.to_string(),
            band: Band::from_channel(channel).unwrap(),
            channel,
            frequency_mhz: crate::models::channel_to_frequency(channel).unwrap(),
            signal_dbm: dbm,
            capabilities: vec![SecurityType::Wpa2],
            timestamp: at(secs),
        }
    }

    fn aggregator() -> Aggregator {
        let mut agg = Aggregator::new(SessionMetadata::new(
            at(0),
            vec![Band::TwoPointFour, Band::Five],
            30,
        ));
        agg.ingest(&observation("aa:00:00:00:00:01", "Home_Network", 6, -45, 1));
        agg.ingest(&observation("aa:00:00:00:00:01", "Home_Network", 6, -38, 4));
        agg.ingest(&observation("aa:00:00:00:00:02", "", 11, -72, 2));
        agg.ingest(&observation("aa:00:00:00:00:03", "Office_5G", 36, -63, 2));
        agg
    }

    #[test]
    fn test_discovery_line() {
        let agg = aggregator();
        let session = agg.session();
        let hidden = session.get(&"aa:00:00:00:00:02".parse().unwrap()).unwrap();
        assert_eq!(discovery_line(hidden), "11   \t-72 dBm  \tHidden Network");
        assert!(discovery_header().starts_with("CHAN"));
    }

    #[test]
    fn test_render_live() {
        let agg = aggregator();
        let view = render_live(&agg.snapshot_at(at(33)), at(33));

        assert!(view.contains("monitoring 2.4GHz + 5GHz"));
        assert!(view.contains("3 networks (2 stale)"));
        assert!(view.contains("Home_Network"));
        assert!(view.contains("STALE"));
        // Strongest first.
        let home = view.find("Home_Network").unwrap();
        let office = view.find("Office_5G").unwrap();
        assert!(home < office);
        // -45 to -38 is a rising trend.
        assert!(view.contains("-38↑"));
    }

    #[test]
    fn test_render_live_empty() {
        let agg = Aggregator::new(SessionMetadata::new(at(0), vec![Band::Five], 30));
        let view = render_live(&agg.snapshot_at(at(5)), at(5));
        assert!(view.contains("No networks detected yet"));
    }

    #[test]
    fn test_render_summary() {
        let config = ReportConfig {
            top_networks: 2,
            ..Default::default()
        };
        let session = aggregator().finalize(at(65));
        let text = render_summary(&session, &config);

        assert!(text.contains("Duration:         1m 05s"));
        assert!(text.contains("Total networks:   3"));
        assert!(text.contains("Strongest signal: -38 dBm"));
        assert!(text.contains("Weakest signal:   -72 dBm"));
        assert!(text.contains("Unique channels:  3"));
        assert!(text.contains("Most congested: channel 6 (1 networks)"));
        assert!(text.contains("Top 2 networks"));
        assert!(!text.contains("Hidden Network"));
    }

    #[test]
    fn test_render_analysis_with_plot() {
        let session = aggregator().finalize(at(10));
        let config = ReportConfig::default();

        let text = render_analysis(&session, &config, false);
        assert!(text.contains("Active channels:  6, 11, 36"));
        assert!(text.contains("Visible networks: 2"));
        assert!(text.contains("Hidden networks:  1"));
        assert!(text.contains("WPA2"));
        assert!(!text.contains("Channel distribution\n"));

        let plotted = render_analysis(&session, &config, true);
        assert!(plotted.contains("Channel distribution\n"));
        assert!(plotted.contains("Signal strength distribution"));
        assert!(plotted.contains("-40..-31 dBm"));
    }

    #[test]
    fn test_render_analysis_of_fixture() {
        let session =
            crate::report::export::import(include_str!("../../fixtures/scan_results.json")).unwrap();
        let text = render_analysis(&session, &ReportConfig::default(), true);

        assert!(text.contains("Most congested:   channel 6 (2 networks)"));
        assert!(text.contains("Signal range:     -78 to -45 dBm"));
        assert!(text.contains("Hidden networks:  1"));
        assert!(text.contains("Stale networks:   1"));
        assert!(text.contains("ch 36"));
    }

    #[test]
    fn test_histogram_scaling() {
        let rows = vec![
            ("a".to_string(), 10),
            ("bb".to_string(), 5),
            ("c".to_string(), 1),
        ];
        let text = histogram(&rows, 5);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].matches('█').count(), 5);
        assert_eq!(lines[1].matches('█').count(), 2);
        // Rounded down to zero but still visible.
        assert_eq!(lines[2].matches('█').count(), 1);
        assert!(lines[0].starts_with("  a  │"));

        assert_eq!(histogram(&[], 20), "");
    }

    #[test]
    fn test_histogram_extreme_values() {
        let rows = vec![
            ("max".to_string(), usize::MAX),
            ("half".to_string(), usize::MAX / 2),
            ("one".to_string(), 1),
        ];
        let text = histogram(&rows, usize::MAX);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].matches('█').count(), MAX_HISTOGRAM_WIDTH);
        assert_eq!(lines[1].matches('█').count(), MAX_HISTOGRAM_WIDTH / 2 - 1);
        assert_eq!(lines[2].matches('█').count(), 1);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-network-name", 6), "a-ver…");
    }
}
