//! Versioned JSON export of a finished scan session.
//!
//! The document is the only on-disk format and the sole input of
//! `analyze`. Exporting an imported document reproduces the original bytes:
//! networks are ordered by BSSID, every field is an integer, string or
//! RFC 3339 timestamp, and the text always ends with a newline.

use crate::error::ScanError;
use crate::models::{Bssid, NetworkRecord, ScanSession, SessionMetadata};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Schema version written by this build and the only one it reads.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct ExportDocument<'a> {
    schema_version: u32,
    session: &'a SessionMetadata,
    networks: Vec<&'a NetworkRecord>,
}

/// Serialize a session to the export document.
pub fn export(session: &ScanSession) -> Result<String, ScanError> {
    let document = ExportDocument {
        schema_version: SCHEMA_VERSION,
        session: &session.metadata,
        networks: session.records().collect(),
    };

    let mut text = serde_json::to_string_pretty(&document)
        .map_err(|e| ScanError::Io(std::io::Error::other(e)))?;
    text.push('\n');
    Ok(text)
}

/// Reconstruct a session from an export document.
///
/// Validation errors name the offending field, e.g. `networks[3].samples`.
pub fn import(text: &str) -> Result<ScanSession, ScanError> {
    let root: Value =
        serde_json::from_str(text).map_err(|e| ScanError::malformed("document", e))?;
    let Value::Object(mut root) = root else {
        return Err(ScanError::malformed("document", "expected a JSON object"));
    };

    let version = root
        .get("schema_version")
        .ok_or_else(|| ScanError::malformed("schema_version", "missing"))?
        .as_u64()
        .ok_or_else(|| ScanError::malformed("schema_version", "expected a non-negative integer"))?;
    if version != u64::from(SCHEMA_VERSION) {
        return Err(ScanError::UnsupportedSchemaVersion {
            expected: SCHEMA_VERSION,
            found: version,
        });
    }

    let metadata: SessionMetadata = root
        .remove("session")
        .ok_or_else(|| ScanError::malformed("session", "missing"))
        .and_then(|v| serde_json::from_value(v).map_err(|e| ScanError::malformed("session", e)))?;

    let networks = match root.remove("networks") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ScanError::malformed("networks", "expected an array")),
        None => return Err(ScanError::malformed("networks", "missing")),
    };

    let mut records: BTreeMap<Bssid, NetworkRecord> = BTreeMap::new();
    for (i, item) in networks.into_iter().enumerate() {
        let field = format!("networks[{}]", i);
        let record: NetworkRecord =
            serde_json::from_value(item).map_err(|e| ScanError::malformed(&field, e))?;
        validate_record(&record, &field)?;

        if records.insert(record.bssid, record).is_some() {
            return Err(ScanError::malformed(
                format!("{}.bssid", field),
                "duplicate BSSID",
            ));
        }
    }

    debug!("Imported {} networks", records.len());
    Ok(ScanSession {
        metadata,
        networks: records,
    })
}

/// Check that a record's summary fields agree with its samples.
fn validate_record(record: &NetworkRecord, field: &str) -> Result<(), ScanError> {
    let Some(last) = record.samples.last() else {
        return Err(ScanError::malformed(
            format!("{}.samples", field),
            "at least one sample is required",
        ));
    };

    if record.first_seen > record.last_seen {
        return Err(ScanError::malformed(
            format!("{}.first_seen", field),
            "later than last_seen",
        ));
    }
    if record.current_dbm != last.dbm {
        return Err(ScanError::malformed(
            format!("{}.current_dbm", field),
            format!("{} does not match the last sample ({})", record.current_dbm, last.dbm),
        ));
    }

    let best = record.samples.iter().map(|s| s.dbm).max().unwrap_or(last.dbm);
    if record.best_dbm != best {
        return Err(ScanError::malformed(
            format!("{}.best_dbm", field),
            format!("{} does not match the strongest sample ({})", record.best_dbm, best),
        ));
    }

    let worst = record.samples.iter().map(|s| s.dbm).min().unwrap_or(last.dbm);
    if record.worst_dbm != worst {
        return Err(ScanError::malformed(
            format!("{}.worst_dbm", field),
            format!("{} does not match the weakest sample ({})", record.worst_dbm, worst),
        ));
    }

    Ok(())
}

/// Write the export document, replacing `path` atomically.
pub fn write_export(session: &ScanSession, path: &Path) -> Result<()> {
    let text = export(session)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(text.as_bytes())
        .context("Failed to write export document")?;
    file.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write results file: {}", path.display()))?;

    info!("Results saved to {}", path.display());
    Ok(())
}

/// Read and validate an export document.
pub fn read_export(path: &Path) -> Result<ScanSession> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file: {}", path.display()))?;
    Ok(import(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Aggregator;
    use crate::models::{Band, Observation, SecurityType};
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;

    fn at(secs: i64, millis: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, millis * 1_000_000)
            .unwrap()
    }

    fn sample_session() -> ScanSession {
        let mut metadata = SessionMetadata::new(at(0, 0), vec![Band::TwoPointFour, Band::Five], 30);
        metadata.interface = Some("wlan0".to_string());
        let mut agg = Aggregator::new(metadata);

        let observations = [
            ("aa:aa:aa:aa:aa:01", "Home \"5G\"", 36, -40, vec![SecurityType::Wpa2], 1),
            ("aa:aa:aa:aa:aa:01", "Home \"5G\"", 36, -55, vec![SecurityType::Wpa2, SecurityType::Wpa3], 4),
            ("bb:bb:bb:bb:bb:02", "", 6, -70, vec![SecurityType::Open], 4),
            ("0c:00:00:00:00:03", "Café", 11, -81, vec![], 40),
        ];
        for (bssid, ssid, channel, dbm, caps, secs) in observations {
            agg.record_poll(true);
            agg.ingest(&Observation {
                bssid: bssid.parse().unwrap(),
                ssid: ssid.to_string(),
                band: Band::from_channel(channel).unwrap(),
                channel,
                frequency_mhz: crate::models::channel_to_frequency(channel).unwrap(),
                signal_dbm: dbm,
                capabilities: caps,
                timestamp: at(secs, 250),
            });
        }
        agg.finalize(at(60, 125))
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let session = sample_session();
        let first = export(&session).unwrap();
        let imported = import(&first).unwrap();
        assert_eq!(imported, session);
        assert_eq!(export(&imported).unwrap(), first);
    }

    #[test]
    fn test_document_shape() {
        let text = export(&sample_session()).unwrap();
        assert!(text.ends_with('\n'));

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["session"]["duration_ms"], 60_125);
        assert_eq!(value["session"]["bands"][1], "5GHz");
        assert_eq!(value["session"]["channel_filter"], Value::Null);

        let networks = value["networks"].as_array().unwrap();
        assert_eq!(networks.len(), 3);
        // Sorted by BSSID.
        assert_eq!(networks[0]["bssid"], "0c:00:00:00:00:03");
        assert_eq!(networks[1]["security"], "WPA3");
        assert_eq!(networks[1]["best_dbm"], -40);
        assert_eq!(networks[1]["current_dbm"], -55);
        // Finalized at 60s: only the network seen at 40s is still fresh.
        assert_eq!(networks[0]["status"], "active");
        assert_eq!(networks[2]["status"], "stale");
    }

    #[test]
    fn test_rejects_other_schema_versions() {
        let text = export(&sample_session()).unwrap();
        let mut value: Value = serde_json::from_str(&text).unwrap();

        value["schema_version"] = Value::from(2);
        let err = import(&value.to_string()).unwrap_err();
        assert!(matches!(
            err,
            ScanError::UnsupportedSchemaVersion {
                expected: 1,
                found: 2
            }
        ));
        assert_eq!(err.exit_code(), 4);

        value["schema_version"] = Value::from("1");
        let err = import(&value.to_string()).unwrap_err();
        assert!(matches!(err, ScanError::MalformedExportDocument { ref field, .. } if field == "schema_version"));

        value.as_object_mut().unwrap().remove("schema_version");
        assert!(import(&value.to_string()).is_err());
    }

    #[test]
    fn test_malformed_documents_name_the_field() {
        let text = export(&sample_session()).unwrap();

        let field_of = |value: &Value| match import(&value.to_string()).unwrap_err() {
            ScanError::MalformedExportDocument { field, .. } => field,
            other => panic!("unexpected error: {}", other),
        };

        let mut value: Value = serde_json::from_str(&text).unwrap();
        value["networks"][1]["bssid"] = Value::from("not-a-mac");
        assert_eq!(field_of(&value), "networks[1]");

        let mut value: Value = serde_json::from_str(&text).unwrap();
        value["networks"][2]["samples"] = Value::Array(vec![]);
        assert_eq!(field_of(&value), "networks[2].samples");

        let mut value: Value = serde_json::from_str(&text).unwrap();
        value["networks"][1]["best_dbm"] = Value::from(-10);
        assert_eq!(field_of(&value), "networks[1].best_dbm");

        let mut value: Value = serde_json::from_str(&text).unwrap();
        let dup = value["networks"][0].clone();
        value["networks"].as_array_mut().unwrap().push(dup);
        assert_eq!(field_of(&value), "networks[3].bssid");

        let mut value: Value = serde_json::from_str(&text).unwrap();
        value["networks"] = Value::from("none");
        assert_eq!(field_of(&value), "networks");

        let mut value: Value = serde_json::from_str(&text).unwrap();
        value["session"]["polls"] = Value::from(-1);
        assert_eq!(field_of(&value), "session");

        assert!(matches!(
            import("{ not json").unwrap_err(),
            ScanError::MalformedExportDocument { ref field, .. } if field == "document"
        ));
        assert!(import("[]").is_err());
    }

    #[test]
    fn test_checked_in_fixture_round_trips() {
        let fixture = include_str!("../../fixtures/scan_results.json");
        let session = import(fixture).unwrap();

        assert_eq!(session.len(), 4);
        assert_eq!(session.stale_count(), 1);
        assert_eq!(session.metadata.failed_polls, 1);
        assert_eq!(export(&session).unwrap(), fixture);
    }

    #[test]
    fn test_write_and_read_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan_results.json");
        let session = sample_session();

        write_export(&session, &path).unwrap();
        // Overwrites in place.
        write_export(&session, &path).unwrap();

        let loaded = read_export(&path).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            export(&session).unwrap()
        );

        let missing = read_export(&dir.path().join("missing.json"));
        assert!(missing.is_err());
    }
}
