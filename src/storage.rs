//! Price data persistence. JSON documents are the interchange format; the
//! bincode snapshot is a faster binary reload of the same bars.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::errors::{EngineError, EngineResult};
use crate::models::Bar;
use crate::series::PriceSeries;

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk JSON shape: `{ "symbol": …, "bars": [ … ] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarDocument {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

#[derive(Serialize, Deserialize)]
struct SeriesSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    symbol: String,
    bars: Vec<Bar>,
}

fn snapshot_error(path: &Path, reason: impl fmt::Display) -> EngineError {
    EngineError::Snapshot {
        reason: format!("{}: {}", path.display(), reason),
    }
}

/// Load a series from either supported format, dispatched on extension.
pub fn load_series(path: impl AsRef<Path>) -> EngineResult<PriceSeries> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => load_json(path),
        Some("bin") => load_snapshot(path),
        _ => Err(snapshot_error(
            path,
            "unsupported data file extension (expected .json or .bin)",
        )),
    }
}

pub fn load_json(path: impl AsRef<Path>) -> EngineResult<PriceSeries> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|error| snapshot_error(path, error))?;
    let document: BarDocument = serde_json::from_reader(BufReader::new(file))
        .map_err(|error| snapshot_error(path, error))?;
    PriceSeries::new(document.symbol, document.bars)
}

pub fn save_json(path: impl AsRef<Path>, document: &BarDocument) -> EngineResult<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let file = File::create(path).map_err(|error| snapshot_error(path, error))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)
        .map_err(|error| snapshot_error(path, error))?;
    writer.flush().map_err(|error| snapshot_error(path, error))
}

pub fn load_snapshot(path: impl AsRef<Path>) -> EngineResult<PriceSeries> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|error| snapshot_error(path, error))?;
    let snapshot: SeriesSnapshot = bincode::deserialize_from(BufReader::new(file))
        .map_err(|error| snapshot_error(path, error))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(snapshot_error(
            path,
            format!(
                "snapshot version mismatch (found {}, expected {})",
                snapshot.version, SNAPSHOT_VERSION
            ),
        ));
    }

    PriceSeries::new(snapshot.symbol, snapshot.bars)
}

pub fn save_snapshot(path: impl AsRef<Path>, series: &PriceSeries) -> EngineResult<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let file = File::create(path).map_err(|error| snapshot_error(path, error))?;
    let mut writer = BufWriter::new(file);
    let snapshot = SeriesSnapshot {
        version: SNAPSHOT_VERSION,
        generated_at: Utc::now(),
        symbol: series.symbol().to_string(),
        bars: series.bars().to_vec(),
    };
    bincode::serialize_into(&mut writer, &snapshot)
        .map_err(|error| snapshot_error(path, error))?;
    writer.flush().map_err(|error| snapshot_error(path, error))
}

fn ensure_parent(path: &Path) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|error| snapshot_error(parent, error))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn sample_bars(len: usize) -> Vec<Bar> {
        (0..len)
            .map(|i| {
                let close = 50.0 + i as f64;
                Bar {
                    date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
                        + chrono::Duration::days(i as i64),
                    open: close,
                    high: close * 1.02,
                    low: close * 0.98,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    fn scratch_path(extension: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stratlab-{}.{}", uuid::Uuid::new_v4(), extension))
    }

    #[test]
    fn json_document_round_trips() {
        let path = scratch_path("json");
        let document = BarDocument {
            symbol: "ACME".to_string(),
            bars: sample_bars(30),
        };
        save_json(&path, &document).unwrap();

        let series = load_series(&path).unwrap();
        assert_eq!(series.symbol(), "ACME");
        assert_eq!(series.len(), 30);
        assert_eq!(series.bars()[7], document.bars[7]);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn snapshot_round_trips_and_checks_version() {
        let path = scratch_path("bin");
        let series = PriceSeries::new("ACME", sample_bars(40)).unwrap();
        save_snapshot(&path, &series).unwrap();

        let restored = load_series(&path).unwrap();
        assert_eq!(restored.symbol(), "ACME");
        assert_eq!(restored.len(), 40);
        assert_eq!(restored.bars(), series.bars());

        // A snapshot stamped with a foreign version is refused.
        let stale = SeriesSnapshot {
            version: SNAPSHOT_VERSION + 1,
            generated_at: Utc::now(),
            symbol: "ACME".to_string(),
            bars: sample_bars(5),
        };
        let file = File::create(&path).unwrap();
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &stale).unwrap();
        writer.flush().unwrap();

        let error = load_snapshot(&path).unwrap_err();
        assert_eq!(error.kind(), "snapshot_error");
        assert!(error.to_string().contains("version mismatch"));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let error = load_series("prices.csv").unwrap_err();
        assert_eq!(error.kind(), "snapshot_error");
    }

    #[test]
    fn loaded_bars_still_pass_series_validation() {
        let path = scratch_path("json");
        let mut bars = sample_bars(10);
        bars[4].high = bars[4].close * 0.5;
        let document = BarDocument {
            symbol: "BAD".to_string(),
            bars,
        };
        save_json(&path, &document).unwrap();

        let error = load_json(&path).unwrap_err();
        assert_eq!(error.kind(), "malformed_series");

        fs::remove_file(&path).ok();
    }
}
