//! CSV bar loading.
//!
//! Each file holds one symbol with a `timestamp,open,high,low,close,volume`
//! header. The symbol is the file stem. Timestamps are accepted as
//! `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use algame_core::domain::{validate_series, Bar, BarError};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::orchestrator::Dataset;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}:{line}: unparseable timestamp '{value}'", .path.display())]
    Timestamp {
        path: PathBuf,
        line: u64,
        value: String,
    },

    #[error("{}:{line}: volume {value} is negative or not finite", .path.display())]
    Volume { path: PathBuf, line: u64, value: f64 },

    #[error("invalid bars in {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: BarError,
    },

    #[error("cannot derive a symbol from {}", .0.display())]
    NoSymbol(PathBuf),

    #[error("symbol '{0}' appears in more than one file")]
    DuplicateSymbol(String),
}

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse bars from any reader. `path` only labels errors. Rejects bad volume;
/// price checks are left to `validate_series`.
pub fn read_bars<R: Read>(reader: R, path: &Path) -> Result<Vec<Bar>, LoadError> {
    let mut rows = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for row in rows.deserialize::<BarRow>() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        // header is line 1
        let line = bars.len() as u64 + 2;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
            path: path.to_path_buf(),
            line,
            value: row.timestamp.clone(),
        })?;
        if !row.volume.is_finite() || row.volume < 0.0 {
            return Err(LoadError::Volume {
                path: path.to_path_buf(),
                line,
                value: row.volume,
            });
        }
        // Fractional volume (e.g. crypto lots) rounds to whole units.
        let volume = row.volume.round() as u64;
        bars.push(Bar::new(timestamp, row.open, row.high, row.low, row.close, volume));
    }
    Ok(bars)
}

/// Load and validate one CSV file.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>, LoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars(file, path)?;
    validate_series(&bars).map_err(|source| LoadError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(bars)
}

/// Symbol for a file: its stem, e.g. `data/SPY.csv` → `SPY`.
pub fn symbol_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Load several files into a dataset keyed by symbol.
pub fn load_dataset<P: AsRef<Path>>(paths: &[P]) -> Result<Dataset, LoadError> {
    let mut data = BTreeMap::new();
    for path in paths {
        let path = path.as_ref();
        let symbol =
            symbol_from_path(path).ok_or_else(|| LoadError::NoSymbol(path.to_path_buf()))?;
        if data.contains_key(&symbol) {
            return Err(LoadError::DuplicateSymbol(symbol));
        }
        let bars = load_csv(path)?;
        data.insert(symbol, bars);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-05"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp(" 2024-03-05T00:00:00 "), Some(expected));
        assert_eq!(parse_timestamp("05/03/2024"), None);
    }

    #[test]
    fn reads_rows_in_order() {
        let text = "timestamp,open,high,low,close,volume\n\
                    2024-01-02,100,101,99,100.5,1000\n\
                    2024-01-03, 100.5, 102, 100, 101.5, 1200.0\n";
        let bars = read_bars(text.as_bytes(), Path::new("SPY.csv")).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 101.5);
        assert_eq!(bars[1].volume, 1200);
    }

    #[test]
    fn bad_timestamp_reports_line() {
        let text = "timestamp,open,high,low,close,volume\n\
                    2024-01-02,100,101,99,100,1\n\
                    yesterday,100,101,99,100,1\n";
        match read_bars(text.as_bytes(), Path::new("X.csv")) {
            Err(LoadError::Timestamp { line, value, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(value, "yesterday");
            }
            other => panic!("expected timestamp error, got {other:?}"),
        }
    }

    #[test]
    fn bad_volume_is_rejected() {
        let negative = "timestamp,open,high,low,close,volume\n\
                        2024-01-02,100,101,99,100,1\n\
                        2024-01-03,100,101,99,100,-5\n";
        match read_bars(negative.as_bytes(), Path::new("X.csv")) {
            Err(LoadError::Volume { line, value, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(value, -5.0);
            }
            other => panic!("expected volume error, got {other:?}"),
        }

        let not_finite = "timestamp,open,high,low,close,volume\n2024-01-02,100,101,99,100,NaN\n";
        assert!(matches!(
            read_bars(not_finite.as_bytes(), Path::new("X.csv")),
            Err(LoadError::Volume { line: 2, .. })
        ));

        let zero = "timestamp,open,high,low,close,volume\n2024-01-02,100,101,99,100,0\n";
        assert_eq!(read_bars(zero.as_bytes(), Path::new("X.csv")).unwrap()[0].volume, 0);
    }

    #[test]
    fn missing_column_is_csv_error() {
        let text = "timestamp,open,high,low,close\n2024-01-02,1,1,1,1\n";
        assert!(matches!(
            read_bars(text.as_bytes(), Path::new("X.csv")),
            Err(LoadError::Csv { .. })
        ));
    }

    #[test]
    fn symbol_is_file_stem() {
        assert_eq!(symbol_from_path(Path::new("data/QQQ.csv")), Some("QQQ".into()));
        assert_eq!(symbol_from_path(Path::new("/")), None);
    }
}
