//! Bar: the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One OHLCV observation. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Data-level failures for a bar series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("series is empty")]
    EmptySeries,

    #[error("bar {index} ({timestamp}) has a non-finite or non-positive price")]
    InvalidPrice {
        index: usize,
        timestamp: NaiveDateTime,
    },

    #[error("bar {index} ({timestamp}) violates OHLC ordering (high/low do not bound open/close)")]
    InconsistentRange {
        index: usize,
        timestamp: NaiveDateTime,
    },

    #[error("bar {index} ({timestamp}) is earlier than the previous bar ({previous})")]
    OutOfOrder {
        index: usize,
        timestamp: NaiveDateTime,
        previous: NaiveDateTime,
    },
}

impl Bar {
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// All four prices are finite and strictly positive.
    pub fn has_valid_prices(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
    }

    /// High bounds open/close/low from above, low bounds them from below.
    pub fn is_sane(&self) -> bool {
        self.has_valid_prices()
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Validate a complete series: non-empty, every bar sane, timestamps non-decreasing.
///
/// Reports the first offending bar.
pub fn validate_series(bars: &[Bar]) -> Result<(), BarError> {
    if bars.is_empty() {
        return Err(BarError::EmptySeries);
    }

    let mut previous: Option<NaiveDateTime> = None;
    for (index, bar) in bars.iter().enumerate() {
        if !bar.has_valid_prices() {
            return Err(BarError::InvalidPrice {
                index,
                timestamp: bar.timestamp,
            });
        }
        if !bar.is_sane() {
            return Err(BarError::InconsistentRange {
                index,
                timestamp: bar.timestamp,
            });
        }
        if let Some(prev) = previous {
            if bar.timestamp < prev {
                return Err(BarError::OutOfOrder {
                    index,
                    timestamp: bar.timestamp,
                    previous: prev,
                });
            }
        }
        previous = Some(bar.timestamp);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample_bar(day: u32) -> Bar {
        Bar::new(ts(day), 100.0, 105.0, 98.0, 103.0, 50_000)
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar(2).is_sane());
    }

    #[test]
    fn bar_detects_nan() {
        let mut bar = sample_bar(2);
        bar.open = f64::NAN;
        assert!(!bar.has_valid_prices());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar(2);
        bar.high = 97.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn series_valid() {
        let bars = vec![sample_bar(2), sample_bar(3), sample_bar(3), sample_bar(4)];
        assert!(validate_series(&bars).is_ok());
    }

    #[test]
    fn series_empty_rejected() {
        assert_eq!(validate_series(&[]), Err(BarError::EmptySeries));
    }

    #[test]
    fn series_out_of_order_reports_index() {
        let bars = vec![sample_bar(3), sample_bar(5), sample_bar(4)];
        match validate_series(&bars) {
            Err(BarError::OutOfOrder { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected OutOfOrder, got {other:?}"),
        }
    }

    #[test]
    fn series_bad_range_reports_index() {
        let mut bad = sample_bar(3);
        bad.low = 104.0;
        let bars = vec![sample_bar(2), bad];
        match validate_series(&bars) {
            Err(BarError::InconsistentRange { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InconsistentRange, got {other:?}"),
        }
    }

    #[test]
    fn series_non_positive_price_rejected() {
        let mut bad = sample_bar(2);
        bad.low = 0.0;
        assert!(matches!(
            validate_series(&[bad]),
            Err(BarError::InvalidPrice { index: 0, .. })
        ));
    }
}
