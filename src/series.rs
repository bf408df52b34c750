use chrono::NaiveDate;
use std::sync::Arc;

use crate::errors::{EngineError, EngineResult};
use crate::models::Bar;

/// Immutable validated OHLCV series for one symbol. Construction checks
/// every bar; afterwards the data is shared cheaply across worker threads
/// through the internal `Arc`s.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    symbol: String,
    bars: Arc<Vec<Bar>>,
    dates: Arc<Vec<NaiveDate>>,
    closes: Arc<Vec<f64>>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> EngineResult<Self> {
        if bars.is_empty() {
            return Err(EngineError::MalformedSeries {
                index: 0,
                reason: "series contains no bars".to_string(),
            });
        }

        for (index, bar) in bars.iter().enumerate() {
            validate_bar(index, bar)?;
            if index > 0 && bar.date <= bars[index - 1].date {
                return Err(EngineError::MalformedSeries {
                    index,
                    reason: format!(
                        "date {} is not after previous bar date {}",
                        bar.date,
                        bars[index - 1].date
                    ),
                });
            }
        }

        let dates: Vec<NaiveDate> = bars.iter().map(|bar| bar.date).collect();
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();

        Ok(PriceSeries {
            symbol: symbol.into(),
            bars: Arc::new(bars),
            dates: Arc::new(dates),
            closes: Arc::new(closes),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Resolve optional start/end dates to an inclusive index window.
    /// Defaults cover the whole series.
    pub fn window(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> EngineResult<(usize, usize)> {
        let range_error = |reason: &str| EngineError::InvalidDateRange {
            start: start.map_or_else(|| "-".to_string(), |d| d.to_string()),
            end: end.map_or_else(|| "-".to_string(), |d| d.to_string()),
            reason: reason.to_string(),
        };

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(range_error("start is after end"));
            }
        }

        let start_index = match start {
            Some(date) => self
                .dates
                .binary_search(&date)
                .unwrap_or_else(|insertion| insertion),
            None => 0,
        };
        let end_index = match end {
            Some(date) => match self.dates.binary_search(&date) {
                Ok(found) => found,
                Err(0) => return Err(range_error("no bars inside range")),
                Err(insertion) => insertion - 1,
            },
            None => self.len() - 1,
        };

        if start_index >= self.len() || start_index > end_index {
            return Err(range_error("no bars inside range"));
        }

        Ok((start_index, end_index))
    }
}

fn validate_bar(index: usize, bar: &Bar) -> EngineResult<()> {
    let malformed = |reason: String| EngineError::MalformedSeries { index, reason };

    for (field, value) in [
        ("open", bar.open),
        ("high", bar.high),
        ("low", bar.low),
        ("close", bar.close),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(malformed(format!(
                "{} must be a positive finite number (got {})",
                field, value
            )));
        }
    }
    if !bar.volume.is_finite() || bar.volume < 0.0 {
        return Err(malformed(format!(
            "volume must be non-negative and finite (got {})",
            bar.volume
        )));
    }
    if bar.high < bar.open.max(bar.close) {
        return Err(malformed(format!(
            "high {} is below max(open, close) {}",
            bar.high,
            bar.open.max(bar.close)
        )));
    }
    if bar.low > bar.open.min(bar.close) {
        return Err(malformed(format!(
            "low {} is above min(open, close) {}",
            bar.low,
            bar.open.min(bar.close)
        )));
    }
    Ok(())
}
