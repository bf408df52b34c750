use crate::errors::{EngineError, EngineResult};
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::{positive_f64_param, usize_param};
use crate::series::PriceSeries;
use std::collections::HashMap;

/// Long-average trend filter with a dead band. Price leaving the band
/// opens with the trend; falling back inside it closes the position.
pub struct TrendFollowingStrategy {
    period: usize,
    threshold: f64,
}

#[derive(Clone, Copy, PartialEq)]
enum Zone {
    Above,
    Inside,
    Below,
}

impl TrendFollowingStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let period = usize_param(parameters, "period", 50)?;
        if period < 2 {
            return Err(EngineError::invalid_parameter(
                "period",
                format!("must be at least 2 (got {})", period),
            ));
        }
        let threshold = positive_f64_param(parameters, "threshold", 0.02)?;
        if threshold > 0.5 {
            return Err(EngineError::invalid_parameter(
                "threshold",
                format!("must be at most 0.5 (got {})", threshold),
            ));
        }
        Ok(Self { period, threshold })
    }

    fn zone(&self, close: f64, average: f64) -> Zone {
        if close > average * (1.0 + self.threshold) {
            Zone::Above
        } else if close < average * (1.0 - self.threshold) {
            Zone::Below
        } else {
            Zone::Inside
        }
    }
}

impl super::Strategy for TrendFollowingStrategy {
    fn id(&self) -> &'static str {
        "trend_following"
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let closes = series.closes();
        let average = indicators::sma(closes, self.period);

        let mut signals = Vec::with_capacity(closes.len());
        let mut previous = Zone::Inside;
        for i in 0..closes.len() {
            if i + 1 < self.min_bars() {
                signals.push(Signal::hold());
                continue;
            }
            let current = self.zone(closes[i], average[i]);
            let signal = match (previous, current) {
                (Zone::Above, Zone::Above)
                | (Zone::Below, Zone::Below)
                | (Zone::Inside, Zone::Inside) => Signal::hold(),
                (_, Zone::Above) => Signal::buy(),
                (_, Zone::Below) => Signal::sell(),
                (_, Zone::Inside) => Signal::exit(),
            };
            previous = current;
            signals.push(signal);
        }
        signals
    }
}
