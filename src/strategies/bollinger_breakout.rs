use crate::errors::{EngineError, EngineResult};
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::{positive_f64_param, usize_param};
use crate::series::PriceSeries;
use std::collections::HashMap;

/// Rides volatility breakouts: entries on a close punching through a band,
/// exit when the close falls back across the middle band.
pub struct BollingerBreakoutStrategy {
    period: usize,
    width: f64,
}

impl BollingerBreakoutStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let period = usize_param(parameters, "period", 20)?;
        if period < 2 {
            return Err(EngineError::invalid_parameter(
                "period",
                format!("must be at least 2 (got {})", period),
            ));
        }
        let width = positive_f64_param(parameters, "width", 2.0)?;
        Ok(Self { period, width })
    }
}

impl super::Strategy for BollingerBreakoutStrategy {
    fn id(&self) -> &'static str {
        "bollinger_breakout"
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let closes = series.closes();
        let bands = indicators::bollinger(closes, self.period, self.width);

        let mut signals = Vec::with_capacity(closes.len());
        for i in 0..closes.len() {
            if i + 1 < self.min_bars() {
                signals.push(Signal::hold());
            } else if super::crossed_above(closes, &bands.upper, i) {
                signals.push(Signal::buy());
            } else if super::crossed_below(closes, &bands.lower, i) {
                signals.push(Signal::sell());
            } else if super::crossed_below(closes, &bands.middle, i)
                || super::crossed_above(closes, &bands.middle, i)
            {
                signals.push(Signal::exit());
            } else {
                signals.push(Signal::hold());
            }
        }
        signals
    }
}
