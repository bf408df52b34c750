use crate::errors::{EngineError, EngineResult};
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::{positive_f64_param, usize_param};
use crate::series::PriceSeries;
use std::collections::HashMap;

pub struct SuperTrendStrategy {
    period: usize,
    multiplier: f64,
}

impl SuperTrendStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let period = usize_param(parameters, "period", 10)?;
        if period < 2 {
            return Err(EngineError::invalid_parameter(
                "period",
                format!("must be at least 2 (got {})", period),
            ));
        }
        let multiplier = positive_f64_param(parameters, "multiplier", 3.0)?;
        Ok(Self { period, multiplier })
    }
}

impl super::Strategy for SuperTrendStrategy {
    fn id(&self) -> &'static str {
        "supertrend"
    }

    fn min_bars(&self) -> usize {
        self.period + 2
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let bars = series.bars();
        let highs: Vec<f64> = bars.iter().map(|bar| bar.high).collect();
        let lows: Vec<f64> = bars.iter().map(|bar| bar.low).collect();
        let closes = series.closes();
        let points = indicators::super_trend(&highs, &lows, closes, self.period, self.multiplier);

        let mut signals = Vec::with_capacity(bars.len());
        for i in 0..bars.len() {
            if i + 1 < self.min_bars() {
                signals.push(Signal::hold());
            } else if points[i].direction == 1 && points[i - 1].direction == -1 {
                signals.push(Signal::buy());
            } else if points[i].direction == -1 && points[i - 1].direction == 1 {
                signals.push(Signal::sell());
            } else {
                signals.push(Signal::hold());
            }
        }
        signals
    }
}
