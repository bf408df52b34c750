use crate::errors::{EngineError, EngineResult};
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::usize_param;
use crate::series::PriceSeries;
use std::collections::HashMap;

/// Donchian-style channel breakout: a close beyond the prior N-bar extreme
/// opens in the breakout direction.
pub struct BreakoutStrategy {
    period: usize,
}

impl BreakoutStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let period = usize_param(parameters, "period", 20)?;
        if period < 2 {
            return Err(EngineError::invalid_parameter(
                "period",
                format!("must be at least 2 (got {})", period),
            ));
        }
        Ok(Self { period })
    }
}

impl super::Strategy for BreakoutStrategy {
    fn id(&self) -> &'static str {
        "breakout"
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let bars = series.bars();
        let highs: Vec<f64> = bars.iter().map(|bar| bar.high).collect();
        let lows: Vec<f64> = bars.iter().map(|bar| bar.low).collect();
        let channel_high = indicators::rolling_max(&highs, self.period);
        let channel_low = indicators::rolling_min(&lows, self.period);

        let mut signals = Vec::with_capacity(bars.len());
        for i in 0..bars.len() {
            if i + 1 < self.min_bars() {
                signals.push(Signal::hold());
                continue;
            }
            // The channel at i-1 is the prior N bars, so the current bar
            // never compares against itself.
            let close = bars[i].close;
            if close > channel_high[i - 1] {
                signals.push(Signal::buy());
            } else if close < channel_low[i - 1] {
                signals.push(Signal::sell());
            } else {
                signals.push(Signal::hold());
            }
        }
        signals
    }
}
