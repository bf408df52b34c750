use crate::errors::{EngineError, EngineResult};
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::{f64_param_in, require_below, usize_param};
use crate::series::PriceSeries;
use std::collections::HashMap;

/// %K/%D crosses taken only in the exhaustion zones: a bullish cross below
/// the oversold line, a bearish cross above the overbought line.
pub struct StochasticStrategy {
    k_period: usize,
    d_period: usize,
    oversold: f64,
    overbought: f64,
}

impl StochasticStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let k_period = usize_param(parameters, "k_period", 14)?;
        if k_period < 2 {
            return Err(EngineError::invalid_parameter(
                "k_period",
                format!("must be at least 2 (got {})", k_period),
            ));
        }
        let d_period = usize_param(parameters, "d_period", 3)?;
        let oversold = f64_param_in(parameters, "oversold", 20.0, 1.0, 99.0)?;
        let overbought = f64_param_in(parameters, "overbought", 80.0, 1.0, 99.0)?;
        require_below("oversold", oversold, "overbought", overbought)?;
        Ok(Self {
            k_period,
            d_period,
            oversold,
            overbought,
        })
    }
}

impl super::Strategy for StochasticStrategy {
    fn id(&self) -> &'static str {
        "stochastic"
    }

    fn min_bars(&self) -> usize {
        self.k_period + self.d_period + 1
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let bars = series.bars();
        let highs: Vec<f64> = bars.iter().map(|bar| bar.high).collect();
        let lows: Vec<f64> = bars.iter().map(|bar| bar.low).collect();
        let closes = series.closes();
        let (k_values, d_values) =
            indicators::stochastic(&highs, &lows, closes, self.k_period, self.d_period);

        let mut signals = Vec::with_capacity(bars.len());
        for i in 0..bars.len() {
            if i + 1 < self.min_bars() {
                signals.push(Signal::hold());
                continue;
            }
            let k = k_values[i];
            if k < self.oversold && super::crossed_above(&k_values, &d_values, i) {
                let weight = (0.5 + (self.oversold - k) / self.oversold * 0.5).min(1.0);
                signals.push(Signal::buy().with_weight(weight));
            } else if k > self.overbought && super::crossed_below(&k_values, &d_values, i) {
                let weight =
                    (0.5 + (k - self.overbought) / (100.0 - self.overbought) * 0.5).min(1.0);
                signals.push(Signal::sell().with_weight(weight));
            } else {
                signals.push(Signal::hold());
            }
        }
        signals
    }
}
