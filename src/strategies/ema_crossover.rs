use crate::errors::EngineResult;
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::{require_ordered, usize_param};
use crate::series::PriceSeries;
use std::collections::HashMap;

pub struct EmaCrossoverStrategy {
    fast_period: usize,
    slow_period: usize,
}

impl EmaCrossoverStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let fast_period = usize_param(parameters, "fast_period", 12)?;
        let slow_period = usize_param(parameters, "slow_period", 26)?;
        require_ordered("fast_period", fast_period, "slow_period", slow_period)?;
        Ok(Self {
            fast_period,
            slow_period,
        })
    }
}

impl super::Strategy for EmaCrossoverStrategy {
    fn id(&self) -> &'static str {
        "ema_crossover"
    }

    fn min_bars(&self) -> usize {
        self.slow_period + 1
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let closes = series.closes();
        let fast = indicators::ema(closes, self.fast_period);
        let slow = indicators::ema(closes, self.slow_period);

        let mut signals = Vec::with_capacity(closes.len());
        for i in 0..closes.len() {
            if i + 1 < self.min_bars() {
                signals.push(Signal::hold());
            } else if super::crossed_above(&fast, &slow, i) {
                signals.push(Signal::buy());
            } else if super::crossed_below(&fast, &slow, i) {
                signals.push(Signal::sell());
            } else {
                signals.push(Signal::hold());
            }
        }
        signals
    }
}
