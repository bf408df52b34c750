use crate::errors::EngineResult;
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::{require_ordered, usize_param};
use crate::series::PriceSeries;
use std::collections::HashMap;

pub struct SmaCrossoverStrategy {
    fast_period: usize,
    slow_period: usize,
}

impl SmaCrossoverStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let fast_period = usize_param(parameters, "fast_period", 10)?;
        let slow_period = usize_param(parameters, "slow_period", 30)?;
        require_ordered("fast_period", fast_period, "slow_period", slow_period)?;
        Ok(Self {
            fast_period,
            slow_period,
        })
    }
}

impl super::Strategy for SmaCrossoverStrategy {
    fn id(&self) -> &'static str {
        "sma_crossover"
    }

    fn min_bars(&self) -> usize {
        self.slow_period + 1
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let closes = series.closes();
        let fast = indicators::sma(closes, self.fast_period);
        let slow = indicators::sma(closes, self.slow_period);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, SignalAction};
    use crate::strategy::Strategy;
    use chrono::NaiveDate;

    fn series_from_closes(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1_000.0,
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    #[test]
    fn rejects_fast_not_below_slow() {
        let mut params = HashMap::new();
        params.insert("fast_period".to_string(), 30.0);
        params.insert("slow_period".to_string(), 10.0);
        assert!(SmaCrossoverStrategy::new(&params).is_err());
    }

    #[test]
    fn emits_buy_when_fast_average_overtakes_slow() {
        // Flat, then a strong ramp: the short average must overtake the
        // long one somewhere on the ramp.
        let mut closes = vec![100.0; 30];
        closes.extend((1..=30).map(|i| 100.0 + 2.0 * i as f64));
        let series = series_from_closes(&closes);

        let mut params = HashMap::new();
        params.insert("fast_period".to_string(), 5.0);
        params.insert("slow_period".to_string(), 15.0);
        let strategy = SmaCrossoverStrategy::new(&params).unwrap();

        let signals = strategy.generate_signals(&series);
        assert_eq!(signals.len(), series.len());
        assert!(signals
            .iter()
            .any(|signal| signal.action == SignalAction::Buy));
        // Warmup bars stay flat.
        for signal in &signals[..strategy.min_bars() - 1] {
            assert_eq!(signal.action, SignalAction::Hold);
        }
    }
}
