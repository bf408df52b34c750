use crate::errors::{EngineError, EngineResult};
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::{f64_param_in, require_below, usize_param};
use crate::series::PriceSeries;
use std::collections::HashMap;

pub struct RsiStrategy {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let period = usize_param(parameters, "period", 14)?;
        if period < 2 {
            return Err(EngineError::invalid_parameter(
                "period",
                format!("must be at least 2 (got {})", period),
            ));
        }
        let oversold = f64_param_in(parameters, "oversold", 30.0, 1.0, 99.0)?;
        let overbought = f64_param_in(parameters, "overbought", 70.0, 1.0, 99.0)?;
        require_below("oversold", oversold, "overbought", overbought)?;
        Ok(Self {
            period,
            oversold,
            overbought,
        })
    }
}

impl super::Strategy for RsiStrategy {
    fn id(&self) -> &'static str {
        "rsi"
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let closes = series.closes();
        let rsi_values = indicators::rsi(closes, self.period);

        let mut signals = Vec::with_capacity(closes.len());
        for i in 0..closes.len() {
            if i + 1 < self.min_bars() {
                signals.push(Signal::hold());
                continue;
            }
            let value = rsi_values[i];
            if value < self.oversold {
                // Deeper oversold reads as stronger conviction.
                let weight = (0.5 + (self.oversold - value) / self.oversold * 0.5).min(1.0);
                signals.push(Signal::buy().with_weight(weight));
            } else if value > self.overbought {
                let weight =
                    (0.5 + (value - self.overbought) / (100.0 - self.overbought) * 0.5).min(1.0);
                signals.push(Signal::sell().with_weight(weight));
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

    #[test]
    fn rejects_inverted_thresholds() {
        let mut params = HashMap::new();
        params.insert("oversold".to_string(), 70.0);
        params.insert("overbought".to_string(), 30.0);
        assert!(RsiStrategy::new(&params).is_err());
    }

    #[test]
    fn rejects_thresholds_outside_rsi_range() {
        let mut params = HashMap::new();
        params.insert("oversold".to_string(), -5.0);
        assert!(RsiStrategy::new(&params).is_err());

        let mut params = HashMap::new();
        params.insert("overbought".to_string(), 120.0);
        assert!(RsiStrategy::new(&params).is_err());
    }

    #[test]
    fn accepts_defaults() {
        let strategy = RsiStrategy::new(&HashMap::new()).unwrap();
        assert_eq!(strategy.period, 14);
        assert!((strategy.oversold - 30.0).abs() < 1e-9);
        assert!((strategy.overbought - 70.0).abs() < 1e-9);
    }
}
