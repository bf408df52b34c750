use crate::errors::{EngineError, EngineResult};
use crate::indicators;
use crate::models::{Signal, SignalSeries};
use crate::params::{f64_param, positive_f64_param, require_below, usize_param};
use crate::series::PriceSeries;
use std::collections::HashMap;

/// Fades stretched moves: enters against the move once the close is more
/// than `entry_z` standard deviations from the rolling mean, exits once it
/// reverts to within `exit_z`.
pub struct MeanReversionStrategy {
    period: usize,
    entry_z: f64,
    exit_z: f64,
}

impl MeanReversionStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> EngineResult<Self> {
        let period = usize_param(parameters, "period", 20)?;
        if period < 2 {
            return Err(EngineError::invalid_parameter(
                "period",
                format!("must be at least 2 (got {})", period),
            ));
        }
        let entry_z = positive_f64_param(parameters, "entry_z", 2.0)?;
        let exit_z = f64_param(parameters, "exit_z", 0.5)?;
        if exit_z < 0.0 {
            return Err(EngineError::invalid_parameter(
                "exit_z",
                format!("must be non-negative (got {})", exit_z),
            ));
        }
        require_below("exit_z", exit_z, "entry_z", entry_z)?;
        Ok(Self {
            period,
            entry_z,
            exit_z,
        })
    }
}

impl super::Strategy for MeanReversionStrategy {
    fn id(&self) -> &'static str {
        "mean_reversion"
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries {
        let closes = series.closes();
        let z_values = indicators::zscore(closes, self.period);

        let mut signals = Vec::with_capacity(closes.len());
        for i in 0..closes.len() {
            if i + 1 < self.min_bars() {
                signals.push(Signal::hold());
                continue;
            }
            let z = z_values[i];
            if z <= -self.entry_z {
                signals.push(Signal::buy());
            } else if z >= self.entry_z {
                signals.push(Signal::sell());
            } else if z.abs() <= self.exit_z {
                signals.push(Signal::exit());
            } else {
                signals.push(Signal::hold());
            }
        }
        signals
    }
}
