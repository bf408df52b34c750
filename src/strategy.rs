use std::collections::HashMap;

use crate::errors::{EngineError, EngineResult};
use crate::models::{ParameterGrid, SignalSeries};
use crate::series::PriceSeries;

/// A parameterized signal generator. Implementations are pure: the same
/// series and parameters always produce the same signals, and the signal
/// for bar `i` only depends on bars `0..=i` (all indicator math is
/// trailing-window).
pub trait Strategy {
    fn id(&self) -> &'static str;

    /// Bars required before the strategy emits anything but `Hold`.
    fn min_bars(&self) -> usize;

    /// One signal per bar, aligned with `series.bars()`.
    fn generate_signals(&self, series: &PriceSeries) -> SignalSeries;
}

impl std::fmt::Debug for dyn Strategy + Send + Sync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("id", &self.id()).finish()
    }
}

/// `a` crossing above `b` on bar `i`.
pub(crate) fn crossed_above(a: &[f64], b: &[f64], i: usize) -> bool {
    i > 0 && a[i] > b[i] && a[i - 1] <= b[i - 1]
}

/// `a` crossing below `b` on bar `i`.
pub(crate) fn crossed_below(a: &[f64], b: &[f64], i: usize) -> bool {
    i > 0 && a[i] < b[i] && a[i - 1] >= b[i - 1]
}

#[path = "strategies/sma_crossover.rs"]
pub mod sma_crossover;

pub use sma_crossover::SmaCrossoverStrategy;

#[path = "strategies/ema_crossover.rs"]
pub mod ema_crossover;

pub use ema_crossover::EmaCrossoverStrategy;

#[path = "strategies/macd_crossover.rs"]
pub mod macd_crossover;

pub use macd_crossover::MacdCrossoverStrategy;

#[path = "strategies/rsi.rs"]
pub mod rsi;

pub use rsi::RsiStrategy;

#[path = "strategies/bollinger_breakout.rs"]
pub mod bollinger_breakout;

pub use bollinger_breakout::BollingerBreakoutStrategy;

#[path = "strategies/breakout.rs"]
pub mod breakout;

pub use breakout::BreakoutStrategy;

#[path = "strategies/trend_following.rs"]
pub mod trend_following;

pub use trend_following::TrendFollowingStrategy;

#[path = "strategies/mean_reversion.rs"]
pub mod mean_reversion;

pub use mean_reversion::MeanReversionStrategy;

#[path = "strategies/supertrend.rs"]
pub mod supertrend;

pub use supertrend::SuperTrendStrategy;

#[path = "strategies/stochastic.rs"]
pub mod stochastic;

pub use stochastic::StochasticStrategy;

/// Catalog entry: identity, defaults and the grid used when an optimization
/// request does not bring its own ranges.
pub struct StrategyInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub defaults: &'static [(&'static str, f64)],
    pub default_grid: &'static [(&'static str, &'static [f64])],
}

pub const CATALOG: &[StrategyInfo] = &[
    StrategyInfo {
        id: "sma_crossover",
        label: "SMA Crossover",
        defaults: &[("fast_period", 10.0), ("slow_period", 30.0)],
        default_grid: &[
            ("fast_period", &[5.0, 10.0, 20.0]),
            ("slow_period", &[30.0, 50.0, 100.0]),
        ],
    },
    StrategyInfo {
        id: "ema_crossover",
        label: "EMA Crossover",
        defaults: &[("fast_period", 12.0), ("slow_period", 26.0)],
        default_grid: &[
            ("fast_period", &[8.0, 12.0, 20.0]),
            ("slow_period", &[26.0, 40.0, 60.0]),
        ],
    },
    StrategyInfo {
        id: "macd_crossover",
        label: "MACD Crossover",
        defaults: &[
            ("fast_period", 12.0),
            ("slow_period", 26.0),
            ("signal_period", 9.0),
        ],
        default_grid: &[
            ("fast_period", &[8.0, 12.0]),
            ("slow_period", &[21.0, 26.0]),
            ("signal_period", &[7.0, 9.0]),
        ],
    },
    StrategyInfo {
        id: "rsi",
        label: "RSI Reversal",
        defaults: &[("period", 14.0), ("oversold", 30.0), ("overbought", 70.0)],
        default_grid: &[
            ("period", &[7.0, 14.0, 21.0]),
            ("oversold", &[20.0, 30.0]),
            ("overbought", &[70.0, 80.0]),
        ],
    },
    StrategyInfo {
        id: "bollinger_breakout",
        label: "Bollinger Breakout",
        defaults: &[("period", 20.0), ("width", 2.0)],
        default_grid: &[("period", &[10.0, 20.0, 30.0]), ("width", &[1.5, 2.0, 2.5])],
    },
    StrategyInfo {
        id: "breakout",
        label: "Channel Breakout",
        defaults: &[("period", 20.0)],
        default_grid: &[("period", &[10.0, 20.0, 40.0, 55.0])],
    },
    StrategyInfo {
        id: "trend_following",
        label: "Trend Following",
        defaults: &[("period", 50.0), ("threshold", 0.02)],
        default_grid: &[
            ("period", &[30.0, 50.0, 100.0]),
            ("threshold", &[0.01, 0.02, 0.04]),
        ],
    },
    StrategyInfo {
        id: "mean_reversion",
        label: "Mean Reversion",
        defaults: &[("period", 20.0), ("entry_z", 2.0), ("exit_z", 0.5)],
        default_grid: &[
            ("period", &[10.0, 20.0, 30.0]),
            ("entry_z", &[1.5, 2.0, 2.5]),
            ("exit_z", &[0.25, 0.5]),
        ],
    },
    StrategyInfo {
        id: "supertrend",
        label: "SuperTrend",
        defaults: &[("period", 10.0), ("multiplier", 3.0)],
        default_grid: &[
            ("period", &[7.0, 10.0, 14.0]),
            ("multiplier", &[2.0, 3.0, 4.0]),
        ],
    },
    StrategyInfo {
        id: "stochastic",
        label: "Stochastic Oscillator",
        defaults: &[
            ("k_period", 14.0),
            ("d_period", 3.0),
            ("oversold", 20.0),
            ("overbought", 80.0),
        ],
        default_grid: &[
            ("k_period", &[9.0, 14.0, 21.0]),
            ("d_period", &[3.0, 5.0]),
            ("oversold", &[20.0, 30.0]),
            ("overbought", &[70.0, 80.0]),
        ],
    },
];

pub fn strategy_info(id: &str) -> EngineResult<&'static StrategyInfo> {
    CATALOG
        .iter()
        .find(|info| info.id == id)
        .ok_or_else(|| EngineError::UnknownStrategy {
            id: id.to_string(),
            valid: valid_ids().join(", "),
        })
}

pub fn valid_ids() -> Vec<&'static str> {
    CATALOG.iter().map(|info| info.id).collect()
}

pub fn default_parameters(id: &str) -> EngineResult<HashMap<String, f64>> {
    let info = strategy_info(id)?;
    Ok(info
        .defaults
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect())
}

pub fn default_grid(id: &str) -> EngineResult<ParameterGrid> {
    let info = strategy_info(id)?;
    Ok(ParameterGrid::from_pairs(
        info.default_grid
            .iter()
            .map(|(name, values)| (name.to_string(), values.to_vec()))
            .collect(),
    ))
}

pub fn create_strategy(
    id: &str,
    parameters: &HashMap<String, f64>,
) -> EngineResult<Box<dyn Strategy + Send + Sync>> {
    match id {
        "sma_crossover" => Ok(Box::new(SmaCrossoverStrategy::new(parameters)?)),
        "ema_crossover" => Ok(Box::new(EmaCrossoverStrategy::new(parameters)?)),
        "macd_crossover" => Ok(Box::new(MacdCrossoverStrategy::new(parameters)?)),
        "rsi" => Ok(Box::new(RsiStrategy::new(parameters)?)),
        "bollinger_breakout" => Ok(Box::new(BollingerBreakoutStrategy::new(parameters)?)),
        "breakout" => Ok(Box::new(BreakoutStrategy::new(parameters)?)),
        "trend_following" => Ok(Box::new(TrendFollowingStrategy::new(parameters)?)),
        "mean_reversion" => Ok(Box::new(MeanReversionStrategy::new(parameters)?)),
        "supertrend" => Ok(Box::new(SuperTrendStrategy::new(parameters)?)),
        "stochastic" => Ok(Box::new(StochasticStrategy::new(parameters)?)),
        other => Err(EngineError::UnknownStrategy {
            id: other.to_string(),
            valid: valid_ids().join(", "),
        }),
    }
}
