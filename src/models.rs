use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::EngineError;

/// One daily OHLCV bar. Validation happens in `PriceSeries::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
    Exit,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Hold => "hold",
            SignalAction::Exit => "exit",
        }
    }
}

impl FromStr for SignalAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(SignalAction::Buy),
            "sell" => Ok(SignalAction::Sell),
            "hold" => Ok(SignalAction::Hold),
            "exit" => Ok(SignalAction::Exit),
            other => Err(EngineError::invalid_parameter(
                "signal_action",
                format!("unknown action '{}'", other),
            )),
        }
    }
}

/// Per-bar strategy output. `weight` is the target allocation fraction in
/// (0, 1] the backtester sizes the position with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    pub weight: f64,
}

impl Signal {
    pub fn buy() -> Self {
        Signal {
            action: SignalAction::Buy,
            weight: 1.0,
        }
    }

    pub fn sell() -> Self {
        Signal {
            action: SignalAction::Sell,
            weight: 1.0,
        }
    }

    pub fn hold() -> Self {
        Signal {
            action: SignalAction::Hold,
            weight: 1.0,
        }
    }

    pub fn exit() -> Self {
        Signal {
            action: SignalAction::Exit,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(f64::MIN_POSITIVE, 1.0);
        self
    }
}

/// Aligned 1:1 with the bars of the series the signals were generated from.
pub type SignalSeries = Vec<Signal>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Long => "long",
            TradeDirection::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResult {
    Win,
    Loss,
}

impl TradeResult {
    /// Breakeven trades count as losses; the commission was still paid.
    pub fn from_profit(profit: f64) -> Self {
        if profit > 0.0 {
            TradeResult::Win
        } else {
            TradeResult::Loss
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeResult::Win => "win",
            TradeResult::Loss => "loss",
        }
    }
}

/// A completed round trip. `profit` is net of both commission legs;
/// `profit_pct` is net profit relative to the entry notional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub direction: TradeDirection,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub commission_paid: f64,
    pub result: TradeResult,
}

/// Portfolio equity marked after every bar, with the commission-free
/// buy-and-hold baseline tracked in parallel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityCurve {
    pub dates: Vec<NaiveDate>,
    pub equity: Vec<f64>,
    pub buy_and_hold: Vec<f64>,
}

impl EquityCurve {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.equity.last().copied()
    }
}

/// Fixed metrics panel. Ratio-style values (returns, drawdown, win rate,
/// profitable days) are fractions, never 0-100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annual_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub num_trades: usize,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub percent_profitable_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub id: String,
    pub strategy: String,
    pub parameters: HashMap<String, f64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: EquityCurve,
    pub metrics: PerformanceMetrics,
}

/// One axis of an optimization grid: a parameter name and its candidate
/// values, in the order they should be enumerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterAxis {
    pub name: String,
    pub values: Vec<f64>,
}

/// Ordered grid axes. The cartesian product enumerates outer-to-inner in
/// axis order: the first axis varies slowest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub axes: Vec<ParameterAxis>,
}

impl ParameterGrid {
    pub fn new(axes: Vec<ParameterAxis>) -> Self {
        ParameterGrid { axes }
    }

    pub fn from_pairs(pairs: Vec<(String, Vec<f64>)>) -> Self {
        ParameterGrid {
            axes: pairs
                .into_iter()
                .map(|(name, values)| ParameterAxis { name, values })
                .collect(),
        }
    }

    /// Grid with no axes still yields one (empty) combination so that an
    /// optimization over defaults degenerates to a single run.
    pub fn combination_count(&self) -> usize {
        self.axes
            .iter()
            .map(|axis| axis.values.len())
            .product::<usize>()
    }

    /// Decode the combination at `index` (mixed radix, first axis slowest).
    pub fn combination(&self, index: usize) -> HashMap<String, f64> {
        let mut params = HashMap::with_capacity(self.axes.len());
        let mut remainder = index;
        let mut stride = self.combination_count();
        for axis in &self.axes {
            stride /= axis.values.len();
            let position = remainder / stride;
            remainder %= stride;
            params.insert(axis.name.clone(), axis.values[position]);
        }
        params
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for axis in &self.axes {
            if axis.values.is_empty() {
                return Err(EngineError::invalid_parameter(
                    axis.name.clone(),
                    "candidate value list is empty",
                ));
            }
            if axis.values.iter().any(|v| !v.is_finite()) {
                return Err(EngineError::invalid_parameter(
                    axis.name.clone(),
                    "candidate values must be finite",
                ));
            }
        }
        Ok(())
    }
}

/// One evaluated grid point. `score` is the polarity-adjusted ranking value
/// (higher is always better); `metric_value` is the raw metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationCandidate {
    pub rank: usize,
    pub parameters: HashMap<String, f64>,
    pub score: f64,
    pub metric_value: f64,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub id: String,
    pub strategy: String,
    pub metric: String,
    pub total_combinations: usize,
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// True when the run was cut short by cancellation or the time budget.
    pub partial: bool,
    pub elapsed_ms: u64,
    pub top: Vec<OptimizationCandidate>,
}

impl OptimizationOutcome {
    pub fn best_parameters(&self) -> Option<&HashMap<String, f64>> {
        self.top.first().map(|candidate| &candidate.parameters)
    }
}

/// One entry of a comparison request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy: String,
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
    #[serde(default)]
    pub param_ranges: Option<ParameterGrid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonOptimization {
    pub metric: String,
    pub best_parameters: HashMap<String, f64>,
    pub default_performance: PerformanceMetrics,
    pub optimized_performance: PerformanceMetrics,
    pub total_combinations: usize,
    pub evaluated: usize,
    pub skipped: usize,
}

/// Per-strategy slice of a comparison. `performance` is the headline panel:
/// the optimized run when optimization was requested, the plain run
/// otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub strategy: String,
    pub parameters: HashMap<String, f64>,
    pub performance: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub equity: Vec<f64>,
    pub optimization: Option<ComparisonOptimization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonFailure {
    pub strategy: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricWinner {
    pub metric: String,
    pub strategy: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonChart {
    pub dates: Vec<NaiveDate>,
    pub buy_and_hold: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub commission: f64,
    /// Successful entries in request order.
    pub entries: Vec<ComparisonEntry>,
    pub failures: Vec<ComparisonFailure>,
    pub best_strategies: Vec<MetricWinner>,
    pub chart: ComparisonChart,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_enumerates_outer_to_inner() {
        let grid = ParameterGrid::from_pairs(vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![10.0, 20.0, 30.0]),
        ]);
        assert_eq!(grid.combination_count(), 6);

        let first = grid.combination(0);
        assert_eq!(first["a"], 1.0);
        assert_eq!(first["b"], 10.0);

        // `b` is the inner axis so it varies fastest.
        let second = grid.combination(1);
        assert_eq!(second["a"], 1.0);
        assert_eq!(second["b"], 20.0);

        let fourth = grid.combination(3);
        assert_eq!(fourth["a"], 2.0);
        assert_eq!(fourth["b"], 10.0);

        let last = grid.combination(5);
        assert_eq!(last["a"], 2.0);
        assert_eq!(last["b"], 30.0);
    }

    #[test]
    fn empty_grid_yields_single_default_combination() {
        let grid = ParameterGrid::default();
        assert_eq!(grid.combination_count(), 1);
        assert!(grid.combination(0).is_empty());
    }

    #[test]
    fn grid_rejects_empty_axis() {
        let grid = ParameterGrid::from_pairs(vec![("period".to_string(), vec![])]);
        assert!(grid.validate().is_err());
    }

    #[test]
    fn signal_action_round_trips_through_str() {
        for action in [
            SignalAction::Buy,
            SignalAction::Sell,
            SignalAction::Hold,
            SignalAction::Exit,
        ] {
            let parsed: SignalAction = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
        assert!("flip".parse::<SignalAction>().is_err());
    }
}
