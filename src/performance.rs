use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use std::str::FromStr;

use crate::errors::{EngineError, EngineResult};
use crate::models::{PerformanceMetrics, Trade};

/// Annualization inputs for the ratio metrics.
#[derive(Debug, Clone, Copy)]
pub struct Annualization {
    pub trading_days: f64,
    pub risk_free_rate: f64,
}

impl Default for Annualization {
    fn default() -> Self {
        Annualization {
            trading_days: 252.0,
            risk_free_rate: 0.02,
        }
    }
}

/// Every metric in the panel, addressable by its wire name. Grid searches
/// rank by one of these; comparisons pick a winner per metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TotalReturn,
    AnnualReturn,
    SharpeRatio,
    SortinoRatio,
    CalmarRatio,
    MaxDrawdown,
    WinRate,
    ProfitFactor,
    NumTrades,
    MaxConsecutiveWins,
    MaxConsecutiveLosses,
    PercentProfitableDays,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::TotalReturn,
        Metric::AnnualReturn,
        Metric::SharpeRatio,
        Metric::SortinoRatio,
        Metric::CalmarRatio,
        Metric::MaxDrawdown,
        Metric::WinRate,
        Metric::ProfitFactor,
        Metric::NumTrades,
        Metric::MaxConsecutiveWins,
        Metric::MaxConsecutiveLosses,
        Metric::PercentProfitableDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TotalReturn => "total_return",
            Metric::AnnualReturn => "annual_return",
            Metric::SharpeRatio => "sharpe_ratio",
            Metric::SortinoRatio => "sortino_ratio",
            Metric::CalmarRatio => "calmar_ratio",
            Metric::MaxDrawdown => "max_drawdown",
            Metric::WinRate => "win_rate",
            Metric::ProfitFactor => "profit_factor",
            Metric::NumTrades => "num_trades",
            Metric::MaxConsecutiveWins => "max_consecutive_wins",
            Metric::MaxConsecutiveLosses => "max_consecutive_losses",
            Metric::PercentProfitableDays => "percent_profitable_days",
        }
    }

    pub fn value(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Metric::TotalReturn => metrics.total_return,
            Metric::AnnualReturn => metrics.annual_return,
            Metric::SharpeRatio => metrics.sharpe_ratio,
            Metric::SortinoRatio => metrics.sortino_ratio,
            Metric::CalmarRatio => metrics.calmar_ratio,
            Metric::MaxDrawdown => metrics.max_drawdown,
            Metric::WinRate => metrics.win_rate,
            Metric::ProfitFactor => metrics.profit_factor,
            Metric::NumTrades => metrics.num_trades as f64,
            Metric::MaxConsecutiveWins => metrics.max_consecutive_wins as f64,
            Metric::MaxConsecutiveLosses => metrics.max_consecutive_losses as f64,
            Metric::PercentProfitableDays => metrics.percent_profitable_days,
        }
    }

    /// Drawdown and loss streaks rank inverted: smaller is the win.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, Metric::MaxDrawdown | Metric::MaxConsecutiveLosses)
    }

    /// Orientation-corrected score for descending sorts. NaN ranks last so
    /// a degenerate run never beats a real one.
    pub fn ranking_score(&self, metrics: &PerformanceMetrics) -> f64 {
        let raw = self.value(metrics);
        if raw.is_nan() {
            return f64::NEG_INFINITY;
        }
        if self.lower_is_better() {
            -raw
        } else {
            raw
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let normalized = s.trim().to_lowercase();
        Metric::ALL
            .iter()
            .copied()
            .find(|metric| metric.as_str() == normalized)
            .ok_or_else(|| EngineError::UnknownMetric {
                name: s.to_string(),
            })
    }
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Build the full metrics panel from completed trades and the per-bar
    /// equity curve. All percentage-style outputs are fractions.
    pub fn calculate(
        trades: &[Trade],
        initial_capital: f64,
        equity: &[f64],
        dates: &[NaiveDate],
        annualization: Annualization,
    ) -> PerformanceMetrics {
        let final_equity = equity.last().copied().unwrap_or(initial_capital);
        let total_return = if initial_capital > 0.0 && final_equity.is_finite() {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let annual_return = Self::calculate_cagr(initial_capital, final_equity, dates);
        let returns = Self::daily_returns(equity);
        let sharpe_ratio = Self::calculate_sharpe_ratio(&returns, annualization);
        let sortino_ratio = Self::calculate_sortino_ratio(&returns, annualization);
        let max_drawdown = Self::calculate_max_drawdown(equity);
        let calmar_ratio = Self::calculate_calmar_ratio(annual_return, max_drawdown);

        let num_trades = trades.len();
        let winning = trades.iter().filter(|t| t.profit > 0.0).count();
        let win_rate = if num_trades > 0 {
            winning as f64 / num_trades as f64
        } else {
            0.0
        };

        let profit_factor = Self::calculate_profit_factor(trades);
        let (max_consecutive_wins, max_consecutive_losses) = Self::calculate_streaks(trades);

        let profitable_days = returns.iter().filter(|r| **r > 0.0).count();
        let percent_profitable_days = if returns.is_empty() {
            0.0
        } else {
            profitable_days as f64 / returns.len() as f64
        };

        PerformanceMetrics {
            total_return,
            annual_return,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown,
            win_rate,
            profit_factor,
            num_trades,
            max_consecutive_wins,
            max_consecutive_losses,
            percent_profitable_days,
        }
    }

    fn daily_returns(equity: &[f64]) -> Vec<f64> {
        if equity.len() < 2 {
            return Vec::new();
        }
        equity
            .windows(2)
            .map(|window| {
                if window[0] > 0.0 {
                    (window[1] - window[0]) / window[0]
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn calculate_cagr(initial_capital: f64, final_equity: f64, dates: &[NaiveDate]) -> f64 {
        if initial_capital <= 0.0 || !final_equity.is_finite() || dates.len() < 2 {
            return 0.0;
        }
        let start = dates[0];
        let end = dates[dates.len() - 1];
        let years = (end - start).num_days() as f64 / 365.25;
        if years <= 0.0 {
            return 0.0;
        }

        let ratio = final_equity / initial_capital;
        if ratio <= 0.0 {
            return -1.0;
        }
        ratio.powf(1.0 / years) - 1.0
    }

    fn calculate_sharpe_ratio(returns: &[f64], annualization: Annualization) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }

        let data = returns.to_vec();
        let mean_return = data.clone().mean();
        let std_dev = data.std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }

        let annualized_return = mean_return * annualization.trading_days;
        let annualized_volatility = std_dev * annualization.trading_days.sqrt();
        (annualized_return - annualization.risk_free_rate) / annualized_volatility
    }

    fn calculate_sortino_ratio(returns: &[f64], annualization: Annualization) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }

        let mean_return = returns.to_vec().mean();
        let annualized_excess =
            mean_return * annualization.trading_days - annualization.risk_free_rate;

        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        if downside.is_empty() {
            // Nothing but flat or up days.
            return if annualized_excess > 0.0 {
                f64::INFINITY
            } else {
                0.0
            };
        }

        let downside_variance =
            downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64;
        let downside_dev = downside_variance.sqrt();
        if downside_dev == 0.0 {
            return 0.0;
        }

        annualized_excess / (downside_dev * annualization.trading_days.sqrt())
    }

    fn calculate_calmar_ratio(annual_return: f64, max_drawdown: f64) -> f64 {
        if !annual_return.is_finite() || !max_drawdown.is_finite() {
            return 0.0;
        }
        if max_drawdown.abs() <= f64::EPSILON {
            return 0.0;
        }
        annual_return / max_drawdown
    }

    /// Largest peak-to-trough decline as a positive fraction of the peak.
    fn calculate_max_drawdown(equity: &[f64]) -> f64 {
        if equity.is_empty() {
            return 0.0;
        }

        let mut max_drawdown = 0.0f64;
        let mut peak = equity[0];
        for &value in equity {
            if value > peak {
                peak = value;
            } else if peak > 0.0 {
                let drawdown = (peak - value) / peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }
        max_drawdown
    }

    fn calculate_profit_factor(trades: &[Trade]) -> f64 {
        let gross_profit: f64 = trades.iter().filter(|t| t.profit > 0.0).map(|t| t.profit).sum();
        let gross_loss: f64 = trades.iter().filter(|t| t.profit < 0.0).map(|t| t.profit).sum();

        if gross_loss.abs() > 0.0 {
            gross_profit / gross_loss.abs()
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn calculate_streaks(trades: &[Trade]) -> (usize, usize) {
        let mut max_wins = 0usize;
        let mut max_losses = 0usize;
        let mut wins = 0usize;
        let mut losses = 0usize;

        for trade in trades {
            if trade.profit > 0.0 {
                wins += 1;
                losses = 0;
            } else if trade.profit < 0.0 {
                losses += 1;
                wins = 0;
            } else {
                wins = 0;
                losses = 0;
            }
            max_wins = max_wins.max(wins);
            max_losses = max_losses.max(losses);
        }

        (max_wins, max_losses)
    }
}
