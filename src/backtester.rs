use chrono::NaiveDate;
use log::debug;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::models::{
    BacktestResult, EquityCurve, Signal, SignalAction, SignalSeries, Trade, TradeDirection,
    TradeResult,
};
use crate::performance::{Annualization, PerformanceCalculator};
use crate::series::PriceSeries;
use crate::strategy::{self, Strategy};

struct OpenPosition {
    direction: TradeDirection,
    entry_date: NaiveDate,
    entry_price: f64,
    quantity: f64,
    notional: f64,
    entry_commission: f64,
}

/// Single-position simulator: FLAT -> LONG/SHORT -> FLAT. Fills happen at
/// the signal bar's close, commission is charged on the notional of both
/// legs, and any position still open on the last bar of the window is
/// force-closed there.
pub struct Backtester {
    config: EngineConfig,
    annualization: Annualization,
}

impl Backtester {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            annualization: Annualization::default(),
        }
    }

    pub fn with_annualization(mut self, annualization: Annualization) -> Self {
        self.annualization = annualization;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run over an externally produced signal series. Signals must be
    /// aligned 1:1 with the full series; the window only restricts which
    /// bars are traded.
    pub fn run(
        &self,
        series: &PriceSeries,
        signals: &SignalSeries,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> EngineResult<BacktestResult> {
        if signals.len() != series.len() {
            return Err(EngineError::SignalMismatch {
                signals: signals.len(),
                bars: series.len(),
            });
        }
        let (start_index, end_index) = series.window(start, end)?;
        Ok(self.simulate(series, signals, start_index, end_index))
    }

    /// Registry facade: construct the strategy, check the window holds
    /// enough bars for its warmup, generate signals over the full series
    /// and simulate.
    pub fn run_strategy(
        &self,
        series: &PriceSeries,
        strategy_id: &str,
        parameters: &HashMap<String, f64>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> EngineResult<BacktestResult> {
        let strategy = strategy::create_strategy(strategy_id, parameters)?;
        self.run_prepared(series, strategy.as_ref(), parameters, start, end)
    }

    /// Same as `run_strategy` for an already constructed strategy. The grid
    /// search uses this to avoid a second registry lookup per combination.
    pub fn run_prepared(
        &self,
        series: &PriceSeries,
        strategy: &(dyn Strategy + Send + Sync),
        parameters: &HashMap<String, f64>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> EngineResult<BacktestResult> {
        let (start_index, end_index) = series.window(start, end)?;
        let available = end_index - start_index + 1;
        if available < strategy.min_bars() {
            return Err(EngineError::InsufficientData {
                required: strategy.min_bars(),
                available,
            });
        }

        let signals = strategy.generate_signals(series);
        let mut result = self.simulate(series, &signals, start_index, end_index);
        result.strategy = strategy.id().to_string();
        result.parameters = parameters.clone();
        Ok(result)
    }

    fn simulate(
        &self,
        series: &PriceSeries,
        signals: &[Signal],
        start_index: usize,
        end_index: usize,
    ) -> BacktestResult {
        let bars = series.bars();
        let first_close = bars[start_index].close;

        let mut cash = self.config.initial_capital;
        let mut position: Option<OpenPosition> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut curve = EquityCurve::default();

        for index in start_index..=end_index {
            let bar = &bars[index];
            let signal = &signals[index];

            let close_now = match (&position, signal.action) {
                (Some(_), SignalAction::Exit) => true,
                (Some(open), SignalAction::Buy) => open.direction == TradeDirection::Short,
                (Some(open), SignalAction::Sell) => open.direction == TradeDirection::Long,
                _ => false,
            };
            if close_now {
                if let Some(open) = position.take() {
                    trades.push(self.close_position(open, bar.date, bar.close, &mut cash));
                }
            } else if position.is_none() {
                match signal.action {
                    SignalAction::Buy => {
                        position = self.open_position(
                            TradeDirection::Long,
                            bar.date,
                            bar.close,
                            signal.weight,
                            &mut cash,
                        );
                    }
                    SignalAction::Sell if self.config.allow_short => {
                        position = self.open_position(
                            TradeDirection::Short,
                            bar.date,
                            bar.close,
                            signal.weight,
                            &mut cash,
                        );
                    }
                    _ => {}
                }
            }

            // Every opened position ends as a completed trade.
            if index == end_index {
                if let Some(open) = position.take() {
                    trades.push(self.close_position(open, bar.date, bar.close, &mut cash));
                }
            }

            let marked = match &position {
                None => cash,
                Some(open) => cash + Self::position_value(open, bar.close),
            };
            curve.dates.push(bar.date);
            curve.equity.push(marked);
            curve
                .buy_and_hold
                .push(self.config.initial_capital * bar.close / first_close);
        }

        let final_capital = curve.final_equity().unwrap_or(self.config.initial_capital);
        let metrics = PerformanceCalculator::calculate(
            &trades,
            self.config.initial_capital,
            &curve.equity,
            &curve.dates,
            self.annualization,
        );

        BacktestResult {
            id: Uuid::new_v4().to_string(),
            strategy: String::new(),
            parameters: HashMap::new(),
            start_date: bars[start_index].date,
            end_date: bars[end_index].date,
            initial_capital: self.config.initial_capital,
            final_capital,
            trades,
            equity_curve: curve,
            metrics,
        }
    }

    fn open_position(
        &self,
        direction: TradeDirection,
        date: NaiveDate,
        price: f64,
        weight: f64,
        cash: &mut f64,
    ) -> Option<OpenPosition> {
        // Sized so the entry commission is always payable from cash.
        let notional = *cash * weight.clamp(0.0, 1.0) / (1.0 + self.config.commission);
        if notional <= 0.0 {
            return None;
        }
        let quantity = notional / price;
        let entry_commission = notional * self.config.commission;
        *cash -= notional + entry_commission;

        debug!(
            "open {} {:.4} @ {} on {} (commission {:.4})",
            direction.as_str(),
            quantity,
            price,
            date,
            entry_commission
        );

        Some(OpenPosition {
            direction,
            entry_date: date,
            entry_price: price,
            quantity,
            notional,
            entry_commission,
        })
    }

    fn close_position(
        &self,
        open: OpenPosition,
        date: NaiveDate,
        price: f64,
        cash: &mut f64,
    ) -> Trade {
        let gross = match open.direction {
            TradeDirection::Long => (price - open.entry_price) * open.quantity,
            TradeDirection::Short => (open.entry_price - price) * open.quantity,
        };
        let exit_commission = price * open.quantity * self.config.commission;
        *cash += open.notional + gross - exit_commission;

        let commission_paid = open.entry_commission + exit_commission;
        let profit = gross - commission_paid;
        let profit_pct = if open.notional > 0.0 {
            profit / open.notional
        } else {
            0.0
        };

        debug!(
            "close {} @ {} on {} (net {:.4})",
            open.direction.as_str(),
            price,
            date,
            profit
        );

        Trade {
            direction: open.direction,
            entry_date: open.entry_date,
            exit_date: date,
            entry_price: open.entry_price,
            exit_price: price,
            quantity: open.quantity,
            profit,
            profit_pct,
            commission_paid,
            result: TradeResult::from_profit(profit),
        }
    }

    fn position_value(open: &OpenPosition, close: f64) -> f64 {
        match open.direction {
            TradeDirection::Long => open.quantity * close,
            TradeDirection::Short => open.notional + (open.entry_price - close) * open.quantity,
        }
    }
}
