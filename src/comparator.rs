use chrono::NaiveDate;
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

use crate::backtester::Backtester;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::errors::{EngineError, EngineResult};
use crate::models::{
    ComparisonChart, ComparisonEntry, ComparisonFailure, ComparisonOptimization, ComparisonResult,
    MetricWinner, StrategyConfig,
};
use crate::optimizer::Optimizer;
use crate::performance::Metric;
use crate::series::PriceSeries;
use crate::strategy;

/// Runs several strategies over the same window and ranks them. Strategies
/// are independent, so they fan out across the rayon pool; results come
/// back in request order.
pub struct Comparator {
    config: EngineConfig,
    settings: RuntimeSettings,
}

impl Comparator {
    pub fn new(config: EngineConfig, settings: RuntimeSettings) -> Self {
        Self { config, settings }
    }

    pub fn compare(
        &self,
        series: &PriceSeries,
        configs: &[StrategyConfig],
        optimize: bool,
        metric: Metric,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> EngineResult<ComparisonResult> {
        if configs.is_empty() {
            return Err(EngineError::invalid_parameter(
                "strategies",
                "at least one strategy configuration is required",
            ));
        }

        let (start_index, end_index) = series.window(start, end)?;
        let chart = self.build_chart(series, start_index, end_index);

        info!(
            "Comparing {} strategies over {} bars{}",
            configs.len(),
            end_index - start_index + 1,
            if optimize {
                format!(" with grid optimization by {}", metric)
            } else {
                String::new()
            }
        );

        let mut seen = HashSet::new();
        let duplicate: Vec<bool> = configs
            .iter()
            .map(|config| !seen.insert(config.strategy.clone()))
            .collect();

        let evaluations: Vec<EngineResult<ComparisonEntry>> = configs
            .par_iter()
            .zip(duplicate.par_iter())
            .map(|(config, &is_duplicate)| {
                if is_duplicate {
                    return Err(EngineError::invalid_parameter(
                        "strategy",
                        format!("duplicate strategy id {}", config.strategy),
                    ));
                }
                self.evaluate_config(series, config, optimize, metric, start, end)
            })
            .collect();

        let mut entries = Vec::new();
        let mut failures = Vec::new();
        for (config, evaluation) in configs.iter().zip(evaluations) {
            match evaluation {
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    warn!("Strategy {} failed: {}", config.strategy, error);
                    failures.push(ComparisonFailure {
                        strategy: config.strategy.clone(),
                        kind: error.kind().to_string(),
                        message: error.to_string(),
                    });
                }
            }
        }

        if entries.is_empty() {
            return Err(EngineError::AllStrategiesFailed {
                failures: failures
                    .into_iter()
                    .map(|failure| (failure.strategy, failure.message))
                    .collect(),
            });
        }

        let best_strategies = pick_best_strategies(&entries);

        Ok(ComparisonResult {
            id: Uuid::new_v4().to_string(),
            start_date: series.dates()[start_index],
            end_date: series.dates()[end_index],
            initial_capital: self.config.initial_capital,
            commission: self.config.commission,
            entries,
            failures,
            best_strategies,
            chart,
        })
    }

    fn evaluate_config(
        &self,
        series: &PriceSeries,
        config: &StrategyConfig,
        optimize: bool,
        metric: Metric,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> EngineResult<ComparisonEntry> {
        let backtester =
            Backtester::new(self.config.clone()).with_annualization(self.settings.annualization());
        let default_result =
            backtester.run_strategy(series, &config.strategy, &config.parameters, start, end)?;

        if !optimize {
            return Ok(ComparisonEntry {
                strategy: config.strategy.clone(),
                parameters: config.parameters.clone(),
                performance: default_result.metrics,
                trades: default_result.trades,
                equity: default_result.equity_curve.equity,
                optimization: None,
            });
        }

        let grid = match &config.param_ranges {
            Some(grid) => grid.clone(),
            None => strategy::default_grid(&config.strategy)?,
        };

        // The outer fan-out already saturates the cores.
        let mut nested_settings = self.settings.clone();
        nested_settings.worker_threads = 1;
        let optimizer =
            Optimizer::new(self.config.clone(), nested_settings).with_progress(false);

        let outcome = match optimizer.optimize(series, &config.strategy, &grid, metric, start, end)
        {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    "Grid search failed for {} ({}); keeping the default parameters",
                    config.strategy, error
                );
                return Ok(ComparisonEntry {
                    strategy: config.strategy.clone(),
                    parameters: config.parameters.clone(),
                    performance: default_result.metrics,
                    trades: default_result.trades,
                    equity: default_result.equity_curve.equity,
                    optimization: None,
                });
            }
        };

        let Some(best_parameters) = outcome.best_parameters().cloned() else {
            warn!(
                "Grid search for {} produced no candidates; keeping the default parameters",
                config.strategy
            );
            return Ok(ComparisonEntry {
                strategy: config.strategy.clone(),
                parameters: config.parameters.clone(),
                performance: default_result.metrics,
                trades: default_result.trades,
                equity: default_result.equity_curve.equity,
                optimization: None,
            });
        };

        let optimized_result =
            backtester.run_strategy(series, &config.strategy, &best_parameters, start, end)?;

        Ok(ComparisonEntry {
            strategy: config.strategy.clone(),
            parameters: best_parameters.clone(),
            performance: optimized_result.metrics.clone(),
            trades: optimized_result.trades,
            equity: optimized_result.equity_curve.equity,
            optimization: Some(ComparisonOptimization {
                metric: metric.to_string(),
                best_parameters,
                default_performance: default_result.metrics,
                optimized_performance: optimized_result.metrics,
                total_combinations: outcome.total_combinations,
                evaluated: outcome.evaluated,
                skipped: outcome.skipped,
            }),
        })
    }

    fn build_chart(
        &self,
        series: &PriceSeries,
        start_index: usize,
        end_index: usize,
    ) -> ComparisonChart {
        let closes = series.closes();
        let first_close = closes[start_index];
        ComparisonChart {
            dates: series.dates()[start_index..=end_index].to_vec(),
            buy_and_hold: closes[start_index..=end_index]
                .iter()
                .map(|close| self.config.initial_capital * close / first_close)
                .collect(),
        }
    }
}

/// Winner per metric across the headline panels. NaN values never win;
/// ties go to the earliest entry.
fn pick_best_strategies(entries: &[ComparisonEntry]) -> Vec<MetricWinner> {
    let mut winners = Vec::new();
    for metric in Metric::ALL {
        let mut best: Option<(&ComparisonEntry, f64)> = None;
        for entry in entries {
            let value = metric.value(&entry.performance);
            if value.is_nan() {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, best_value)) => {
                    if metric.lower_is_better() {
                        value < *best_value
                    } else {
                        value > *best_value
                    }
                }
            };
            if better {
                best = Some((entry, value));
            }
        }
        if let Some((entry, value)) = best {
            winners.push(MetricWinner {
                metric: metric.to_string(),
                strategy: entry.strategy.clone(),
                value,
            });
        }
    }
    winners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, PerformanceMetrics};
    use std::collections::HashMap;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap() + chrono::Duration::days(n as i64 - 1)
    }

    fn wavy_series(len: usize) -> PriceSeries {
        let bars: Vec<Bar> = (0..len)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.2).sin() * 10.0 + i as f64 * 0.08;
                Bar {
                    date: day(i as u32 + 1),
                    open: close,
                    high: close * 1.02,
                    low: close * 0.98,
                    close,
                    volume: 8_000.0,
                }
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    fn config_for(id: &str) -> StrategyConfig {
        StrategyConfig {
            strategy: id.to_string(),
            parameters: HashMap::new(),
            param_ranges: None,
        }
    }

    fn comparator() -> Comparator {
        Comparator::new(EngineConfig::default(), RuntimeSettings::default())
    }

    #[test]
    fn entries_come_back_in_request_order() {
        let series = wavy_series(200);
        let configs = vec![
            config_for("sma_crossover"),
            config_for("rsi"),
            config_for("breakout"),
        ];
        let result = comparator()
            .compare(&series, &configs, false, Metric::SharpeRatio, None, None)
            .unwrap();

        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.entries[0].strategy, "sma_crossover");
        assert_eq!(result.entries[1].strategy, "rsi");
        assert_eq!(result.entries[2].strategy, "breakout");
        assert!(result.failures.is_empty());
        assert_eq!(result.chart.dates.len(), 200);
        assert_eq!(result.entries[0].equity.len(), 200);
        assert!(!result.best_strategies.is_empty());
        for winner in &result.best_strategies {
            assert!(configs.iter().any(|c| c.strategy == winner.strategy));
        }
    }

    #[test]
    fn duplicate_strategy_ids_are_rejected_individually() {
        let series = wavy_series(160);
        let configs = vec![
            config_for("sma_crossover"),
            config_for("sma_crossover"),
            config_for("rsi"),
        ];
        let result = comparator()
            .compare(&series, &configs, false, Metric::SharpeRatio, None, None)
            .unwrap();

        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].strategy, "sma_crossover");
        assert_eq!(result.failures[0].kind, "invalid_parameter");
    }

    #[test]
    fn one_bad_config_does_not_sink_the_rest() {
        let series = wavy_series(160);
        let mut bad = config_for("sma_crossover");
        bad.parameters.insert("fast_period".to_string(), 50.0);
        bad.parameters.insert("slow_period".to_string(), 10.0);
        let configs = vec![bad, config_for("rsi")];
        let result = comparator()
            .compare(&series, &configs, false, Metric::SharpeRatio, None, None)
            .unwrap();

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].strategy, "rsi");
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].kind, "invalid_parameter");
    }

    #[test]
    fn nothing_but_failures_is_an_error() {
        let series = wavy_series(160);
        let configs = vec![config_for("nope"), config_for("also_nope")];
        let err = comparator()
            .compare(&series, &configs, false, Metric::SharpeRatio, None, None)
            .unwrap_err();
        match err {
            EngineError::AllStrategiesFailed { failures } => {
                assert_eq!(failures.len(), 2);
            }
            other => panic!("expected AllStrategiesFailed, got {}", other),
        }
    }

    #[test]
    fn empty_request_is_rejected() {
        let series = wavy_series(60);
        let err = comparator()
            .compare(&series, &[], false, Metric::SharpeRatio, None, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[test]
    fn optimization_records_both_panels() {
        let series = wavy_series(220);
        let configs = vec![config_for("sma_crossover")];
        let result = comparator()
            .compare(&series, &configs, true, Metric::TotalReturn, None, None)
            .unwrap();

        let entry = &result.entries[0];
        let optimization = entry.optimization.as_ref().expect("optimization block");
        assert_eq!(optimization.metric, "total_return");
        assert!(optimization.total_combinations > 1);
        assert!(optimization.evaluated > 0);
        assert_eq!(entry.parameters, optimization.best_parameters);
        assert_eq!(entry.performance, optimization.optimized_performance);
        // The headline panel is the optimized run, defaults stay recorded.
        assert!(optimization.best_parameters.contains_key("fast_period"));
    }

    #[test]
    fn winners_respect_metric_polarity() {
        fn entry(id: &str, total_return: f64, max_drawdown: f64) -> ComparisonEntry {
            ComparisonEntry {
                strategy: id.to_string(),
                parameters: HashMap::new(),
                performance: PerformanceMetrics {
                    total_return,
                    max_drawdown,
                    ..PerformanceMetrics::default()
                },
                trades: Vec::new(),
                equity: Vec::new(),
                optimization: None,
            }
        }

        let entries = vec![entry("a", 0.30, 0.20), entry("b", 0.10, 0.05)];
        let winners = pick_best_strategies(&entries);

        let by_metric: HashMap<_, _> = winners
            .iter()
            .map(|w| (w.metric.as_str(), w.strategy.as_str()))
            .collect();
        assert_eq!(by_metric["total_return"], "a");
        assert_eq!(by_metric["max_drawdown"], "b");
    }

    #[test]
    fn nan_values_never_win_and_ties_go_first() {
        fn entry(id: &str, sharpe: f64) -> ComparisonEntry {
            ComparisonEntry {
                strategy: id.to_string(),
                parameters: HashMap::new(),
                performance: PerformanceMetrics {
                    sharpe_ratio: sharpe,
                    ..PerformanceMetrics::default()
                },
                trades: Vec::new(),
                equity: Vec::new(),
                optimization: None,
            }
        }

        let entries = vec![entry("a", f64::NAN), entry("b", 1.0), entry("c", 1.0)];
        let winners = pick_best_strategies(&entries);
        let sharpe_winner = winners
            .iter()
            .find(|w| w.metric == "sharpe_ratio")
            .expect("sharpe winner");
        assert_eq!(sharpe_winner.strategy, "b");
    }
}
