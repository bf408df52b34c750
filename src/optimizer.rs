use chrono::NaiveDate;
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::backtester::Backtester;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::errors::{EngineError, EngineResult};
use crate::models::{OptimizationCandidate, OptimizationOutcome, ParameterGrid, PerformanceMetrics};
use crate::performance::Metric;
use crate::series::PriceSeries;
use crate::strategy;

/// Stable identity for a parameter combination, independent of map order.
pub(crate) fn parameter_signature(parameters: &HashMap<String, f64>) -> String {
    let mut sorted: Vec<_> = parameters.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    format!("{:?}", sorted)
}

/// Snapshot pushed to observers as combinations complete.
#[derive(Debug, Clone, Copy)]
pub struct SearchProgress {
    pub total: usize,
    pub completed: usize,
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub best_score: Option<f64>,
}

/// Progress and cancellation hooks for a running grid search. The
/// background job layer implements this; direct callers get the default
/// no-op behavior.
pub trait SearchObserver: Send + Sync {
    fn on_progress(&self, _progress: &SearchProgress) {}

    fn cancel_requested(&self) -> bool {
        false
    }
}

struct NoObserver;

impl SearchObserver for NoObserver {}

struct ComboTask {
    index: usize,
    parameters: HashMap<String, f64>,
}

enum ComboOutcome {
    Evaluated {
        index: usize,
        parameters: HashMap<String, f64>,
        score: f64,
        metric_value: f64,
        metrics: PerformanceMetrics,
    },
    Skipped,
    Failed {
        error: String,
    },
    Cancelled,
}

/// Exhaustive grid search over a strategy's parameter space, fanned out to
/// a bounded worker pool. Combinations are enumerated in axis order, so
/// ties resolve to the earliest combination regardless of which worker
/// finished first.
pub struct Optimizer {
    config: EngineConfig,
    settings: RuntimeSettings,
    show_progress: bool,
}

impl Optimizer {
    pub fn new(config: EngineConfig, settings: RuntimeSettings) -> Self {
        Self {
            config,
            settings,
            show_progress: true,
        }
    }

    /// Suppress the console progress bar, for searches nested inside other
    /// parallel work.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn optimize(
        &self,
        series: &PriceSeries,
        strategy_id: &str,
        grid: &ParameterGrid,
        metric: Metric,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> EngineResult<OptimizationOutcome> {
        self.optimize_observed(series, strategy_id, grid, metric, start, end, &NoObserver)
    }

    pub fn optimize_observed(
        &self,
        series: &PriceSeries,
        strategy_id: &str,
        grid: &ParameterGrid,
        metric: Metric,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        observer: &dyn SearchObserver,
    ) -> EngineResult<OptimizationOutcome> {
        strategy::strategy_info(strategy_id)?;
        grid.validate()?;
        series.window(start, end)?;

        let started = Instant::now();
        let deadline = self
            .settings
            .optimization_budget_ms
            .map(|ms| started + Duration::from_millis(ms));

        let total_combinations = grid.combination_count();
        let mut seen = HashSet::new();
        let mut tasks: Vec<ComboTask> = Vec::with_capacity(total_combinations);
        let mut duplicate_skips = 0usize;
        for index in 0..total_combinations {
            let parameters = grid.combination(index);
            if seen.insert(parameter_signature(&parameters)) {
                tasks.push(ComboTask { index, parameters });
            } else {
                duplicate_skips += 1;
            }
        }

        let dispatched = tasks.len();
        info!(
            "Grid search for {} over {} combination{} ({} unique) ranked by {}",
            strategy_id,
            total_combinations,
            if total_combinations == 1 { "" } else { "s" },
            dispatched,
            metric
        );

        let num_workers = std::cmp::min(dispatched.max(1), std::cmp::max(1, self.settings.worker_threads));
        let cancelled = Arc::new(AtomicBool::new(false));

        let (task_tx, task_rx): (Sender<ComboTask>, Receiver<ComboTask>) = bounded(dispatched.max(1));
        let (result_tx, result_rx): (Sender<ComboOutcome>, Receiver<ComboOutcome>) =
            bounded(dispatched.max(1));

        let mut handles = Vec::new();
        for _ in 0..num_workers {
            let rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let series = series.clone();
            let strategy_id = strategy_id.to_string();
            let backtester = Backtester::new(self.config.clone())
                .with_annualization(self.settings.annualization());
            let cancelled = cancelled.clone();

            let handle = thread::spawn(move || {
                while let Ok(task) = rx.recv() {
                    let out_of_budget = deadline.map(|d| Instant::now() >= d).unwrap_or(false);
                    if cancelled.load(AtomicOrdering::Relaxed) || out_of_budget {
                        if result_tx.send(ComboOutcome::Cancelled).is_err() {
                            break;
                        }
                        continue;
                    }

                    let outcome = match backtester.run_strategy(
                        &series,
                        &strategy_id,
                        &task.parameters,
                        start,
                        end,
                    ) {
                        Ok(result) => ComboOutcome::Evaluated {
                            index: task.index,
                            parameters: task.parameters,
                            score: metric.ranking_score(&result.metrics),
                            metric_value: metric.value(&result.metrics),
                            metrics: result.metrics,
                        },
                        Err(
                            EngineError::InvalidParameter { .. }
                            | EngineError::InsufficientData { .. },
                        ) => ComboOutcome::Skipped,
                        Err(error) => ComboOutcome::Failed {
                            error: error.to_string(),
                        },
                    };

                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }
        drop(result_tx);

        for task in tasks {
            task_tx
                .send(task)
                .map_err(|_| EngineError::NoValidParameters {
                    strategy: strategy_id.to_string(),
                })?;
        }
        drop(task_tx);

        let pb = if self.show_progress {
            ProgressBar::new(dispatched as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut candidates: Vec<(usize, OptimizationCandidate)> = Vec::new();
        let mut evaluated = 0usize;
        let mut skipped = duplicate_skips;
        let mut failed = 0usize;
        let mut best_score: Option<f64> = None;
        let mut completed = 0usize;

        while completed < dispatched {
            if observer.cancel_requested() {
                cancelled.store(true, AtomicOrdering::Relaxed);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline && !cancelled.load(AtomicOrdering::Relaxed) {
                    info!("Optimization budget exhausted; keeping results gathered so far");
                    cancelled.store(true, AtomicOrdering::Relaxed);
                }
            }

            match result_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(outcome) => {
                    completed += 1;
                    pb.set_position(completed as u64);
                    match outcome {
                        ComboOutcome::Evaluated {
                            index,
                            parameters,
                            score,
                            metric_value,
                            metrics,
                        } => {
                            evaluated += 1;
                            if best_score.map(|best| score > best).unwrap_or(true) {
                                best_score = Some(score);
                            }
                            candidates.push((
                                index,
                                OptimizationCandidate {
                                    rank: 0,
                                    parameters,
                                    score,
                                    metric_value,
                                    metrics,
                                },
                            ));
                        }
                        ComboOutcome::Skipped => skipped += 1,
                        ComboOutcome::Failed { error } => {
                            failed += 1;
                            warn!("Combination failed during grid search: {}", error);
                        }
                        ComboOutcome::Cancelled => {}
                    }
                    observer.on_progress(&SearchProgress {
                        total: total_combinations,
                        completed,
                        evaluated,
                        skipped,
                        failed,
                        best_score,
                    });
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    warn!("Result channel closed unexpectedly. Some results may be lost.");
                    break;
                }
            }
        }
        pb.finish_and_clear();

        for handle in handles {
            let _ = handle.join();
        }

        let partial = cancelled.load(AtomicOrdering::Relaxed)
            && evaluated + skipped + failed < total_combinations;

        if evaluated == 0 && !partial {
            return Err(EngineError::NoValidParameters {
                strategy: strategy_id.to_string(),
            });
        }

        candidates.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.truncate(self.settings.top_results);

        let top: Vec<OptimizationCandidate> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, (_, mut candidate))| {
                candidate.rank = i + 1;
                candidate
            })
            .collect();

        info!(
            "Grid search for {} finished: {} evaluated, {} skipped, {} failed in {} ms",
            strategy_id,
            evaluated,
            skipped,
            failed,
            started.elapsed().as_millis()
        );

        Ok(OptimizationOutcome {
            id: Uuid::new_v4().to_string(),
            strategy: strategy_id.to_string(),
            metric: metric.to_string(),
            total_combinations,
            evaluated,
            skipped,
            failed,
            partial,
            elapsed_ms: started.elapsed().as_millis() as u64,
            top,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap() + chrono::Duration::days(n as i64 - 1)
    }

    fn series_from_closes(closes: &[f64]) -> PriceSeries {
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: day(i as u32 + 1),
                open: close,
                high: close * 1.02,
                low: close * 0.98,
                close,
                volume: 5_000.0,
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    fn wavy_series(len: usize) -> PriceSeries {
        let closes: Vec<f64> = (0..len)
            .map(|i| 100.0 + (i as f64 * 0.25).sin() * 12.0 + i as f64 * 0.05)
            .collect();
        series_from_closes(&closes)
    }

    fn optimizer(workers: usize) -> Optimizer {
        let mut settings = RuntimeSettings::default();
        settings.worker_threads = workers;
        Optimizer::new(EngineConfig::default(), settings)
    }

    #[test]
    fn ranks_descending_with_complete_bookkeeping() {
        let series = wavy_series(160);
        let grid = ParameterGrid::from_pairs(vec![
            ("fast_period".to_string(), vec![5.0, 10.0]),
            ("slow_period".to_string(), vec![20.0, 40.0]),
        ]);
        let outcome = optimizer(4)
            .optimize(&series, "sma_crossover", &grid, Metric::TotalReturn, None, None)
            .unwrap();

        assert_eq!(outcome.total_combinations, 4);
        assert_eq!(outcome.evaluated + outcome.skipped + outcome.failed, 4);
        assert!(!outcome.partial);
        assert_eq!(outcome.top.len(), outcome.evaluated.min(10));
        for pair in outcome.top.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for (i, candidate) in outcome.top.iter().enumerate() {
            assert_eq!(candidate.rank, i + 1);
        }
    }

    #[test]
    fn structurally_invalid_combinations_are_skipped_not_fatal() {
        let series = wavy_series(200);
        let grid = ParameterGrid::from_pairs(vec![
            ("fast_period".to_string(), vec![10.0, 50.0]),
            ("slow_period".to_string(), vec![30.0, 100.0]),
        ]);
        let outcome = optimizer(2)
            .optimize(&series, "sma_crossover", &grid, Metric::SharpeRatio, None, None)
            .unwrap();

        // fast 50 / slow 30 is the one nonsense pairing.
        assert_eq!(outcome.total_combinations, 4);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.evaluated, 3);
        assert_eq!(outcome.failed, 0);
    }

    #[test]
    fn empty_grid_evaluates_the_defaults_once() {
        let series = wavy_series(160);
        let grid = ParameterGrid::default();
        let outcome = optimizer(2)
            .optimize(&series, "sma_crossover", &grid, Metric::TotalReturn, None, None)
            .unwrap();

        assert_eq!(outcome.total_combinations, 1);
        assert_eq!(outcome.evaluated, 1);
        assert_eq!(outcome.top.len(), 1);
        assert!(outcome.top[0].parameters.is_empty());
    }

    #[test]
    fn duplicate_combinations_run_once() {
        let series = wavy_series(160);
        let grid = ParameterGrid::from_pairs(vec![
            ("fast_period".to_string(), vec![10.0, 10.0]),
            ("slow_period".to_string(), vec![30.0]),
        ]);
        let outcome = optimizer(2)
            .optimize(&series, "sma_crossover", &grid, Metric::TotalReturn, None, None)
            .unwrap();

        assert_eq!(outcome.total_combinations, 2);
        assert_eq!(outcome.evaluated, 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn all_invalid_combinations_is_an_error() {
        let series = wavy_series(160);
        let grid = ParameterGrid::from_pairs(vec![
            ("fast_period".to_string(), vec![50.0]),
            ("slow_period".to_string(), vec![20.0]),
        ]);
        let err = optimizer(2)
            .optimize(&series, "sma_crossover", &grid, Metric::TotalReturn, None, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::NoValidParameters { .. }));
    }

    #[test]
    fn unknown_strategy_is_rejected_before_any_work() {
        let series = wavy_series(60);
        let err = optimizer(2)
            .optimize(
                &series,
                "nope",
                &ParameterGrid::default(),
                Metric::TotalReturn,
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategy { .. }));
    }

    #[test]
    fn exhausted_budget_returns_partial_outcome() {
        let series = wavy_series(200);
        let grid = ParameterGrid::from_pairs(vec![
            ("fast_period".to_string(), vec![5.0, 8.0, 10.0, 12.0]),
            ("slow_period".to_string(), vec![20.0, 30.0, 40.0, 50.0]),
        ]);
        let mut settings = RuntimeSettings::default();
        settings.worker_threads = 2;
        settings.optimization_budget_ms = Some(0);
        let outcome = Optimizer::new(EngineConfig::default(), settings)
            .optimize(&series, "sma_crossover", &grid, Metric::TotalReturn, None, None)
            .unwrap();

        assert!(outcome.partial);
        assert_eq!(outcome.evaluated, 0);
        assert!(outcome.top.is_empty());
    }

    #[test]
    fn equal_scores_keep_enumeration_order() {
        // Flat prices keep RSI pinned at neutral, so no combination trades
        // and every score ties at zero.
        let series = series_from_closes(&[100.0; 80]);
        let grid = ParameterGrid::from_pairs(vec![
            ("period".to_string(), vec![7.0, 14.0]),
            ("oversold".to_string(), vec![30.0]),
            ("overbought".to_string(), vec![70.0]),
        ]);
        let outcome = optimizer(4)
            .optimize(&series, "rsi", &grid, Metric::TotalReturn, None, None)
            .unwrap();

        assert_eq!(outcome.evaluated, 2);
        assert!((outcome.top[0].parameters["period"] - 7.0).abs() < 1e-9);
        assert!((outcome.top[1].parameters["period"] - 14.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_runs_rank_identically() {
        let series = wavy_series(180);
        let grid = ParameterGrid::from_pairs(vec![
            ("fast_period".to_string(), vec![5.0, 10.0, 15.0]),
            ("slow_period".to_string(), vec![20.0, 30.0, 45.0]),
        ]);
        let opt = optimizer(4);
        let first = opt
            .optimize(&series, "sma_crossover", &grid, Metric::TotalReturn, None, None)
            .unwrap();
        let second = opt
            .optimize(&series, "sma_crossover", &grid, Metric::TotalReturn, None, None)
            .unwrap();

        let first_params: Vec<_> = first.top.iter().map(|c| c.parameters.clone()).collect();
        let second_params: Vec<_> = second.top.iter().map(|c| c.parameters.clone()).collect();
        assert_eq!(first_params, second_params);
        for (a, b) in first.top.iter().zip(second.top.iter()) {
            assert!((a.score - b.score).abs() < 1e-12);
        }
    }
}
