//! Wire-facing request and response bodies, plus the engine-side service
//! the routing layer (or the CLI) drives. Keys are snake_case and every
//! ratio travels as a fraction; non-finite floats are clamped before they
//! leave the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::backtester::Backtester;
use crate::comparator::Comparator;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::errors::{EngineError, EngineResult};
use crate::jobs::{JobManager, JobRequest};
use crate::models::{
    BacktestResult, ComparisonChart, ComparisonEntry, ComparisonFailure, MetricWinner,
    OptimizationCandidate, ParameterGrid, PerformanceMetrics, StrategyConfig, Trade,
};
use crate::performance::Metric;
use crate::series::PriceSeries;
use crate::strategy;

/// JSON cannot carry NaN or infinities, so they are pinned to the nearest
/// representable value before serialization.
pub fn clamp_value(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        f64::MAX
    } else if value == f64::NEG_INFINITY {
        f64::MIN
    } else {
        value
    }
}

pub fn sanitize_metrics(metrics: &PerformanceMetrics) -> PerformanceMetrics {
    PerformanceMetrics {
        total_return: clamp_value(metrics.total_return),
        annual_return: clamp_value(metrics.annual_return),
        sharpe_ratio: clamp_value(metrics.sharpe_ratio),
        sortino_ratio: clamp_value(metrics.sortino_ratio),
        calmar_ratio: clamp_value(metrics.calmar_ratio),
        max_drawdown: clamp_value(metrics.max_drawdown),
        win_rate: clamp_value(metrics.win_rate),
        profit_factor: clamp_value(metrics.profit_factor),
        num_trades: metrics.num_trades,
        max_consecutive_wins: metrics.max_consecutive_wins,
        max_consecutive_losses: metrics.max_consecutive_losses,
        percent_profitable_days: clamp_value(metrics.percent_profitable_days),
    }
}

/// Uniform failure body: `{ "success": false, "error": …, "kind": … }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub kind: String,
}

impl From<&EngineError> for ErrorEnvelope {
    fn from(error: &EngineError) -> Self {
        ErrorEnvelope {
            success: false,
            error: error.to_string(),
            kind: error.kind().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestRequest {
    pub strategy: String,
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
    pub initial_capital: Option<f64>,
    pub commission: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartPayload {
    pub dates: Vec<NaiveDate>,
    pub equity: Vec<f64>,
    pub buy_and_hold: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResponse {
    pub success: bool,
    pub strategy: String,
    pub parameters: HashMap<String, f64>,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub chart: ChartPayload,
}

impl BacktestResponse {
    fn from_result(result: BacktestResult) -> Self {
        BacktestResponse {
            success: true,
            strategy: result.strategy,
            parameters: result.parameters,
            metrics: sanitize_metrics(&result.metrics),
            trades: result.trades,
            chart: ChartPayload {
                dates: result.equity_curve.dates,
                equity: result.equity_curve.equity,
                buy_and_hold: result.equity_curve.buy_and_hold,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeRequest {
    pub strategy: String,
    #[serde(default)]
    pub param_ranges: Option<ParameterGrid>,
    pub metric: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeAck {
    pub success: bool,
    pub strategy: String,
    pub total_combinations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationStatusResponse {
    pub success: bool,
    pub status: String,
    pub progress: f64,
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    pub phase: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResultsResponse {
    pub success: bool,
    pub strategy: String,
    pub metric: String,
    pub partial: bool,
    pub results: Vec<OptimizationCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompareRequest {
    pub strategies: Vec<StrategyConfig>,
    pub initial_capital: Option<f64>,
    pub commission: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub optimize: bool,
    pub optimization_metric: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareResponse {
    pub success: bool,
    pub results: Vec<ComparisonEntry>,
    pub best_strategies: Vec<MetricWinner>,
    pub chart: ComparisonChart,
    pub errors: Vec<ComparisonFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyDescriptor {
    pub id: String,
    pub label: String,
    pub defaults: HashMap<String, f64>,
    pub default_grid: Vec<(String, Vec<f64>)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyListResponse {
    pub success: bool,
    pub strategies: Vec<StrategyDescriptor>,
}

/// Engine-side handler for the dashboard's JSON bodies. Owns the loaded
/// series and the background job registry; transports stay elsewhere.
pub struct ApiService {
    series: PriceSeries,
    defaults: EngineConfig,
    settings: RuntimeSettings,
    jobs: JobManager,
}

impl ApiService {
    pub fn new(series: PriceSeries, defaults: EngineConfig, settings: RuntimeSettings) -> Self {
        let jobs = JobManager::new(defaults.clone(), settings.clone());
        Self {
            series,
            defaults,
            settings,
            jobs,
        }
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn run_backtest(&self, request: &BacktestRequest) -> EngineResult<BacktestResponse> {
        let config = self.config_for(request.initial_capital, request.commission)?;
        let backtester =
            Backtester::new(config).with_annualization(self.settings.annualization());
        let result = backtester.run_strategy(
            &self.series,
            &request.strategy,
            &request.parameters,
            request.start_date,
            request.end_date,
        )?;
        Ok(BacktestResponse::from_result(result))
    }

    /// Launch the grid search in the background and acknowledge. Progress
    /// comes from `optimization_status`, the ranking from
    /// `optimization_results` once the job has finished.
    pub fn optimize_strategy(&self, request: &OptimizeRequest) -> EngineResult<OptimizeAck> {
        let metric = parse_metric(request.metric.as_deref())?;
        let grid = match &request.param_ranges {
            Some(grid) => grid.clone(),
            None => strategy::default_grid(&request.strategy)?,
        };
        let total_combinations = grid.combination_count();

        self.jobs.start_optimization(
            &self.series,
            JobRequest {
                strategy: request.strategy.clone(),
                grid,
                metric,
                start: request.start_date,
                end: request.end_date,
            },
        )?;

        Ok(OptimizeAck {
            success: true,
            strategy: request.strategy.clone(),
            total_combinations,
        })
    }

    pub fn optimization_status(
        &self,
        strategy_id: &str,
    ) -> EngineResult<OptimizationStatusResponse> {
        let snapshot = self.jobs.status(strategy_id)?;
        Ok(status_response(snapshot))
    }

    pub fn cancel_optimization(
        &self,
        strategy_id: &str,
    ) -> EngineResult<OptimizationStatusResponse> {
        let snapshot = self.jobs.cancel(strategy_id)?;
        Ok(status_response(snapshot))
    }

    pub fn optimization_results(
        &self,
        strategy_id: &str,
    ) -> EngineResult<OptimizationResultsResponse> {
        match self.jobs.results(strategy_id)? {
            Some(outcome) => Ok(OptimizationResultsResponse {
                success: true,
                strategy: outcome.strategy,
                metric: outcome.metric,
                partial: outcome.partial,
                results: outcome
                    .top
                    .into_iter()
                    .map(|mut candidate| {
                        candidate.score = clamp_value(candidate.score);
                        candidate.metric_value = clamp_value(candidate.metric_value);
                        candidate.metrics = sanitize_metrics(&candidate.metrics);
                        candidate
                    })
                    .collect(),
            }),
            None => Err(EngineError::JobAlreadyRunning {
                strategy: strategy_id.to_string(),
            }),
        }
    }

    pub fn compare_strategies(&self, request: &CompareRequest) -> EngineResult<CompareResponse> {
        let metric = parse_metric(request.optimization_metric.as_deref())?;
        let config = self.config_for(request.initial_capital, request.commission)?;
        let comparator = Comparator::new(config, self.settings.clone());
        let result = comparator.compare(
            &self.series,
            &request.strategies,
            request.optimize,
            metric,
            request.start_date,
            request.end_date,
        )?;

        Ok(CompareResponse {
            success: true,
            results: result
                .entries
                .into_iter()
                .map(|mut entry| {
                    entry.performance = sanitize_metrics(&entry.performance);
                    if let Some(optimization) = entry.optimization.as_mut() {
                        optimization.default_performance =
                            sanitize_metrics(&optimization.default_performance);
                        optimization.optimized_performance =
                            sanitize_metrics(&optimization.optimized_performance);
                    }
                    entry
                })
                .collect(),
            best_strategies: result
                .best_strategies
                .into_iter()
                .map(|mut winner| {
                    winner.value = clamp_value(winner.value);
                    winner
                })
                .collect(),
            chart: result.chart,
            errors: result.failures,
        })
    }

    pub fn list_strategies(&self) -> StrategyListResponse {
        StrategyListResponse {
            success: true,
            strategies: strategy::CATALOG
                .iter()
                .map(|info| StrategyDescriptor {
                    id: info.id.to_string(),
                    label: info.label.to_string(),
                    defaults: info
                        .defaults
                        .iter()
                        .map(|(name, value)| (name.to_string(), *value))
                        .collect(),
                    default_grid: info
                        .default_grid
                        .iter()
                        .map(|(name, values)| (name.to_string(), values.to_vec()))
                        .collect(),
                })
                .collect(),
        }
    }

    fn config_for(
        &self,
        initial_capital: Option<f64>,
        commission: Option<f64>,
    ) -> EngineResult<EngineConfig> {
        Ok(EngineConfig::new(
            initial_capital.unwrap_or(self.defaults.initial_capital),
            commission.unwrap_or(self.defaults.commission),
        )?
        .with_allow_short(self.defaults.allow_short))
    }
}

fn parse_metric(name: Option<&str>) -> EngineResult<Metric> {
    match name {
        Some(raw) => raw.parse(),
        None => Ok(Metric::SharpeRatio),
    }
}

fn status_response(snapshot: crate::jobs::JobSnapshot) -> OptimizationStatusResponse {
    let progress = if snapshot.total > 0 {
        snapshot.completed as f64 / snapshot.total as f64
    } else {
        0.0
    };
    OptimizationStatusResponse {
        success: true,
        status: snapshot.phase.as_str().to_string(),
        progress,
        evaluated: snapshot.evaluated,
        skipped: snapshot.skipped,
        failed: snapshot.failed,
        best_score: snapshot.best_score.map(clamp_value),
        phase: format!(
            "{} ({}/{} combinations)",
            snapshot.phase.as_str(),
            snapshot.completed,
            snapshot.total
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use std::thread;
    use std::time::Duration;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, 1).unwrap() + chrono::Duration::days(n as i64 - 1)
    }

    fn wavy_series(len: usize) -> PriceSeries {
        let bars: Vec<Bar> = (0..len)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.2).sin() * 10.0 + i as f64 * 0.05;
                Bar {
                    date: day(i as u32 + 1),
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 3_000.0,
                }
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    fn service(len: usize) -> ApiService {
        ApiService::new(
            wavy_series(len),
            EngineConfig::default(),
            RuntimeSettings::default(),
        )
    }

    fn wait_for_terminal(service: &ApiService, strategy: &str) -> OptimizationStatusResponse {
        for _ in 0..1_000 {
            let status = service.optimization_status(strategy).unwrap();
            if status.status != "queued" && status.status != "running" {
                return status;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("optimization for {} never finished", strategy);
    }

    #[test]
    fn backtest_request_parses_from_json_and_answers() {
        let service = service(200);
        let request: BacktestRequest = serde_json::from_str(
            r#"{
                "strategy": "sma_crossover",
                "parameters": {"fast_period": 5, "slow_period": 20},
                "initial_capital": 25000,
                "commission": 0.002,
                "start_date": "2021-03-10"
            }"#,
        )
        .unwrap();

        let response = service.run_backtest(&request).unwrap();
        assert!(response.success);
        assert_eq!(response.strategy, "sma_crossover");
        assert_eq!(response.chart.dates.len(), response.chart.equity.len());

        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["success"], true);
        assert!(body["metrics"]["total_return"].is_number());
        assert!(body["chart"]["buy_and_hold"].is_array());
    }

    #[test]
    fn error_envelope_carries_kind_and_message() {
        let service = service(120);
        let request: BacktestRequest =
            serde_json::from_str(r#"{"strategy": "definitely_not_real"}"#).unwrap();
        let error = service.run_backtest(&request).unwrap_err();
        let envelope = ErrorEnvelope::from(&error);

        assert!(!envelope.success);
        assert_eq!(envelope.kind, "unknown_strategy");
        assert!(envelope.error.contains("definitely_not_real"));
        let body = serde_json::to_value(&envelope).unwrap();
        assert_eq!(body["success"], false);
    }

    #[test]
    fn non_finite_values_are_clamped_for_the_wire() {
        assert_eq!(clamp_value(f64::NAN), 0.0);
        assert_eq!(clamp_value(f64::INFINITY), f64::MAX);
        assert_eq!(clamp_value(f64::NEG_INFINITY), f64::MIN);
        assert_eq!(clamp_value(1.25), 1.25);

        let mut metrics = PerformanceMetrics::default();
        metrics.profit_factor = f64::INFINITY;
        metrics.sortino_ratio = f64::NAN;
        let sanitized = sanitize_metrics(&metrics);
        assert_eq!(sanitized.profit_factor, f64::MAX);
        assert_eq!(sanitized.sortino_ratio, 0.0);
        // Sanitized panels always survive JSON encoding as numbers.
        let body = serde_json::to_value(&sanitized).unwrap();
        assert!(body["profit_factor"].is_number());
    }

    #[test]
    fn optimization_flow_acknowledges_reports_and_serves_results() {
        let service = service(200);
        let request: OptimizeRequest = serde_json::from_str(
            r#"{
                "strategy": "sma_crossover",
                "param_ranges": {"axes": [
                    {"name": "fast_period", "values": [5, 10]},
                    {"name": "slow_period", "values": [20, 30]}
                ]},
                "metric": "total_return"
            }"#,
        )
        .unwrap();

        let ack = service.optimize_strategy(&request).unwrap();
        assert!(ack.success);
        assert_eq!(ack.total_combinations, 4);

        let status = wait_for_terminal(&service, "sma_crossover");
        assert_eq!(status.status, "completed");
        assert!(status.progress > 0.0);

        let results = service.optimization_results("sma_crossover").unwrap();
        assert!(results.success);
        assert_eq!(results.metric, "total_return");
        assert!(!results.partial);
        assert!(!results.results.is_empty());
        assert_eq!(results.results[0].rank, 1);
    }

    #[test]
    fn results_for_an_unknown_job_fail_with_job_not_found() {
        let service = service(120);
        let error = service.optimization_results("rsi").unwrap_err();
        assert_eq!(ErrorEnvelope::from(&error).kind, "job_not_found");
    }

    #[test]
    fn compare_request_round_trips() {
        let service = service(200);
        let request: CompareRequest = serde_json::from_str(
            r#"{
                "strategies": [
                    {"strategy": "sma_crossover"},
                    {"strategy": "rsi", "parameters": {"period": 10}}
                ],
                "commission": 0.001
            }"#,
        )
        .unwrap();

        let response = service.compare_strategies(&request).unwrap();
        assert!(response.success);
        assert_eq!(response.results.len(), 2);
        assert!(response.errors.is_empty());

        let body = serde_json::to_value(&response).unwrap();
        assert!(body["best_strategies"].is_array());
        assert!(body["chart"]["dates"].is_array());
        assert_eq!(body["results"][0]["strategy"], "sma_crossover");
    }
}
