use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use uuid::Uuid;

use crate::config::{EngineConfig, RuntimeSettings};
use crate::errors::{EngineError, EngineResult};
use crate::models::{OptimizationOutcome, ParameterGrid};
use crate::optimizer::{Optimizer, SearchObserver, SearchProgress};
use crate::performance::Metric;
use crate::series::PriceSeries;
use crate::strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, JobPhase::Queued | JobPhase::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Queued => "queued",
            JobPhase::Running => "running",
            JobPhase::Completed => "completed",
            JobPhase::Cancelled => "cancelled",
            JobPhase::Failed => "failed",
        }
    }
}

/// Point-in-time view of a background job, safe to hand to callers while
/// the worker keeps going.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub strategy: String,
    pub phase: JobPhase,
    pub total: usize,
    pub completed: usize,
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub best_score: Option<f64>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub strategy: String,
    pub grid: ParameterGrid,
    pub metric: Metric,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

struct JobInner {
    phase: JobPhase,
    total: usize,
    completed: usize,
    evaluated: usize,
    skipped: usize,
    failed: usize,
    best_score: Option<f64>,
    error: Option<String>,
    elapsed_ms: Option<u64>,
}

struct JobState {
    job_id: String,
    strategy: String,
    started_at: Instant,
    inner: Mutex<JobInner>,
    cancel: AtomicBool,
    outcome: Mutex<Option<EngineResult<OptimizationOutcome>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobState {
    fn new(job_id: String, strategy: String) -> Self {
        Self {
            job_id,
            strategy,
            started_at: Instant::now(),
            inner: Mutex::new(JobInner {
                phase: JobPhase::Queued,
                total: 0,
                completed: 0,
                evaluated: 0,
                skipped: 0,
                failed: 0,
                best_score: None,
                error: None,
                elapsed_ms: None,
            }),
            cancel: AtomicBool::new(false),
            outcome: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    fn set_phase(&self, phase: JobPhase) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.phase = phase;
        }
    }

    fn finish(&self, result: EngineResult<OptimizationOutcome>) {
        let phase = match &result {
            Ok(outcome) if outcome.partial && self.cancel.load(Ordering::Relaxed) => {
                JobPhase::Cancelled
            }
            Ok(_) => JobPhase::Completed,
            Err(_) => JobPhase::Failed,
        };
        if let Ok(mut inner) = self.inner.lock() {
            inner.phase = phase;
            inner.elapsed_ms = Some(self.started_at.elapsed().as_millis() as u64);
            match &result {
                Ok(outcome) => {
                    if let Some(best) = outcome.top.first() {
                        inner.best_score = Some(best.score);
                    }
                }
                Err(error) => inner.error = Some(error.to_string()),
            }
        }
        if let Ok(mut slot) = self.outcome.lock() {
            *slot = Some(result);
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        if let Ok(inner) = self.inner.lock() {
            JobSnapshot {
                job_id: self.job_id.clone(),
                strategy: self.strategy.clone(),
                phase: inner.phase,
                total: inner.total,
                completed: inner.completed,
                evaluated: inner.evaluated,
                skipped: inner.skipped,
                failed: inner.failed,
                best_score: inner.best_score,
                elapsed_ms: inner
                    .elapsed_ms
                    .unwrap_or_else(|| self.started_at.elapsed().as_millis() as u64),
                error: inner.error.clone(),
            }
        } else {
            JobSnapshot {
                job_id: self.job_id.clone(),
                strategy: self.strategy.clone(),
                phase: JobPhase::Failed,
                total: 0,
                completed: 0,
                evaluated: 0,
                skipped: 0,
                failed: 0,
                best_score: None,
                elapsed_ms: self.started_at.elapsed().as_millis() as u64,
                error: Some("job status unavailable".to_string()),
            }
        }
    }
}

struct JobObserver {
    state: Arc<JobState>,
}

impl SearchObserver for JobObserver {
    fn on_progress(&self, progress: &SearchProgress) {
        if let Ok(mut inner) = self.state.inner.lock() {
            inner.total = progress.total;
            inner.completed = progress.completed;
            inner.evaluated = progress.evaluated;
            inner.skipped = progress.skipped;
            inner.failed = progress.failed;
            inner.best_score = progress.best_score;
        }
    }

    fn cancel_requested(&self) -> bool {
        self.state.cancel.load(Ordering::Relaxed)
    }
}

/// Fire-and-poll registry for background grid searches, at most one active
/// job per strategy id.
pub struct JobManager {
    config: EngineConfig,
    settings: RuntimeSettings,
    jobs: DashMap<String, Arc<JobState>>,
}

impl JobManager {
    pub fn new(config: EngineConfig, settings: RuntimeSettings) -> Self {
        Self {
            config,
            settings,
            jobs: DashMap::new(),
        }
    }

    /// Validate and launch a grid search in a background thread, returning
    /// the queued snapshot immediately.
    pub fn start_optimization(
        &self,
        series: &PriceSeries,
        request: JobRequest,
    ) -> EngineResult<JobSnapshot> {
        strategy::strategy_info(&request.strategy)?;
        request.grid.validate()?;
        series.window(request.start, request.end)?;

        let state = Arc::new(JobState::new(
            Uuid::new_v4().to_string(),
            request.strategy.clone(),
        ));

        match self.jobs.entry(request.strategy.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().snapshot().phase.is_active() {
                    return Err(EngineError::JobAlreadyRunning {
                        strategy: request.strategy,
                    });
                }
                occupied.insert(state.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(state.clone());
            }
        }

        info!(
            "Launching optimization job {} for {}",
            state.job_id, request.strategy
        );

        let optimizer =
            Optimizer::new(self.config.clone(), self.settings.clone()).with_progress(false);
        let series = series.clone();
        let thread_state = state.clone();
        let handle = thread::spawn(move || {
            thread_state.set_phase(JobPhase::Running);
            let observer = JobObserver {
                state: thread_state.clone(),
            };
            let result = optimizer.optimize_observed(
                &series,
                &request.strategy,
                &request.grid,
                request.metric,
                request.start,
                request.end,
                &observer,
            );
            if let Err(error) = &result {
                warn!(
                    "Optimization job for {} failed: {}",
                    request.strategy, error
                );
            }
            thread_state.finish(result);
        });
        if let Ok(mut slot) = state.handle.lock() {
            *slot = Some(handle);
        }

        Ok(state.snapshot())
    }

    pub fn status(&self, strategy: &str) -> EngineResult<JobSnapshot> {
        Ok(self.get(strategy)?.snapshot())
    }

    /// Flag the job for cooperative cancellation. Workers stop picking up
    /// combinations and the partial ranking stays retrievable.
    pub fn cancel(&self, strategy: &str) -> EngineResult<JobSnapshot> {
        let state = self.get(strategy)?;
        state.cancel.store(true, Ordering::Relaxed);
        info!("Cancellation requested for job {}", state.job_id);
        Ok(state.snapshot())
    }

    /// `Ok(None)` while the job is still running; the stored error for a
    /// failed job.
    pub fn results(&self, strategy: &str) -> EngineResult<Option<OptimizationOutcome>> {
        let state = self.get(strategy)?;
        let result = match state.outcome.lock() {
            Ok(slot) => match &*slot {
                None => Ok(None),
                Some(Ok(outcome)) => Ok(Some(outcome.clone())),
                Some(Err(error)) => Err(error.clone()),
            },
            Err(_) => Ok(None),
        };
        result
    }

    /// Block until the job's worker thread exits. Mostly useful for
    /// command-line callers that launch and immediately follow one job.
    pub fn wait(&self, strategy: &str) -> EngineResult<JobSnapshot> {
        let state = self.get(strategy)?;
        let handle = match state.handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        Ok(state.snapshot())
    }

    fn get(&self, strategy: &str) -> EngineResult<Arc<JobState>> {
        self.jobs
            .get(strategy)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::JobNotFound {
                strategy: strategy.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(n as i64 - 1)
    }

    fn wavy_series(len: usize) -> PriceSeries {
        let bars: Vec<Bar> = (0..len)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.15).sin() * 9.0 + i as f64 * 0.03;
                Bar {
                    date: day(i as u32 + 1),
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 4_000.0,
                }
            })
            .collect();
        PriceSeries::new("TEST", bars).unwrap()
    }

    fn manager(workers: usize) -> JobManager {
        let mut settings = RuntimeSettings::default();
        settings.worker_threads = workers;
        JobManager::new(EngineConfig::default(), settings)
    }

    fn small_request() -> JobRequest {
        JobRequest {
            strategy: "sma_crossover".to_string(),
            grid: ParameterGrid::from_pairs(vec![
                ("fast_period".to_string(), vec![5.0, 10.0]),
                ("slow_period".to_string(), vec![20.0, 30.0]),
            ]),
            metric: Metric::TotalReturn,
            start: None,
            end: None,
        }
    }

    fn large_request() -> JobRequest {
        JobRequest {
            strategy: "sma_crossover".to_string(),
            grid: ParameterGrid::from_pairs(vec![
                (
                    "fast_period".to_string(),
                    (2..12).map(|v| v as f64).collect(),
                ),
                (
                    "slow_period".to_string(),
                    (20..30).map(|v| v as f64).collect(),
                ),
            ]),
            metric: Metric::TotalReturn,
            start: None,
            end: None,
        }
    }

    #[test]
    fn job_runs_to_completion_and_serves_results() {
        let series = wavy_series(160);
        let jobs = manager(2);
        let ack = jobs.start_optimization(&series, small_request()).unwrap();
        assert!(ack.phase.is_active());
        assert_eq!(ack.strategy, "sma_crossover");

        let done = jobs.wait("sma_crossover").unwrap();
        assert_eq!(done.phase, JobPhase::Completed);
        assert!(done.error.is_none());

        let outcome = jobs.results("sma_crossover").unwrap().expect("results");
        assert_eq!(outcome.total_combinations, 4);
        assert!(outcome.evaluated > 0);
        assert!(!outcome.top.is_empty());
    }

    #[test]
    fn unknown_strategy_is_rejected_at_submission() {
        let series = wavy_series(60);
        let jobs = manager(1);
        let mut request = small_request();
        request.strategy = "nope".to_string();
        let err = jobs.start_optimization(&series, request).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategy { .. }));
        // Nothing was registered for the bad id.
        assert!(matches!(
            jobs.status("nope").unwrap_err(),
            EngineError::JobNotFound { .. }
        ));
    }

    #[test]
    fn one_active_job_per_strategy() {
        let series = wavy_series(2_000);
        let jobs = manager(1);
        jobs.start_optimization(&series, large_request()).unwrap();
        let err = jobs
            .start_optimization(&series, large_request())
            .unwrap_err();
        assert!(matches!(err, EngineError::JobAlreadyRunning { .. }));

        // Once finished, the slot frees up for a rerun.
        jobs.wait("sma_crossover").unwrap();
        jobs.start_optimization(&series, small_request()).unwrap();
        let done = jobs.wait("sma_crossover").unwrap();
        assert_eq!(done.phase, JobPhase::Completed);
    }

    #[test]
    fn cancel_keeps_partial_results_retrievable() {
        let series = wavy_series(2_000);
        let jobs = manager(1);
        jobs.start_optimization(&series, large_request()).unwrap();
        jobs.cancel("sma_crossover").unwrap();
        let done = jobs.wait("sma_crossover").unwrap();

        assert!(matches!(
            done.phase,
            JobPhase::Cancelled | JobPhase::Completed
        ));
        let outcome = jobs.results("sma_crossover").unwrap().expect("outcome");
        if done.phase == JobPhase::Cancelled {
            assert!(outcome.partial);
        }
    }

    #[test]
    fn failed_job_reports_its_error() {
        let series = wavy_series(160);
        let jobs = manager(1);
        let mut request = small_request();
        request.grid = ParameterGrid::from_pairs(vec![
            ("fast_period".to_string(), vec![50.0]),
            ("slow_period".to_string(), vec![20.0]),
        ]);
        jobs.start_optimization(&series, request).unwrap();
        let done = jobs.wait("sma_crossover").unwrap();

        assert_eq!(done.phase, JobPhase::Failed);
        assert!(done.error.is_some());
        assert!(matches!(
            jobs.results("sma_crossover").unwrap_err(),
            EngineError::NoValidParameters { .. }
        ));
    }

    #[test]
    fn unknown_job_lookups_fail_cleanly() {
        let jobs = manager(1);
        assert!(matches!(
            jobs.status("rsi").unwrap_err(),
            EngineError::JobNotFound { .. }
        ));
        assert!(matches!(
            jobs.cancel("rsi").unwrap_err(),
            EngineError::JobNotFound { .. }
        ));
        assert!(matches!(
            jobs.results("rsi").unwrap_err(),
            EngineError::JobNotFound { .. }
        ));
    }
}
