use crate::api::{self, OptimizationResultsResponse};
use crate::config::{parse_date, EngineConfig, RuntimeSettings};
use crate::models::{OptimizationOutcome, ParameterGrid};
use crate::optimizer::Optimizer;
use crate::performance::Metric;
use crate::storage;
use crate::strategy;
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

pub fn run(
    settings: &RuntimeSettings,
    strategy_id: &str,
    data_file: &Path,
    metric_name: Option<&str>,
    ranges_json: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let series = storage::load_series(data_file)?;
    info!(
        "Loaded {} bars for {} from {}",
        series.len(),
        series.symbol(),
        data_file.display()
    );

    let metric = match metric_name {
        Some(raw) => raw.parse::<Metric>()?,
        None => Metric::SharpeRatio,
    };
    let grid: ParameterGrid = match ranges_json {
        Some(raw) => {
            serde_json::from_str(raw).with_context(|| format!("Invalid --ranges JSON: {}", raw))?
        }
        None => strategy::default_grid(strategy_id)?,
    };
    let start = start_date
        .map(|raw| parse_date("start_date", raw))
        .transpose()?;
    let end = end_date
        .map(|raw| parse_date("end_date", raw))
        .transpose()?;

    info!(
        "Optimizing {} over {} combinations, ranked by {}",
        strategy_id,
        grid.combination_count(),
        metric
    );

    let optimizer = Optimizer::new(EngineConfig::default(), settings.clone());
    let outcome = optimizer.optimize(&series, strategy_id, &grid, metric, start, end)?;

    print_results(&outcome);

    if let Some(path) = output {
        let response = OptimizationResultsResponse {
            success: true,
            strategy: outcome.strategy.clone(),
            metric: outcome.metric.clone(),
            partial: outcome.partial,
            results: outcome
                .top
                .iter()
                .cloned()
                .map(|mut candidate| {
                    candidate.score = api::clamp_value(candidate.score);
                    candidate.metric_value = api::clamp_value(candidate.metric_value);
                    candidate.metrics = api::sanitize_metrics(&candidate.metrics);
                    candidate
                })
                .collect(),
        };
        let body = serde_json::to_string_pretty(&response)
            .context("Failed to serialize optimization results")?;
        fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Optimization results written to {}", path.display());
    }

    Ok(())
}

fn print_results(outcome: &OptimizationOutcome) {
    println!(
        "\n=== TOP {} PARAMETER SETS FOR {} (by {}) ===\n",
        outcome.top.len(),
        outcome.strategy,
        outcome.metric
    );
    println!(
        "Evaluated {} of {} combinations ({} skipped, {} failed) in {} ms{}",
        outcome.evaluated,
        outcome.total_combinations,
        outcome.skipped,
        outcome.failed,
        outcome.elapsed_ms,
        if outcome.partial { ", partial" } else { "" }
    );
    println!();

    for candidate in &outcome.top {
        println!("Rank {}:", candidate.rank);
        println!("  {}: {:.4}", outcome.metric, candidate.metric_value);
        println!(
            "  Total Return: {:.2}%",
            candidate.metrics.total_return * 100.0
        );
        println!("  Sharpe Ratio: {:.4}", candidate.metrics.sharpe_ratio);
        println!(
            "  Max Drawdown: {:.2}%",
            candidate.metrics.max_drawdown * 100.0
        );
        println!("  Win Rate: {:.2}%", candidate.metrics.win_rate * 100.0);
        println!("  Trades: {}", candidate.metrics.num_trades);
        println!("  Parameters:");
        let mut pairs: Vec<_> = candidate.parameters.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in pairs {
            println!("    {}: {}", name, value);
        }
        println!();
    }
}
