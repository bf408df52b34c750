use crate::api::{ApiService, CompareRequest, CompareResponse};
use crate::config::{parse_date, EngineConfig, RuntimeSettings};
use crate::models::StrategyConfig;
use crate::storage;
use anyhow::{Context, Result};
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub fn run(
    settings: &RuntimeSettings,
    strategy_ids: &[String],
    data_file: &Path,
    optimize: bool,
    metric_name: Option<&str>,
    initial_capital: Option<f64>,
    commission: Option<f64>,
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

    let start = start_date
        .map(|raw| parse_date("start_date", raw))
        .transpose()?;
    let end = end_date
        .map(|raw| parse_date("end_date", raw))
        .transpose()?;

    let request = CompareRequest {
        strategies: strategy_ids
            .iter()
            .map(|id| StrategyConfig {
                strategy: id.clone(),
                parameters: HashMap::new(),
                param_ranges: None,
            })
            .collect(),
        initial_capital,
        commission,
        start_date: start,
        end_date: end,
        optimize,
        optimization_metric: metric_name.map(str::to_string),
    };

    let service = ApiService::new(series, EngineConfig::default(), settings.clone());
    let response = service.compare_strategies(&request)?;

    print_summary(&response);

    if let Some(path) = output {
        let body = serde_json::to_string_pretty(&response)
            .context("Failed to serialize comparison response")?;
        fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Comparison response written to {}", path.display());
    }

    Ok(())
}

fn print_summary(response: &CompareResponse) {
    println!("\n=== STRATEGY COMPARISON ===\n");
    for entry in &response.results {
        let metrics = &entry.performance;
        println!("{}:", entry.strategy);
        println!("  Total Return: {:.2}%", metrics.total_return * 100.0);
        println!("  Sharpe Ratio: {:.4}", metrics.sharpe_ratio);
        println!("  Max Drawdown: {:.2}%", metrics.max_drawdown * 100.0);
        println!("  Win Rate: {:.2}%", metrics.win_rate * 100.0);
        println!("  Trades: {}", metrics.num_trades);
        if let Some(optimization) = &entry.optimization {
            println!(
                "  Optimized by {} over {} combinations ({} evaluated, {} skipped)",
                optimization.metric,
                optimization.total_combinations,
                optimization.evaluated,
                optimization.skipped
            );
            let mut pairs: Vec<_> = optimization.best_parameters.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            for (name, value) in pairs {
                println!("    {}: {}", name, value);
            }
        }
        println!();
    }

    if !response.errors.is_empty() {
        println!("Failures:");
        for failure in &response.errors {
            println!("  {}: {} ({})", failure.strategy, failure.message, failure.kind);
        }
        println!();
    }

    println!("Best by metric:");
    for winner in &response.best_strategies {
        println!("  {}: {} ({:.4})", winner.metric, winner.strategy, winner.value);
    }
    println!();
}
