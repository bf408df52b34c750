use crate::api::{ApiService, BacktestRequest, BacktestResponse};
use crate::config::{parse_date, EngineConfig, RuntimeSettings};
use crate::storage;
use anyhow::{Context, Result};
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub fn run(
    settings: &RuntimeSettings,
    strategy: &str,
    data_file: &Path,
    params_json: Option<&str>,
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

    let parameters: HashMap<String, f64> = match params_json {
        Some(raw) => {
            serde_json::from_str(raw).with_context(|| format!("Invalid --params JSON: {}", raw))?
        }
        None => HashMap::new(),
    };
    let start = start_date
        .map(|raw| parse_date("start_date", raw))
        .transpose()?;
    let end = end_date
        .map(|raw| parse_date("end_date", raw))
        .transpose()?;

    let request = BacktestRequest {
        strategy: strategy.to_string(),
        parameters,
        initial_capital,
        commission,
        start_date: start,
        end_date: end,
    };
    let service = ApiService::new(series, EngineConfig::default(), settings.clone());
    let response = service.run_backtest(&request)?;

    print_summary(&response);

    if let Some(path) = output {
        let body = serde_json::to_string_pretty(&response)
            .context("Failed to serialize backtest response")?;
        fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Backtest response written to {}", path.display());
    }

    Ok(())
}

fn print_summary(response: &BacktestResponse) {
    let metrics = &response.metrics;
    println!("\n=== BACKTEST: {} ===\n", response.strategy);
    println!("  Total Return: {:.2}%", metrics.total_return * 100.0);
    println!("  Annual Return: {:.2}%", metrics.annual_return * 100.0);
    println!("  Sharpe Ratio: {:.4}", metrics.sharpe_ratio);
    println!("  Sortino Ratio: {:.4}", metrics.sortino_ratio);
    println!("  Calmar Ratio: {:.4}", metrics.calmar_ratio);
    println!("  Max Drawdown: {:.2}%", metrics.max_drawdown * 100.0);
    println!("  Win Rate: {:.2}%", metrics.win_rate * 100.0);
    println!("  Profit Factor: {:.4}", metrics.profit_factor);
    println!("  Trades: {}", metrics.num_trades);
    if !response.parameters.is_empty() {
        println!("  Parameters:");
        let mut pairs: Vec<_> = response.parameters.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in pairs {
            println!("    {}: {}", name, value);
        }
    }
    println!();
}
