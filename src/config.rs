use chrono::NaiveDate;
use std::collections::HashMap;

use crate::errors::{EngineError, EngineResult};
use crate::performance::Annualization;

/// Simulation parameters shared by every backtest in a request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Fraction of traded notional charged on each leg (0.001 = 10 bps).
    pub commission: f64,
    /// When false, sell signals while flat are ignored instead of opening
    /// short positions.
    pub allow_short: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            commission: 0.001,
            allow_short: true,
        }
    }
}

impl EngineConfig {
    pub fn new(initial_capital: f64, commission: f64) -> EngineResult<Self> {
        if !initial_capital.is_finite() || initial_capital <= 0.0 {
            return Err(EngineError::invalid_parameter(
                "initial_capital",
                format!("must be positive (got {})", initial_capital),
            ));
        }
        if !commission.is_finite() || !(0.0..1.0).contains(&commission) {
            return Err(EngineError::invalid_parameter(
                "commission",
                format!("must be a fraction in [0, 1) (got {})", commission),
            ));
        }
        Ok(Self {
            initial_capital,
            commission,
            allow_short: true,
        })
    }

    pub fn with_allow_short(mut self, allow_short: bool) -> Self {
        self.allow_short = allow_short;
        self
    }
}

/// Process-level knobs. Read once at startup from `STRATLAB_*` environment
/// variables or an explicit settings map.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub worker_threads: usize,
    pub top_results: usize,
    pub trading_days: f64,
    pub risk_free_rate: f64,
    pub optimization_budget_ms: Option<u64>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(1),
            top_results: 10,
            trading_days: 252.0,
            risk_free_rate: 0.02,
            optimization_budget_ms: None,
        }
    }
}

impl RuntimeSettings {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> EngineResult<Self> {
        let defaults = Self::default();

        let worker_threads =
            parse_setting_usize(settings, "WORKER_THREADS", defaults.worker_threads, 1)?;
        let top_results = parse_setting_usize(settings, "TOP_RESULTS", defaults.top_results, 1)?;
        let trading_days = parse_setting_f64(
            settings,
            "TRADING_DAYS_PER_YEAR",
            defaults.trading_days,
            1.0,
            366.0,
        )?;
        let risk_free_rate =
            parse_setting_f64(settings, "RISK_FREE_RATE", defaults.risk_free_rate, -1.0, 1.0)?;

        let optimization_budget_ms = match settings.get("OPTIMIZATION_BUDGET_MS") {
            Some(raw) if !raw.trim().is_empty() => {
                let value = raw.trim().parse::<u64>().map_err(|_| {
                    EngineError::invalid_parameter(
                        "OPTIMIZATION_BUDGET_MS",
                        format!("must be a whole number of milliseconds (value: {})", raw),
                    )
                })?;
                if value == 0 {
                    None
                } else {
                    Some(value)
                }
            }
            _ => None,
        };

        Ok(Self {
            worker_threads,
            top_results,
            trading_days,
            risk_free_rate,
            optimization_budget_ms,
        })
    }

    /// Settings from `STRATLAB_`-prefixed environment variables.
    pub fn from_env() -> EngineResult<Self> {
        let settings: HashMap<String, String> = std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix("STRATLAB_")
                    .map(|stripped| (stripped.to_string(), value))
            })
            .collect();
        Self::from_settings_map(&settings)
    }

    pub fn annualization(&self) -> Annualization {
        Annualization {
            trading_days: self.trading_days,
            risk_free_rate: self.risk_free_rate,
        }
    }
}

/// Parse a `YYYY-MM-DD` date argument.
pub fn parse_date(name: &str, raw: &str) -> EngineResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        EngineError::invalid_parameter(
            name,
            format!("must be a date in YYYY-MM-DD format (value: {})", raw),
        )
    })
}

fn parse_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> EngineResult<f64> {
    let raw = match settings.get(key).map(|value| value.trim()) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    let value = raw.parse::<f64>().map_err(|_| {
        EngineError::invalid_parameter(key, format!("must be a number (value: {})", raw))
    })?;
    if !value.is_finite() || value < min || value > max {
        return Err(EngineError::invalid_parameter(
            key,
            format!("must be between {} and {} (value: {})", min, max, raw),
        ));
    }
    Ok(value)
}

fn parse_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    default: usize,
    min: usize,
) -> EngineResult<usize> {
    let raw = match settings.get(key).map(|value| value.trim()) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    let value = raw.parse::<usize>().map_err(|_| {
        EngineError::invalid_parameter(key, format!("must be a whole number (value: {})", raw))
    })?;
    if value < min {
        return Err(EngineError::invalid_parameter(
            key,
            format!("must be at least {} (value: {})", min, raw),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_validates_inputs() {
        assert!(EngineConfig::new(10_000.0, 0.001).is_ok());
        assert!(EngineConfig::new(0.0, 0.001).is_err());
        assert!(EngineConfig::new(10_000.0, 1.0).is_err());
        assert!(EngineConfig::new(10_000.0, -0.1).is_err());
        assert!(EngineConfig::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn settings_map_overrides_defaults() {
        let mut map = HashMap::new();
        map.insert("WORKER_THREADS".to_string(), "2".to_string());
        map.insert("TOP_RESULTS".to_string(), "5".to_string());
        map.insert("RISK_FREE_RATE".to_string(), "0.03".to_string());
        map.insert("OPTIMIZATION_BUDGET_MS".to_string(), "1500".to_string());

        let settings = RuntimeSettings::from_settings_map(&map).unwrap();
        assert_eq!(settings.worker_threads, 2);
        assert_eq!(settings.top_results, 5);
        assert!((settings.risk_free_rate - 0.03).abs() < 1e-12);
        assert_eq!(settings.optimization_budget_ms, Some(1500));
        assert!((settings.trading_days - 252.0).abs() < 1e-12);
    }

    #[test]
    fn settings_map_rejects_garbage() {
        let mut map = HashMap::new();
        map.insert("WORKER_THREADS".to_string(), "many".to_string());
        assert!(RuntimeSettings::from_settings_map(&map).is_err());

        let mut map = HashMap::new();
        map.insert("TRADING_DAYS_PER_YEAR".to_string(), "-5".to_string());
        assert!(RuntimeSettings::from_settings_map(&map).is_err());
    }

    #[test]
    fn date_parsing_requires_iso_format() {
        assert!(parse_date("start_date", "2021-03-04").is_ok());
        assert!(parse_date("start_date", "03/04/2021").is_err());
    }
}
