//! Seeded synthetic OHLCV generation, so every part of the engine can be
//! driven without external market data. The same seed always produces the
//! same bars.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{EngineError, EngineResult};
use crate::models::Bar;
use crate::series::PriceSeries;

#[derive(Debug, Clone)]
pub struct SampleDataSpec {
    pub symbol: String,
    pub bars: usize,
    pub seed: u64,
    pub start_date: NaiveDate,
    pub start_price: f64,
    /// Expected daily return of the walk.
    pub daily_drift: f64,
    /// Half-width of the uniform daily return band around the drift.
    pub daily_volatility: f64,
}

impl Default for SampleDataSpec {
    fn default() -> Self {
        Self {
            symbol: "SAMPLE".to_string(),
            bars: 504,
            seed: 42,
            start_date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or_default(),
            start_price: 100.0,
            daily_drift: 0.0003,
            daily_volatility: 0.015,
        }
    }
}

impl SampleDataSpec {
    fn validate(&self) -> EngineResult<()> {
        if self.bars == 0 {
            return Err(EngineError::invalid_parameter(
                "bars",
                "must generate at least one bar",
            ));
        }
        if !self.start_price.is_finite() || self.start_price <= 0.0 {
            return Err(EngineError::invalid_parameter(
                "start_price",
                format!("must be positive (got {})", self.start_price),
            ));
        }
        if !self.daily_volatility.is_finite() || !(0.0..0.5).contains(&self.daily_volatility) {
            return Err(EngineError::invalid_parameter(
                "daily_volatility",
                format!("must be in [0, 0.5) (got {})", self.daily_volatility),
            ));
        }
        if !self.daily_drift.is_finite() || self.daily_drift.abs() >= 0.5 {
            return Err(EngineError::invalid_parameter(
                "daily_drift",
                format!("must be in (-0.5, 0.5) (got {})", self.daily_drift),
            ));
        }
        Ok(())
    }
}

/// Random-walk daily bars on weekdays only, starting at `start_date`.
pub fn generate_bars(spec: &SampleDataSpec) -> EngineResult<Vec<Bar>> {
    spec.validate()?;

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut date = spec.start_date;
    let mut close = spec.start_price;
    let mut bars = Vec::with_capacity(spec.bars);

    while bars.len() < spec.bars {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
            continue;
        }

        let open = close;
        let daily_return = spec.daily_drift + rng.gen_range(-1.0..=1.0) * spec.daily_volatility;
        close = open * (1.0 + daily_return);

        let body_high = open.max(close);
        let body_low = open.min(close);
        // Wick extensions stay inside the validated OHLC envelope.
        let high = body_high * (1.0 + rng.gen_range(0.0..spec.daily_volatility.max(1e-6)));
        let low = body_low * (1.0 - rng.gen_range(0.0..spec.daily_volatility.max(1e-6)));
        let volume = rng.gen_range(50_000.0..500_000.0_f64).round();

        bars.push(Bar {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
        date += Duration::days(1);
    }

    Ok(bars)
}

pub fn generate_series(spec: &SampleDataSpec) -> EngineResult<PriceSeries> {
    let bars = generate_bars(spec)?;
    PriceSeries::new(spec.symbol.clone(), bars)
}
