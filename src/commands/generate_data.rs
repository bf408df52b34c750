use crate::config::parse_date;
use crate::sample_data::{self, SampleDataSpec};
use crate::storage::{self, BarDocument};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(
    output: &Path,
    symbol: &str,
    bars: usize,
    seed: u64,
    start_date: Option<&str>,
) -> Result<()> {
    let mut spec = SampleDataSpec {
        symbol: symbol.to_string(),
        bars,
        seed,
        ..SampleDataSpec::default()
    };
    if let Some(raw) = start_date {
        spec.start_date = parse_date("start_date", raw)?;
    }

    let bars = sample_data::generate_bars(&spec)?;
    let first = bars[0].date;
    let last = bars[bars.len() - 1].date;
    let document = BarDocument {
        symbol: spec.symbol.clone(),
        bars,
    };
    storage::save_json(output, &document)?;

    info!(
        "Wrote {} bars for {} ({} - {}) to {}",
        document.bars.len(),
        document.symbol,
        first,
        last,
        output.display()
    );
    Ok(())
}
