use crate::storage;
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(data_file: &Path, output: &Path) -> Result<()> {
    let series = storage::load_series(data_file)?;
    info!(
        "Loaded {} bars for {} from {}",
        series.len(),
        series.symbol(),
        data_file.display()
    );

    storage::save_snapshot(output, &series)?;
    info!("Price series snapshot written to {}", output.display());
    Ok(())
}
