pub mod backtest;
pub mod compare;
pub mod export_snapshot;
pub mod generate_data;
pub mod list_strategies;
pub mod optimize;
