pub mod api;
pub mod backtester;
pub mod commands;
pub mod comparator;
pub mod config;
pub mod errors;
pub mod indicators;
pub mod jobs;
pub mod models;
pub mod optimizer;
pub mod params;
pub mod performance;
pub mod sample_data;
pub mod series;
pub mod storage;
pub mod strategy;
