pub mod classifier;
pub mod config;
pub mod data;
pub mod xlsx;
