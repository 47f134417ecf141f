pub mod chain;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod monitor;
pub mod proof;
pub mod recorder;
pub mod shutdown;
pub mod time;
