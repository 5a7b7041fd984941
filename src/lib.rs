pub mod analysis;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod query;
pub mod stats;
