//! Core data models for cpseval.
//!
//! - `category`: problem category classification records
//! - `config`: TOML configuration loaded once at startup
//! - `error`: error taxonomy and `Result` alias
//! - `sample`: problems, samples, verdicts and scored results

mod category;
mod config;
mod error;
mod sample;

pub use category::*;
pub use config::*;
pub use error::*;
pub use sample::*;
