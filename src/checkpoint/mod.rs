//! Dataset persistence for resumable runs.
//!
//! Provides:
//! - `load_problems`: the problem corpus
//! - `DatasetStore`: load/save of a sample collection
//! - `CategoryStore`: load/save of problem category records
//! - `load_or_seed`: the evaluation working set, resumed or seeded
//! - `JsonFileStore`: whole-file JSON store with atomic replace and backup

mod store;

pub use store::*;
