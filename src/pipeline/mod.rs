//! Pipeline module - generation, evaluation and classification pipelines.

mod classification;
mod evaluation;
mod generation;

pub use classification::*;
pub use evaluation::*;
pub use generation::*;
