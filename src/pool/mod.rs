//! Judge ensemble and prompt construction.

mod judge;
mod prompts;

pub use judge::*;
pub use prompts::*;
