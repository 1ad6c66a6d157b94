//! Backend clients: HTTP transport, pacing, provider adapters and the
//! model factory.

mod backend;
mod llm_client;
mod rate_limiter;
mod registry;

pub use backend::*;
pub use llm_client::*;
pub use rate_limiter::*;
pub use registry::*;
