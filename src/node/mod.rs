//! Node module - Startup wiring, RPC handlers, status, and leader catch-up

mod config;
mod orchestrator;
mod service;
mod status;
mod sync;

pub use config::*;
pub use orchestrator::*;
pub use service::*;
pub use status::*;
pub use sync::*;
