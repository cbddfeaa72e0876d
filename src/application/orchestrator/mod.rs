//! Request state machine: intent, tool choice, tool call, interpretation.

mod errors;
mod models;
mod runner;


pub use errors::{FailureKind, NavigationError};
pub use models::{NavigationState, Resolution, ToolStep};
pub use runner::Orchestrator;
