//! # Application Module
//!
//! Navigation logic on top of the tool host protocol client.
//!
//! ## Submodules
//!
//! - [`tooling`] - Transports, JSON-RPC session and tool catalogue
//! - [`ai`] - Intent extraction, tool choice and result interpretation
//! - [`context`] - Bounded conversation history and session facts
//! - [`orchestrator`] - Per-request state machine
//! - [`stdio`] - Line-oriented front end

pub mod ai;
pub mod context;
pub mod orchestrator;
pub mod stdio;
pub mod tooling;
