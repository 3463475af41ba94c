#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Adaptive execution engine: one shared pattern store feeding a plan
//! builder, a predictive executor, and a pattern analyzer, so every completed
//! run improves the next plan.

/// Engine runtime wiring and the execution feedback loop.
#[path = "../main.rs"]
pub mod runtime;

pub use runtime::{CompletedExecution, EngineRuntime, EngineRuntimeBuilder};
