#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Execution planning subsystem: turns a classified request into a
//! dependency-aware plan of runnable steps, consulting execution history for
//! adaptation hints.

/// Steps, plans, intents, and structural errors.
#[path = "../module.rs"]
pub mod module;

/// Domain-exclusive trigger keyword table.
#[path = "../keywords.rs"]
pub mod keywords;

/// Reference validation and cycle-safe topological ordering.
#[path = "../order.rs"]
pub mod order;

/// Per-intent step generation.
#[path = "../builder.rs"]
pub mod builder;

/// Planning runtime orchestration entry points.
#[path = "../main.rs"]
pub mod planning_entry;

/// Telemetry helpers for planning.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use builder::PlanBuilder;
pub use keywords::TriggerTable;
pub use module::{
    ExecutionPlan, ExecutionStep, PlanError, RequestIntent, RetryPolicy, StepKind,
    STEPS_PER_SECOND,
};
pub use order::validate_and_order;
pub use planning_entry::PlanningRuntime;
pub use telemetry::{PlanningTelemetry, PlanningTelemetryBuilder};
