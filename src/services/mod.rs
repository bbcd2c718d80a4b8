//! Orchestration services
//!
//! Each service wires domain logic to the infrastructure layer: resolving
//! stencils into desired resources, loading persisted and live state,
//! computing the plan and executing it.

pub mod executor;
pub mod loader;
pub mod planner;
pub mod resolver;

pub use executor::PlanExecutor;
pub use loader::{LiveLoader, StateReader};
pub use resolver::TemplateResolver;
