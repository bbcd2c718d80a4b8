//! Core domain types: resources, persisted state, diffing and plans.
//!
//! Everything in here is pure data and pure logic; network access lives in
//! `infrastructure` and orchestration in `services`.

pub mod diff;
pub mod plan;
pub mod resource;
pub mod state;
