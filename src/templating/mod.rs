//! Stencils and template machinery
//!
//! A stencil is a user-authored YAML recipe for one or more Grafana
//! resources: a text template for the model, dynamic evaluations, static
//! lookups and an optional loop over a resolved variable.

pub mod evaluation;
pub mod path;
pub mod renderer;
pub mod stencil;

pub use evaluation::{Evaluation, EvaluationLock};
pub use stencil::{Stencil, StencilLoader};
