//! Command implementations
//!
//! Every subcommand is an `execute` function in its own module. The shared
//! reconciliation pipeline (config → stencils → desired set → persisted
//! state → live state → plan) lives here.

pub mod apply;
pub mod destroy;
pub mod plan;
pub mod validate;
pub mod version;

use std::path::PathBuf;

use crate::config::{self, Configuration};
use crate::domain::plan::Plan;
use crate::error::Result;
use crate::infrastructure;
use crate::services::loader::{prune_empty_groups, LiveLoader, StateReader};
use crate::services::resolver::ResourceGroups;
use crate::services::{planner, TemplateResolver};
use crate::templating;
use crate::ui;

/// Everything a plan-shaped command needs
pub struct PlanContext {
    pub configuration: Configuration,
    pub current_groups: ResourceGroups,
    pub desired_groups: ResourceGroups,
    pub plan: Plan,
}

/// Run the full pipeline up to the computed plan. With `destroy` set the
/// desired set is empty, so every managed resource plans as a removal.
pub async fn prepare(scope: &str, update: bool, destroy: bool) -> Result<PlanContext> {
    let scope_path = PathBuf::from(scope);
    let spinner = ui::spinner("Loading config");
    let configuration = config::load(&scope_path)?;

    let desired_groups = if destroy {
        ResourceGroups::new()
    } else {
        spinner.set_message("Loading templates");
        let stencils = templating::stencil::load(&scope_path)?;

        spinner.set_message("Resolving resources");
        let resolver = TemplateResolver::new(&configuration.providers, &scope_path, update);
        resolver.resolve_all(&stencils).await?
    };

    spinner.set_message("Loading state");
    let store = infrastructure::state_store(
        &configuration.providers,
        &configuration.state.provider,
    )?;
    let states = StateReader::new(&store).load_all().await?;

    spinner.set_message("Loading live resources");
    let live_loader = LiveLoader::new(
        &configuration.providers,
        configuration.concurrency.threads,
        configuration.concurrency.timeout,
    );
    let mut current_groups = live_loader.load(&states).await?;
    prune_empty_groups(&mut current_groups);

    spinner.set_message("Preparing the plan");
    let plan = planner::compute(&current_groups, &desired_groups);
    spinner.finish_and_clear();

    Ok(PlanContext {
        configuration,
        current_groups,
        desired_groups,
        plan,
    })
}
