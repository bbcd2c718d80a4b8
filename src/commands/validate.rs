//! `gdbt validate`
//!
//! Loads the configuration and every stencil, then resolves them end to
//! end (evaluations included) without touching state or Grafana resources.

use std::path::PathBuf;

use colored::Colorize;

use crate::config;
use crate::error::Result;
use crate::services::TemplateResolver;
use crate::templating;
use crate::ui;

pub async fn execute(scope: &str, update: bool) -> Result<()> {
    let scope_path = PathBuf::from(scope);
    let spinner = ui::spinner("Loading config");
    let configuration = config::load(&scope_path)?;

    spinner.set_message("Loading templates");
    let stencils = templating::stencil::load(&scope_path)?;

    spinner.set_message("Resolving resources");
    let resolver = TemplateResolver::new(&configuration.providers, &scope_path, update);
    resolver.resolve_all(&stencils).await?;
    spinner.finish_and_clear();

    println!("\n{}\n", "Configuration is valid".bold().green());
    Ok(())
}
