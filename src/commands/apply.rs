//! `gdbt apply`

use std::time::Instant;

use colored::Colorize;
use dialoguer::Confirm;

use crate::commands::{prepare, PlanContext};
use crate::error::Result;
use crate::infrastructure;
use crate::services::{planner, PlanExecutor};
use crate::ui;

pub async fn execute(scope: &str, update: bool, auto_approve: bool) -> Result<()> {
    let context = prepare(scope, update, false).await?;

    if !context.plan.has_changes() {
        println!("\n{}\n", "Dashboards are up to date!".bold().green());
        return Ok(());
    }

    println!("\n{}\n", "Pending changes:".bold());
    println!("{}\n", context.plan.render());

    if !auto_approve && !confirm()? {
        ui::print_info("Apply cancelled");
        return Ok(());
    }
    println!();

    run(&context).await
}

pub(crate) fn confirm() -> Result<bool> {
    Ok(Confirm::new()
        .with_prompt("Apply?")
        .default(false)
        .interact()
        .unwrap_or(false))
}

pub(crate) async fn run(context: &PlanContext) -> Result<()> {
    let store = infrastructure::state_store(
        &context.configuration.providers,
        &context.configuration.state.provider,
    )?;

    let current = planner::flatten(&context.current_groups);
    let desired = planner::flatten(&context.desired_groups);

    let start = Instant::now();
    let executor = PlanExecutor::new(
        &context.configuration.providers,
        &store,
        context.configuration.concurrency.threads,
        context.configuration.concurrency.timeout,
    );
    let applied = executor.execute(&context.plan, &current, &desired).await?;
    let duration = start.elapsed();

    println!(
        "\n{}\n",
        format!(
            "Done! Modified {} resources in {:.2} seconds.",
            applied,
            duration.as_secs_f64()
        )
        .bold()
        .green()
    );
    Ok(())
}
