//! `gdbt plan`

use colored::Colorize;

use crate::commands::prepare;
use crate::error::Result;

pub async fn execute(scope: &str, update: bool) -> Result<()> {
    let context = prepare(scope, update, false).await?;

    if !context.plan.has_changes() {
        println!("\n{}\n", "Dashboards are up to date!".bold().green());
        return Ok(());
    }

    println!("\n{}\n", "Planned changes:".bold());
    println!("{}", context.plan.render());
    println!(
        "\nRun {} to apply these changes\n",
        "gdbt apply".bold().green()
    );
    Ok(())
}
