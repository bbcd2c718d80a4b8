//! `gdbt destroy`
//!
//! Plans against an empty desired set, so every resource the state knows
//! about is removed (dashboards first, then their folders).

use colored::Colorize;

use crate::commands::{apply, prepare};
use crate::error::Result;
use crate::ui;

pub async fn execute(scope: &str, auto_approve: bool) -> Result<()> {
    let context = prepare(scope, false, true).await?;

    if !context.plan.has_changes() {
        println!("\n{}\n", "Nothing to destroy!".bold().green());
        return Ok(());
    }

    println!("\n{}\n", "Resources to be destroyed:".bold());
    println!("{}\n", context.plan.render());

    if !auto_approve && !apply::confirm()? {
        ui::print_info("Destroy cancelled");
        return Ok(());
    }
    println!();

    apply::run(&context).await
}
