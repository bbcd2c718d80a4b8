//! CLI definitions for gdbt
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gdbt",
    version,
    about = "Declarative dashboard management tool for Grafana",
    long_about = "Defines Grafana dashboards and folders as templated code,\nplans the difference against the live instance and applies it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Args, Clone)]
pub struct ScopeArgs {
    /// Working directory with config.toml and templates
    #[arg(short, long, default_value = ".")]
    pub scope: String,

    /// Force re-evaluation of dynamic variables
    #[arg(short, long)]
    pub update: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get gdbt version
    Version,

    /// Validate the configuration and templates
    Validate {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Plan the changes
    Plan {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Apply the changes
    Apply {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        auto_approve: bool,
    },

    /// Remove every managed resource
    Destroy {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        auto_approve: bool,
    },
}
