//! Command-line interface for worklog
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{self, Config};
use crate::error::Result;
use crate::output::OutputOptions;
use crate::settings::SettingsStore;

mod account;
mod collect;
mod project;
mod settings;

/// worklog - collect git history across repositories
///
/// Reads commits by the selected authors from the checked branches of every
/// registered project, groups them, and prints a report or an AI summary.
#[derive(Parser, Debug)]
#[command(name = "worklog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to worklog.toml (defaults to the worklog config directory)
    #[arg(long, global = true, env = "WORKLOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stream collection events as JSONL to a file, or "-" for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect commits and print the deduplicated log
    Collect(SelectionArgs),

    /// Collect commits and summarize them with the configured AI model
    Report {
        #[command(flatten)]
        selection: SelectionArgs,

        /// System prompt override for this report
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Registered repositories and their branch selection
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Commit-author accounts
    #[command(subcommand)]
    Account(AccountCommands),

    /// AI settings
    #[command(subcommand)]
    Settings(SettingsCommands),
}

/// Time window and author selection shared by `collect` and `report`.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Named period: today, yesterday, this-week, last-week, this-month,
    /// last-month, this-quarter, last-quarter, first-half, second-half, this-year
    #[arg(short, long, conflicts_with_all = ["since", "until"])]
    pub period: Option<String>,

    /// First day of a custom window (YYYY-MM-DD)
    #[arg(long, requires = "until")]
    pub since: Option<String>,

    /// Last day of a custom window (YYYY-MM-DD)
    #[arg(long, requires = "since")]
    pub until: Option<String>,

    /// Author to include (repeatable); overrides the checked accounts
    #[arg(short, long = "author")]
    pub authors: Vec<String>,

    /// Maximum concurrent git invocations
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,
}

/// Project subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Register a repository
    Add {
        /// Path inside the repository
        path: PathBuf,
    },

    /// Forget a project
    Rm {
        /// Project name
        name: String,
    },

    /// List registered projects
    Ls,

    /// List the selectable branches of a project
    Branches {
        /// Project name
        name: String,
    },

    /// Replace the checked branches of a project
    Check {
        /// Project name
        name: String,

        /// Branch keys: local/<name> or remote/<remote>/<name>
        branches: Vec<String>,
    },
}

/// Account subcommands
#[derive(Subcommand, Debug)]
pub enum AccountCommands {
    /// Add an account (checked by default)
    Add {
        /// Author name as matched by git log --author
        name: String,

        /// Email address
        email: String,
    },

    /// Remove an account
    Rm {
        /// Account name
        name: String,
    },

    /// List accounts
    Ls,

    /// Include an account in collections
    Check {
        /// Account name
        name: String,
    },

    /// Exclude an account from collections
    Uncheck {
        /// Account name
        name: String,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show the effective AI settings
    Show,

    /// Set one setting: key, address, model or prompt
    Set {
        /// Setting name
        key: String,

        /// New value
        value: String,
    },

    /// Check that the API key is accepted
    Verify,
}

/// Loaded configuration and settings shared by command handlers.
pub(crate) struct Context {
    pub config: Config,
    pub settings: SettingsStore,
}

impl Context {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load(&path)?,
            None => Config::load_or_default(&config::default_config_path()?)?,
        };
        let settings = SettingsStore::open(config::settings_path()?)?;
        Ok(Self { config, settings })
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Collect(selection) => collect::run_collect(collect::CollectOptions {
                selection,
                config: self.config,
                events: self.events,
                output,
            }),
            Commands::Report { selection, prompt } => {
                collect::run_report(collect::ReportOptions {
                    collect: collect::CollectOptions {
                        selection,
                        config: self.config,
                        events: self.events,
                        output,
                    },
                    prompt,
                })
            }
            Commands::Project(cmd) => {
                let ctx = Context::load(self.config)?;
                match cmd {
                    ProjectCommands::Add { path } => project::run_add(ctx, path, output),
                    ProjectCommands::Rm { name } => project::run_rm(ctx, &name, output),
                    ProjectCommands::Ls => project::run_ls(ctx, output),
                    ProjectCommands::Branches { name } => {
                        project::run_branches(ctx, &name, output)
                    }
                    ProjectCommands::Check { name, branches } => {
                        project::run_check(ctx, &name, &branches, output)
                    }
                }
            }
            Commands::Account(cmd) => {
                let ctx = Context::load(self.config)?;
                match cmd {
                    AccountCommands::Add { name, email } => {
                        account::run_add(ctx, &name, &email, output)
                    }
                    AccountCommands::Rm { name } => account::run_rm(ctx, &name, output),
                    AccountCommands::Ls => account::run_ls(ctx, output),
                    AccountCommands::Check { name } => {
                        account::run_set_checked(ctx, &name, true, output)
                    }
                    AccountCommands::Uncheck { name } => {
                        account::run_set_checked(ctx, &name, false, output)
                    }
                }
            }
            Commands::Settings(cmd) => {
                let ctx = Context::load(self.config)?;
                match cmd {
                    SettingsCommands::Show => settings::run_show(ctx, output),
                    SettingsCommands::Set { key, value } => {
                        settings::run_set(ctx, &key, value, output)
                    }
                    SettingsCommands::Verify => settings::run_verify(ctx, output),
                }
            }
        }
    }
}
