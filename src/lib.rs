//! worklog - collect git history across repositories into work reports
//!
//! This library provides the core functionality for the `worklog` CLI:
//! running `git log` for every selected project × branch × author on a
//! bounded worker pool, aggregating the results, and turning them into a
//! deduplicated report or an AI-written summary.
//!
//! # Modules
//!
//! - [`collect`]: Collection runs, grouped results and observer notifications
//! - [`scheduler`]: Bounded-concurrency worker pool
//! - [`task`]: A single log task: branch resolution, `git log`, parsing
//! - [`git`]: Subprocess invocation and repository discovery
//! - [`branch`]: Branch references and remote-branch resolution
//! - [`log_parser`]: Parsing `git log` output into commit records
//! - [`period`]: Named periods and time windows
//! - [`report`]: Deduplicated rendering and summaries
//! - [`project`], [`account`]: Persisted selections
//! - [`settings`], [`config`]: Namespaced settings store and TOML config
//! - [`ai`]: Chat-completion client
//! - [`events`], [`output`]: JSONL events and CLI output formatting
//! - [`error`]: Error types and exit codes

pub mod account;
pub mod ai;
pub mod branch;
pub mod cli;
pub mod collect;
pub mod config;
pub mod error;
pub mod events;
pub mod git;
pub mod lock;
pub mod log_parser;
pub mod output;
pub mod period;
pub mod project;
pub mod report;
pub mod scheduler;
pub mod settings;
pub mod task;

pub use error::{Error, Result};
