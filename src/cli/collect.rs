//! worklog collect / report command implementations.

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::account::AccountRegistry;
use crate::ai::{ChatClient, ChatSettings};
use crate::cli::{Context, SelectionArgs};
use crate::collect::{
    validate_selection, CollectObserver, Collector, ObserverSet, Progress, RunSummary,
};
use crate::error::Result;
use crate::events::{EventDestination, EventObserver};
use crate::git::GitCli;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::period::{Clock, Period, SystemClock, TimeWindow};
use crate::project::{ProjectRegistry, SETTINGS_NAMESPACE};
use crate::report::{self, ReportGroup};
use crate::scheduler::Scheduler;
use crate::settings::{Namespace, SettingsStore};

/// Settings key remembering the last named period.
pub const PERIOD_SETTING: &str = "period";

pub struct CollectOptions {
    pub selection: SelectionArgs,
    pub config: Option<PathBuf>,
    pub events: Option<String>,
    pub output: OutputOptions,
}

pub struct ReportOptions {
    pub collect: CollectOptions,
    pub prompt: Option<String>,
}

#[derive(Serialize)]
struct WindowOutput {
    since: String,
    until: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    period: Option<Period>,
}

#[derive(Serialize)]
struct CollectOutput {
    window: WindowOutput,
    tasks: usize,
    commits: usize,
    groups: Vec<ReportGroup>,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct ReportOutput {
    window: WindowOutput,
    commits: usize,
    summary: String,
    errors: Vec<String>,
}

struct Collected {
    window: WindowOutput,
    run: RunSummary,
    groups: Vec<ReportGroup>,
}

pub fn run_collect(options: CollectOptions) -> Result<()> {
    let mut ctx = Context::load(options.config.clone())?;
    let collected = collect(&mut ctx, &options)?;

    let commits = report::unique_commit_count(&collected.groups);
    let mut human = HumanOutput::new(format!(
        "Collected {commits} commits in {} groups",
        collected.groups.len()
    ));
    human.set_body(report::render_plain(&collected.groups));
    push_window_summary(&mut human, &collected);
    for error in &collected.run.errors {
        human.push_warning(error.clone());
    }

    let output = CollectOutput {
        window: collected.window,
        tasks: collected.run.progress.total,
        commits,
        groups: collected.groups,
        errors: collected.run.errors,
    };
    emit_success(options.output, "collect", &output, Some(&human))
}

pub fn run_report(options: ReportOptions) -> Result<()> {
    let mut ctx = Context::load(options.collect.config.clone())?;
    let collected = collect(&mut ctx, &options.collect)?;

    let chat = ChatSettings::resolve(&ctx.config.ai, &ctx.settings);
    let prompt = options.prompt.clone().unwrap_or_else(|| chat.prompt.clone());
    let client = ChatClient::new(chat);
    let summary = report::summarize(&client, &prompt, &collected.groups)?;

    let mut human = HumanOutput::new("Work report");
    human.set_body(summary.clone());
    push_window_summary(&mut human, &collected);
    for error in &collected.run.errors {
        human.push_warning(error.clone());
    }

    let output = ReportOutput {
        commits: report::unique_commit_count(&collected.groups),
        window: collected.window,
        summary,
        errors: collected.run.errors,
    };
    emit_success(options.collect.output, "report", &output, Some(&human))
}

fn push_window_summary(human: &mut HumanOutput, collected: &Collected) {
    let window = &collected.window;
    let label = match window.period {
        Some(period) => format!("{} ({} .. {})", period, window.since, window.until),
        None => format!("{} .. {}", window.since, window.until),
    };
    human.push_summary("Window", label);
    human.push_summary("Tasks", collected.run.progress.total.to_string());
    human.push_summary("Failed", collected.run.errors.len().to_string());
}

fn collect(ctx: &mut Context, options: &CollectOptions) -> Result<Collected> {
    let projects = ProjectRegistry::new(&mut ctx.settings).project_map();
    let authors = if options.selection.authors.is_empty() {
        AccountRegistry::new(&mut ctx.settings).selected_authors()
    } else {
        options.selection.authors.clone()
    };
    validate_selection(&projects, &authors)?;

    let (window, period) = resolve_window(&options.selection, &mut ctx.settings, &SystemClock)?;

    let collect_config = &ctx.config.collect;
    let invoker = Arc::new(GitCli::new(
        collect_config.git_binary.clone(),
        collect_config.git_timeout(),
    ));
    let scheduler = Scheduler::new(
        options
            .selection
            .concurrency
            .or(collect_config.max_concurrency),
    )?;

    let mut observers = ObserverSet::new();
    if let Some(destination) = EventDestination::parse(options.events.as_deref()) {
        observers = observers.with(Arc::new(EventObserver::new(destination.open()?)));
    }
    if !options.output.json && !options.output.quiet {
        observers = observers.with(Arc::new(ProgressObserver::new()));
    }

    let collector = Collector::new(invoker, scheduler, Arc::new(observers))?;
    let run = collector.start(&projects, &authors, &window)?.wait();
    let groups = report::dedup_groups(&run.logs);

    Ok(Collected {
        window: WindowOutput {
            since: window.since_arg(),
            until: window.until_arg(),
            period,
        },
        run,
        groups,
    })
}

/// Custom dates win; otherwise the given period, the remembered one, or today.
///
/// An explicitly chosen period is remembered for the next run.
fn resolve_window(
    selection: &SelectionArgs,
    settings: &mut SettingsStore,
    clock: &dyn Clock,
) -> Result<(TimeWindow, Option<Period>)> {
    if let (Some(since), Some(until)) = (&selection.since, &selection.until) {
        return Ok((TimeWindow::parse_dates(since, until)?, None));
    }

    let ns = Namespace::new(SETTINGS_NAMESPACE);
    let period = match selection.period.as_deref() {
        Some(raw) => {
            let period: Period = raw.parse()?;
            settings.set(&ns, PERIOD_SETTING, period.as_str())?;
            period
        }
        None => settings
            .get_opt(&ns, PERIOD_SETTING)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Period::Today),
    };
    Ok((period.resolve(clock)?, Some(period)))
}

/// Renders collection progress on stderr.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message("Collecting logs");
        Self { bar }
    }
}

impl CollectObserver for ProgressObserver {
    fn on_progress(&self, progress: Progress) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.completed as u64);
    }

    fn on_finished(&self) {
        self.bar.finish_and_clear();
    }
}
