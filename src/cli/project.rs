//! worklog project command implementations.

use std::path::PathBuf;

use serde::Serialize;

use crate::branch::BranchRef;
use crate::cli::Context;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::project::{ProjectEntry, ProjectRegistry};

#[derive(Serialize)]
struct ProjectListOutput {
    total: usize,
    projects: Vec<ProjectEntry>,
}

#[derive(Serialize)]
struct BranchListOutput {
    project: String,
    branches: Vec<BranchOutput>,
}

#[derive(Serialize)]
struct BranchOutput {
    key: String,
    #[serde(flatten)]
    branch: BranchRef,
    checked: bool,
}

#[derive(Serialize)]
struct ProjectChangeOutput {
    name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    checked: Vec<String>,
}

pub fn run_add(mut ctx: Context, path: PathBuf, output: OutputOptions) -> Result<()> {
    let project = ProjectRegistry::new(&mut ctx.settings).add_project(&path)?;

    let mut human = HumanOutput::new(format!("Project {} added", project.name));
    human.push_summary("Path", project.path.display().to_string());
    human.push_next_step(format!("worklog project branches {}", project.name));
    emit_success(output, "project add", &project, Some(&human))
}

pub fn run_rm(mut ctx: Context, name: &str, output: OutputOptions) -> Result<()> {
    ProjectRegistry::new(&mut ctx.settings).remove_project(name)?;

    let human = HumanOutput::new(format!("Project {name} removed"));
    let data = ProjectChangeOutput {
        name: name.to_string(),
        checked: Vec::new(),
    };
    emit_success(output, "project rm", &data, Some(&human))
}

pub fn run_ls(mut ctx: Context, output: OutputOptions) -> Result<()> {
    let projects = ProjectRegistry::new(&mut ctx.settings).list_projects();

    let mut human = HumanOutput::new("Projects");
    human.push_summary("Total", projects.len().to_string());
    for project in &projects {
        let mut line = format!("{} {}", project.name, project.path.display());
        if !project.available {
            line.push_str(" [missing]");
        }
        if !project.checked.is_empty() {
            line.push_str(&format!(" ({} checked)", project.checked.len()));
        }
        human.push_detail(line);
    }
    if projects.is_empty() {
        human.push_next_step("worklog project add <path>");
    }

    let data = ProjectListOutput {
        total: projects.len(),
        projects,
    };
    emit_success(output, "project ls", &data, Some(&human))
}

pub fn run_branches(mut ctx: Context, name: &str, output: OutputOptions) -> Result<()> {
    let registry = ProjectRegistry::new(&mut ctx.settings);
    let project = registry.get(name)?;
    let branches = registry.branches(name)?;

    let mut human = HumanOutput::new(format!("Branches of {name}"));
    let branches: Vec<BranchOutput> = branches
        .into_iter()
        .map(|branch| {
            let key = branch.key();
            let checked = project.checked.contains(&key);
            human.push_detail(format!(
                "[{}] {} ({key})",
                if checked { "x" } else { " " },
                branch
            ));
            BranchOutput {
                key,
                branch,
                checked,
            }
        })
        .collect();

    let data = BranchListOutput {
        project: name.to_string(),
        branches,
    };
    emit_success(output, "project branches", &data, Some(&human))
}

pub fn run_check(
    mut ctx: Context,
    name: &str,
    keys: &[String],
    output: OutputOptions,
) -> Result<()> {
    let branches = keys
        .iter()
        .map(|key| {
            BranchRef::parse_key(key).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "invalid branch key '{key}' (expected local/<name> or remote/<remote>/<name>)"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut registry = ProjectRegistry::new(&mut ctx.settings);
    registry.set_checked(name, &branches)?;
    let project = registry.get(name)?;

    let mut human = HumanOutput::new(format!("Branch selection of {name} updated"));
    human.push_summary("Checked", project.checked.len().to_string());
    for key in &project.checked {
        human.push_detail(key.clone());
    }

    let data = ProjectChangeOutput {
        name: name.to_string(),
        checked: project.checked,
    };
    emit_success(output, "project check", &data, Some(&human))
}
