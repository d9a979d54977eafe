//! worklog account command implementations.

use serde::Serialize;

use crate::account::{Account, AccountRegistry};
use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};

#[derive(Serialize)]
struct AccountListOutput {
    total: usize,
    selected: usize,
    accounts: Vec<Account>,
}

#[derive(Serialize)]
struct AccountChangeOutput {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    checked: Option<bool>,
}

pub fn run_add(mut ctx: Context, name: &str, email: &str, output: OutputOptions) -> Result<()> {
    let account = AccountRegistry::new(&mut ctx.settings).add_account(name, email)?;

    let mut human = HumanOutput::new(format!("Account {} added", account.name));
    human.push_summary("Email", account.email.clone());
    emit_success(output, "account add", &account, Some(&human))
}

pub fn run_rm(mut ctx: Context, name: &str, output: OutputOptions) -> Result<()> {
    AccountRegistry::new(&mut ctx.settings).remove_account(name)?;

    let human = HumanOutput::new(format!("Account {name} removed"));
    let data = AccountChangeOutput {
        name: name.to_string(),
        checked: None,
    };
    emit_success(output, "account rm", &data, Some(&human))
}

pub fn run_ls(mut ctx: Context, output: OutputOptions) -> Result<()> {
    let accounts = AccountRegistry::new(&mut ctx.settings).list_accounts();
    let selected = accounts.iter().filter(|account| account.checked).count();

    let mut human = HumanOutput::new("Accounts");
    human.push_summary("Total", accounts.len().to_string());
    human.push_summary("Selected", selected.to_string());
    for account in &accounts {
        human.push_detail(format!(
            "[{}] {} <{}>",
            if account.checked { "x" } else { " " },
            account.name,
            account.email
        ));
    }
    if accounts.is_empty() {
        human.push_next_step("worklog account add <name> <email>");
    }

    let data = AccountListOutput {
        total: accounts.len(),
        selected,
        accounts,
    };
    emit_success(output, "account ls", &data, Some(&human))
}

pub fn run_set_checked(
    mut ctx: Context,
    name: &str,
    checked: bool,
    output: OutputOptions,
) -> Result<()> {
    AccountRegistry::new(&mut ctx.settings).set_checked(name, checked)?;

    let (command, verb) = if checked {
        ("account check", "selected")
    } else {
        ("account uncheck", "deselected")
    };
    let human = HumanOutput::new(format!("Account {name} {verb}"));
    let data = AccountChangeOutput {
        name: name.to_string(),
        checked: Some(checked),
    };
    emit_success(output, command, &data, Some(&human))
}
