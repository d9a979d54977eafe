//! Commit-author accounts.
//!
//! An account name is what `git log --author` matches against; the email is
//! kept for display. Checked accounts form the author selection of a run.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::settings::{Namespace, SettingsStore};

pub const ACCOUNTS_NAMESPACE: &str = "accounts";

/// Persisted form of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_checked")]
    pub checked: bool,
}

fn default_checked() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub name: String,
    pub email: String,
    pub checked: bool,
}

/// Account operations over a [`SettingsStore`].
pub struct AccountRegistry<'a> {
    settings: &'a mut SettingsStore,
    ns: Namespace,
}

impl<'a> AccountRegistry<'a> {
    pub fn new(settings: &'a mut SettingsStore) -> Self {
        Self {
            settings,
            ns: Namespace::new(ACCOUNTS_NAMESPACE),
        }
    }

    /// Add (or replace) an account. New accounts start checked.
    pub fn add_account(&mut self, name: &str, email: &str) -> Result<Account> {
        let name = non_empty(name)
            .ok_or_else(|| Error::InvalidArgument("account name cannot be empty".to_string()))?;
        let email = non_empty(email)
            .ok_or_else(|| Error::InvalidArgument("account email cannot be empty".to_string()))?;
        if name.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "account name cannot contain '/': {name}"
            )));
        }
        if !is_valid_email(email) {
            return Err(Error::InvalidArgument(format!("invalid email address: {email}")));
        }

        let record = AccountRecord {
            email: email.to_string(),
            checked: true,
        };
        self.write(name, &record)?;
        debug!(account = %name, "account added");
        Ok(account(name.to_string(), record))
    }

    pub fn remove_account(&mut self, name: &str) -> Result<()> {
        if !self.settings.contains(&self.ns, name) {
            return Err(Error::AccountNotFound(name.to_string()));
        }
        self.settings.remove(&self.ns, name)
    }

    pub fn set_checked(&mut self, name: &str, checked: bool) -> Result<()> {
        let mut record = self.read(name)?;
        record.checked = checked;
        self.write(name, &record)
    }

    /// All accounts, sorted by name.
    pub fn list_accounts(&self) -> Vec<Account> {
        self.settings
            .child_keys(&self.ns)
            .into_iter()
            .filter_map(|name| match self.read(&name) {
                Ok(record) => Some(account(name, record)),
                Err(err) => {
                    warn!(account = %name, error = %err, "skipping unreadable account");
                    None
                }
            })
            .collect()
    }

    /// Names of checked accounts, in list order.
    pub fn selected_authors(&self) -> Vec<String> {
        self.list_accounts()
            .into_iter()
            .filter(|account| account.checked)
            .map(|account| account.name)
            .collect()
    }

    fn read(&self, name: &str) -> Result<AccountRecord> {
        let raw = self
            .settings
            .get_opt(&self.ns, name)
            .ok_or_else(|| Error::AccountNotFound(name.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&mut self, name: &str, record: &AccountRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.settings.set(&self.ns, name, json)
    }
}

fn account(name: String, record: AccountRecord) -> Account {
    Account {
        name,
        email: record.email,
        checked: record.checked,
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// `local@domain.tld`: one `@`, non-empty local part, and a dot inside the
/// domain with text on both sides.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match (domain.find('.'), domain.rfind('.')) {
        (Some(first), Some(last)) => first > 0 && last + 1 < domain.len(),
        _ => false,
    }
}
