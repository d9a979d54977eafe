//! Registered projects and their branch selections.
//!
//! Each project is one key under the `projects` namespace of the settings
//! store, holding a JSON record with the repository path and the checked
//! branch keys (`local/<name>` or `remote/<remote>/<name>`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::branch::{self, BranchRef};
use crate::collect::{Project, ProjectMap};
use crate::error::{Error, Result};
use crate::git;
use crate::settings::{Namespace, SettingsStore};

pub const PROJECTS_NAMESPACE: &str = "projects";
pub const SETTINGS_NAMESPACE: &str = "settings";
pub const LAST_DIR_KEY: &str = "last_dir";

/// Persisted form of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub path: PathBuf,
    #[serde(default)]
    pub checked: Vec<String>,
    #[serde(default = "default_expanded")]
    pub expanded: bool,
}

fn default_expanded() -> bool {
    true
}

/// A registered project as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectEntry {
    pub name: String,
    pub path: PathBuf,
    pub checked: Vec<String>,
    pub expanded: bool,
    /// Whether the path still exists on disk.
    pub available: bool,
}

/// Project operations over a [`SettingsStore`].
pub struct ProjectRegistry<'a> {
    settings: &'a mut SettingsStore,
    ns: Namespace,
}

impl<'a> ProjectRegistry<'a> {
    pub fn new(settings: &'a mut SettingsStore) -> Self {
        Self {
            settings,
            ns: Namespace::new(PROJECTS_NAMESPACE),
        }
    }

    /// Register the repository at `path`, named after its final component.
    ///
    /// Re-adding a name replaces the stored path and clears its selection.
    pub fn add_project(&mut self, path: &Path) -> Result<ProjectEntry> {
        let path = absolute(path)?;
        git::discover_repo(&path)?;

        let name = project_name(&path)?;
        let record = ProjectRecord {
            path: path.clone(),
            checked: Vec::new(),
            expanded: true,
        };
        self.write(&name, &record)?;

        let parent = path.parent().unwrap_or(&path).to_string_lossy().into_owned();
        self.settings
            .set(&Namespace::new(SETTINGS_NAMESPACE), LAST_DIR_KEY, parent)?;

        debug!(project = %name, path = %path.display(), "project registered");
        Ok(entry(name, record))
    }

    pub fn remove_project(&mut self, name: &str) -> Result<()> {
        if !self.settings.contains(&self.ns, name) {
            return Err(Error::ProjectNotFound(name.to_string()));
        }
        self.settings.remove(&self.ns, name)
    }

    /// All projects, sorted by name. Records that fail to parse are skipped.
    pub fn list_projects(&self) -> Vec<ProjectEntry> {
        self.settings
            .child_keys(&self.ns)
            .into_iter()
            .filter_map(|name| match self.read(&name) {
                Ok(record) => Some(entry(name, record)),
                Err(err) => {
                    warn!(project = %name, error = %err, "skipping unreadable project");
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<ProjectEntry> {
        self.read(name).map(|record| entry(name.to_string(), record))
    }

    /// Selectable branches of a registered project.
    pub fn branches(&self, name: &str) -> Result<Vec<BranchRef>> {
        let record = self.read(name)?;
        branch::list_branches(&record.path)
    }

    /// Replace the checked branches of `name`.
    pub fn set_checked(&mut self, name: &str, branches: &[BranchRef]) -> Result<()> {
        let mut record = self.read(name)?;
        record.checked.clear();
        for key in branches.iter().map(BranchRef::key) {
            if !record.checked.contains(&key) {
                record.checked.push(key);
            }
        }
        self.write(name, &record)
    }

    pub fn set_expanded(&mut self, name: &str, expanded: bool) -> Result<()> {
        let mut record = self.read(name)?;
        record.expanded = expanded;
        self.write(name, &record)
    }

    /// Snapshot of checked branches per project, ready for a collection run.
    ///
    /// Projects whose path no longer exists or with nothing checked are left
    /// out. Remote branches become `<remote>/<name>` revisions.
    ///
    /// Projects come out sorted by name, the order the registry is loaded
    /// in, regardless of when each was added. Report dedup keeps the first
    /// group it sees, so this order decides which project a shared commit
    /// is attributed to.
    pub fn project_map(&self) -> ProjectMap {
        self.list_projects()
            .into_iter()
            .filter(|project| project.available)
            .filter_map(|project| {
                let branches: Vec<String> = project
                    .checked
                    .iter()
                    .filter_map(|key| {
                        let parsed = BranchRef::parse_key(key);
                        if parsed.is_none() {
                            warn!(project = %project.name, key = %key, "ignoring malformed branch key");
                        }
                        parsed
                    })
                    .map(|branch| branch.log_target())
                    .collect();
                if branches.is_empty() {
                    return None;
                }
                Some(Project {
                    name: project.name,
                    path: project.path,
                    branches,
                })
            })
            .collect()
    }

    fn read(&self, name: &str) -> Result<ProjectRecord> {
        let raw = self
            .settings
            .get_opt(&self.ns, name)
            .ok_or_else(|| Error::ProjectNotFound(name.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&mut self, name: &str, record: &ProjectRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.settings.set(&self.ns, name, json)
    }
}

fn entry(name: String, record: ProjectRecord) -> ProjectEntry {
    ProjectEntry {
        available: record.path.exists(),
        name,
        path: record.path,
        checked: record.checked,
        expanded: record.expanded,
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn project_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "cannot derive a project name from {}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_named(root: &TempDir, name: &str) -> PathBuf {
        let path = root.path().join(name);
        git2::Repository::init(&path).unwrap();
        path
    }

    #[test]
    fn add_uses_final_component_as_name() {
        let root = TempDir::new().unwrap();
        let path = repo_named(&root, "demo");
        let mut store = SettingsStore::in_memory();

        let added = ProjectRegistry::new(&mut store).add_project(&path).unwrap();
        assert_eq!(added.name, "demo");
        assert!(added.checked.is_empty());
        assert!(added.available);
        assert_eq!(
            store.get_opt(&Namespace::new(SETTINGS_NAMESPACE), LAST_DIR_KEY),
            Some(root.path().to_string_lossy().into_owned())
        );
    }

    #[test]
    fn add_rejects_non_repository() {
        let root = TempDir::new().unwrap();
        let plain = root.path().join("plain");
        std::fs::create_dir_all(&plain).unwrap();
        let mut store = SettingsStore::in_memory();

        // A temp dir may sit inside some enclosing repository; only assert
        // the error kind when discovery really fails.
        if git2::Repository::discover(&plain).is_err() {
            let err = ProjectRegistry::new(&mut store).add_project(&plain).unwrap_err();
            assert!(matches!(err, Error::NotARepo(_)));
        }
    }

    #[test]
    fn remove_unknown_project_fails() {
        let mut store = SettingsStore::in_memory();
        let err = ProjectRegistry::new(&mut store).remove_project("ghost").unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound(_)));
    }

    #[test]
    fn project_map_uses_checked_branches() {
        let root = TempDir::new().unwrap();
        let path = repo_named(&root, "demo");
        let mut store = SettingsStore::in_memory();
        let mut registry = ProjectRegistry::new(&mut store);
        registry.add_project(&path).unwrap();
        registry.add_project(&repo_named(&root, "idle")).unwrap();

        registry
            .set_checked(
                "demo",
                &[BranchRef::remote("origin", "main"), BranchRef::local("wip")],
            )
            .unwrap();

        let map = registry.project_map();
        assert_eq!(map.len(), 1);
        let demo = map.get("demo").unwrap();
        assert_eq!(demo.branches, vec!["origin/main", "wip"]);
        assert_eq!(demo.path, path);
    }

    #[test]
    fn project_map_is_sorted_by_name() {
        let root = TempDir::new().unwrap();
        let mut store = SettingsStore::in_memory();
        let mut registry = ProjectRegistry::new(&mut store);
        for name in ["zeta", "mid", "alpha"] {
            registry.add_project(&repo_named(&root, name)).unwrap();
            registry
                .set_checked(name, &[BranchRef::local("main")])
                .unwrap();
        }

        let map = registry.project_map();
        let names: Vec<&str> = map
            .iter()
            .map(|project| project.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn project_map_skips_missing_paths() {
        let mut store = SettingsStore::in_memory();
        let record = ProjectRecord {
            path: PathBuf::from("/definitely/not/here"),
            checked: vec!["local/main".to_string()],
            expanded: true,
        };
        store
            .set(
                &Namespace::new(PROJECTS_NAMESPACE),
                "gone",
                serde_json::to_string(&record).unwrap(),
            )
            .unwrap();

        let registry = ProjectRegistry::new(&mut store);
        assert!(registry.project_map().is_empty());
        assert!(!registry.get("gone").unwrap().available);
    }

    #[test]
    fn record_defaults_when_fields_missing() {
        let record: ProjectRecord = serde_json::from_str(r#"{"path":"/x"}"#).unwrap();
        assert!(record.checked.is_empty());
        assert!(record.expanded);
    }

    #[test]
    fn set_expanded_persists() {
        let root = TempDir::new().unwrap();
        let path = repo_named(&root, "demo");
        let mut store = SettingsStore::in_memory();
        let mut registry = ProjectRegistry::new(&mut store);
        registry.add_project(&path).unwrap();
        registry.set_expanded("demo", false).unwrap();
        assert!(!registry.get("demo").unwrap().expanded);
    }
}
