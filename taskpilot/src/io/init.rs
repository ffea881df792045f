//! Initialization helpers for `.taskpilot/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::config::{OrchestratorConfig, load_config, write_config};
use super::task_store::JsonTaskStore;

const GITIGNORE: &str = "scratch/\n*.tmp\n";

/// All canonical paths within `.taskpilot/` for a project root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub tasks_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".taskpilot");
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            gitignore_path: state_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            tasks_path: state_dir.join("tasks.json"),
        }
    }

    pub fn load_config(&self) -> Result<OrchestratorConfig> {
        load_config(&self.config_path)
    }

    pub fn scratch_dir(&self, cfg: &OrchestratorConfig) -> PathBuf {
        cfg.scratch_dir(&self.root)
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing taskpilot-owned files.
    pub force: bool,
}

/// Create `.taskpilot/` with a default config, an empty task file and a `.gitignore`.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<WorkspacePaths> {
    let paths = WorkspacePaths::new(root);
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create {}", paths.state_dir.display()))?;

    if options.force || !paths.config_path.exists() {
        write_config(&paths.config_path, &OrchestratorConfig::default())?;
    }
    JsonTaskStore::new(&paths.tasks_path).init(options.force)?;
    if options.force || !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, GITIGNORE)
            .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::task_store::TaskRepository;
    use crate::task::TaskFilter;

    #[test]
    fn init_creates_scaffold() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
        assert!(paths.config_path.exists());
        assert!(paths.tasks_path.exists());
        let gitignore = fs::read_to_string(&paths.gitignore_path).expect("gitignore");
        assert!(gitignore.lines().any(|l| l == "scratch/"));
        assert_eq!(paths.load_config().expect("config"), OrchestratorConfig::default());
    }

    #[test]
    fn init_without_force_keeps_existing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.config_path, "simulated = true\n").expect("edit config");

        init_workspace(temp.path(), &InitOptions { force: false }).expect("re-init");
        assert!(paths.load_config().expect("config").simulated);

        init_workspace(temp.path(), &InitOptions { force: true }).expect("force");
        assert!(!paths.load_config().expect("config").simulated);
        let store = JsonTaskStore::new(&paths.tasks_path);
        assert!(store.list(&TaskFilter::all()).expect("list").is_empty());
    }
}
