//! Task repository contract and its in-memory and JSON-file implementations.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::task::{NewTask, Task, TaskFilter, TaskPatch};

const TASKS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/tasks.v1.schema.json"
));
const TASK_FILE_VERSION: u32 = 1;

/// Storage contract the orchestrator works through.
///
/// `list` returns tasks in storage order; selection relies on that order for
/// tie-breaking.
pub trait TaskRepository: Send + Sync {
    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
    fn get(&self, id: &str) -> Result<Option<Task>>;
    fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task>;
    fn create(&self, input: NewTask) -> Result<Task>;
}

/// Volatile repository, mostly for tests and simulated runs.
#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<Vec<Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Task>>> {
        self.tasks
            .lock()
            .map_err(|_| anyhow!("task repository lock poisoned"))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.lock()?;
        Ok(tasks.iter().filter(|t| filter.matches(t)).cloned().collect())
    }

    fn get(&self, id: &str) -> Result<Option<Task>> {
        let tasks = self.lock()?;
        Ok(tasks.iter().find(|t| t.id == id).cloned())
    }

    fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        let mut tasks = self.lock()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow!("task '{id}' not found"))?;
        patch.apply(task);
        Ok(task.clone())
    }

    fn create(&self, input: NewTask) -> Result<Task> {
        let task = input.into_task(Uuid::new_v4().to_string());
        self.lock()?.push(task.clone());
        Ok(task)
    }
}

/// On-disk layout of the task file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TaskFile {
    version: u32,
    tasks: Vec<Task>,
}

impl Default for TaskFile {
    fn default() -> Self {
        Self {
            version: TASK_FILE_VERSION,
            tasks: Vec::new(),
        }
    }
}

/// Repository backed by a JSON file.
///
/// Every call re-reads the file, so edits made by an external agent are seen
/// on the next read. Writes go through a unique temp file + rename, and
/// read-modify-write cycles hold an exclusive lock on a sibling `.lock` file so
/// concurrent processes do not lose each other's updates.
#[derive(Debug)]
pub struct JsonTaskStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty task file if none exists (or unconditionally with `force`).
    pub fn init(&self, force: bool) -> Result<()> {
        if !force && self.path.exists() {
            return Ok(());
        }
        write_task_file(&self.path, &TaskFile::default())
    }

    fn load(&self) -> Result<TaskFile> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "task file missing, starting empty");
            return Ok(TaskFile::default());
        }
        load_task_file(&self.path)
    }

    fn modify<T>(&self, f: impl FnOnce(&mut TaskFile) -> Result<T>) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("task store lock poisoned"))?;
        let _file_lock = lock_task_file(&self.path)?;
        let mut file = self.load()?;
        let value = f(&mut file)?;
        write_task_file(&self.path, &file)?;
        Ok(value)
    }
}

impl TaskRepository for JsonTaskStore {
    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let file = self.load()?;
        Ok(file.tasks.into_iter().filter(|t| filter.matches(t)).collect())
    }

    fn get(&self, id: &str) -> Result<Option<Task>> {
        let file = self.load()?;
        Ok(file.tasks.into_iter().find(|t| t.id == id))
    }

    fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        self.modify(|file| {
            let task = file
                .tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow!("task '{id}' not found in {}", self.path.display()))?;
            patch.apply(task);
            Ok(task.clone())
        })
    }

    fn create(&self, input: NewTask) -> Result<Task> {
        self.modify(|file| {
            let task = input.into_task(Uuid::new_v4().to_string());
            file.tasks.push(task.clone());
            Ok(task)
        })
    }
}

/// Exclusive lock on `<task file>.lock`, released when the handle drops.
///
/// Serializes read-modify-write cycles across processes sharing the task file.
fn lock_task_file(path: &Path) -> Result<File> {
    let lock_path = path.with_extension("json.lock");
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("open lock file {}", lock_path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("lock {}", lock_path.display()))?;
    Ok(file)
}

/// Load and validate a task file (schema + unique ids).
fn load_task_file(path: &Path) -> Result<TaskFile> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read task file {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse task file {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate {}", path.display()))?;
    let file: TaskFile = serde_json::from_value(value)
        .with_context(|| format!("deserialize task file {}", path.display()))?;
    validate_unique_ids(&file.tasks)?;
    Ok(file)
}

fn write_task_file(path: &Path, file: &TaskFile) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("task file path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(file).context("serialize task file")?;
    buf.push('\n');
    // Unique per write: other processes may be replacing the same file.
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp task file in {}", parent.display()))?;
    tmp.write_all(buf.as_bytes())
        .with_context(|| format!("write temp task file {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace task file {}", path.display()))?;
    Ok(())
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TASKS_SCHEMA).context("parse embedded task schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "task file schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_unique_ids(tasks: &[Task]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    let duplicates: Vec<&str> = tasks
        .iter()
        .filter(|t| !seen.insert(t.id.as_str()))
        .map(|t| t.id.as_str())
        .collect();
    if duplicates.is_empty() {
        return Ok(());
    }
    Err(anyhow!("duplicate task ids: {}", duplicates.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn new_task(title: &str, approved: bool) -> NewTask {
        NewTask {
            title: title.to_string(),
            priority: 1,
            human_approved: approved,
            ..NewTask::default()
        }
    }

    #[test]
    fn json_store_create_update_list() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonTaskStore::new(temp.path().join("tasks.json"));
        store.init(false).expect("init");

        let a = store.create(new_task("a", true)).expect("create a");
        let b = store.create(new_task("b", false)).expect("create b");
        assert_ne!(a.id, b.id);

        let updated = store
            .update(&a.id, &TaskPatch::status(TaskStatus::InProgress))
            .expect("update");
        assert_eq!(updated.status, TaskStatus::InProgress);

        let reloaded = JsonTaskStore::new(store.path());
        let titles: Vec<String> = reloaded
            .list(&TaskFilter::all())
            .expect("list")
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["a", "b"]);
        let pending = reloaded
            .list(&TaskFilter::with_status(TaskStatus::Pending))
            .expect("list pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }

    #[test]
    fn json_store_sees_external_edits() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        let store = JsonTaskStore::new(&path);
        let task = store.create(new_task("external", true)).expect("create");

        let raw = fs::read_to_string(&path).expect("read");
        fs::write(&path, raw.replace("\"PENDING\"", "\"COMPLETED\"")).expect("edit");

        let seen = store.get(&task.id).expect("get").expect("present");
        assert_eq!(seen.status, TaskStatus::Completed);
    }

    #[test]
    fn json_store_rejects_schema_violations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        fs::write(
            &path,
            r#"{"version":1,"tasks":[{"id":"x","title":"t","priority":7,"status":"PENDING"}]}"#,
        )
        .expect("write");
        let err = JsonTaskStore::new(&path)
            .list(&TaskFilter::all())
            .unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn json_store_rejects_duplicate_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        fs::write(
            &path,
            r#"{"version":1,"tasks":[
                {"id":"x","title":"a","priority":0,"status":"PENDING"},
                {"id":"x","title":"b","priority":0,"status":"PENDING"}]}"#,
        )
        .expect("write");
        let err = JsonTaskStore::new(&path).get("x").unwrap_err();
        assert!(err.to_string().contains("duplicate task ids: x"));
    }

    #[test]
    fn separate_stores_do_not_lose_concurrent_updates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        let seed = JsonTaskStore::new(&path);
        let ids: Vec<String> = (0..8)
            .map(|i| seed.create(new_task(&format!("t{i}"), true)).expect("create").id)
            .collect();

        // One store per thread, so only the file lock orders the writes.
        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let path = path.clone();
                std::thread::spawn(move || {
                    JsonTaskStore::new(path)
                        .update(&id, &TaskPatch::status(TaskStatus::Completed))
                        .expect("update")
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }

        let tasks = seed.list(&TaskFilter::all()).expect("list");
        assert_eq!(tasks.len(), ids.len());
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn in_memory_update_of_missing_task_errors() {
        let repo = InMemoryTaskRepository::new();
        let err = repo
            .update("nope", &TaskPatch::status(TaskStatus::Completed))
            .unwrap_err();
        assert!(err.to_string().contains("'nope' not found"));
    }
}
