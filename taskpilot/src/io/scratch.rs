//! Per-execution scratch files for terminal sessions.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::core::script::{ScriptKind, sanitize_file_stem};

const SUFFIX_LEN: usize = 8;
const MAX_ATTEMPTS: usize = 16;

/// Prompt and launcher script written for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchFiles {
    pub stem: String,
    pub prompt_path: PathBuf,
    pub script_path: PathBuf,
}

/// `<sanitized task id>-<random suffix>`.
pub fn unique_stem(task_id: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", sanitize_file_stem(task_id), suffix.to_ascii_lowercase())
}

/// Reserve a fresh prompt/script pair under `dir`.
///
/// Both files are created with `create_new`, so two executions can never share
/// a path even if the random suffixes collided.
pub fn reserve(dir: &Path, task_id: &str, kind: ScriptKind) -> Result<ScratchFiles> {
    fs::create_dir_all(dir).with_context(|| format!("create scratch dir {}", dir.display()))?;
    for _ in 0..MAX_ATTEMPTS {
        let stem = unique_stem(task_id);
        let prompt_path = dir.join(format!("{stem}.prompt.md"));
        let script_path = dir.join(format!("{stem}.{}", kind.extension()));
        match create_new(&prompt_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("create {}", prompt_path.display()));
            }
        }
        match create_new(&script_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&prompt_path);
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("create {}", script_path.display()));
            }
        }
        return Ok(ScratchFiles {
            stem,
            prompt_path,
            script_path,
        });
    }
    Err(anyhow!(
        "could not reserve unique scratch files in {} after {MAX_ATTEMPTS} attempts",
        dir.display()
    ))
}

/// Overwrite a reserved scratch file.
pub fn write(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("open scratch file {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write scratch file {}", path.display()))
}

fn create_new(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn stems_are_prefixed_by_sanitized_id() {
        let stem = unique_stem("task/1");
        assert!(stem.starts_with("task_1-"));
        assert_eq!(stem.len(), "task_1-".len() + SUFFIX_LEN);
    }

    #[test]
    fn reservations_never_collide() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut scripts = HashSet::new();
        for _ in 0..50 {
            let files = reserve(temp.path(), "same-id", ScriptKind::Posix).expect("reserve");
            assert!(files.prompt_path.exists());
            assert!(files.script_path.extension().is_some_and(|e| e == "sh"));
            assert!(scripts.insert(files.script_path));
        }
    }

    #[test]
    fn write_replaces_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let files = reserve(temp.path(), "t", ScriptKind::WindowsCmd).expect("reserve");
        write(&files.script_path, "first version").expect("write");
        write(&files.script_path, "second").expect("write");
        assert_eq!(fs::read_to_string(&files.script_path).unwrap(), "second");
    }
}
