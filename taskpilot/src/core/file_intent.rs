//! Literal file/folder creation requests parsed out of task text.
//!
//! Recognized phrasings (case-insensitive):
//! - `create a folder named X` / `create directory called X`
//! - `create a file named Y`
//! - `create a file named Y inside folder Z` (also `in the folder Z`)
//!
//! Names may be quoted. Anything that would escape the working directory is
//! dropped.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static FOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bcreate\s+(?:a\s+|an\s+|new\s+)*(?:folder|directory)\s+(?:named|called)\s+["'`]?([^\s"'`]+)"#,
    )
    .expect("folder pattern is valid")
});

static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bcreate\s+(?:a\s+|an\s+|new\s+)*file\s+(?:named|called)\s+["'`]?([^\s"'`]+)["'`]?(?:\s+(?:inside|in)\s+(?:the\s+)?(?:folder|directory)\s+(?:named\s+|called\s+)?["'`]?([^\s"'`]+))?"#,
    )
    .expect("file pattern is valid")
});

/// One non-destructive filesystem action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileIntent {
    CreateFolder(PathBuf),
    CreateFile(PathBuf),
}

impl FileIntent {
    pub fn path(&self) -> &Path {
        match self {
            FileIntent::CreateFolder(path) | FileIntent::CreateFile(path) => path,
        }
    }
}

/// Parse intents in order of appearance. Duplicates are dropped.
pub fn parse_file_intents(text: &str) -> Vec<FileIntent> {
    let mut found: Vec<(usize, FileIntent)> = Vec::new();

    for caps in FOLDER_RE.captures_iter(text) {
        let start = caps.get(0).map_or(0, |m| m.start());
        if let Some(path) = caps.get(1).and_then(|m| safe_relative(m.as_str())) {
            found.push((start, FileIntent::CreateFolder(path)));
        }
    }

    for caps in FILE_RE.captures_iter(text) {
        let start = caps.get(0).map_or(0, |m| m.start());
        let Some(name) = caps.get(1).and_then(|m| safe_relative(m.as_str())) else {
            continue;
        };
        let path = match caps.get(2).map(|m| safe_relative(m.as_str())) {
            Some(Some(folder)) => folder.join(name),
            Some(None) => continue,
            None => name,
        };
        found.push((start, FileIntent::CreateFile(path)));
    }

    found.sort_by_key(|(start, _)| *start);
    let mut intents: Vec<FileIntent> = Vec::new();
    for (_, intent) in found {
        if !intents.contains(&intent) {
            intents.push(intent);
        }
    }
    intents
}

/// Strip trailing sentence punctuation and reject paths leaving the workdir.
fn safe_relative(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
    if trimmed.is_empty() {
        return None;
    }
    let path = PathBuf::from(trimmed);
    let all_normal = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !all_normal || path.is_absolute() {
        return None;
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_folder_request() {
        let intents = parse_file_intents("Please create a folder named reports.");
        assert_eq!(
            intents,
            vec![FileIntent::CreateFolder(PathBuf::from("reports"))]
        );
    }

    #[test]
    fn parses_file_inside_folder() {
        let intents =
            parse_file_intents("Create a new file called \"notes.md\" inside the folder docs");
        assert_eq!(
            intents,
            vec![FileIntent::CreateFile(PathBuf::from("docs").join("notes.md"))]
        );
    }

    #[test]
    fn keeps_order_of_appearance() {
        let intents = parse_file_intents(
            "create file named a.txt then create directory called out and create file named b.txt in folder out",
        );
        assert_eq!(
            intents,
            vec![
                FileIntent::CreateFile(PathBuf::from("a.txt")),
                FileIntent::CreateFolder(PathBuf::from("out")),
                FileIntent::CreateFile(PathBuf::from("out").join("b.txt")),
            ]
        );
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(parse_file_intents("create a folder named ../etc").is_empty());
        assert!(parse_file_intents("create a file named /etc/passwd").is_empty());
        assert!(parse_file_intents("create a file named x.txt inside folder ../up").is_empty());
    }

    #[test]
    fn unrelated_text_yields_nothing() {
        assert!(parse_file_intents("refactor the login flow").is_empty());
        assert!(parse_file_intents("delete the folder named tmp").is_empty());
    }
}
