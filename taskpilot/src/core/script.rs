//! Launcher script rendering for terminal sessions.
//!
//! Rendering is pure: callers decide where the script lands and how it is
//! started. The prompt itself lives in a sibling file so the script never has
//! to embed arbitrary multi-line text inside shell quoting.

use std::path::Path;

use crate::task::Task;

/// Script dialect for the target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Posix,
    WindowsCmd,
}

impl ScriptKind {
    pub fn extension(self) -> &'static str {
        match self {
            ScriptKind::Posix => "sh",
            ScriptKind::WindowsCmd => "cmd",
        }
    }
}

/// Everything a launcher script needs.
#[derive(Debug, Clone)]
pub struct ScriptInputs<'a> {
    pub task: &'a Task,
    pub workdir: &'a Path,
    pub prompt_path: &'a Path,
    pub command: &'a str,
    pub args: &'a [String],
}

/// Human-readable lines shown at the top of the terminal session.
pub fn task_summary_lines(task: &Task) -> Vec<String> {
    let mut lines = vec![
        format!("Task:     {}", task.title),
        format!("Id:       {}", task.id),
        format!("Priority: {} ({})", task.priority_label(), task.priority),
    ];
    if let Some(category) = task.category.as_deref().filter(|c| !c.trim().is_empty()) {
        lines.push(format!("Category: {category}"));
    }
    if !task.affected_files.is_empty() {
        lines.push(format!("Files:    {}", task.affected_files.join(", ")));
    }
    lines
}

pub fn render_script(kind: ScriptKind, inputs: &ScriptInputs<'_>) -> String {
    match kind {
        ScriptKind::Posix => render_posix(inputs),
        ScriptKind::WindowsCmd => render_windows_cmd(inputs),
    }
}

fn render_posix(inputs: &ScriptInputs<'_>) -> String {
    let mut out = String::new();
    out.push_str("#!/bin/sh\n");
    out.push_str(&format!(
        "cd {} || exit 1\n",
        sh_quote(&inputs.workdir.to_string_lossy())
    ));
    out.push_str("printf '%s\\n' '=== taskpilot agent session ==='\n");
    for line in task_summary_lines(inputs.task) {
        out.push_str(&format!("printf '%s\\n' {}\n", sh_quote(&line)));
    }
    out.push_str("printf '\\n'\n");

    let mut invocation = vec![sh_quote(inputs.command)];
    invocation.extend(inputs.args.iter().map(|arg| sh_quote(arg)));
    invocation.push(format!(
        "\"$(cat {})\"",
        sh_quote(&inputs.prompt_path.to_string_lossy())
    ));
    out.push_str(&invocation.join(" "));
    out.push('\n');

    out.push_str("status=$?\n");
    out.push_str("printf '\\n%s\\n' \"Agent exited with status $status. Press Enter to close.\"\n");
    out.push_str("read _ignored\n");
    out
}

fn render_windows_cmd(inputs: &ScriptInputs<'_>) -> String {
    let mut out = String::new();
    out.push_str("@echo off\r\n");
    out.push_str(&format!(
        "title taskpilot {}\r\n",
        cmd_escape(&inputs.task.title)
    ));
    out.push_str(&format!(
        "cd /d \"{}\"\r\n",
        inputs.workdir.to_string_lossy()
    ));
    out.push_str("echo === taskpilot agent session ===\r\n");
    for line in task_summary_lines(inputs.task) {
        out.push_str(&format!("echo {}\r\n", cmd_escape(&line)));
    }
    out.push_str("echo.\r\n");

    let mut ps = format!(
        "$p = Get-Content -Raw -LiteralPath {}; & {}",
        ps_quote(&inputs.prompt_path.to_string_lossy()),
        ps_quote(inputs.command)
    );
    for arg in inputs.args {
        ps.push(' ');
        ps.push_str(&ps_quote(arg));
    }
    ps.push_str(" $p");
    out.push_str(&format!(
        "powershell -NoProfile -ExecutionPolicy Bypass -Command \"{}\"\r\n",
        ps.replace('"', "\\\"")
    ));
    out.push_str("echo.\r\n");
    out.push_str("echo Agent exited with status %ERRORLEVEL%.\r\n");
    out.push_str("pause\r\n");
    out
}

/// Quote for POSIX `sh` using single quotes.
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Escape text for `echo`/`title` in a `.cmd` file.
fn cmd_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%%"),
            '^' | '&' | '|' | '<' | '>' | '(' | ')' => {
                out.push('^');
                out.push(ch);
            }
            '\r' | '\n' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

/// Reduce a task id to characters safe in file names.
pub fn sanitize_file_stem(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    if cleaned.is_empty() {
        "task".to_string()
    } else {
        cleaned
    }
}
