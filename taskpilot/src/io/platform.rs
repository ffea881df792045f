//! Host platform detection and command wrapping.

use std::process::Command;

use crate::core::script::ScriptKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    OtherUnix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::OtherUnix
        }
    }

    pub fn script_kind(self) -> ScriptKind {
        match self {
            Platform::Windows => ScriptKind::WindowsCmd,
            _ => ScriptKind::Posix,
        }
    }
}

/// Program and arguments to actually spawn for an agent command.
///
/// On Windows agent CLIs are usually npm shims (`claude.cmd`) that only
/// resolve through `cmd /C`, or live inside WSL entirely.
pub fn wrap_invocation(
    platform: Platform,
    command: &str,
    args: &[String],
    use_wsl: bool,
) -> (String, Vec<String>) {
    match platform {
        Platform::Windows if use_wsl => {
            let mut wrapped = vec![command.to_string()];
            wrapped.extend(args.iter().cloned());
            ("wsl".to_string(), wrapped)
        }
        Platform::Windows => {
            let mut wrapped = vec!["/C".to_string(), command.to_string()];
            wrapped.extend(args.iter().cloned());
            ("cmd".to_string(), wrapped)
        }
        _ => (command.to_string(), args.to_vec()),
    }
}

/// Build a `Command` for `command args` wrapped for `platform`.
pub fn agent_command(platform: Platform, command: &str, args: &[String], use_wsl: bool) -> Command {
    let (program, wrapped) = wrap_invocation(platform, command, args, use_wsl);
    let mut cmd = Command::new(program);
    cmd.args(wrapped);
    cmd
}
