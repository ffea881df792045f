//! Detached terminal launching.
//!
//! Each platform has an ordered list of launchers: a preferred modern terminal
//! emulator first, then the stock fallbacks (`open`, `start`,
//! `x-terminal-emulator`) and finally running the script directly with its
//! output sent to a log file. The first launcher that starts wins; one that
//! exits with an error during a short startup grace period counts as refused.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::platform::Platform;
use crate::io::process::isolate_process_group;

/// How long to wait for hand-off launchers (`open`, `start`) to report back.
const HANDOFF_TIMEOUT: Duration = Duration::from_secs(5);
/// Emulators that cannot open a window (no display, bad flags) exit within this.
const STARTUP_GRACE: Duration = Duration::from_millis(300);

/// One way of opening a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCandidate {
    pub name: &'static str,
    pub program: String,
    pub args: Vec<String>,
    /// The program hands the script to another process and exits quickly, so its
    /// exit code tells us whether the launch worked.
    pub handoff: bool,
    /// Send stdout/stderr to this file instead of discarding them.
    pub log_path: Option<PathBuf>,
}

impl LaunchCandidate {
    fn new(name: &'static str, program: &str, args: &[&str], handoff: bool) -> Self {
        Self {
            name,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            handoff,
            log_path: None,
        }
    }
}

/// Result of trying to open a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalLaunch {
    Launched { launcher: String },
    Unavailable { attempted: Vec<String> },
}

/// Ordered launchers for `platform`.
pub fn launch_candidates(platform: Platform, script: &Path, title: &str) -> Vec<LaunchCandidate> {
    let script = script.to_string_lossy();
    let script = script.as_ref();
    match platform {
        Platform::MacOs => vec![
            LaunchCandidate::new("iterm", "open", &["-a", "iTerm", script], true),
            LaunchCandidate::new("terminal.app", "open", &["-a", "Terminal", script], true),
        ],
        Platform::Windows => vec![
            LaunchCandidate::new(
                "windows-terminal",
                "wt.exe",
                &["new-tab", "--title", title, "cmd", "/K", script],
                false,
            ),
            LaunchCandidate::new(
                "start",
                "cmd",
                &["/C", "start", title, "cmd", "/K", script],
                true,
            ),
        ],
        Platform::Linux | Platform::OtherUnix => {
            let mut candidates = vec![
                LaunchCandidate::new(
                    "gnome-terminal",
                    "gnome-terminal",
                    &["--title", title, "--", "sh", script],
                    false,
                ),
                LaunchCandidate::new("konsole", "konsole", &["-e", "sh", script], false),
                LaunchCandidate::new("kitty", "kitty", &["--title", title, "sh", script], false),
                LaunchCandidate::new("alacritty", "alacritty", &["-e", "sh", script], false),
                LaunchCandidate::new(
                    "x-terminal-emulator",
                    "x-terminal-emulator",
                    &["-e", "sh", script],
                    false,
                ),
                LaunchCandidate::new("xterm", "xterm", &["-T", title, "-e", "sh", script], false),
            ];
            let mut direct = LaunchCandidate::new("direct", "sh", &[script], false);
            direct.log_path = Some(PathBuf::from(format!("{script}.log")));
            candidates.push(direct);
            candidates
        }
    }
}

/// Open a new terminal window running `script`, detached from this process.
///
/// Never fails: a host with no usable launcher yields [`TerminalLaunch::Unavailable`].
#[instrument(skip_all, fields(script = %script.display()))]
pub fn launch_detached_terminal(platform: Platform, script: &Path, title: &str) -> TerminalLaunch {
    launch_first(launch_candidates(platform, script, title))
}

/// Try `candidates` in order and stop at the first one that starts.
fn launch_first(candidates: Vec<LaunchCandidate>) -> TerminalLaunch {
    let mut attempted = Vec::new();
    for candidate in candidates {
        attempted.push(candidate.name.to_string());
        if try_launch(&candidate) {
            info!(launcher = candidate.name, "terminal launched");
            return TerminalLaunch::Launched {
                launcher: candidate.name.to_string(),
            };
        }
    }
    warn!(?attempted, "no terminal launcher succeeded");
    TerminalLaunch::Unavailable { attempted }
}

fn try_launch(candidate: &LaunchCandidate) -> bool {
    let mut cmd = Command::new(&candidate.program);
    cmd.args(&candidate.args).stdin(Stdio::null());
    match candidate.log_path.as_ref().map(File::create) {
        Some(Ok(log)) => match log.try_clone() {
            Ok(err_log) => {
                cmd.stdout(log).stderr(err_log);
            }
            Err(_) => {
                cmd.stdout(log).stderr(Stdio::null());
            }
        },
        _ => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }
    if !candidate.handoff {
        isolate_process_group(&mut cmd);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!(launcher = candidate.name, err = %e, "launcher not usable");
            return false;
        }
    };

    let wait = if candidate.handoff {
        HANDOFF_TIMEOUT
    } else {
        STARTUP_GRACE
    };
    match child.wait_timeout(wait) {
        Ok(Some(status)) if status.success() => true,
        // The script itself ran, so its exit code is the agent's, not the launcher's.
        Ok(Some(_)) if candidate.log_path.is_some() => true,
        Ok(Some(status)) => {
            debug!(launcher = candidate.name, code = ?status.code(), "launcher refused");
            false
        }
        Ok(None) => {
            debug!(
                launcher = candidate.name,
                pid = child.id(),
                "launcher still running, detaching"
            );
            reap_in_background(child);
            true
        }
        Err(e) => {
            debug!(launcher = candidate.name, err = %e, "waiting on launcher failed");
            reap_in_background(child);
            false
        }
    }
}

/// Wait for a detached launcher on a throwaway thread so it never lingers as a zombie.
fn reap_in_background(mut child: Child) {
    let spawned = thread::Builder::new()
        .name("terminal-reaper".to_string())
        .spawn(move || {
            let _ = child.wait();
        });
    if let Err(e) = spawned {
        warn!(err = %e, "could not start reaper thread for terminal launcher");
    }
}

/// Mark a script executable so launchers that exec it directly can run it.
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_prefers_modern_emulators_then_falls_back_to_direct() {
        let names: Vec<&str> = launch_candidates(Platform::Linux, Path::new("/s/run.sh"), "t")
            .iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names.first(), Some(&"gnome-terminal"));
        assert_eq!(names.last(), Some(&"direct"));
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("kitty") < pos("x-terminal-emulator"));
    }

    #[test]
    fn direct_fallback_logs_next_to_script() {
        let candidates = launch_candidates(Platform::Linux, Path::new("/s/run.sh"), "t");
        let direct = candidates.last().unwrap();
        assert_eq!(direct.log_path, Some(PathBuf::from("/s/run.sh.log")));
        assert_eq!(direct.args, vec!["/s/run.sh".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn emulator_that_exits_with_error_falls_through_to_next() {
        let candidates = vec![
            LaunchCandidate::new("broken", "sh", &["-c", "exit 3"], false),
            LaunchCandidate::new("missing", "taskpilot-test-no-such-terminal", &[], false),
            LaunchCandidate::new("lingering", "sh", &["-c", "sleep 2"], false),
        ];
        let launch = launch_first(candidates);
        assert_eq!(
            launch,
            TerminalLaunch::Launched {
                launcher: "lingering".to_string()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn quick_clean_exit_counts_as_launched() {
        let launch = launch_first(vec![LaunchCandidate::new("quick", "true", &[], false)]);
        assert_eq!(
            launch,
            TerminalLaunch::Launched {
                launcher: "quick".to_string()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn direct_run_is_launched_even_when_the_script_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut direct = LaunchCandidate::new("direct", "sh", &["-c", "echo nope; exit 1"], false);
        direct.log_path = Some(temp.path().join("run.log"));
        let launch = launch_first(vec![direct]);
        assert_eq!(
            launch,
            TerminalLaunch::Launched {
                launcher: "direct".to_string()
            }
        );
        assert!(temp.path().join("run.log").exists());
    }

    #[cfg(unix)]
    #[test]
    fn all_refusals_report_every_attempt() {
        let launch = launch_first(vec![
            LaunchCandidate::new("a", "false", &[], false),
            LaunchCandidate::new("b", "taskpilot-test-no-such-terminal", &[], false),
        ]);
        assert_eq!(
            launch,
            TerminalLaunch::Unavailable {
                attempted: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn macos_and_windows_use_handoff_fallbacks() {
        let mac = launch_candidates(Platform::MacOs, Path::new("/s/run.sh"), "t");
        assert!(mac.iter().all(|c| c.program == "open" && c.handoff));

        let win = launch_candidates(Platform::Windows, Path::new(r"C:\s\run.cmd"), "t");
        assert_eq!(win[0].program, "wt.exe");
        assert!(!win[0].handoff);
        assert_eq!(win[1].args[..2], ["/C".to_string(), "start".to_string()]);
    }
}
