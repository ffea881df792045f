//! Timeout behavior of the process layer.
#![cfg(unix)]

use std::process::Command;
use std::time::{Duration, Instant};

use taskpilot::io::process::{NO_EXIT_CODE, probe_command, run_command_with_timeout};

#[test]
fn sleep_is_killed_at_timeout() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let started = Instant::now();
    let output =
        run_command_with_timeout(cmd, None, Duration::from_millis(100), 4096, None).expect("run");

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(output.timed_out);
    assert!(!output.success());
    assert!(output.stderr_text().contains("timed out after 100ms"));
}

#[test]
fn grandchildren_die_with_the_group() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "sleep 5 & sleep 5; wait"]);
    let started = Instant::now();
    let output =
        run_command_with_timeout(cmd, None, Duration::from_millis(200), 4096, None).expect("run");
    // Readers only finish once every holder of the pipes is gone.
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(output.timed_out);
}

#[test]
fn missing_program_is_reported_not_raised() {
    let output = run_command_with_timeout(
        Command::new("taskpilot-test-no-such-binary"),
        None,
        Duration::from_secs(1),
        4096,
        None,
    )
    .expect("spawn failure is not an error");
    assert_eq!(output.exit_code, NO_EXIT_CODE);
    assert!(output.spawn_error.is_some());
    assert!(!probe_command(
        Command::new("taskpilot-test-no-such-binary"),
        Duration::from_secs(1)
    ));
}
