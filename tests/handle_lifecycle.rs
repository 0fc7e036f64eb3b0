#![cfg(unix)]

mod common;
use crate::common::{init_tracing, sh, test_coordinator, with_timeout, CaptureSink};

use std::error::Error;
use std::sync::Arc;

use procwatch::{
    ProcessState, ProcwatchError, RunOutcome, SubprocessHandle, LAUNCH_FAILED_EXIT_CODE,
    NOT_FINISHED_EXIT_CODE,
};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn empty_command_is_rejected() {
    let coordinator = test_coordinator();
    let result = SubprocessHandle::new(Vec::<String>::new(), Arc::new(CaptureSink::new()), coordinator);

    match result {
        Err(ProcwatchError::InvalidArgument(msg)) => assert!(msg.contains("executable")),
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
}

#[test]
fn fresh_handle_reports_not_started() -> TestResult {
    let handle = SubprocessHandle::new(["true"], Arc::new(CaptureSink::new()), test_coordinator())?;

    assert_eq!(handle.state(), ProcessState::NotStarted);
    assert!(!handle.is_started());
    assert!(!handle.is_running());
    assert_eq!(handle.exit_code(), NOT_FINISHED_EXIT_CODE);
    assert_eq!(handle.outcome(), None);
    assert_eq!(handle.pid(), None);
    Ok(())
}

#[test]
fn start_outside_runtime_leaves_handle_unstarted() -> TestResult {
    let handle = SubprocessHandle::new(["true"], Arc::new(CaptureSink::new()), test_coordinator())?;

    let worker = handle.clone();
    let result = std::thread::spawn(move || worker.start())
        .join()
        .expect("start must not panic without a runtime");

    match result {
        Err(ProcwatchError::IllegalState(msg)) => assert!(msg.contains("Tokio runtime")),
        other => panic!("expected IllegalState, got {other:?}"),
    }
    assert_eq!(handle.state(), ProcessState::NotStarted);
    assert!(!handle.is_started());

    // Still configurable after the failed start.
    handle.set_survivor(true)?;
    assert!(handle.is_survivor());
    Ok(())
}

#[tokio::test]
async fn echo_hello_reaches_sink_with_exit_notice() -> TestResult {
    init_tracing();

    let sink = Arc::new(CaptureSink::new());
    let handle = SubprocessHandle::new(["echo", "hello"], sink.clone(), test_coordinator())?;
    handle.set_exit_code_shown(true)?;

    handle.start()?;
    assert!(handle.is_started());
    with_timeout(handle.wait_for()).await;

    assert!(!handle.is_running());
    assert_eq!(handle.state(), ProcessState::Finished);
    assert_eq!(handle.exit_code(), 0);
    assert_eq!(handle.outcome(), Some(RunOutcome::Exited(0)));
    assert_eq!(sink.stdout(), "hello\n");
    assert!(sink.stderr().contains("exited with code 0"), "stderr was {:?}", sink.stderr());
    Ok(())
}

#[tokio::test]
async fn exit_code_and_stderr_are_propagated() -> TestResult {
    init_tracing();

    let sink = Arc::new(CaptureSink::new());
    let handle = SubprocessHandle::new(sh("echo oops 1>&2; exit 3"), sink.clone(), test_coordinator())?;

    handle.start()?;
    with_timeout(handle.wait_for()).await;

    assert_eq!(handle.exit_code(), 3);
    assert!(sink.stderr().contains("oops"));
    // Exit notice is off by default.
    assert!(!sink.stderr().contains("exited with code"));
    Ok(())
}

#[tokio::test]
async fn all_stdout_survives_natural_exit() -> TestResult {
    init_tracing();

    let sink = Arc::new(CaptureSink::new());
    let script = "i=0; while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done";
    let handle = SubprocessHandle::new(sh(script), sink.clone(), test_coordinator())?;

    handle.start()?;
    with_timeout(handle.wait_for()).await;

    let out = sink.stdout();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2000);
    assert_eq!(lines.first(), Some(&"line-0"));
    assert_eq!(lines.last(), Some(&"line-1999"));
    Ok(())
}

#[tokio::test]
async fn setters_fail_once_started() -> TestResult {
    init_tracing();

    let handle = SubprocessHandle::new(["true"], Arc::new(CaptureSink::new()), test_coordinator())?;
    handle.start()?;

    assert!(matches!(handle.set_survivor(true), Err(ProcwatchError::IllegalState(_))));
    assert!(matches!(handle.set_exit_code_shown(true), Err(ProcwatchError::IllegalState(_))));
    assert!(matches!(handle.set_env("A", "B"), Err(ProcwatchError::IllegalState(_))));
    assert!(matches!(handle.start(), Err(ProcwatchError::IllegalState(_))));

    with_timeout(handle.wait_for()).await;

    // Still rejected after the run is over.
    assert!(matches!(handle.set_working_dir("/"), Err(ProcwatchError::IllegalState(_))));
    assert!(matches!(handle.start(), Err(ProcwatchError::IllegalState(_))));
    assert!(!handle.is_survivor());
    Ok(())
}

#[tokio::test]
async fn launch_failure_is_reported_through_sink() -> TestResult {
    init_tracing();

    let sink = Arc::new(CaptureSink::new());
    let handle = SubprocessHandle::new(
        ["/definitely/not/a/real/executable"],
        sink.clone(),
        test_coordinator(),
    )?;

    // start() itself succeeds; the failure is asynchronous.
    handle.start()?;
    with_timeout(handle.wait_for()).await;

    assert_eq!(handle.outcome(), Some(RunOutcome::LaunchFailed));
    assert_eq!(handle.exit_code(), LAUNCH_FAILED_EXIT_CODE);
    assert!(sink.stderr().contains("failed to launch"));
    Ok(())
}

#[tokio::test]
async fn env_and_working_dir_are_applied() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let sink = Arc::new(CaptureSink::new());
    let handle = SubprocessHandle::new(sh("echo \"$PROCWATCH_TEST_VAR\"; pwd"), sink.clone(), test_coordinator())?;
    handle.set_env("PROCWATCH_TEST_VAR", "from-test")?;
    handle.set_working_dir(dir.path())?;

    handle.start()?;
    with_timeout(handle.wait_for()).await;

    let out = sink.stdout();
    assert!(out.starts_with("from-test\n"), "stdout was {out:?}");
    let dir_name = dir.path().file_name().and_then(|n| n.to_str()).unwrap_or_default();
    assert!(out.contains(dir_name), "stdout was {out:?}");
    Ok(())
}

#[tokio::test]
async fn wait_and_stop_are_noops_before_start() -> TestResult {
    let handle = SubprocessHandle::new(["true"], Arc::new(CaptureSink::new()), test_coordinator())?;

    with_timeout(handle.wait_for()).await;
    with_timeout(handle.stop()).await;

    assert_eq!(handle.state(), ProcessState::NotStarted);
    assert_eq!(handle.exit_code(), NOT_FINISHED_EXIT_CODE);
    Ok(())
}

#[tokio::test]
async fn stop_after_finish_is_noop() -> TestResult {
    init_tracing();

    let sink = Arc::new(CaptureSink::new());
    let handle = SubprocessHandle::new(sh("exit 7"), sink.clone(), test_coordinator())?;
    handle.start()?;
    with_timeout(handle.wait_for()).await;

    with_timeout(handle.stop()).await;

    assert_eq!(handle.exit_code(), 7);
    assert!(!sink.stderr().contains("process killed"));
    Ok(())
}

#[tokio::test]
async fn clones_share_state() -> TestResult {
    init_tracing();

    let handle = SubprocessHandle::new(["true"], Arc::new(CaptureSink::new()), test_coordinator())?;
    let observer = handle.clone();

    handle.start()?;
    with_timeout(observer.wait_for()).await;

    assert_eq!(handle.state(), ProcessState::Finished);
    assert_eq!(handle.exit_code(), 0);
    Ok(())
}
