use std::{net::TcpListener, path::PathBuf, time::Duration};

use jshost::driver::{self, DebugOptions, Invocation, Outcome};
use jshost_debugger::DebugError;

fn script(dir: &tempfile::TempDir, source: &str) -> PathBuf {
    let path = dir.path().join("main.js");
    std::fs::write(&path, source).unwrap();
    path
}

fn debug_options(port: u16, break_on_next_statement: bool) -> DebugOptions {
    DebugOptions {
        port,
        break_on_next_statement,
        runtime_name: "runtime1".to_string(),
        host: "127.0.0.1".to_string(),
        wait_timeout: Some(Duration::from_millis(200)),
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_completion_becomes_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = driver::run(Invocation {
        script: script(&dir, "host.arguments.length * 20 + 2.9"),
        args: vec!["one".into()],
        debug: None,
    })
    .await
    .unwrap();
    assert_eq!(outcome.exit_code(), 42);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_script_exception_is_an_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = driver::run(Invocation {
        script: script(&dir, "host.throw();"),
        args: Vec::new(),
        debug: None,
    })
    .await
    .unwrap();
    assert_eq!(outcome, Outcome::Exception("Sample error message".to_string()));
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_script_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = driver::run(Invocation {
        script: dir.path().join("missing.js"),
        args: Vec::new(),
        debug: None,
    })
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("missing.js"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_without_client_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = driver::run(Invocation {
        script: script(&dir, "debugger;\n5"),
        args: Vec::new(),
        debug: Some(debug_options(free_port(), false)),
    })
    .await
    .unwrap();
    assert_eq!(outcome.exit_code(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_brk_wait_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let err = driver::run(Invocation {
        script: script(&dir, "1"),
        args: Vec::new(),
        debug: Some(debug_options(free_port(), true)),
    })
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DebugError>(),
        Some(DebugError::Timeout)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_port_in_use_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let err = driver::run(Invocation {
        script: script(&dir, "1"),
        args: Vec::new(),
        debug: Some(debug_options(port, false)),
    })
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DebugError>(),
        Some(DebugError::AddressInUse(_))
    ));
}
