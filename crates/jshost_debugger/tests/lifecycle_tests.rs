mod utils;

use std::{sync::Arc, time::Duration};

use jshost_debugger::{
    BreakKind, DebugError, DebugEvents, HandlerPhase, ProtocolHandler, RuntimeHandle,
    ServiceConfig, SessionService,
};
use serde_json::{Value, json};
use serial_test::serial;

use crate::utils::{DebugClient, connect, next_json, start_service, teardown};

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_listen_errors() {
    let service = SessionService::new(ServiceConfig::default());
    assert!(matches!(service.listen(0).await, Err(DebugError::NoHandlers)));

    let handler = Arc::new(ProtocolHandler::new(RuntimeHandle::allocate()));
    service
        .register_handler("runtime1", handler.clone(), false)
        .await
        .unwrap();

    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken = blocker.local_addr().unwrap().port();
    assert!(matches!(
        service.listen(taken).await,
        Err(DebugError::AddressInUse(addr)) if addr.port() == taken
    ));

    let addr = service.listen(0).await.unwrap();
    assert_ne!(addr.port(), 0);
    assert_eq!(service.local_addr().await, Some(addr));
    assert!(matches!(
        service.listen(0).await,
        Err(DebugError::InvalidState(_))
    ));

    // Destroy is refused while listening
    assert!(matches!(
        service.destroy().await,
        Err(DebugError::InvalidState(_))
    ));

    teardown(service, &["runtime1"], vec![handler]).await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_inspect_brk_flow() {
    let service = SessionService::new(ServiceConfig::default());
    let handler = Arc::new(ProtocolHandler::new(RuntimeHandle::allocate()));
    service
        .register_handler("runtime1", handler.clone(), true)
        .await
        .unwrap();
    let addr = service.listen(0).await.unwrap();

    // Plays the engine: wait, register the script, report two statements
    let engine = {
        let handler = handler.clone();
        tokio::task::spawn_blocking(move || {
            handler.wait_for_debugger(None)?;
            let context = handler.register_source_context("file:///main.js", "a();\nb();\n");
            handler.break_here(context, 1, 1, BreakKind::Statement);
            handler.break_here(context, 2, 1, BreakKind::Statement);
            handler.on_exception(context, "boom");
            Ok::<_, DebugError>(context)
        })
    };

    let mut client = DebugClient::connect(addr, "runtime1").await;
    let attached = client.notification().await;
    assert_eq!(attached["method"], "attached");
    client.request("runIfWaitingForDebugger", Value::Null).await;

    let parsed = client.expect("scriptParsed").await;
    let context = parsed["params"]["contextId"].clone();

    let paused = client.expect("paused").await;
    assert_eq!(paused["params"]["reason"], "breakOnNextStatement");
    assert_eq!(paused["params"]["line"], 1);
    assert_eq!(handler.phase(), HandlerPhase::Paused);

    let bp = client
        .request("setBreakpoint", json!({ "contextId": context, "line": 2 }))
        .await;
    let breakpoint_id = bp["result"]["breakpointId"].clone();
    assert_eq!(breakpoint_id, 1);

    let resume = client.request("resume", Value::Null).await;
    assert!(resume.get("error").is_none(), "{resume}");
    assert_eq!(client.notification().await["method"], "resumed");

    let paused = client.notification().await;
    assert_eq!(paused["method"], "paused");
    assert_eq!(paused["params"]["reason"], "breakpoint");
    assert_eq!(paused["params"]["line"], 2);
    assert_eq!(paused["params"]["breakpointId"], breakpoint_id);

    client.request("resume", Value::Null).await;
    assert_eq!(client.notification().await["method"], "resumed");

    let context = engine.await.unwrap().unwrap();
    let exception = client.notification().await;
    assert_eq!(exception["method"], "exception");
    assert_eq!(exception["params"]["contextId"], json!(context));
    assert_eq!(exception["params"]["message"], "boom");

    let scripts = client.request("listScripts", Value::Null).await;
    assert_eq!(scripts["result"][0]["url"], "file:///main.js");

    let breakpoints = client.request("listBreakpoints", Value::Null).await;
    assert_eq!(breakpoints["result"].as_array().map(Vec::len), Some(1));
    let removed = client
        .request("removeBreakpoint", json!({ "breakpointId": breakpoint_id }))
        .await;
    assert_eq!(removed["result"]["removed"], true);

    teardown(service, &["runtime1"], vec![handler]).await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_client_disconnect_while_paused_resumes_engine() {
    let (service, handlers, addr) = start_service(&["runtime1"]).await;
    let handler = handlers[0].clone();

    let (write, mut read) = connect(addr, "runtime1").await;
    let _attached = next_json(&mut read).await;

    let engine = {
        let handler = handler.clone();
        tokio::task::spawn_blocking(move || {
            let context = handler.register_source_context("file:///d.js", "debugger;");
            handler.break_here(context, 1, 1, BreakKind::DebuggerStatement);
        })
    };

    let _parsed = next_json(&mut read).await;
    let paused = next_json(&mut read).await;
    assert_eq!(paused["params"]["reason"], "debuggerStatement");

    drop(write);
    drop(read);
    tokio::time::timeout(Duration::from_secs(5), engine)
        .await
        .expect("engine stayed paused after the client left")
        .unwrap();
    assert_eq!(handler.phase(), HandlerPhase::Running);

    teardown(service, &["runtime1"], handlers).await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_reconnect_after_disconnect() {
    let (service, handlers, addr) = start_service(&["runtime1"]).await;

    {
        let (_write, mut read) = connect(addr, "runtime1").await;
        let _attached = next_json(&mut read).await;
    }

    // Session cleanup runs asynchronously after the socket drops
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handlers[0].has_session() {
        assert!(tokio::time::Instant::now() < deadline, "session never detached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (_write, mut read) = connect(addr, "runtime1").await;
    let attached = next_json(&mut read).await;
    assert_eq!(attached["method"], "attached");

    teardown(service, &["runtime1"], handlers).await;
}
