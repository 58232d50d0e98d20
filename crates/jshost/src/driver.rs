//! Runs one script in one runtime, with the debugging pair set up around it
//! when asked for.
//!
//! Construction order is runtime, handler, registration, listener; teardown
//! runs in reverse: close, unregister, destroy service, destroy handler,
//! dispose runtime. Every teardown step is attempted even after a failure.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use jshost_debugger::{ProtocolHandler, ServiceConfig, SessionService};
use jshost_engine::{Completion, EngineError, Runtime, RuntimeOptions};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::{cli::Cli, config::HostConfig};

#[derive(Debug, Clone)]
pub struct DebugOptions {
    pub port: u16,
    pub break_on_next_statement: bool,
    pub runtime_name: String,
    pub host: String,
    pub wait_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub script: PathBuf,
    /// Arguments after the script path
    pub args: Vec<String>,
    pub debug: Option<DebugOptions>,
}

impl Invocation {
    pub fn from_cli(cli: &Cli, config: &HostConfig) -> Self {
        let debug = cli.debug_enabled().then(|| DebugOptions {
            port: cli.port,
            break_on_next_statement: cli.inspect_brk,
            runtime_name: config.runtime_name.clone(),
            host: config.host.clone(),
            wait_timeout: config.wait_timeout(),
        });
        Self {
            script: PathBuf::from(cli.script()),
            args: cli.script_args().to_vec(),
            debug,
        }
    }

    /// `host.arguments`: the script path as given, then its arguments
    fn host_arguments(&self) -> Vec<String> {
        std::iter::once(self.script.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// How a script run ended when the host itself did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Completion),
    /// The script threw; carries the exception message
    Exception(String),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Completed(completion) => completion.exit_code(),
            Outcome::Exception(_) => 1,
        }
    }
}

/// Runs the invocation on a blocking thread, the engine's home for its
/// whole life.
///
/// A panic on that thread comes back as a [`tokio::task::JoinError`] inside
/// the error.
///
/// # Errors
///
/// Setup, engine or teardown failures.
pub async fn run(invocation: Invocation) -> Result<Outcome> {
    let service = invocation.debug.as_ref().map(|debug| {
        Arc::new(SessionService::new(ServiceConfig {
            host: debug.host.clone(),
        }))
    });

    let tokio_rt = Handle::current();
    let mut engine = tokio::task::spawn_blocking({
        let service = service.clone();
        move || run_blocking(&tokio_rt, &invocation, service.as_deref())
    });

    let joined = tokio::select! {
        joined = &mut engine => joined,
        Ok(()) = tokio::signal::ctrl_c(), if service.is_some() => {
            warn!("Interrupted, closing debugger service");
            if let Some(service) = &service
                && let Err(e) = service.close().await
            {
                warn!("Failed closing debugger service: {e}");
            }
            tokio::select! {
                joined = &mut engine => joined,
                _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
            }
        }
    };
    joined?
}

fn run_blocking(
    tokio_rt: &Handle,
    invocation: &Invocation,
    service: Option<&SessionService>,
) -> Result<Outcome> {
    let mut runtime =
        Runtime::new(RuntimeOptions::default()).context("Failed to create script runtime")?;

    let outcome = match (service, &invocation.debug) {
        (Some(service), Some(options)) => {
            let mut scope = DebugScope::new(tokio_rt, service, &mut runtime, options);
            let outcome = scope
                .start(options)
                .and_then(|()| execute(scope.runtime(), invocation));
            let teardown = scope.teardown();
            outcome.and_then(|outcome| teardown.map(|()| outcome))
        }
        _ => execute(&mut runtime, invocation),
    };

    if let Err(e) = runtime.dispose() {
        error!("Failed to dispose script runtime: {e}");
        return outcome.and(Err(e).context("Failed to dispose script runtime"));
    }
    outcome
}

fn execute(runtime: &mut Runtime, invocation: &Invocation) -> Result<Outcome> {
    let mut context = runtime
        .create_context(&invocation.host_arguments())
        .context("Failed to create execution context")?;

    match context.run_file(&invocation.script) {
        Ok(completion) => {
            debug!(value = %completion.value, "Script completed");
            Ok(Outcome::Completed(completion))
        }
        Err(EngineError::ScriptException(message)) => Ok(Outcome::Exception(message)),
        Err(e) => Err(e).with_context(|| format!("Failed to run {}", invocation.script.display())),
    }
}

/// The protocol handler of one runtime together with the service serving it.
///
/// Borrows the runtime so the pair is always torn down before the runtime
/// is disposed; `Drop` tears down if an early exit skipped [`Self::teardown`].
struct DebugScope<'a> {
    tokio_rt: &'a Handle,
    service: &'a SessionService,
    runtime: &'a mut Runtime,
    handler: Arc<ProtocolHandler>,
    name: String,
    registered: bool,
    finished: bool,
}

impl<'a> DebugScope<'a> {
    fn new(
        tokio_rt: &'a Handle,
        service: &'a SessionService,
        runtime: &'a mut Runtime,
        options: &DebugOptions,
    ) -> Self {
        let handler = Arc::new(ProtocolHandler::new(runtime.handle()));
        Self {
            tokio_rt,
            service,
            runtime,
            handler,
            name: options.runtime_name.clone(),
            registered: false,
            finished: false,
        }
    }

    fn runtime(&mut self) -> &mut Runtime {
        self.runtime
    }

    fn start(&mut self, options: &DebugOptions) -> Result<()> {
        self.tokio_rt
            .block_on(self.service.register_handler(
                &self.name,
                self.handler.clone(),
                options.break_on_next_statement,
            ))
            .with_context(|| format!("Failed to register runtime `{}`", self.name))?;
        self.registered = true;
        self.runtime.attach_debugger(self.handler.clone());

        let addr = self
            .tokio_rt
            .block_on(self.service.listen(options.port))
            .with_context(|| format!("Failed to start debugger on port {}", options.port))?;
        eprintln!("Listening on ws://{addr}/{}", self.name);

        if options.break_on_next_statement {
            eprintln!("Waiting for debugger to connect...");
            self.handler
                .wait_for_debugger(options.wait_timeout)
                .context("Failed waiting for debugger")?;
            eprintln!("Debugger connected");
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.runtime.detach_debugger();

        let mut failure = None;
        record(
            &mut failure,
            "close debugger service",
            self.tokio_rt.block_on(self.service.close()),
        );
        if self.registered {
            record(
                &mut failure,
                "unregister runtime",
                self.tokio_rt
                    .block_on(self.service.unregister_handler(&self.name)),
            );
        }
        record(
            &mut failure,
            "destroy debugger service",
            self.tokio_rt.block_on(self.service.destroy()),
        );
        if self.registered {
            record(
                &mut failure,
                "destroy protocol handler",
                self.handler.destroy(),
            );
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!("Debugger torn down");
                Ok(())
            }
        }
    }
}

impl Drop for DebugScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Debug scope released early, tearing down");
            let _ = self.teardown();
        }
    }
}

/// Logs a failed teardown step and keeps the first failure.
fn record(
    failure: &mut Option<anyhow::Error>,
    step: &str,
    result: jshost_debugger::Result<()>,
) {
    if let Err(e) = result {
        error!("Failed to {step}: {e}");
        if failure.is_none() {
            *failure = Some(anyhow::Error::new(e).context(format!("Failed to {step}")));
        }
    }
}
