//! Command-line JavaScript host.
//!
//! Parses flags, loads the optional config, installs logging and hands the
//! script to [`driver::run`]. With `--inspect`/`--inspect-brk` the runtime is
//! served to remote debuggers at `ws://{host}:{port}/{runtimeName}`.

pub mod cli;
pub mod config;
pub mod driver;
pub(crate) mod utils;

use tracing::error;

use crate::{
    cli::Cli,
    config::HostConfig,
    driver::{Invocation, Outcome},
    utils::logger::init_logger,
};

/// Runs the host for parsed arguments and returns the process exit code.
///
/// The completion value is printed on stdout; failures are reported on
/// stderr with a `jshost:` prefix.
pub async fn run_cli(cli: &Cli) -> i32 {
    let config = match HostConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("jshost: {e:#}");
            return 1;
        }
    };
    init_logger(&config.logger, cli.log_level());

    match driver::run(Invocation::from_cli(cli, &config)).await {
        Ok(outcome) => {
            let code = outcome.exit_code();
            match &outcome {
                Outcome::Completed(_) => println!("{code}"),
                Outcome::Exception(message) => eprintln!("jshost: exception: {message}"),
            }
            code
        }
        Err(e) if e.is::<tokio::task::JoinError>() => {
            error!("Script thread failed: {e}");
            eprintln!("jshost: fatal error: internal error.");
            1
        }
        Err(e) => {
            eprintln!("jshost: {e:#}");
            1
        }
    }
}
