//! # jshost engine
//!
//! Embeds a deno_core JavaScript runtime and wires it to the debugger.
//!
//! A [`Runtime`] owns the isolate; [`Runtime::create_context`] installs the
//! global `host` object and returns a [`HostContext`] that runs script files.
//! When a debugger is attached with [`Runtime::attach_debugger`], every
//! script is announced to it and every statement reports its position
//! before it runs, so client breakpoints stop on any statement line.
//!
//! ```rust,no_run
//! use jshost_engine::{Runtime, RuntimeOptions};
//!
//! # fn example() -> Result<(), jshost_engine::EngineError> {
//! let mut runtime = Runtime::new(RuntimeOptions::default())?;
//! let completion = {
//!     let mut context = runtime.create_context(&["main.js".to_string()])?;
//!     context.run_file("main.js")?
//! };
//! runtime.dispose()?;
//! println!("{}", completion.exit_code());
//! # Ok(())
//! # }
//! ```
//!
//! Scripts see:
//!
//! - `host.echo(...args)` - print the arguments, space separated
//! - `host.throw([value])` - throw `value`, or a sample `Error`
//! - `host.runScript(path)` - run another file and return its completion value
//! - `host.arguments` - the script path followed by the script arguments

mod context;
mod error;
pub mod instrument;
mod load;
mod ops;
mod runtime;

pub use context::{Completion, HOST_CALLBACKS, HostContext};
pub use error::{EngineError, Result};
pub use runtime::{OutputSink, Runtime, RuntimeOptions};
