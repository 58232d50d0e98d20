//! Shared helpers for engine integration tests

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use jshost_engine::OutputSink;
use parking_lot::Mutex;

/// Collects `host.echo` output for assertions
#[derive(Clone, Default)]
pub(crate) struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

#[allow(unused)]
impl CapturedOutput {
    pub(crate) fn sink(&self) -> OutputSink {
        self.0.clone()
    }

    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[allow(unused)]
pub(crate) fn write_script(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, source).expect("Failed writing script");
    path
}
