use std::path::Path;

use camino::Utf8PathBuf;
use tracing::warn;

use crate::error::{EngineError, Result};

/// A script read from disk, addressed by its absolute path
#[derive(Debug, Clone)]
pub(crate) struct LoadedFile {
    pub(crate) path: Utf8PathBuf,
    pub(crate) text: String,
}

/// Resolves `path` against the working directory and reads it. Unreadable
/// and empty files are both invalid arguments.
pub(crate) fn load_script(path: &Path) -> Result<LoadedFile> {
    let absolute = std::path::absolute(path).map_err(|e| {
        EngineError::InvalidArgument(format!("invalid path `{}`: {e}", path.display()))
    })?;
    let absolute = Utf8PathBuf::from_path_buf(absolute).map_err(|p| {
        EngineError::InvalidArgument(format!("path is not valid UTF-8: {}", p.display()))
    })?;

    let text = std::fs::read_to_string(&absolute).map_err(|e| {
        warn!(path = %absolute, error = %e, "Unable to open script");
        EngineError::InvalidArgument(format!("unable to open file: {absolute}"))
    })?;
    if text.is_empty() {
        return Err(EngineError::InvalidArgument(format!(
            "script is empty: {absolute}"
        )));
    }

    Ok(LoadedFile {
        path: absolute,
        text,
    })
}
