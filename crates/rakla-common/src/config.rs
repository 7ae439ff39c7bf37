//! Config-file loading.

use crate::{RaklaError, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

/// Load a JSON config file into `T`.
///
/// A file that cannot be read is a [`RaklaError::Config`] carrying the I/O
/// error as its source; malformed JSON surfaces as a `Json` error.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        RaklaError::config_with_source(format!("failed to read config file {}", path.display()), e)
    })?;
    let value = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(value)
}
