//! Engine selection from configuration.

use std::sync::Arc;
use std::time::Duration;

use askdb_core::{Config, Error};

use crate::http::HttpEngine;
use crate::scripted::ScriptedEngine;
use crate::traits::ReasoningEngine;

/// Build the configured reasoning engine.
///
/// `engine.kind = "http"` requires `engine.base_url`; `"scripted"` needs
/// no further configuration.
pub fn engine_from_config(config: &Config) -> Result<Arc<dyn ReasoningEngine>, Error> {
    match config.engine.kind.as_str() {
        "http" => {
            let base_url = config.engine.base_url.as_deref().ok_or_else(|| {
                Error::Config("engine.base_url is required for the http engine".to_string())
            })?;
            let timeout = Duration::from_secs(config.engine.timeout_secs);
            Ok(Arc::new(HttpEngine::with_timeout(base_url, timeout)))
        }
        "scripted" => Ok(Arc::new(ScriptedEngine::new())),
        other => Err(Error::Config(format!(
            "Unknown engine kind '{other}'. Valid values: [\"http\", \"scripted\"]"
        ))),
    }
}
