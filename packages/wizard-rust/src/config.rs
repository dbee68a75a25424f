use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use msbwizard_core::RouterConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::validation::check_positive;

/// Application settings, read from a JSON settings file.
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardSettings {
    /// Log filter directive, e.g. `"info"` or `"msbwizard=debug"`.
    pub log_level: String,
    /// Also write logs to this file.
    pub log_file: Option<PathBuf>,
    /// Truncate `log_file` on startup instead of appending.
    pub clear_log: bool,
    /// Reject request targets whose type the router does not know.
    pub strict_type_check: bool,
    /// Default canvas block width.
    pub block_width: f64,
    /// Default canvas block height.
    pub block_height: f64,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_file: None,
            clear_log: false,
            strict_type_check: false,
            block_width: 100.0,
            block_height: 50.0,
        }
    }
}

impl WizardSettings {
    /// Read settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed, or holds a
    /// non-positive block size.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to read settings {}", path.display())))
            }
        };
        let settings: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse settings {}", path.display()))?;
        check_positive(settings.block_width, "block_width")?;
        check_positive(settings.block_height, "block_height")?;
        Ok(settings)
    }

    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            strict_type_check: self.strict_type_check,
        }
    }
}
