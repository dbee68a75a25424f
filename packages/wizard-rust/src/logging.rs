use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{anyhow, Context as _};
use tracing_subscriber::EnvFilter;

use crate::config::WizardSettings;

/// Build the log filter. `RUST_LOG` wins over `level`.
///
/// # Errors
///
/// Fails if `level` is not a valid filter directive.
pub fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'")),
    }
}

/// Install the global `tracing` subscriber.
///
/// Logs go to stderr, or to `settings.log_file` when set (truncated first if
/// `settings.clear_log`). `level` overrides `settings.log_level`.
///
/// # Errors
///
/// Fails on an invalid level, an unopenable log file, or if a subscriber is
/// already installed.
pub fn init_logging(settings: &WizardSettings, level: Option<&str>) -> anyhow::Result<()> {
    let filter = env_filter(level.unwrap_or(&settings.log_level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match &settings.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(!settings.clear_log)
                .truncate(settings.clear_log)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;
    tracing::debug!(level = level.unwrap_or(&settings.log_level), "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(env_filter("info").is_ok());
        assert!(env_filter("msbwizard=debug,warn").is_ok());
        assert!(env_filter("msbwizard=loud").is_err());
    }
}
