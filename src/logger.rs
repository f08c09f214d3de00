use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Summary = 0,   // Batch lifecycle and request logs (default)
    Detailed = 1,  // Per-company progress, retries, parse attempts
    Debug = 2,     // Everything, including dependency internals
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Default filter directives when RUST_LOG is not set
    pub fn directives(&self) -> &'static str {
        match self {
            VerbosityLevel::Summary => "info",
            VerbosityLevel::Detailed => "peownerfinder=debug,tower_http=debug,info",
            VerbosityLevel::Debug => "peownerfinder=trace,tower_http=trace,debug",
        }
    }
}

/// Install the global subscriber: stderr always, plus a plain-text copy
/// appended to `log_file` when given. RUST_LOG overrides `verbosity`.
pub fn init(verbosity: VerbosityLevel, log_file: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directives()));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_count_mapping() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(7), VerbosityLevel::Debug);
        assert!(VerbosityLevel::Debug > VerbosityLevel::Summary);
    }

    #[test]
    fn test_directives_parse() {
        for level in [VerbosityLevel::Summary, VerbosityLevel::Detailed, VerbosityLevel::Debug] {
            assert!(EnvFilter::try_new(level.directives()).is_ok());
        }
    }
}
