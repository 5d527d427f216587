//! Tracing subscriber setup for the CLI
//!
//! The library only emits events; the binary installs a subscriber here.
//! All log output goes to stderr so stdout stays free for the command.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output with colors (default for CLI)
    Console,
    /// Plain output without ANSI colors, for CI logs
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",  // Default: only problems
            1 => "info",  // -v: model loading and timings
            2 => "debug", // -vv: internal state
            _ => "trace", // -vvv+: everything
        }
    }

    /// The filter directive that `init` will install
    #[must_use]
    pub fn filter_directive(&self) -> &str {
        self.env_filter
            .as_deref()
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| self.verbosity_to_filter())
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.filter_directive())?;
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },
        }

        Ok(())
    }
}

/// Initialize tracing with CLI defaults, honouring `RUST_LOG`
///
/// # Errors
/// - Invalid `RUST_LOG` directive
/// - A global subscriber is already installed
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<()> {
    let mut config = TracingConfig::new().with_verbosity(verbosity);
    if let Ok(filter) = std::env::var(EnvFilter::DEFAULT_ENV) {
        config = config.with_env_filter(filter);
    }
    if std::env::var_os("CI").is_some() {
        config = config.with_format(TracingFormat::Compact);
    }
    config.init()
}
