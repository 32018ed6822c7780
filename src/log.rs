//! Logging from Weir.

use std::fmt;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::Layer as FmtLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::cfg::{LogLevel, LogTarget, LoggingConfig};

//----------- Logger -----------------------------------------------------------

/// The state of the Weir logger.
pub struct Logger {
    filter: Handle<EnvFilter, Registry>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("filter", &self.filter)
            .finish()
    }
}

impl Logger {
    /// Launch the Weir logger.
    ///
    /// Fails if a global [`tracing`] logger has been set already.
    pub fn launch(config: &LoggingConfig) -> Result<&'static Logger, String> {
        let filter = make_env_filter(config)?;

        // The reload layer gives us a handle through which the filter can be
        // replaced when the configuration changes.
        let (filter, filter_handle) = reload::Layer::new(filter);

        let target = PrimaryLogger::new(&config.target)
            .map_err(|err| format!("could not open the log target: {err}"))?;
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match target {
            PrimaryLogger::File { file } => {
                // Never emit colors to files.
                let layer = FmtLayer::new().with_ansi(false).with_writer(file);
                registry.with(layer).try_init()
            }
            PrimaryLogger::Stdout => {
                // 'tracing' only checks 'NO_COLOR'; look at the terminal too.
                let layer = FmtLayer::new()
                    .with_ansi(supports_color::on(supports_color::Stream::Stdout).is_some())
                    .with_writer(std::io::stdout);
                registry.with(layer).try_init()
            }
            PrimaryLogger::Stderr => {
                let layer = FmtLayer::new()
                    .with_ansi(supports_color::on(supports_color::Stream::Stderr).is_some())
                    .with_writer(std::io::stderr);
                registry.with(layer).try_init()
            }
        };
        installed.map_err(|err| format!("could not install the logger: {err}"))?;

        Ok(Box::leak(Box::new(Self {
            filter: filter_handle,
        })))
    }

    /// Apply a new logging configuration.
    ///
    /// Only the level and trace targets can be changed at runtime.
    pub fn apply(&self, config: &LoggingConfig) -> Result<(), String> {
        self.filter
            .reload(make_env_filter(config)?)
            .map_err(|_| "could not reload filter".into())
    }
}

/// Make a new [`EnvFilter`] based on the config.
fn make_env_filter(config: &LoggingConfig) -> Result<EnvFilter, String> {
    // The default filter ignores environment variables; the configured level
    // is added on top of it.
    let mut filter = EnvFilter::default().add_directive(level_filter(config.level).into());

    for target in &config.trace_targets {
        filter = filter.add_directive(
            target
                .parse()
                .map_err(|_| format!("invalid trace target: '{target}'"))?,
        );
    }

    Ok(filter)
}

/// A primary logger.
enum PrimaryLogger {
    /// A file logger.
    File {
        /// The actual file.
        file: std::fs::File,
    },

    /// A logger to stdout.
    Stdout,

    /// A logger to stderr.
    Stderr,
}

impl PrimaryLogger {
    /// Initialize a new [`PrimaryLogger`].
    fn new(config: &LogTarget) -> Result<Self, std::io::Error> {
        match config {
            LogTarget::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;

                Ok(Self::File { file })
            }
            LogTarget::Stdout => Ok(Self::Stdout),
            LogTarget::Stderr => Ok(Self::Stderr),
        }
    }
}

/// The filter level for a configured log level.
fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

//============ Tests ===========================================================

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::{level_filter, make_env_filter};
    use crate::cfg::{LogLevel, LoggingConfig};

    #[test]
    fn env_filter() {
        let mut config = LoggingConfig {
            level: LogLevel::Warning,
            trace_targets: vec!["weir::update=trace".into()],
            ..Default::default()
        };
        let filter = make_env_filter(&config).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));

        config.trace_targets = vec!["weir=verbose".into()];
        assert!(make_env_filter(&config).is_err());
    }

    #[test]
    fn levels() {
        assert_eq!(level_filter(LogLevel::Warning), LevelFilter::WARN);
        assert_eq!(level_filter(LogLevel::Trace), LevelFilter::TRACE);
    }
}
