//! Configuring Weir.
//!
//! Weir is configured through a TOML file. This crate defines the format of
//! that file (in [`file`]) and the validated runtime configuration it is
//! parsed into ([`Config`]). The runtime configuration is passed explicitly to
//! the parts of Weir that need it; there is no global configuration state.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! target = { file = "/var/log/weir.log" }
//!
//! [updates]
//! forward-timeout = "5s"
//!
//! [[zone]]
//! name = "example.org"
//! dnssec = true
//! serial-policy = "date-counter"
//!
//! [[zone]]
//! name = "example.net"
//! primary = "192.0.2.1:53"
//! ```

use std::{fmt, fs, io, net::SocketAddr, time::Duration};

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use domain::base::Name;

pub mod file;

mod timespan;
pub use timespan::TimeSpan;

//----------- Config -----------------------------------------------------------

/// The configuration of Weir.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// How Weir logs.
    pub logging: LoggingConfig,

    /// How updates are processed.
    pub updates: UpdateConfig,

    /// The zones being served.
    pub zones: Vec<ZoneConfig>,
}

//--- Loading

impl Config {
    /// Parse the configuration from a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let spec: file::Spec = toml::from_str(text).map_err(ConfigError::Parse)?;
        spec.parse()
    }

    /// Load the configuration from a file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Io(path.into(), err))?;
        Self::from_toml(&text)
    }

    /// The configuration of a zone.
    pub fn zone(&self, name: &Name<Bytes>) -> Option<&ZoneConfig> {
        self.zones.iter().find(|z| z.name == *name)
    }
}

//----------- LoggingConfig ----------------------------------------------------

/// Configuration for logging.
#[derive(Clone, Debug, Default)]
pub struct LoggingConfig {
    /// The minimum severity of messages to log.
    pub level: LogLevel,

    /// Where to log messages to.
    pub target: LogTarget,

    /// Targets (in `tracing` directive syntax) to log trace messages for.
    pub trace_targets: Vec<String>,
}

/// A severity level for logging.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

/// A target to log messages to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to a file.
    File(Utf8PathBuf),

    /// Print to standard output.
    Stdout,

    /// Print to standard error.
    #[default]
    Stderr,
}

//----------- UpdateConfig -----------------------------------------------------

/// Configuration for processing updates.
#[derive(Clone, Debug)]
pub struct UpdateConfig {
    /// How long to wait for a primary to answer a forwarded update.
    pub forward_timeout: Duration,

    /// How often to check whether retired zone snapshots can be released.
    pub reclaim_interval: Duration,

    /// The maximum number of changesets to keep in the journal, per zone.
    pub journal_max_entries: usize,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            forward_timeout: Duration::from_secs(5),
            reclaim_interval: Duration::from_secs(1),
            journal_max_entries: 100,
        }
    }
}

//----------- ZoneConfig -------------------------------------------------------

/// Configuration for a zone.
#[derive(Clone, Debug)]
pub struct ZoneConfig {
    /// The apex name of the zone.
    pub name: Name<Bytes>,

    /// The primary server, if this is a secondary.
    ///
    /// Updates to secondaries are forwarded to the primary.
    pub primary: Option<SocketAddr>,

    /// Whether the zone is signed.
    pub dnssec: bool,

    /// Whether to write the zone out after every committed update.
    pub flush_immediately: bool,

    /// How to generate new SOA serials.
    pub serial_policy: SerialPolicy,

    /// The names of the TSIG keys allowed to update the zone.
    ///
    /// If empty, updates are not restricted by key.
    pub update_keys: Vec<Name<Bytes>>,
}

impl ZoneConfig {
    /// A primary zone with default settings.
    pub fn new(name: Name<Bytes>) -> Self {
        Self {
            name,
            primary: None,
            dnssec: false,
            flush_immediately: false,
            serial_policy: SerialPolicy::Counter,
            update_keys: Vec::new(),
        }
    }
}

/// Policy for generating serial numbers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SerialPolicy {
    /// Increment the serial number on every change.
    #[default]
    Counter,

    /// Use the current Unix time, in seconds.
    ///
    /// If that would not increase the serial, it is incremented instead.
    UnixTime,

    /// Set the serial number to `<YYYY><MM><DD><xx>`.
    ///
    /// If that would not increase the serial, it is incremented instead.
    DateCounter,
}

//============ Errors ==========================================================

//----------- ConfigError ------------------------------------------------------

/// An error in loading the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io(Utf8PathBuf, io::Error),

    /// The configuration file is not valid TOML, or has an unexpected shape.
    Parse(toml::de::Error),

    /// A setting has an invalid value.
    Invalid(String),
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, err) => write!(f, "could not read '{path}': {err}"),
            ConfigError::Parse(err) => write!(f, "could not parse the configuration: {err}"),
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

//============ Tests ===========================================================

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use bytes::Bytes;
    use domain::base::Name;

    use super::{Config, ConfigError, LogLevel, LogTarget, SerialPolicy};

    #[test]
    fn full() {
        let config = Config::from_toml(
            r#"
            [logging]
            level = "debug"
            target = { file = "/var/log/weir.log" }
            trace-targets = ["weir::update=trace"]

            [updates]
            forward-timeout = "3s"
            reclaim-interval = 2
            journal-max-entries = 10

            [[zone]]
            name = "example.org"
            dnssec = true
            flush-immediately = true
            serial-policy = "date-counter"
            update-keys = ["key.example.org."]

            [[zone]]
            name = "example.net."
            primary = "192.0.2.1:53"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.logging.target,
            LogTarget::File("/var/log/weir.log".into())
        );
        assert_eq!(config.updates.forward_timeout, Duration::from_secs(3));
        assert_eq!(config.updates.reclaim_interval, Duration::from_secs(2));
        assert_eq!(config.updates.journal_max_entries, 10);

        let org = Name::<Bytes>::from_str("example.org.").unwrap();
        let zone = config.zone(&org).unwrap();
        assert!(zone.dnssec);
        assert!(zone.flush_immediately);
        assert!(zone.primary.is_none());
        assert_eq!(zone.serial_policy, SerialPolicy::DateCounter);
        assert_eq!(zone.update_keys.len(), 1);

        let net = Name::<Bytes>::from_str("example.net.").unwrap();
        let zone = config.zone(&net).unwrap();
        assert_eq!(zone.primary, Some("192.0.2.1:53".parse().unwrap()));
        assert_eq!(zone.serial_policy, SerialPolicy::Counter);
    }

    #[test]
    fn defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.target, LogTarget::Stderr);
        assert_eq!(config.updates.journal_max_entries, 100);
        assert!(config.zones.is_empty());
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            Config::from_toml("[updates]\nunknown = 1"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_toml("[updates]\njournal-max-entries = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[[zone]]\nname = \"a.\"\n[[zone]]\nname = \"A\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[[zone]]\nname = \"a..b\""),
            Err(ConfigError::Invalid(_))
        ));
    }
}
