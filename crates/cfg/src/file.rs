//! The configuration file.

use std::{net::SocketAddr, str::FromStr};

use bytes::Bytes;
use camino::Utf8PathBuf;
use domain::base::Name;
use serde::{Deserialize, Serialize};

use crate::{
    Config, ConfigError, LogLevel, LogTarget, LoggingConfig, SerialPolicy, TimeSpan, UpdateConfig,
    ZoneConfig,
};

//----------- Spec -------------------------------------------------------------

/// A configuration file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Spec {
    /// How Weir logs.
    pub logging: LoggingSpec,

    /// How updates are processed.
    pub updates: UpdatesSpec,

    /// The zones being served.
    #[serde(rename = "zone")]
    pub zones: Vec<ZoneSpec>,
}

//--- Conversion

impl Spec {
    /// Parse from this specification.
    pub fn parse(self) -> Result<Config, ConfigError> {
        let mut seen = foldhash::HashSet::default();
        let zones = self
            .zones
            .into_iter()
            .map(|zone| {
                let zone = zone.parse()?;
                if !seen.insert(zone.name.to_string().to_ascii_lowercase()) {
                    return Err(ConfigError::Invalid(format!(
                        "zone '{}' is configured twice",
                        zone.name
                    )));
                }
                Ok(zone)
            })
            .collect::<Result<_, _>>()?;

        Ok(Config {
            logging: self.logging.parse(),
            updates: self.updates.parse()?,
            zones,
        })
    }

    /// Build into this specification.
    pub fn build(config: &Config) -> Self {
        Self {
            logging: LoggingSpec::build(&config.logging),
            updates: UpdatesSpec::build(&config.updates),
            zones: config.zones.iter().map(ZoneSpec::build).collect(),
        }
    }
}

//----------- LoggingSpec ------------------------------------------------------

/// Configuration for logging.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct LoggingSpec {
    /// The minimum severity of messages to log.
    pub level: LogLevelSpec,

    /// Where to log messages to.
    pub target: LogTargetSpec,

    /// Targets to log trace messages for, regardless of the level.
    pub trace_targets: Vec<String>,
}

//--- Conversion

impl LoggingSpec {
    /// Parse from this specification.
    pub fn parse(self) -> LoggingConfig {
        LoggingConfig {
            level: self.level.parse(),
            target: self.target.parse(),
            trace_targets: self.trace_targets,
        }
    }

    /// Build into this specification.
    pub fn build(config: &LoggingConfig) -> Self {
        Self {
            level: LogLevelSpec::build(config.level),
            target: LogTargetSpec::build(&config.target),
            trace_targets: config.trace_targets.clone(),
        }
    }
}

//----------- LogLevelSpec -----------------------------------------------------

/// A severity level for logging.
#[derive(Copy, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevelSpec {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

//--- Conversion

impl LogLevelSpec {
    /// Parse from this specification.
    pub fn parse(self) -> LogLevel {
        match self {
            Self::Trace => LogLevel::Trace,
            Self::Debug => LogLevel::Debug,
            Self::Info => LogLevel::Info,
            Self::Warning => LogLevel::Warning,
            Self::Error => LogLevel::Error,
        }
    }

    /// Build into this specification.
    pub fn build(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::Trace,
            LogLevel::Debug => Self::Debug,
            LogLevel::Info => Self::Info,
            LogLevel::Warning => Self::Warning,
            LogLevel::Error => Self::Error,
        }
    }
}

//----------- LogTargetSpec ----------------------------------------------------

/// A target to log messages to.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogTargetSpec {
    /// Append to a file.
    File(Utf8PathBuf),

    /// Print to standard output.
    Stdout,

    /// Print to standard error.
    #[default]
    Stderr,
}

//--- Conversion

impl LogTargetSpec {
    /// Parse from this specification.
    pub fn parse(self) -> LogTarget {
        match self {
            Self::File(path) => LogTarget::File(path),
            Self::Stdout => LogTarget::Stdout,
            Self::Stderr => LogTarget::Stderr,
        }
    }

    /// Build into this specification.
    pub fn build(target: &LogTarget) -> Self {
        match target {
            LogTarget::File(path) => Self::File(path.clone()),
            LogTarget::Stdout => Self::Stdout,
            LogTarget::Stderr => Self::Stderr,
        }
    }
}

//----------- UpdatesSpec ------------------------------------------------------

/// Configuration for processing updates.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct UpdatesSpec {
    /// How long to wait for a primary to answer a forwarded update.
    pub forward_timeout: TimeSpan,

    /// How often to check whether retired zone snapshots can be released.
    pub reclaim_interval: TimeSpan,

    /// The maximum number of changesets to keep in the journal, per zone.
    pub journal_max_entries: usize,
}

//--- Conversion

impl UpdatesSpec {
    /// Parse from this specification.
    pub fn parse(self) -> Result<UpdateConfig, ConfigError> {
        if self.journal_max_entries == 0 {
            return Err(ConfigError::Invalid(
                "'journal-max-entries' must be at least 1".into(),
            ));
        }
        if self.reclaim_interval.as_secs() == 0 {
            return Err(ConfigError::Invalid(
                "'reclaim-interval' must be at least 1 second".into(),
            ));
        }

        Ok(UpdateConfig {
            forward_timeout: self.forward_timeout.as_duration(),
            reclaim_interval: self.reclaim_interval.as_duration(),
            journal_max_entries: self.journal_max_entries,
        })
    }

    /// Build into this specification.
    pub fn build(config: &UpdateConfig) -> Self {
        Self {
            forward_timeout: TimeSpan::from_secs(config.forward_timeout.as_secs()),
            reclaim_interval: TimeSpan::from_secs(config.reclaim_interval.as_secs()),
            journal_max_entries: config.journal_max_entries,
        }
    }
}

impl Default for UpdatesSpec {
    fn default() -> Self {
        Self::build(&UpdateConfig::default())
    }
}

//----------- ZoneSpec ---------------------------------------------------------

/// Configuration for a zone.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ZoneSpec {
    /// The apex name of the zone.
    pub name: String,

    /// The primary server, if this is a secondary.
    #[serde(default)]
    pub primary: Option<SocketAddr>,

    /// Whether the zone is signed.
    #[serde(default)]
    pub dnssec: bool,

    /// Whether to write the zone out after every committed update.
    #[serde(default)]
    pub flush_immediately: bool,

    /// How to generate new SOA serials.
    #[serde(default)]
    pub serial_policy: SerialPolicySpec,

    /// The names of the TSIG keys allowed to update the zone.
    ///
    /// If empty, updates are not restricted by key.
    #[serde(default)]
    pub update_keys: Vec<String>,
}

//--- Conversion

impl ZoneSpec {
    /// Parse from this specification.
    pub fn parse(self) -> Result<ZoneConfig, ConfigError> {
        let name = parse_name(&self.name)?;
        let update_keys = self
            .update_keys
            .iter()
            .map(|key| parse_name(key))
            .collect::<Result<_, _>>()?;

        Ok(ZoneConfig {
            name,
            primary: self.primary,
            dnssec: self.dnssec,
            flush_immediately: self.flush_immediately,
            serial_policy: self.serial_policy.parse(),
            update_keys,
        })
    }

    /// Build into this specification.
    pub fn build(config: &ZoneConfig) -> Self {
        Self {
            name: config.name.to_string(),
            primary: config.primary,
            dnssec: config.dnssec,
            flush_immediately: config.flush_immediately,
            serial_policy: SerialPolicySpec::build(config.serial_policy),
            update_keys: config.update_keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Parse a domain name.
///
/// Names in the configuration are always absolute; a trailing dot is optional.
fn parse_name(text: &str) -> Result<Name<Bytes>, ConfigError> {
    let absolute = if text.ends_with('.') {
        text.to_string()
    } else {
        format!("{text}.")
    };
    Name::from_str(&absolute)
        .map_err(|err| ConfigError::Invalid(format!("invalid domain name '{text}': {err}")))
}

//----------- SerialPolicySpec -------------------------------------------------

/// Policy for generating serial numbers.
#[derive(Copy, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SerialPolicySpec {
    /// Increment the serial number on every change.
    #[default]
    Counter,

    /// Use the current Unix time, in seconds.
    UnixTime,

    /// Set the serial number to `<YYYY><MM><DD><xx>`.
    DateCounter,
}

//--- Conversion

impl SerialPolicySpec {
    /// Parse from this specification.
    pub fn parse(self) -> SerialPolicy {
        match self {
            Self::Counter => SerialPolicy::Counter,
            Self::UnixTime => SerialPolicy::UnixTime,
            Self::DateCounter => SerialPolicy::DateCounter,
        }
    }

    /// Build into this specification.
    pub fn build(policy: SerialPolicy) -> Self {
        match policy {
            SerialPolicy::Counter => Self::Counter,
            SerialPolicy::UnixTime => Self::UnixTime,
            SerialPolicy::DateCounter => Self::DateCounter,
        }
    }
}
