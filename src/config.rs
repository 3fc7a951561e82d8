//! Startup configuration
//!
//! Reads a line-oriented `KEY:VALUE` file once at startup. Lines starting
//! with `#` are comments and unknown keys are ignored. A bad value keeps
//! the default and is reported as a [`ConfigWarning`], so a typo never
//! stops the server from starting.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// Hard ceiling for `MAX_MESSAGE_LENGTH`
pub const MESSAGE_LENGTH_CEILING: usize = 1024;

/// Read buffer room beyond the payload: prefix, target name, separator
const READ_OVERHEAD: usize = 256;

pub const DEFAULT_PORT: u16 = 50001;
pub const DEFAULT_MAX_USERS: usize = 11;
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 139;

/// Logging threshold named by `LOGGING_LEVEL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    ///
    /// tracing has no level above `error`, so CRITICAL maps onto it.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(()),
        }
    }
}

/// Non-fatal problems found while parsing the config source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Line without a `:` separator
    MalformedLine { line: usize, text: String },
    /// Value that does not parse for its key
    InvalidValue { key: String, value: String },
    /// `MAX_MESSAGE_LENGTH` above the ceiling
    Clamped { requested: usize },
    /// Key the server does not know
    UnknownKey(String),
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::MalformedLine { line, text } => {
                write!(f, "line {}: expected KEY:VALUE, got '{}'", line, text)
            }
            ConfigWarning::InvalidValue { key, value } => {
                write!(f, "invalid value '{}' for {}, keeping default", value, key)
            }
            ConfigWarning::Clamped { requested } => write!(
                f,
                "MAX_MESSAGE_LENGTH {} exceeds {}, clamped",
                requested, MESSAGE_LENGTH_CEILING
            ),
            ConfigWarning::UnknownKey(key) => write!(f, "ignoring unknown key {}", key),
        }
    }
}

/// Process-wide settings, read-only after startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub log_level: LogLevel,
    pub max_users: usize,
    pub max_message_length: usize,
    /// Append log records here instead of stdout
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_level: LogLevel::default(),
            max_users: DEFAULT_MAX_USERS,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            log_file: None,
        }
    }
}

impl Config {
    /// Read and parse the config file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parse config text, starting from the defaults
    pub fn parse(text: &str) -> (Self, Vec<ConfigWarning>) {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                warnings.push(ConfigWarning::MalformedLine {
                    line: index + 1,
                    text: line.to_string(),
                });
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            let invalid = || ConfigWarning::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            };

            match key {
                "PORT" => match value.parse() {
                    Ok(port) => config.port = port,
                    Err(_) => warnings.push(invalid()),
                },
                "LOGGING_LEVEL" => match value.parse() {
                    Ok(level) => config.log_level = level,
                    Err(()) => warnings.push(invalid()),
                },
                "MAX_USER" => match value.parse() {
                    Ok(max) => config.max_users = max,
                    Err(_) => warnings.push(invalid()),
                },
                "MAX_MESSAGE_LENGTH" => match value.parse::<usize>() {
                    Ok(len) if len > MESSAGE_LENGTH_CEILING => {
                        warnings.push(ConfigWarning::Clamped { requested: len });
                        config.max_message_length = MESSAGE_LENGTH_CEILING;
                    }
                    Ok(len) => config.max_message_length = len,
                    Err(_) => warnings.push(invalid()),
                },
                "LOG_FILE" if !value.is_empty() => config.log_file = Some(PathBuf::from(value)),
                "LOG_FILE" => warnings.push(invalid()),
                _ => warnings.push(ConfigWarning::UnknownKey(key.to_string())),
            }
        }

        (config, warnings)
    }

    /// Bytes read from a socket per message
    ///
    /// Large enough for a maximum-length payload of 4-byte characters plus
    /// a target name, so a read that fills the buffer is always too long.
    pub fn read_buffer_size(&self) -> usize {
        (self.max_message_length * 4 + READ_OVERHEAD).max(MESSAGE_LENGTH_CEILING)
    }

    /// Listening address: every interface on the configured port
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let (config, warnings) = Config::parse("");
        assert_eq!(config, Config::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_recognized_keys() {
        let text = "# relay settings\n\
                    PORT:6000\n\
                    LOGGING_LEVEL:WARNING\n\
                    MAX_USER:3\n\
                    MAX_MESSAGE_LENGTH:200\n";
        let (config, warnings) = Config::parse(text);

        assert!(warnings.is_empty());
        assert_eq!(config.port, 6000);
        assert_eq!(config.log_level, LogLevel::Warning);
        assert_eq!(config.max_users, 3);
        assert_eq!(config.max_message_length, 200);
    }

    #[test]
    fn test_message_length_clamped() {
        let (config, warnings) = Config::parse("MAX_MESSAGE_LENGTH:5000");
        assert_eq!(config.max_message_length, MESSAGE_LENGTH_CEILING);
        assert_eq!(warnings, vec![ConfigWarning::Clamped { requested: 5000 }]);
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let text = "PORT:abc\nMAX_USER:-1\nLOGGING_LEVEL:verbose\njunk line";
        let (config, warnings) = Config::parse(text);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_users, DEFAULT_MAX_USERS);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(warnings.len(), 4);
        assert!(matches!(warnings[3], ConfigWarning::MalformedLine { line: 4, .. }));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let (config, warnings) = Config::parse("COLOR:blue\nPORT:7000");
        assert_eq!(config.port, 7000);
        assert_eq!(warnings, vec![ConfigWarning::UnknownKey("COLOR".to_string())]);
    }

    #[test]
    fn test_log_file_key() {
        let (config, _) = Config::parse("LOG_FILE: syslog.log");
        assert_eq!(config.log_file, Some(PathBuf::from("syslog.log")));
    }

    #[test]
    fn test_log_level_directives() {
        assert_eq!(LogLevel::Warning.as_directive(), "warn");
        assert_eq!(LogLevel::Critical.as_directive(), "error");
        assert!("debug".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_read_buffer_fits_longest_message() {
        let (config, _) = Config::parse("MAX_MESSAGE_LENGTH:1024");
        assert!(config.read_buffer_size() > 4 * 1024 + "*/".len());

        let (small, _) = Config::parse("MAX_MESSAGE_LENGTH:10");
        assert_eq!(small.read_buffer_size(), MESSAGE_LENGTH_CEILING);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here/config").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
