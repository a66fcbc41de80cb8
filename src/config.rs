//! Configuration record and its line-oriented `key = value` loader.
//!
//! Loading a config file is an external concern from the storage/protocol
//! core's point of view (the core only consumes a [`Config`]), but a
//! runnable binary needs one. Parsed by hand rather than reaching for a
//! parsing crate: one key per line, `#`-prefixed and blank lines
//! ignored, unknown or duplicate keys rejected.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::storage::EvictionPolicy;

/// A fully validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub num_workers: usize,
    pub max_num_files: usize,
    pub max_storage_size: u64,
    pub enable_compression: bool,
    pub socketname: String,
    pub replacement_policy: EvictionPolicy,
}

/// Why a config file or line failed to validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    UnknownKey { line: usize, key: String },
    DuplicateKey { line: usize, key: String },
    MissingKey(&'static str),
    InvalidValue { line: usize, key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "i/o error reading config: {msg}"),
            ConfigError::UnknownKey { line, key } => {
                write!(f, "line {line}: unknown config key {key:?}")
            }
            ConfigError::DuplicateKey { line, key } => {
                write!(f, "line {line}: duplicate config key {key:?}")
            }
            ConfigError::MissingKey(key) => write!(f, "missing required config key {key:?}"),
            ConfigError::InvalidValue { line, key, value } => {
                write!(f, "line {line}: invalid value {value:?} for key {key:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

const KEYS: &[&str] = &[
    "num_workers",
    "max_num_files",
    "max_storage_size",
    "enable_compression",
    "socketname",
    "replacement_policy",
];

impl Config {
    /// Parse and validate a config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::parse(&text)
    }

    /// Parse and validate the body of a config file.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let mut seen: HashSet<&'static str> = HashSet::new();
        let mut num_workers = None;
        let mut max_num_files = None;
        let mut max_storage_size = None;
        let mut enable_compression = None;
        let mut socketname = None;
        let mut replacement_policy = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_number = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                line: line_number,
                key: line.to_string(),
                value: String::new(),
            })?;
            let key = key.trim();
            let value = value.trim();
            let canonical = *KEYS
                .iter()
                .find(|k| **k == key)
                .ok_or_else(|| ConfigError::UnknownKey {
                    line: line_number,
                    key: key.to_string(),
                })?;
            if !seen.insert(canonical) {
                return Err(ConfigError::DuplicateKey {
                    line: line_number,
                    key: canonical.to_string(),
                });
            }

            match canonical {
                "num_workers" => {
                    num_workers = Some(parse_positive_usize(line_number, key, value)?);
                }
                "max_num_files" => {
                    max_num_files = Some(parse_positive_usize(line_number, key, value)?);
                }
                "max_storage_size" => {
                    max_storage_size = Some(parse_positive_u64(line_number, key, value)?);
                }
                "enable_compression" => {
                    enable_compression = Some(parse_bool(line_number, key, value)?);
                }
                "socketname" => {
                    if value.is_empty() {
                        return Err(ConfigError::InvalidValue {
                            line: line_number,
                            key: key.to_string(),
                            value: value.to_string(),
                        });
                    }
                    socketname = Some(value.to_string());
                }
                "replacement_policy" => {
                    replacement_policy = Some(parse_policy(line_number, key, value)?);
                }
                _ => unreachable!("canonical key not in KEYS"),
            }
        }

        Ok(Config {
            num_workers: num_workers.ok_or(ConfigError::MissingKey("num_workers"))?,
            max_num_files: max_num_files.ok_or(ConfigError::MissingKey("max_num_files"))?,
            max_storage_size: max_storage_size.ok_or(ConfigError::MissingKey("max_storage_size"))?,
            enable_compression: enable_compression
                .ok_or(ConfigError::MissingKey("enable_compression"))?,
            socketname: socketname.ok_or(ConfigError::MissingKey("socketname"))?,
            replacement_policy: replacement_policy
                .ok_or(ConfigError::MissingKey("replacement_policy"))?,
        })
    }
}

fn parse_positive_usize(line: usize, key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .parse::<usize>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            line,
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_positive_u64(line: usize, key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            line,
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_bool(line: usize, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(ConfigError::InvalidValue {
            line,
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_policy(line: usize, key: &str, value: &str) -> Result<EvictionPolicy, ConfigError> {
    match value {
        "FIFO" => Ok(EvictionPolicy::Fifo),
        "LRU" => Ok(EvictionPolicy::Lru),
        "LFU" => Ok(EvictionPolicy::Lfu),
        _ => Err(ConfigError::InvalidValue {
            line,
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "\
num_workers = 4
max_num_files = 100
max_storage_size = 1048576
enable_compression = 0
socketname = /tmp/memfiled.sock
replacement_policy = LRU
";

    #[test]
    fn parses_valid_config() {
        let cfg = Config::parse(VALID).unwrap();
        assert_eq!(cfg.num_workers, 4);
        assert_eq!(cfg.max_num_files, 100);
        assert_eq!(cfg.max_storage_size, 1_048_576);
        assert!(!cfg.enable_compression);
        assert_eq!(cfg.socketname, "/tmp/memfiled.sock");
        assert_eq!(cfg.replacement_policy, EvictionPolicy::Lru);
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let text = format!("# a comment\n\n{VALID}\n# trailing\n");
        Config::parse(&text).unwrap();
    }

    #[test]
    fn rejects_unknown_key() {
        let text = format!("{VALID}bogus = 1\n");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::UnknownKey { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_key() {
        let text = format!("{VALID}num_workers = 8\n");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn rejects_missing_key() {
        let text = "num_workers = 4\n";
        assert!(matches!(
            Config::parse(text),
            Err(ConfigError::MissingKey(_))
        ));
    }

    #[test]
    fn rejects_non_positive_count() {
        let text = VALID.replace("num_workers = 4", "num_workers = 0");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_bad_policy() {
        let text = VALID.replace("replacement_policy = LRU", "replacement_policy = MRU");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
