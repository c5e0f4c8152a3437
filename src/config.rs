use std::fmt;
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_RECONCILE_HOUR: u32 = 1;
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

/// Process configuration, read from `ROOMLEDGER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// UTC hour (0-23) at which the daily sweep runs.
    pub reconcile_hour: u32,
    /// WAL appends since the last compaction before the compactor rewrites the log.
    pub compact_threshold: u64,
    /// JSON file listing rooms and users to load at startup.
    pub inventory_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take defaults; unparseable ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("ROOMLEDGER_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let metrics_port = parse(&lookup, "ROOMLEDGER_METRICS_PORT")?;
        let reconcile_hour =
            parse(&lookup, "ROOMLEDGER_RECONCILE_HOUR")?.unwrap_or(DEFAULT_RECONCILE_HOUR);
        if reconcile_hour > 23 {
            return Err(ConfigError::Invalid {
                key: "ROOMLEDGER_RECONCILE_HOUR",
                value: reconcile_hour.to_string(),
            });
        }
        let compact_threshold =
            parse(&lookup, "ROOMLEDGER_COMPACT_THRESHOLD")?.unwrap_or(DEFAULT_COMPACT_THRESHOLD);
        let inventory_file = lookup("ROOMLEDGER_INVENTORY_FILE").map(PathBuf::from);

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            metrics_port,
            reconcile_hour,
            compact_threshold,
            inventory_file,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roomledger.wal")
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
