use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "RehabTrack";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rolling window, ending today, over which adherence is reported.
pub const DEFAULT_ADHERENCE_WINDOW_DAYS: u32 = 7;

/// How far back the streak walk looks before giving up.
pub const DEFAULT_STREAK_LOOKBACK_DAYS: u32 = 90;

/// Upper bound for either day setting. Ten years of daily records.
pub const MAX_WINDOW_DAYS: u32 = 3650;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

const DATABASE_FILE: &str = "rehabtrack.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot determine home directory; set REHAB_DATA_DIR")]
    NoHomeDir,

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    "rehabtrack=info,rehabtrack_lib=info,tower_http=info".to_string()
}

/// Get the application data directory
/// ~/RehabTrack/ on all platforms
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

/// Knobs for the adherence snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdherenceSettings {
    pub window_days: u32,
    pub streak_lookback_days: u32,
}

impl Default for AdherenceSettings {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_ADHERENCE_WINDOW_DAYS,
            streak_lookback_days: DEFAULT_STREAK_LOOKBACK_DAYS,
        }
    }
}

/// Runtime configuration for the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub adherence: AdherenceSettings,
}

impl ServiceConfig {
    /// Reads `REHAB_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset or blank keys
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = match get("REHAB_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => app_data_dir()?,
        };
        let db_path = get("REHAB_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DATABASE_FILE));

        let bind_raw = get("REHAB_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "REHAB_BIND_ADDR",
                value: bind_raw.clone(),
                reason: e.to_string(),
            })?;

        let adherence = AdherenceSettings {
            window_days: parse_days(
                "REHAB_ADHERENCE_WINDOW_DAYS",
                get("REHAB_ADHERENCE_WINDOW_DAYS"),
                DEFAULT_ADHERENCE_WINDOW_DAYS,
            )?,
            streak_lookback_days: parse_days(
                "REHAB_STREAK_LOOKBACK_DAYS",
                get("REHAB_STREAK_LOOKBACK_DAYS"),
                DEFAULT_STREAK_LOOKBACK_DAYS,
            )?,
        };

        Ok(Self {
            data_dir,
            db_path,
            bind_addr,
            adherence,
        })
    }
}

fn parse_days(key: &'static str, raw: Option<String>, default: u32) -> Result<u32, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key,
            value: raw,
            reason: "must be at least 1".into(),
        }),
        Ok(days) if days > MAX_WINDOW_DAYS => Err(ConfigError::InvalidValue {
            key,
            value: raw,
            reason: format!("must be at most {MAX_WINDOW_DAYS}"),
        }),
        Ok(days) => Ok(days),
        Err(e) => Err(ConfigError::InvalidValue {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
