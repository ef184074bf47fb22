use std::path::PathBuf;

use crate::services::catalog::{DEFAULT_BASE_URL, DEFAULT_IMAGE_BASE};

pub const ENV_SUPABASE_URL: &str = "REELSHELF_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "REELSHELF_SUPABASE_ANON_KEY";
pub const ENV_TMDB_API_KEY: &str = "REELSHELF_TMDB_API_KEY";
pub const ENV_TMDB_BASE_URL: &str = "REELSHELF_TMDB_BASE_URL";
pub const ENV_TMDB_IMAGE_BASE: &str = "REELSHELF_TMDB_IMAGE_BASE";
pub const ENV_STATE_DB: &str = "REELSHELF_STATE_DB";
pub const ENV_OFFLINE: &str = "REELSHELF_OFFLINE";

const STATE_DB_FILE: &str = "state.db";

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    Missing(&'static str),
    /// A variable is set but unusable
    Invalid { key: &'static str, reason: String },
    /// No platform config dir to default the state db into
    NoConfigDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} is not set", key),
            ConfigError::Invalid { key, reason } => write!(f, "{} is invalid: {}", key, reason),
            ConfigError::NoConfigDir => {
                write!(f, "Failed to get config dir; set {} explicitly", ENV_STATE_DB)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for String {
    fn from(e: ConfigError) -> Self {
        e.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub base_url: String,
    pub image_base: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` runs against the in-process backend
    pub supabase: Option<SupabaseConfig>,
    pub catalog: CatalogConfig,
    pub state_db: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let offline = match get(ENV_OFFLINE) {
            None => false,
            Some(v) => parse_flag(&v).ok_or_else(|| ConfigError::Invalid {
                key: ENV_OFFLINE,
                reason: format!("expected true/false, got {:?}", v),
            })?,
        };

        let supabase = if offline {
            None
        } else {
            let url = get(ENV_SUPABASE_URL).ok_or(ConfigError::Missing(ENV_SUPABASE_URL))?;
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ConfigError::Invalid {
                    key: ENV_SUPABASE_URL,
                    reason: "must be an http(s) URL".to_string(),
                });
            }
            let anon_key =
                get(ENV_SUPABASE_ANON_KEY).ok_or(ConfigError::Missing(ENV_SUPABASE_ANON_KEY))?;
            Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
            })
        };

        let catalog = CatalogConfig {
            base_url: get(ENV_TMDB_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            image_base: get(ENV_TMDB_IMAGE_BASE).unwrap_or_else(|| DEFAULT_IMAGE_BASE.to_string()),
            api_key: get(ENV_TMDB_API_KEY),
        };

        let state_db = match get(ENV_STATE_DB) {
            Some(path) => PathBuf::from(path),
            None => default_state_db()?,
        };

        Ok(Self {
            supabase,
            catalog,
            state_db,
        })
    }

    pub fn is_offline(&self) -> bool {
        self.supabase.is_none()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_state_db() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("reelshelf").join(STATE_DB_FILE))
        .ok_or(ConfigError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn online_config() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_SUPABASE_URL, "https://example.supabase.co/"),
            (ENV_SUPABASE_ANON_KEY, "anon"),
            (ENV_TMDB_API_KEY, "tmdb"),
            (ENV_STATE_DB, "/tmp/reelshelf/state.db"),
        ]))
        .unwrap();

        assert!(!config.is_offline());
        let supabase = config.supabase.unwrap();
        assert_eq!(supabase.url, "https://example.supabase.co");
        assert_eq!(config.catalog.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.catalog.api_key.as_deref(), Some("tmdb"));
        assert_eq!(config.state_db, PathBuf::from("/tmp/reelshelf/state.db"));
    }

    #[test]
    fn offline_needs_no_backend() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_OFFLINE, "true"),
            (ENV_STATE_DB, "state.db"),
        ]))
        .unwrap();
        assert!(config.is_offline());
        assert!(config.catalog.api_key.is_none());
    }

    #[test]
    fn missing_and_invalid_values() {
        let err = AppConfig::from_lookup(lookup(&[(ENV_STATE_DB, "state.db")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_SUPABASE_URL));

        let err = AppConfig::from_lookup(lookup(&[
            (ENV_SUPABASE_URL, "example.supabase.co"),
            (ENV_SUPABASE_ANON_KEY, "anon"),
            (ENV_STATE_DB, "state.db"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_SUPABASE_URL, .. }));

        let err = AppConfig::from_lookup(lookup(&[(ENV_OFFLINE, "maybe")])).unwrap_err();
        assert!(err.to_string().starts_with(ENV_OFFLINE));
    }
}
