//! Settings for the `ledgerline` binary.
//!
//! Read from an optional `settings.toml` and overridden by `LEDGERLINE__*`
//! environment variables (`LEDGERLINE__DATABASE__URL`, `LEDGERLINE__APP__LEVEL`, ...).
use config::{Config, ConfigError, Environment, File};
use engine::{DEFAULT_MAX_INSTALLMENTS, RemainderPolicy};
use serde::Deserialize;

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Database {
    /// A sqlx connection string, or `memory` for a throwaway database.
    pub url: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: "sqlite:./ledgerline.db?mode=rwc".to_string(),
        }
    }
}

impl Database {
    pub fn connection_url(&self) -> &str {
        match self.url.as_str() {
            "memory" => MEMORY_URL,
            url => url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Engine {
    pub max_installments: u32,
    pub remainder_policy: RemainderPolicy,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            max_installments: DEFAULT_MAX_INSTALLMENTS,
            remainder_policy: RemainderPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub engine: Engine,
}

impl Settings {
    /// Load settings from `path` (extension optional, missing file allowed).
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("LEDGERLINE").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let settings = Settings::new("does-not-exist/settings").unwrap();
        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.engine.max_installments, DEFAULT_MAX_INSTALLMENTS);
        assert_eq!(settings.engine.remainder_policy, RemainderPolicy::First);
    }

    #[test]
    fn memory_shorthand() {
        let database = Database {
            url: "memory".to_string(),
        };
        assert_eq!(database.connection_url(), MEMORY_URL);
    }

    #[test]
    fn engine_section_parses() {
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(
                "[engine]\nmax_installments = 12\nremainder_policy = \"spread\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.engine.max_installments, 12);
        assert_eq!(settings.engine.remainder_policy, RemainderPolicy::Spread);
        assert_eq!(settings.database.url, "sqlite:./ledgerline.db?mode=rwc");
    }
}
