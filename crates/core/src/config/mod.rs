//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELLCACHE_*)
//! 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// How document navigations are served.
///
/// One strategy applies to every navigation handled by a worker instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationStrategy {
    /// Fetch the shell with forced revalidation; fall back to the stored shell.
    #[default]
    NetworkFirst,
    /// Serve the stored shell immediately and refresh it in the background.
    CacheFirst,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELLCACHE_*)
/// 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version identifier. Takes precedence over the worker URL parameter.
    ///
    /// Set via SHELLCACHE_VERSION environment variable.
    #[serde(default)]
    pub version: Option<String>,

    /// The worker's own URL, e.g. `https://app.example/sw.js?v=42`.
    ///
    /// Supplies the version (via `version_param`) and the default scope.
    #[serde(default)]
    pub worker_url: Option<String>,

    /// Query parameter on `worker_url` holding the version identifier.
    #[serde(default = "default_version_param")]
    pub version_param: String,

    /// Registration scope. Defaults to the directory of `worker_url`.
    #[serde(default)]
    pub scope: Option<String>,

    /// Store names are `cache_prefix + version`.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Locators stored on install, resolved against the scope.
    ///
    /// Set via SHELLCACHE_PRECACHE as an array, e.g. `["manifest.json","icon.png"]`.
    #[serde(default)]
    pub precache: Vec<String>,

    /// Locator of the application shell served for every navigation.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Strategy applied to document navigations.
    #[serde(default)]
    pub navigation_strategy: NavigationStrategy,

    /// Path to SQLite store database.
    ///
    /// Set via SHELLCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Optional network timeout in milliseconds. Unset means no timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_version_param() -> String {
    "v".into()
}

fn default_cache_prefix() -> String {
    "shellcache-".into()
}

fn default_shell() -> String {
    "index.html".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shellcache.sqlite")
}

fn default_user_agent() -> String {
    "shellcache/0.1".into()
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: None,
            worker_url: None,
            version_param: default_version_param(),
            scope: None,
            cache_prefix: default_cache_prefix(),
            precache: Vec::new(),
            shell: default_shell(),
            navigation_strategy: NavigationStrategy::default(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed,
    /// or if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::var("SHELLCACHE_CONFIG_FILE").ok())
    }

    /// Load configuration with an explicit TOML file instead of `SHELLCACHE_CONFIG_FILE`.
    pub fn load_from(config_file: Option<String>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_path) = config_file {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELLCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The version identifier, from `version` or the worker URL's query.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if neither source provides one.
    pub fn resolved_version(&self) -> Result<String, ConfigError> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }

        if let Some(worker_url) = &self.worker_url {
            let url = parse_url("worker_url", worker_url)?;
            if let Some((_, value)) = url.query_pairs().find(|(k, _)| k.as_ref() == self.version_param.as_str()) {
                return Ok(value.into_owned());
            }
        }

        Err(ConfigError::Missing {
            field: "version".into(),
            hint: format!(
                "Set SHELLCACHE_VERSION or add ?{}=<version> to SHELLCACHE_WORKER_URL",
                self.version_param
            ),
        })
    }

    /// The registration scope as an absolute URL ending in `/`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if neither `scope` nor `worker_url` is set.
    pub fn resolved_scope(&self) -> Result<Url, ConfigError> {
        let mut scope = match (&self.scope, &self.worker_url) {
            (Some(scope), _) => parse_url("scope", scope)?,
            (None, Some(worker_url)) => {
                let url = parse_url("worker_url", worker_url)?;
                url.join("./").map_err(|e| ConfigError::Invalid {
                    field: "worker_url".into(),
                    reason: e.to_string(),
                })?
            }
            (None, None) => {
                return Err(ConfigError::Missing {
                    field: "scope".into(),
                    hint: "Set SHELLCACHE_SCOPE or SHELLCACHE_WORKER_URL".into(),
                });
            }
        };

        scope.set_query(None);
        scope.set_fragment(None);
        if !scope.path().ends_with('/') {
            let path = format!("{}/", scope.path());
            scope.set_path(&path);
        }

        Ok(scope)
    }

    /// Name of the store for the resolved version.
    pub fn store_name(&self) -> Result<String, ConfigError> {
        Ok(format!("{}{}", self.cache_prefix, self.resolved_version()?))
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::Invalid { field: field.into(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.version.is_none());
        assert!(config.worker_url.is_none());
        assert_eq!(config.version_param, "v");
        assert_eq!(config.cache_prefix, "shellcache-");
        assert_eq!(config.shell, "index.html");
        assert_eq!(config.navigation_strategy, NavigationStrategy::NetworkFirst);
        assert_eq!(config.db_path, PathBuf::from("./shellcache.sqlite"));
        assert_eq!(config.user_agent, "shellcache/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert!(config.timeout().is_none());
        assert!(config.precache.is_empty());
    }

    #[test]
    fn test_version_from_worker_url() {
        let config = AppConfig {
            worker_url: Some("https://app.example/pwa/sw.js?v=2024.10.1".into()),
            ..Default::default()
        };
        assert_eq!(config.resolved_version().unwrap(), "2024.10.1");
        assert_eq!(config.store_name().unwrap(), "shellcache-2024.10.1");
    }

    #[test]
    fn test_explicit_version_wins() {
        let config = AppConfig {
            version: Some("v9".into()),
            worker_url: Some("https://app.example/sw.js?v=v1".into()),
            ..Default::default()
        };
        assert_eq!(config.resolved_version().unwrap(), "v9");
    }

    #[test]
    fn test_custom_version_param() {
        let config = AppConfig {
            worker_url: Some("https://app.example/sw.js?build=abc".into()),
            version_param: "build".into(),
            ..Default::default()
        };
        assert_eq!(config.resolved_version().unwrap(), "abc");
    }

    #[test]
    fn test_missing_version() {
        let config = AppConfig { worker_url: Some("https://app.example/sw.js".into()), ..Default::default() };
        assert!(matches!(config.resolved_version(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_scope_from_worker_url() {
        let config = AppConfig {
            worker_url: Some("https://app.example/pwa/sw.js?v=1".into()),
            ..Default::default()
        };
        assert_eq!(config.resolved_scope().unwrap().as_str(), "https://app.example/pwa/");
    }

    #[test]
    fn test_scope_gets_trailing_slash() {
        let config = AppConfig { scope: Some("https://app.example/pwa".into()), ..Default::default() };
        assert_eq!(config.resolved_scope().unwrap().as_str(), "https://app.example/pwa/");
    }

    #[test]
    fn test_missing_scope() {
        let config = AppConfig { version: Some("v1".into()), ..Default::default() };
        assert!(matches!(config.resolved_scope(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_navigation_strategy_serde() {
        let strategy: NavigationStrategy = serde_json::from_str("\"cache-first\"").unwrap();
        assert_eq!(strategy, NavigationStrategy::CacheFirst);
    }

    #[test]
    fn test_load_layers() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "shellcache.toml",
                r#"
                worker_url = "https://app.example/sw.js?v=file"
                precache = ["manifest.json", "icon.png"]
                navigation_strategy = "cache-first"
                "#,
            )?;
            jail.set_env("SHELLCACHE_VERSION", "env");

            let config = AppConfig::load_from(Some("shellcache.toml".into())).unwrap();
            assert_eq!(config.resolved_version().unwrap(), "env");
            assert_eq!(config.precache, vec!["manifest.json".to_string(), "icon.png".to_string()]);
            assert_eq!(config.navigation_strategy, NavigationStrategy::CacheFirst);
            Ok(())
        });
    }
}
