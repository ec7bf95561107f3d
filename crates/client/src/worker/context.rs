//! Process-wide worker state.

use url::Url;

use crate::fetch::{resolve, same_origin};
use shellcache_core::{AppConfig, Error, NavigationStrategy};

/// Read-only state established once at worker startup.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub version: String,
    pub store_name: String,
    pub scope: Url,
    /// Resolved precache list, in declaration order, without duplicates.
    pub precache: Vec<Url>,
    /// The navigation/document identity served for every navigation.
    pub shell: Url,
    pub navigation: NavigationStrategy,
}

impl WorkerContext {
    /// Build the context from loaded configuration.
    ///
    /// Precache locators that fail to resolve, or resolve to another origin,
    /// are skipped with a warning rather than failing startup.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let version = config.resolved_version()?;
        let store_name = config.store_name()?;
        let scope = config.resolved_scope()?;

        let shell = resolve(&scope, &config.shell).map_err(|e| Error::InvalidUrl(format!("shell: {e}")))?;
        if !same_origin(&scope, &shell) {
            return Err(Error::CrossOrigin(shell.to_string()));
        }

        let mut precache: Vec<Url> = Vec::with_capacity(config.precache.len());
        for locator in &config.precache {
            match resolve(&scope, locator) {
                Ok(url) if !same_origin(&scope, &url) => {
                    tracing::warn!(locator = %locator, url = %url, "skipping cross-origin precache entry")
                }
                Ok(url) if !precache.contains(&url) => precache.push(url),
                Ok(_) => {}
                Err(e) => tracing::warn!(locator = %locator, error = %e, "skipping unresolvable precache entry"),
            }
        }

        Ok(Self { version, store_name, scope, precache, shell, navigation: config.navigation_strategy })
    }
}
