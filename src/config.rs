//! Application configuration.
//!
//! Loaded from TOML, every field optional:
//!
//! ```toml
//! name = "my-app"
//! debug = true
//! addr = "0.0.0.0:3000"
//! admin_token = "s3cret"
//!
//! [maintenance]
//! enabled = false
//! message = "Back soon."
//! whitelisted_ips = ["127.0.0.1", "::1"]
//!
//! [cors]
//! allow_origin = "*"
//! ```
//!
//! A handful of environment variables override the file, so the same build
//! can run in every environment: `APP_NAME`, `APP_DEBUG`, `APP_ADDR`,
//! `ADMIN_TOKEN`, `MAINTENANCE_MODE`.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::container::{Container, Injectable};
use crate::error::{ContainerError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub name: String,
    pub env: String,
    /// Error pages include the underlying error message.
    pub debug: bool,
    /// Address [`Server`](crate::Server) binds to.
    pub addr: String,
    /// Token `AdminMiddleware` compares against.
    pub admin_token: String,
    pub maintenance: MaintenanceConfig,
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "lintel".to_owned(),
            env: "local".to_owned(),
            debug: false,
            addr: "0.0.0.0:3000".to_owned(),
            admin_token: "secret-admin-token".to_owned(),
            maintenance: MaintenanceConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub message: String,
    pub whitelisted_ips: Vec<String>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            message: "We are currently performing maintenance. Please check back soon.".to_owned(),
            whitelisted_ips: vec!["127.0.0.1".to_owned(), "::1".to_owned()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_owned(),
            allow_methods: "GET, POST, PUT, DELETE, OPTIONS".to_owned(),
            allow_headers: "Content-Type, Authorization, X-Requested-With".to_owned(),
        }
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Reads a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&source)?.with_env_overrides())
    }

    /// Applies `APP_*` / `ADMIN_TOKEN` / `MAINTENANCE_MODE` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(name) = var("APP_NAME") {
            self.name = name;
        }
        if let Some(addr) = var("APP_ADDR") {
            self.addr = addr;
        }
        if let Some(token) = var("ADMIN_TOKEN") {
            self.admin_token = token;
        }
        if let Some(debug) = var("APP_DEBUG") {
            self.debug = parse_flag("APP_DEBUG", &debug, self.debug);
        }
        if let Some(enabled) = var("MAINTENANCE_MODE") {
            self.maintenance.enabled = parse_flag("MAINTENANCE_MODE", &enabled, self.maintenance.enabled);
        }
        self
    }
}

fn parse_flag(key: &str, raw: &str, current: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
            warn!(key, value = raw, "ignoring unparseable boolean");
            current
        }
    }
}

/// Without a registered instance the container falls back to defaults plus
/// environment overrides.
impl Injectable for Config {
    fn build(_: &Container) -> Result<Self, ContainerError> {
        Ok(Self::default().with_env_overrides())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = Config::from_toml("debug = true\n[maintenance]\nenabled = true\n").unwrap();
        assert!(config.debug);
        assert!(config.maintenance.enabled);
        assert_eq!(config.maintenance.whitelisted_ips, vec!["127.0.0.1", "::1"]);
        assert_eq!(config.cors, CorsConfig::default());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        assert!(matches!(Config::from_toml("debug = 'maybe'"), Err(crate::Error::Config(_))));
    }

    #[test]
    fn environment_overrides_the_file() {
        let env: HashMap<&str, &str> =
            [("APP_DEBUG", "1"), ("ADMIN_TOKEN", "t0k"), ("MAINTENANCE_MODE", "bogus")].into();

        let config = Config::default().with_overrides(|k| env.get(k).map(|v| (*v).to_owned()));
        assert!(config.debug);
        assert_eq!(config.admin_token, "t0k");
        assert!(!config.maintenance.enabled);
    }
}
