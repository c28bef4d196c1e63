//! Configuration loading.
//!
//! Configuration is read once at process startup: an optional JSON file named
//! by `CALLTAP_CONFIG`, then environment variable overrides. Nothing is ever
//! written back.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::constants;

/// Configuration for the interception engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Address the control listener binds to. Must be loopback.
    pub bind_address: IpAddr,
    /// Port the control listener binds to (0 picks an ephemeral port).
    pub port: u16,
    /// Milliseconds a blocking interception waits for a reply.
    pub interception_timeout_ms: u64,
    /// Namespace prefixes whose methods are never instrumented.
    pub ignored_namespaces: Vec<String>,
    /// Lifecycle sampler settings.
    pub sampler: SamplerConfig,
}

/// Lifecycle sampler settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SamplerConfig {
    /// Whether the sampler task runs at all.
    pub enabled: bool,
    /// Milliseconds between ticks.
    pub interval_ms: u64,
    /// Callback names published on every tick.
    pub callbacks: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: constants::DEFAULT_BIND_ADDRESS,
            port: constants::DEFAULT_PORT,
            interception_timeout_ms: duration_ms(constants::DEFAULT_INTERCEPTION_TIMEOUT),
            ignored_namespaces: vec!["std".to_string(), "core".to_string(), "alloc".to_string()],
            sampler: SamplerConfig::default(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: duration_ms(constants::DEFAULT_SAMPLER_INTERVAL),
            callbacks: constants::DEFAULT_LIFECYCLE_CALLBACKS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Loads configuration from `CALLTAP_CONFIG` (if set), with environment
    /// variable overrides applied on top.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os("CALLTAP_CONFIG") {
            Some(path) => Self::load_from_path(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Applies `CALLTAP_*` overrides using `lookup` to resolve variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("CALLTAP_BIND") {
            self.bind_address = bind
                .trim()
                .parse()
                .with_context(|| format!("Invalid CALLTAP_BIND: {bind}"))?;
        }
        if let Some(port) = lookup("CALLTAP_PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid CALLTAP_PORT: {port}"))?;
        }
        if let Some(timeout) = lookup("CALLTAP_INTERCEPT_TIMEOUT_MS") {
            self.interception_timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid CALLTAP_INTERCEPT_TIMEOUT_MS: {timeout}"))?;
        }
        if let Some(namespaces) = lookup("CALLTAP_IGNORED_NAMESPACES") {
            self.ignored_namespaces = namespaces
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(enabled) = lookup("CALLTAP_SAMPLER") {
            self.sampler.enabled = matches!(enabled.trim(), "1" | "true" | "yes");
        }
        if let Some(interval) = lookup("CALLTAP_SAMPLER_INTERVAL_MS") {
            self.sampler.interval_ms = interval
                .trim()
                .parse()
                .with_context(|| format!("Invalid CALLTAP_SAMPLER_INTERVAL_MS: {interval}"))?;
        }
        Ok(())
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.bind_address.is_loopback() {
            bail!(
                "Refusing to bind control channel to non-loopback address {}",
                self.bind_address
            );
        }
        if self.interception_timeout_ms == 0 {
            bail!("interception_timeout_ms must be greater than zero");
        }
        if self.sampler.enabled && self.sampler.interval_ms == 0 {
            bail!("sampler.interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Socket address of the control listener.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Blocking interception timeout.
    pub fn interception_timeout(&self) -> Duration {
        Duration::from_millis(self.interception_timeout_ms)
    }
}

impl SamplerConfig {
    /// Period between sampler ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_loopback_with_five_second_timeout() {
        let config = Config::default();
        assert!(config.bind_address.is_loopback());
        assert_eq!(config.port, constants::DEFAULT_PORT);
        assert_eq!(config.interception_timeout(), Duration::from_secs(5));
        assert!(!config.sampler.enabled);
        assert_eq!(config.sampler.callbacks.len(), 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_applied() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("CALLTAP_PORT", "7000"),
                ("CALLTAP_INTERCEPT_TIMEOUT_MS", "250"),
                ("CALLTAP_IGNORED_NAMESPACES", "System, UnityEngine,,"),
                ("CALLTAP_SAMPLER", "true"),
                ("CALLTAP_SAMPLER_INTERVAL_MS", "20"),
            ]))
            .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.interception_timeout(), Duration::from_millis(250));
        assert_eq!(config.ignored_namespaces, vec!["System", "UnityEngine"]);
        assert!(config.sampler.enabled);
        assert_eq!(config.sampler.interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_port_override_is_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup_from(&[("CALLTAP_PORT", "69420")]))
            .unwrap_err();
        assert!(err.to_string().contains("CALLTAP_PORT"), "got: {err}");
    }

    #[test]
    fn test_non_loopback_bind_rejected() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[("CALLTAP_BIND", "0.0.0.0")]))
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("non-loopback"), "got: {err}");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config {
            interception_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_path_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 0, "sampler": {{"enabled": true}}}}"#).unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.port, 0);
        assert!(config.sampler.enabled);
        assert_eq!(config.sampler.interval_ms, 100);
        assert_eq!(config.interception_timeout_ms, 5000);
    }

    #[test]
    fn test_load_from_path_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"), "got: {err}");
    }
}
