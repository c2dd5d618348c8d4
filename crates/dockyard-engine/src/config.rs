//! Engine connection settings resolved from the environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";
pub const DOCKER_TLS_VERIFY_ENV: &str = "DOCKER_TLS_VERIFY";
pub const DOCKER_CERT_PATH_ENV: &str = "DOCKER_CERT_PATH";
pub const ENGINE_TIMEOUT_ENV: &str = "DOCKYARD_ENGINE_TIMEOUT";

/// Request timeout used when none is configured, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine address (`unix://`, `tcp://`, `http://`). `None` uses the local socket.
    pub host: Option<String>,
    pub tls_verify: bool,
    /// Directory holding `ca.pem`, `cert.pem` and `key.pem`.
    pub cert_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: None,
            tls_verify: false,
            cert_path: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let tls_verify = get(DOCKER_TLS_VERIFY_ENV)
            .map(|value| !matches!(value.trim(), "0" | "false" | "FALSE" | "no"))
            .unwrap_or(false);

        let timeout_secs = get(ENGINE_TIMEOUT_ENV)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            host: get(DOCKER_HOST_ENV),
            tls_verify,
            cert_path: get(DOCKER_CERT_PATH_ENV).map(PathBuf::from),
            timeout_secs,
        }
    }

    pub fn ca_file(&self) -> Option<PathBuf> {
        self.cert_path.as_ref().map(|dir| dir.join("ca.pem"))
    }

    pub fn cert_file(&self) -> Option<PathBuf> {
        self.cert_path.as_ref().map(|dir| dir.join("cert.pem"))
    }

    pub fn key_file(&self) -> Option<PathBuf> {
        self.cert_path.as_ref().map(|dir| dir.join("key.pem"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_uses_local_defaults() {
        let config = EngineConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_tls_environment() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            (DOCKER_HOST_ENV, "tcp://192.168.99.100:2376"),
            (DOCKER_TLS_VERIFY_ENV, "1"),
            (DOCKER_CERT_PATH_ENV, "/home/user/.docker/machine/machines/default"),
            (ENGINE_TIMEOUT_ENV, "30"),
        ]));

        assert_eq!(config.host.as_deref(), Some("tcp://192.168.99.100:2376"));
        assert!(config.tls_verify);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(
            config.ca_file().unwrap(),
            PathBuf::from("/home/user/.docker/machine/machines/default/ca.pem")
        );
    }

    #[test]
    fn test_blank_and_disabled_values() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            (DOCKER_HOST_ENV, "  "),
            (DOCKER_TLS_VERIFY_ENV, "0"),
            (ENGINE_TIMEOUT_ENV, "soon"),
        ]));

        assert_eq!(config.host, None);
        assert!(!config.tls_verify);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
