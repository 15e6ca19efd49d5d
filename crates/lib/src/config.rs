//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.clerk/config.json`) and environment.
//! Store credentials are never cached: the pipeline asks a [`CredentialsProvider`] on every
//! resolution attempt, so a settings change takes effect on the next search.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outbound signal the widget posts to the host to ask for the current context.
pub const DEFAULT_FETCH_SIGNAL: &str = "chatwoot-dashboard-app:fetch-info";

/// How long a context request waits for the host before reporting a timeout.
pub const DEFAULT_CONTEXT_TIMEOUT_MS: u64 = 5000;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Commerce API settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Host application connection settings.
    #[serde(default)]
    pub host: HostConfig,
}

/// Commerce API root and key pair. All three must be set before any request is made.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// REST root, e.g. `https://shop.example/wp-json/wc/v3`. Overridden by CLERK_STORE_URL env.
    pub base_url: Option<String>,
    /// Overridden by CLERK_STORE_KEY env.
    pub consumer_key: Option<String>,
    /// Overridden by CLERK_STORE_SECRET env.
    pub consumer_secret: Option<String>,
}

/// Host connection: where the host lives and how a context request is spelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// WebSocket URL of the host application (used by `clerk watch`).
    pub url: Option<String>,

    /// Sentinel posted to the host to request context.
    #[serde(default = "default_fetch_signal")]
    pub fetch_signal: String,

    /// Wait window for a context request, in milliseconds.
    #[serde(default = "default_context_timeout_ms")]
    pub context_timeout_ms: u64,
}

fn default_fetch_signal() -> String {
    DEFAULT_FETCH_SIGNAL.to_string()
}

fn default_context_timeout_ms() -> u64 {
    DEFAULT_CONTEXT_TIMEOUT_MS
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            url: None,
            fetch_signal: default_fetch_signal(),
            context_timeout_ms: default_context_timeout_ms(),
        }
    }
}

/// Resolved store credentials. Only constructed when every field is present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

/// Source of store credentials, read fresh at the moment of each resolution attempt.
pub trait CredentialsProvider: Send + Sync {
    /// `None` means "not configured".
    fn credentials(&self) -> Option<Credentials>;
}

impl<F> CredentialsProvider for F
where
    F: Fn() -> Option<Credentials> + Send + Sync,
{
    fn credentials(&self) -> Option<Credentials> {
        self()
    }
}

/// Reads credentials from the config file and environment on every call.
#[derive(Debug, Clone)]
pub struct ConfigFileCredentials {
    path: Option<PathBuf>,
    env: EnvLookup,
}

/// Looks up one environment variable by name.
pub type EnvLookup = fn(&str) -> Option<String>;

fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

impl ConfigFileCredentials {
    /// `None` uses the default path (CLERK_CONFIG_PATH or ~/.clerk/config.json).
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            env: process_env,
        }
    }

    /// Replace the process environment as the source of `CLERK_STORE_*` overrides.
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }
}

impl CredentialsProvider for ConfigFileCredentials {
    fn credentials(&self) -> Option<Credentials> {
        match load_config(self.path.clone()) {
            Ok((config, _)) => resolve_credentials_with(&config, self.env),
            Err(e) => {
                log::warn!("reading store credentials failed: {:#}", e);
                None
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve credentials from env (CLERK_STORE_URL, CLERK_STORE_KEY, CLERK_STORE_SECRET) over config.
/// Returns None unless all three are present.
pub fn resolve_credentials(config: &Config) -> Option<Credentials> {
    resolve_credentials_with(config, process_env)
}

/// Like [`resolve_credentials`], reading overrides through `env`.
pub fn resolve_credentials_with(config: &Config, env: EnvLookup) -> Option<Credentials> {
    let env_or = |var: &str, fallback: Option<&str>| {
        non_empty(env(var).as_deref()).or_else(|| non_empty(fallback))
    };
    let store = &config.store;
    let base_url = env_or("CLERK_STORE_URL", store.base_url.as_deref())?;
    let consumer_key = env_or("CLERK_STORE_KEY", store.consumer_key.as_deref())?;
    let consumer_secret = env_or("CLERK_STORE_SECRET", store.consumer_secret.as_deref())?;
    Some(Credentials {
        base_url: base_url.trim_end_matches('/').to_string(),
        consumer_key,
        consumer_secret,
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CLERK_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".clerk").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or CLERK_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store(url: Option<&str>, key: Option<&str>, secret: Option<&str>) -> Config {
        Config {
            store: StoreConfig {
                base_url: url.map(String::from),
                consumer_key: key.map(String::from),
                consumer_secret: secret.map(String::from),
            },
            ..Config::default()
        }
    }

    #[test]
    fn host_defaults() {
        let h = HostConfig::default();
        assert_eq!(h.fetch_signal, DEFAULT_FETCH_SIGNAL);
        assert_eq!(h.context_timeout_ms, 5000);
        assert!(h.url.is_none());
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.store.base_url.is_none());
        assert_eq!(config.host.context_timeout_ms, DEFAULT_CONTEXT_TIMEOUT_MS);
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn credentials_require_all_three() {
        let resolve = |c: &Config| resolve_credentials_with(c, no_env);
        assert!(resolve(&store(Some("https://s"), Some("ck"), None)).is_none());
        assert!(resolve(&store(None, Some("ck"), Some("cs"))).is_none());
        assert!(resolve(&store(Some("https://s"), Some("  "), Some("cs"))).is_none());
    }

    #[test]
    fn env_overrides_config_and_fills_gaps() {
        fn env(var: &str) -> Option<String> {
            match var {
                "CLERK_STORE_URL" => Some(" https://env.example/ ".to_string()),
                "CLERK_STORE_SECRET" => Some("cs_env".to_string()),
                _ => Some(String::new()),
            }
        }
        let creds = resolve_credentials_with(&store(Some("https://file"), Some("ck_file"), None), env)
            .unwrap();
        assert_eq!(creds.base_url, "https://env.example");
        assert_eq!(creds.consumer_key, "ck_file");
        assert_eq!(creds.consumer_secret, "cs_env");
    }

    #[test]
    fn credentials_trim_base_url() {
        let creds = resolve_credentials_with(
            &store(
                Some("https://shop.example/wp-json/wc/v3/"),
                Some("ck_1"),
                Some("cs_1"),
            ),
            no_env,
        )
        .unwrap();
        assert_eq!(creds.base_url, "https://shop.example/wp-json/wc/v3");
        assert_eq!(creds.consumer_key, "ck_1");
        assert_eq!(creds.consumer_secret, "cs_1");
    }

    #[test]
    fn closure_provider() {
        let provider = || -> Option<Credentials> { None };
        assert!(CredentialsProvider::credentials(&provider).is_none());
    }

    #[test]
    fn config_file_is_read_on_every_call() {
        let dir = std::env::temp_dir().join(format!("clerk-config-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let provider = ConfigFileCredentials::new(Some(path.clone())).with_env(no_env);
        assert!(provider.credentials().is_none());

        std::fs::File::create(&path)
            .and_then(|mut f| {
                f.write_all(
                    br#"{"store":{"baseUrl":"https://a","consumerKey":"k","consumerSecret":"s"}}"#,
                )
            })
            .unwrap();
        assert_eq!(provider.credentials().unwrap().base_url, "https://a");

        std::fs::write(&path, b"{}").unwrap();
        assert!(provider.credentials().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
