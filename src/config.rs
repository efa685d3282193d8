//! Application-level configuration loading: lifecycle timings, dedup windows and
//! process settings read from the environment.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "FESTIVAL_BACK_CONFIG_PATH";
/// Environment variable holding the token admin routes expect.
const ADMIN_TOKEN_ENV: &str = "FESTIVAL_ADMIN_TOKEN";
/// Environment variable holding the webhook notices are posted to.
const WEBHOOK_URL_ENV: &str = "FESTIVAL_WEBHOOK_URL";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Scheduling and closing timings.
    pub lifecycle: LifecycleConfig,
    /// Trigger dedup windows.
    pub dedup: DedupConfig,
    /// Token expected in `X-Admin-Token`; admin routes are closed when unset.
    pub admin_token: Option<String>,
    /// Webhook receiving festival notices; notices are only logged when unset.
    pub webhook_url: Option<String>,
}

/// Timings driving scheduling and progressive closing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Delay between two active-work polls while closing.
    pub poll_interval: Duration,
    /// Hard limit on how long closing waits for running matches.
    pub max_wait: Duration,
    /// How late the halfway notice may still be sent.
    pub halfway_grace: Duration,
    /// A progress notice is sent every this many polls.
    pub progress_every_polls: u32,
    /// Longest a single notice delivery may take before it is dropped.
    pub notify_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(20 * 60),
            halfway_grace: Duration::from_secs(5 * 60),
            progress_every_polls: 5,
            notify_timeout: Duration::from_secs(10),
        }
    }
}

/// Windows used by the inbound trigger dedup guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupConfig {
    /// How long an event id is remembered.
    pub event_ttl_ms: u64,
    /// Minimum spacing between two identical actions of one actor.
    pub action_ttl_ms: u64,
    /// Width of the per-actor near-duplicate bucket.
    pub bucket_window_ms: u64,
    /// Interval of the background sweep.
    pub sweep_interval: Duration,
    /// Actions that belong to multi-step flows and are never throttled.
    pub multi_step_actions: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            event_ttl_ms: 10_000,
            action_ttl_ms: 1_000,
            bucket_window_ms: 2_000,
            sweep_interval: Duration::from_secs(30),
            multi_step_actions: default_multi_step_actions(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to baked-in defaults, then apply
    /// environment settings.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        lifecycle = ?app_config.lifecycle,
                        "loaded festival config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.admin_token = non_empty_env(ADMIN_TOKEN_ENV);
        config.webhook_url = non_empty_env(WEBHOOK_URL_ENV);
        if config.admin_token.is_none() {
            warn!("{ADMIN_TOKEN_ENV} is not set; admin routes will reject every request");
        }
        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleConfig::default(),
            dedup: DedupConfig::default(),
            admin_token: None,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    lifecycle: RawLifecycle,
    #[serde(default)]
    dedup: RawDedup,
}

#[derive(Debug, Default, Deserialize)]
struct RawLifecycle {
    poll_interval_secs: Option<u64>,
    max_wait_secs: Option<u64>,
    halfway_grace_secs: Option<u64>,
    progress_every_polls: Option<u32>,
    notify_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDedup {
    event_ttl_ms: Option<u64>,
    action_ttl_ms: Option<u64>,
    bucket_window_ms: Option<u64>,
    sweep_interval_secs: Option<u64>,
    multi_step_actions: Option<Vec<String>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let lifecycle_defaults = LifecycleConfig::default();
        let dedup_defaults = DedupConfig::default();

        let lifecycle = LifecycleConfig {
            poll_interval: value
                .lifecycle
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(lifecycle_defaults.poll_interval),
            max_wait: value
                .lifecycle
                .max_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(lifecycle_defaults.max_wait),
            halfway_grace: value
                .lifecycle
                .halfway_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(lifecycle_defaults.halfway_grace),
            // Zero would divide by zero when deciding on progress notices.
            progress_every_polls: value
                .lifecycle
                .progress_every_polls
                .filter(|every| *every > 0)
                .unwrap_or(lifecycle_defaults.progress_every_polls),
            notify_timeout: value
                .lifecycle
                .notify_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(lifecycle_defaults.notify_timeout),
        };

        let dedup = DedupConfig {
            event_ttl_ms: value.dedup.event_ttl_ms.unwrap_or(dedup_defaults.event_ttl_ms),
            action_ttl_ms: value
                .dedup
                .action_ttl_ms
                .unwrap_or(dedup_defaults.action_ttl_ms),
            bucket_window_ms: value
                .dedup
                .bucket_window_ms
                .filter(|window| *window > 0)
                .unwrap_or(dedup_defaults.bucket_window_ms),
            sweep_interval: value
                .dedup
                .sweep_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(dedup_defaults.sweep_interval),
            multi_step_actions: value
                .dedup
                .multi_step_actions
                .unwrap_or(dedup_defaults.multi_step_actions),
        };

        Self {
            lifecycle,
            dedup,
            admin_token: None,
            webhook_url: None,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

/// Scheduler actions run back to back during recovery and are never throttled.
fn default_multi_step_actions() -> Vec<String> {
    vec![
        "lifecycle:activate".into(),
        "lifecycle:announce_halfway".into(),
        "lifecycle:begin_closing".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"lifecycle": {"max_wait_secs": 60}}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.lifecycle.max_wait, Duration::from_secs(60));
        assert_eq!(config.lifecycle.poll_interval, Duration::from_secs(30));
        assert_eq!(config.dedup, DedupConfig::default());
    }

    #[test]
    fn zero_progress_cadence_is_ignored() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"lifecycle": {"progress_every_polls": 0}}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.lifecycle.progress_every_polls, 5);
    }
}
