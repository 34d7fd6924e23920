use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
  #[error("Critical Error: {0} is not set")]
  Missing(&'static str),
  #[error("{name} has invalid value {value:?}: {reason}")]
  Invalid {
    name: &'static str,
    value: String,
    reason: String,
  },
}

#[derive(Debug, Clone)]
pub struct Config {
  pub api_url: String,
  pub api_key: Option<String>,
  pub active_interval: Duration,
  pub idle_interval: Duration,
  pub log_file: PathBuf,
}

impl Config {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let api_url = non_empty(lookup("SIGNUP_API_URL"))
      .ok_or(ConfigError::Missing("SIGNUP_API_URL"))?
      .trim_end_matches('/')
      .to_string();
    let api_key = non_empty(lookup("SIGNUP_API_KEY"));
    if api_key.is_none() {
      warn!("SIGNUP_API_KEY is not set; requests will be sent without X-API-Key");
    }

    Ok(Self {
      api_url,
      api_key,
      active_interval: seconds(&lookup, "BOTDASH_ACTIVE_INTERVAL_SECS", 3, 1..=3)?,
      idle_interval: seconds(&lookup, "BOTDASH_IDLE_INTERVAL_SECS", 30, 10..=30)?,
      log_file: non_empty(lookup("BOTDASH_LOG_FILE"))
        .unwrap_or_else(|| "botdash.log".into())
        .into(),
    })
  }
}

/// Settings for the sandbox backend binary.
#[derive(Debug, Clone)]
pub struct StubConfig {
  pub port: u16,
  pub step: Duration,
  pub api_key: Option<String>,
}

impl StubConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let port = parse_or(&lookup, "STUB_PORT", 8080u16)?;
    let step_millis = parse_or(&lookup, "STUB_STEP_MILLIS", 1500u64)?;
    Ok(Self {
      port,
      step: Duration::from_millis(step_millis),
      api_key: non_empty(lookup("SIGNUP_API_KEY")),
    })
  }
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(
  lookup: &impl Fn(&str) -> Option<String>,
  name: &'static str,
  default: T,
) -> Result<T, ConfigError> {
  match non_empty(lookup(name)) {
    None => Ok(default),
    Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
      name,
      value: raw.clone(),
      reason: "not a valid number".into(),
    }),
  }
}

fn seconds(
  lookup: &impl Fn(&str) -> Option<String>,
  name: &'static str,
  default: u64,
  range: std::ops::RangeInclusive<u64>,
) -> Result<Duration, ConfigError> {
  let secs = parse_or(lookup, name, default)?;
  if !range.contains(&secs) {
    return Err(ConfigError::Invalid {
      name,
      value: secs.to_string(),
      reason: format!("must be between {} and {} seconds", range.start(), range.end()),
    });
  }
  Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
  }

  #[test]
  fn missing_url_is_fatal() {
    let err = Config::from_lookup(lookup(&[("SIGNUP_API_KEY", "k")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing("SIGNUP_API_URL"));
  }

  #[test]
  fn defaults_and_trailing_slash() {
    let config = Config::from_lookup(lookup(&[("SIGNUP_API_URL", "http://bot.local:5000/")])).unwrap();
    assert_eq!(config.api_url, "http://bot.local:5000");
    assert_eq!(config.api_key, None);
    assert_eq!(config.active_interval, Duration::from_secs(3));
    assert_eq!(config.idle_interval, Duration::from_secs(30));
    assert_eq!(config.log_file, PathBuf::from("botdash.log"));
  }

  #[test]
  fn interval_outside_cadence_window_is_rejected() {
    let err = Config::from_lookup(lookup(&[
      ("SIGNUP_API_URL", "http://bot.local"),
      ("BOTDASH_IDLE_INTERVAL_SECS", "5"),
    ]))
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { name: "BOTDASH_IDLE_INTERVAL_SECS", .. }));
  }

  #[test]
  fn stub_config_parses_port() {
    let config = StubConfig::from_lookup(lookup(&[("STUB_PORT", "9090"), ("STUB_STEP_MILLIS", "20")])).unwrap();
    assert_eq!(config.port, 9090);
    assert_eq!(config.step, Duration::from_millis(20));
    assert!(StubConfig::from_lookup(lookup(&[("STUB_PORT", "many")])).is_err());
  }
}
