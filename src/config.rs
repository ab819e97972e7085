use std::env;
use std::str::FromStr;
use std::time::Duration;
use anyhow::{anyhow, Result};

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: Option<String>,
  pub rabbitmq_url: Option<String>,
  pub server_port: u16,
  pub callback: CallbackConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackConfig {
  pub concurrency: usize,
  pub timeout: Duration,
  /// First backoff delay; attempt `i` waits `backoff_base * 2^i`.
  pub backoff_base: Duration,
  pub max_attempts: u32,
}

impl Default for CallbackConfig {
  fn default() -> Self {
    Self {
      concurrency: 8,
      timeout: Duration::from_secs(10),
      backoff_base: Duration::from_secs(1),
      max_attempts: 3,
    }
  }
}

impl Config {
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let defaults = CallbackConfig::default();
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    Ok(Self {
      database_url: non_empty("DATABASE_URL"),
      rabbitmq_url: non_empty("RABBITMQ_URL"),
      server_port: parse_or(&lookup, "SERVER_PORT", 8080)?,
      callback: CallbackConfig {
        concurrency: parse_or(&lookup, "CALLBACK_CONCURRENCY", defaults.concurrency)?.max(1),
        timeout: Duration::from_secs(parse_or(&lookup, "CALLBACK_TIMEOUT_SECS", defaults.timeout.as_secs())?),
        backoff_base: Duration::from_millis(parse_or(&lookup, "CALLBACK_BACKOFF_BASE_MS", defaults.backoff_base.as_millis() as u64)?),
        max_attempts: defaults.max_attempts,
      },
    })
  }

  pub fn require_rabbitmq_url(&self) -> Result<&str> {
    self.rabbitmq_url.as_deref().ok_or_else(|| anyhow!("RABBITMQ_URL must be set"))
  }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
  match lookup(key) {
    Some(raw) if !raw.trim().is_empty() => raw.trim()
      .parse()
      .map_err(|_| anyhow!("invalid value for {}: {:?}", key, raw)),
    _ => Ok(default),
  }
}
