use std::time::Duration;

use chrono::Local;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::client::{ApiClient, LOGS_PATH, READ_TIMEOUT, STATUS_PATH};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{INVALID_JSON_LOGS, INVALID_LOG_FORMAT, LogBuffer, WorkerStatus};
use crate::session::{LogsOutcome, SessionStore, StatusOutcome};

/// Poll interval recommendation: fast while the worker is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
  pub active: Duration,
  pub idle: Duration,
}

impl Default for Cadence {
  fn default() -> Self {
    Self {
      active: Duration::from_secs(3),
      idle: Duration::from_secs(30),
    }
  }
}

impl Cadence {
  pub fn new(active: Duration, idle: Duration) -> Self {
    Self { active, idle }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.active_interval, config.idle_interval)
  }

  pub fn interval_for(&self, status: &WorkerStatus) -> Duration {
    if status.is_active() { self.active } else { self.idle }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
  Fetch,
  ResetToIdle,
  Keep,
}

/// Logs are fetched while the worker is active or when the user asked for a
/// refresh; otherwise the buffer settles on the idle marker.
pub fn log_action(status: &WorkerStatus, manual: bool, logs: &LogBuffer) -> LogAction {
  if status.is_active() || manual {
    LogAction::Fetch
  } else if logs.is_idle_marker() {
    LogAction::Keep
  } else {
    LogAction::ResetToIdle
  }
}

#[derive(Debug, Clone)]
pub struct TaskStatusPoller {
  client: ApiClient,
  session: SessionStore,
}

impl TaskStatusPoller {
  pub fn new(client: ApiClient, session: SessionStore) -> Self {
    Self { client, session }
  }

  /// Fetches `/status` and replaces the session's worker status. Returns
  /// whether a well-formed status was applied.
  pub async fn poll(&self) -> bool {
    let seq = self.session.next_seq();
    let outcome = match self.client.get_json(STATUS_PATH, READ_TIMEOUT).await {
      Ok(payload) => match WorkerStatus::from_payload(&payload) {
        Ok(status) => StatusOutcome::Fresh(status),
        Err(raw) => {
          error!(%raw, "invalid API status");
          StatusOutcome::Malformed(raw)
        }
      },
      Err(ApiError::Malformed { raw, .. }) => {
        error!(%raw, "invalid JSON status");
        StatusOutcome::Malformed(raw)
      }
      Err(err) => {
        warn!(error = %err, "status fetch failed");
        StatusOutcome::Unreachable(format!(
          "({}) Status Fetch Fail: {}",
          Local::now().format("%H:%M:%S"),
          err.category()
        ))
      }
    };
    let fresh = matches!(outcome, StatusOutcome::Fresh(_));
    self.session.apply_status(seq, outcome).await;
    fresh
  }
}

#[derive(Debug, Clone)]
pub struct LogFetcher {
  client: ApiClient,
  session: SessionStore,
}

impl LogFetcher {
  pub fn new(client: ApiClient, session: SessionStore) -> Self {
    Self { client, session }
  }

  /// Fetches `/logs`. A transport failure leaves the buffer untouched.
  pub async fn fetch_logs(&self) -> bool {
    let seq = self.session.next_seq();
    let outcome = match self.client.get_json(LOGS_PATH, READ_TIMEOUT).await {
      Ok(payload) => match parse_logs(&payload) {
        Some(lines) => {
          debug!(count = lines.len(), "fetched logs");
          LogsOutcome::Fresh(lines)
        }
        None => {
          error!(%payload, "invalid logs format");
          LogsOutcome::Malformed(INVALID_LOG_FORMAT)
        }
      },
      Err(ApiError::Malformed { .. }) => {
        error!("invalid JSON logs");
        LogsOutcome::Malformed(INVALID_JSON_LOGS)
      }
      Err(err) => {
        warn!(error = %err, "logs fetch failed; keeping previous logs");
        return false;
      }
    };
    let fresh = matches!(outcome, LogsOutcome::Fresh(_));
    self.session.apply_logs(seq, outcome).await;
    fresh
  }
}

fn parse_logs(payload: &Value) -> Option<Vec<String>> {
  payload
    .get("logs")?
    .as_array()?
    .iter()
    .map(|line| line.as_str().map(str::to_owned))
    .collect()
}
