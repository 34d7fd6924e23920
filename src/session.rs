use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::models::{IDLE_LOG_MARKER, LogBuffer, WorkerState, WorkerStatus};

/// Result of one `/status` round trip, ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
  Fresh(WorkerStatus),
  Malformed(String),
  Unreachable(String),
}

/// Result of one `/logs` round trip. Transport failures are never applied.
#[derive(Debug, Clone, PartialEq)]
pub enum LogsOutcome {
  Fresh(Vec<String>),
  Malformed(&'static str),
}

/// The dashboard's single belief about the remote worker.
#[derive(Debug, Clone, Default)]
pub struct Session {
  pub status: WorkerStatus,
  pub logs: LogBuffer,
  pub last_fetch: Option<Instant>,
  status_seq: u64,
  logs_seq: u64,
}

impl Session {
  fn apply_status(&mut self, seq: u64, outcome: StatusOutcome) -> bool {
    if seq <= self.status_seq {
      debug!(seq, applied = self.status_seq, "dropping stale status response");
      return false;
    }
    self.status_seq = seq;
    self.last_fetch = Some(Instant::now());
    self.status = match outcome {
      StatusOutcome::Fresh(status) => status,
      StatusOutcome::Malformed(raw) => WorkerStatus::malformed(&raw),
      StatusOutcome::Unreachable(details) => WorkerStatus {
        state: WorkerState::Error,
        task: self.status.task.take(),
        details,
        last_update: self.status.last_update,
      },
    };
    true
  }

  fn apply_logs(&mut self, seq: u64, outcome: LogsOutcome) -> bool {
    if seq <= self.logs_seq {
      debug!(seq, applied = self.logs_seq, "dropping stale log response");
      return false;
    }
    self.logs_seq = seq;
    self.logs = match outcome {
      LogsOutcome::Fresh(lines) => LogBuffer::new(lines),
      LogsOutcome::Malformed(marker) => LogBuffer::marker(marker),
    };
    true
  }
}

/// Shared handle to the session. Every page reads and writes through it.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
  inner: Arc<RwLock<Session>>,
  seq: Arc<AtomicU64>,
}

impl SessionStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reserves a sequence number for a request that is about to be sent.
  pub fn next_seq(&self) -> u64 {
    self.seq.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub async fn snapshot(&self) -> Session {
    self.inner.read().await.clone()
  }

  pub async fn status(&self) -> WorkerStatus {
    self.inner.read().await.status.clone()
  }

  pub async fn logs(&self) -> LogBuffer {
    self.inner.read().await.logs.clone()
  }

  pub async fn apply_status(&self, seq: u64, outcome: StatusOutcome) -> bool {
    self.inner.write().await.apply_status(seq, outcome)
  }

  pub async fn apply_logs(&self, seq: u64, outcome: LogsOutcome) -> bool {
    self.inner.write().await.apply_logs(seq, outcome)
  }

  /// Replaces the buffer with a local marker. Log fetches already in flight
  /// are older and will be dropped.
  pub async fn replace_logs(&self, line: String) {
    let seq = self.next_seq();
    self.inner.write().await.apply_logs(seq, LogsOutcome::Fresh(vec![line]));
  }

  pub async fn append_log(&self, line: String) {
    let seq = self.next_seq();
    let mut session = self.inner.write().await;
    session.logs_seq = seq;
    session.logs.push(line);
  }

  /// Swaps in the idle marker unless it is already showing.
  pub async fn reset_to_idle_marker(&self) -> bool {
    let seq = self.next_seq();
    let mut session = self.inner.write().await;
    if session.logs.is_idle_marker() {
      return false;
    }
    session.apply_logs(seq, LogsOutcome::Fresh(vec![IDLE_LOG_MARKER.to_string()]))
  }
}
