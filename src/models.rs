use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const WAITING_LOG_MARKER: &str = "--- Waiting for task ---";
pub const IDLE_LOG_MARKER: &str = "--- Bot is idle ---";
pub const INVALID_LOG_FORMAT: &str = "--- Error: Invalid log format ---";
pub const INVALID_JSON_LOGS: &str = "--- Error: Invalid JSON logs ---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
  #[default]
  Unknown,
  Idle,
  Running,
  Starting,
  Stopping,
  Stopped,
  Error,
}

impl WorkerState {
  pub fn is_active(self) -> bool {
    matches!(self, WorkerState::Running | WorkerState::Starting | WorkerState::Stopping)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      WorkerState::Unknown => "unknown",
      WorkerState::Idle => "idle",
      WorkerState::Running => "running",
      WorkerState::Starting => "starting",
      WorkerState::Stopping => "stopping",
      WorkerState::Stopped => "stopped",
      WorkerState::Error => "error",
    }
  }
}

impl FromStr for WorkerState {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "unknown" => Ok(WorkerState::Unknown),
      "idle" => Ok(WorkerState::Idle),
      "running" => Ok(WorkerState::Running),
      "starting" => Ok(WorkerState::Starting),
      "stopping" => Ok(WorkerState::Stopping),
      "stopped" => Ok(WorkerState::Stopped),
      "error" => Ok(WorkerState::Error),
      other => Err(format!("unrecognized worker state {:?}", other)),
    }
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Names a workflow the worker can run ("full_flow", "consistency", "delete").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskIdentity(String);

impl TaskIdentity {
  pub const FULL_FLOW: &'static str = "full_flow";
  pub const CONSISTENCY: &'static str = "consistency";
  pub const DELETE: &'static str = "delete";

  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn full_flow() -> Self {
    Self::new(Self::FULL_FLOW)
  }

  pub fn consistency() -> Self {
    Self::new(Self::CONSISTENCY)
  }

  pub fn delete() -> Self {
    Self::new(Self::DELETE)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TaskIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
  pub state: WorkerState,
  pub task: Option<TaskIdentity>,
  pub details: String,
  pub last_update: Option<f64>,
}

impl Default for WorkerStatus {
  fn default() -> Self {
    Self {
      state: WorkerState::Unknown,
      task: None,
      details: "Connecting...".into(),
      last_update: None,
    }
  }
}

impl WorkerStatus {
  /// Parses a `/status` payload. `Err` carries the raw payload text when it
  /// is not a document with a recognised `state`.
  pub fn from_payload(payload: &Value) -> Result<Self, String> {
    let raw = || payload.to_string();
    let doc = payload.as_object().ok_or_else(raw)?;
    let state = doc
      .get("state")
      .and_then(Value::as_str)
      .and_then(|s| s.parse::<WorkerState>().ok())
      .ok_or_else(raw)?;
    let task = match doc.get("task") {
      None | Some(Value::Null) => None,
      Some(Value::String(name)) => Some(TaskIdentity::new(name.clone())),
      Some(_) => return Err(raw()),
    };
    let details = match doc.get("details") {
      None | Some(Value::Null) => String::new(),
      Some(Value::String(text)) => text.clone(),
      Some(other) => other.to_string(),
    };

    Ok(Self {
      state,
      task,
      details,
      last_update: doc.get("last_update").and_then(Value::as_f64),
    })
  }

  pub fn malformed(raw: &str) -> Self {
    Self {
      state: WorkerState::Error,
      task: None,
      details: format!("Invalid status format: {}", raw),
      last_update: None,
    }
  }

  pub fn is_active(&self) -> bool {
    self.state.is_active()
  }

  pub fn is_running(&self, task: &TaskIdentity) -> bool {
    self.is_active() && self.task.as_ref() == Some(task)
  }
}

/// Latest log snapshot from the backend. Each fetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBuffer {
  lines: Vec<String>,
}

impl Default for LogBuffer {
  fn default() -> Self {
    Self::marker(WAITING_LOG_MARKER)
  }
}

impl LogBuffer {
  pub fn new(lines: Vec<String>) -> Self {
    Self { lines }
  }

  pub fn marker(line: &str) -> Self {
    Self { lines: vec![line.to_string()] }
  }

  pub fn lines(&self) -> &[String] {
    &self.lines
  }

  pub fn is_idle_marker(&self) -> bool {
    self.lines.first().map(String::as_str) == Some(IDLE_LOG_MARKER)
  }

  pub fn push(&mut self, line: String) {
    self.lines.push(line);
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
  Start,
  Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
  pub action: ControlAction,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_type: Option<TaskIdentity>,
}

impl ControlCommand {
  pub fn start(task: &TaskIdentity) -> Self {
    Self {
      action: ControlAction::Start,
      task_type: Some(task.clone()),
    }
  }

  pub fn stop() -> Self {
    Self {
      action: ControlAction::Stop,
      task_type: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parses_full_status() {
    let status = WorkerStatus::from_payload(&json!({
      "state": "running", "task": "full_flow", "details": "Step 2", "last_update": 1700000000.5
    }))
    .unwrap();
    assert_eq!(status.state, WorkerState::Running);
    assert_eq!(status.task, Some(TaskIdentity::full_flow()));
    assert_eq!(status.last_update, Some(1700000000.5));
    assert!(status.is_running(&TaskIdentity::full_flow()));
    assert!(!status.is_running(&TaskIdentity::delete()));
  }

  #[test]
  fn minimal_status_has_no_task() {
    let status = WorkerStatus::from_payload(&json!({"state": "idle"})).unwrap();
    assert_eq!(status.state, WorkerState::Idle);
    assert_eq!(status.task, None);
    assert_eq!(status.details, "");
    assert!(!status.is_active());
  }

  #[test]
  fn unknown_state_or_shape_is_malformed() {
    assert_eq!(WorkerStatus::from_payload(&json!({"state": "dancing"})).unwrap_err(), r#"{"state":"dancing"}"#);
    assert!(WorkerStatus::from_payload(&json!({"task": "delete"})).is_err());
    assert!(WorkerStatus::from_payload(&json!(["idle"])).is_err());
    assert!(WorkerStatus::from_payload(&json!({"state": "idle", "task": 7})).is_err());
  }

  #[test]
  fn control_command_wire_shape() {
    let start = serde_json::to_value(ControlCommand::start(&TaskIdentity::consistency())).unwrap();
    assert_eq!(start, json!({"action": "start", "task_type": "consistency"}));
    let stop = serde_json::to_value(ControlCommand::stop()).unwrap();
    assert_eq!(stop, json!({"action": "stop"}));
  }

  #[test]
  fn status_serializes_with_lowercase_state() {
    let mut status = WorkerStatus::default();
    status.state = WorkerState::Stopping;
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["state"], "stopping");
    assert_eq!(value["task"], Value::Null);
  }
}
