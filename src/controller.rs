use serde_json::Value;
use tracing::{error, info};

use crate::client::{ApiClient, CONTROL_PATH, CONTROL_TIMEOUT};
use crate::error::ApiError;
use crate::models::{ControlAction, ControlCommand, TaskIdentity};

/// Sends start/stop commands. Does not guard against concurrent starts;
/// the backend rejects a second one.
#[derive(Debug, Clone)]
pub struct TaskController {
  client: ApiClient,
}

impl TaskController {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn start(&self, task: &TaskIdentity) -> Result<String, ApiError> {
    self.send(ControlCommand::start(task)).await
  }

  pub async fn stop(&self) -> Result<String, ApiError> {
    self.send(ControlCommand::stop()).await
  }

  async fn send(&self, command: ControlCommand) -> Result<String, ApiError> {
    let label = match &command.task_type {
      Some(task) => task.to_string(),
      None => "stop".to_string(),
    };
    let payload = self
      .client
      .post_json(CONTROL_PATH, &command, CONTROL_TIMEOUT)
      .await
      .map_err(|e| {
        error!(command = %label, error = %e, "API control error");
        e
      })?;

    let fallback = match command.action {
      ControlAction::Start => "Start sent.",
      ControlAction::Stop => "Stop sent.",
    };
    let message = payload
      .get("message")
      .and_then(Value::as_str)
      .unwrap_or(fallback)
      .to_string();
    info!(command = %label, %message, "control command acknowledged");
    Ok(message)
  }
}
