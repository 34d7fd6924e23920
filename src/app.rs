use std::time::Duration;

use chrono::Local;
use tracing::{error, info};

use crate::client::ApiClient;
use crate::config::Config;
use crate::controller::TaskController;
use crate::error::ApiError;
use crate::form::{FieldValues, FormBinder, ValidationWarning};
use crate::models::TaskIdentity;
use crate::poller::{Cadence, LogAction, LogFetcher, TaskStatusPoller, log_action};
use crate::session::SessionStore;
use crate::settings::{SettingsDocument, SettingsResource, SettingsStore};
use crate::summary::SummaryStore;

/// Outcome of a settings save: the backend's verdict plus any fields that
/// were sent with their original value.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
  pub result: Result<String, ApiError>,
  pub warnings: Vec<ValidationWarning>,
}

/// Everything a page needs, built once and shared by reference.
pub struct AppState {
  pub session: SessionStore,
  pub poller: TaskStatusPoller,
  pub logs: LogFetcher,
  pub controller: TaskController,
  pub settings: SettingsStore,
  pub summary: SummaryStore,
  pub cadence: Cadence,
}

impl AppState {
  pub fn new(config: &Config) -> Self {
    Self::with_client(ApiClient::from_config(config), Cadence::from_config(config))
  }

  pub fn with_client(client: ApiClient, cadence: Cadence) -> Self {
    let session = SessionStore::new();
    Self {
      poller: TaskStatusPoller::new(client.clone(), session.clone()),
      logs: LogFetcher::new(client.clone(), session.clone()),
      controller: TaskController::new(client.clone()),
      settings: SettingsStore::new(client.clone()),
      summary: SummaryStore::new(client),
      session,
      cadence,
    }
  }

  /// One poll cycle. Returns how long to wait before the next one.
  pub async fn refresh(&self, manual: bool) -> Duration {
    self.poller.poll().await;
    let snapshot = self.session.snapshot().await;
    match log_action(&snapshot.status, manual, &snapshot.logs) {
      LogAction::Fetch => {
        self.logs.fetch_logs().await;
      }
      LogAction::ResetToIdle => {
        self.session.reset_to_idle_marker().await;
      }
      LogAction::Keep => {}
    }
    self.cadence.interval_for(&snapshot.status)
  }

  pub async fn start_task(&self, task: &TaskIdentity) -> Result<String, ApiError> {
    self
      .session
      .replace_logs(format!("--- Sending 'start {}' command: {} ---", task, clock()))
      .await;
    let result = self.controller.start(task).await;
    match &result {
      Ok(message) => info!(%task, %message, "start sent"),
      Err(err) => error!(%task, error = %err, "failed start"),
    }
    self.poller.poll().await;
    self.logs.fetch_logs().await;
    result
  }

  pub async fn stop_task(&self) -> Result<String, ApiError> {
    self
      .session
      .append_log(format!("--- Sending 'stop' command: {} ---", clock()))
      .await;
    let result = self.controller.stop().await;
    if let Err(err) = &result {
      error!(error = %err, "failed stop");
    }
    self.poller.poll().await;
    self.logs.fetch_logs().await;
    result
  }

  pub async fn save_settings(
    &self,
    resource: SettingsResource,
    binder: &FormBinder,
    original: &SettingsDocument,
    edits: &FieldValues,
  ) -> SaveOutcome {
    let collected = binder.collect(original, edits);
    let result = self.settings.save(resource, &collected.document).await;
    SaveOutcome {
      result,
      warnings: collected.warnings,
    }
  }
}

fn clock() -> String {
  Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::form::{FieldInput, FieldPath, initial_values};
  use crate::models::{IDLE_LOG_MARKER, WorkerState};
  use serde_json::{Value, json};
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn app(server: &MockServer) -> AppState {
    AppState::with_client(
      ApiClient::new(&server.uri(), None),
      Cadence::new(Duration::from_secs(1), Duration::from_secs(10)),
    )
  }

  async fn mount_get(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET")).and(path(route)).respond_with(response).mount(server).await;
  }

  #[tokio::test]
  async fn idle_worker_gets_idle_cadence_and_no_log_fetch() {
    let mock_server = MockServer::start().await;
    mount_get(&mock_server, "/status", ResponseTemplate::new(200).set_body_json(json!({"state": "idle"}))).await;
    Mock::given(method("GET"))
      .and(path("/logs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"logs": []})))
      .expect(0)
      .mount(&mock_server)
      .await;

    let app = app(&mock_server);
    assert_eq!(app.refresh(false).await, Duration::from_secs(10));
    assert_eq!(app.session.logs().await.lines(), [IDLE_LOG_MARKER]);
  }

  #[tokio::test]
  async fn manual_refresh_fetches_logs_even_when_idle() {
    let mock_server = MockServer::start().await;
    mount_get(&mock_server, "/status", ResponseTemplate::new(200).set_body_json(json!({"state": "stopped"}))).await;
    mount_get(&mock_server, "/logs", ResponseTemplate::new(200).set_body_json(json!({"logs": ["last run ok"]}))).await;

    let app = app(&mock_server);
    app.refresh(true).await;
    assert_eq!(app.session.logs().await.lines(), ["last run ok"]);
  }

  #[tokio::test]
  async fn active_worker_gets_fast_cadence_and_logs() {
    let mock_server = MockServer::start().await;
    mount_get(
      &mock_server,
      "/status",
      ResponseTemplate::new(200).set_body_json(json!({"state": "running", "task": "full_flow"})),
    )
    .await;
    mount_get(&mock_server, "/logs", ResponseTemplate::new(200).set_body_json(json!({"logs": ["step 1"]}))).await;

    let app = app(&mock_server);
    assert_eq!(app.refresh(false).await, Duration::from_secs(1));
    assert_eq!(app.session.logs().await.lines(), ["step 1"]);
  }

  #[tokio::test]
  async fn start_clears_logs_and_repolls_immediately() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/control"))
      .and(body_json(json!({"action": "start", "task_type": "consistency"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Started"})))
      .expect(1)
      .mount(&mock_server)
      .await;
    Mock::given(method("GET"))
      .and(path("/status"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "starting", "task": "consistency"})))
      .expect(1)
      .mount(&mock_server)
      .await;
    mount_get(&mock_server, "/logs", ResponseTemplate::new(500)).await;

    let app = app(&mock_server);
    let task = TaskIdentity::consistency();
    assert_eq!(app.start_task(&task).await, Ok("Started".to_string()));

    let session = app.session.snapshot().await;
    assert!(session.status.is_running(&task));
    assert_eq!(session.logs.lines().len(), 1);
    assert!(session.logs.lines()[0].starts_with("--- Sending 'start consistency' command: "));
  }

  #[tokio::test]
  async fn stop_appends_marker_and_reports_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/control"))
      .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "No task is running"})))
      .mount(&mock_server)
      .await;
    mount_get(&mock_server, "/status", ResponseTemplate::new(200).set_body_json(json!({"state": "idle"}))).await;
    mount_get(&mock_server, "/logs", ResponseTemplate::new(503)).await;

    let app = app(&mock_server);
    let err = app.stop_task().await.unwrap_err();
    assert_eq!(err, ApiError::Http { status: 409, message: "No task is running".into() });
    let lines = app.session.logs().await.lines().to_vec();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("--- Sending 'stop' command: "));
    assert_eq!(app.session.status().await.state, WorkerState::Idle);
  }

  #[tokio::test]
  async fn save_settings_sends_coerced_document() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/settings/main"))
      .and(body_json(json!({"profiles_to_delete": ["x", "y"], "sheet_name": "Accounts Data"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Saved"})))
      .expect(1)
      .mount(&mock_server)
      .await;

    let app = app(&mock_server);
    let original = match json!({"profiles_to_delete": ["x"], "sheet_name": "Accounts Data"}) {
      Value::Object(map) => map,
      _ => unreachable!(),
    };
    let binder = FormBinder::only(&["profiles_to_delete"]);
    let mut edits = initial_values(&binder.render(&original));
    edits.insert(FieldPath::new(["profiles_to_delete"]), FieldInput::Text("x\ny\n".into()));

    let outcome = app.save_settings(SettingsResource::Main, &binder, &original, &edits).await;
    assert_eq!(outcome.result, Ok("Saved".to_string()));
    assert!(outcome.warnings.is_empty());
  }
}
