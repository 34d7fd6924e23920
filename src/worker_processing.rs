//! In-memory stand-in for the automation worker, served by `botdash_stub`.
//! It only walks through believable state transitions and log lines.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::info;

use crate::models::{TaskIdentity, WorkerState, WorkerStatus};

pub const KNOWN_TASKS: [&str; 3] = [TaskIdentity::FULL_FLOW, TaskIdentity::CONSISTENCY, TaskIdentity::DELETE];

fn steps_for(task: &TaskIdentity) -> &'static [&'static str] {
  match task.as_str() {
    TaskIdentity::FULL_FLOW => &[
      "Creating AdsPower profiles",
      "Checking profile consistency",
      "Creating Gmail accounts",
      "Checking Gmail status",
      "Subscribing to newsletter",
    ],
    TaskIdentity::CONSISTENCY => &["Opening profiles", "Running pixelscan check", "Running trust score check"],
    _ => &["Deleting profiles", "Updating accounts sheet"],
  }
}

struct StubState {
  status: WorkerStatus,
  logs: Vec<String>,
  settings: HashMap<String, Map<String, Value>>,
  profiles: Vec<Value>,
  generation: u64,
}

#[derive(Clone)]
pub struct StubBackend {
  state: Arc<Mutex<StubState>>,
  step: Duration,
  api_key: Option<String>,
}

impl StubBackend {
  pub fn new(step: Duration, api_key: Option<String>) -> Self {
    Self::with_profiles(step, api_key, demo_profiles())
  }

  pub fn with_profiles(step: Duration, api_key: Option<String>, profiles: Vec<Value>) -> Self {
    let settings = HashMap::from([
      ("main".to_string(), object(default_main_settings())),
      ("full_flow".to_string(), object(default_full_flow_settings())),
    ]);
    let state = StubState {
      status: status(WorkerState::Idle, None, "Bot is idle"),
      logs: Vec::new(),
      settings,
      profiles,
      generation: 0,
    };
    Self {
      state: Arc::new(Mutex::new(state)),
      step,
      api_key,
    }
  }

  pub fn api_key(&self) -> Option<&str> {
    self.api_key.as_deref()
  }

  pub async fn status(&self) -> WorkerStatus {
    self.state.lock().await.status.clone()
  }

  pub async fn logs(&self) -> Vec<String> {
    self.state.lock().await.logs.clone()
  }

  pub async fn profiles(&self) -> Vec<Value> {
    self.state.lock().await.profiles.clone()
  }

  pub async fn settings(&self, name: &str) -> Option<Map<String, Value>> {
    self.state.lock().await.settings.get(name).cloned()
  }

  pub async fn save_settings(&self, name: &str, document: Map<String, Value>) -> bool {
    match self.state.lock().await.settings.get_mut(name) {
      Some(slot) => {
        *slot = document;
        info!(name, "settings saved");
        true
      }
      None => false,
    }
  }

  pub async fn start(&self, task: TaskIdentity) -> Result<(), String> {
    let generation = {
      let mut state = self.state.lock().await;
      if state.status.is_active() {
        return Err("A task is already running".into());
      }
      state.generation += 1;
      state.status = status(WorkerState::Starting, Some(task.clone()), &format!("Starting {}", task));
      state.logs = vec![log_line(&format!("Starting task '{}'", task))];
      state.generation
    };
    info!(%task, generation, "simulated task starting");
    tokio::spawn(process_simulated_task(self.clone(), task, generation));
    Ok(())
  }

  pub async fn stop(&self) -> Result<(), String> {
    let generation = {
      let mut state = self.state.lock().await;
      if !state.status.is_active() {
        return Err("No task is running".into());
      }
      state.generation += 1;
      let task = state.status.task.clone();
      state.status = status(WorkerState::Stopping, task, "Stop requested");
      state.logs.push(log_line("Stop requested"));
      state.generation
    };
    info!(generation, "simulated task stopping");

    let backend = self.clone();
    tokio::spawn(async move {
      sleep(backend.step).await;
      backend
        .record(generation, |state| {
          state.status = status(WorkerState::Stopped, None, "Task stopped by user");
          state.logs.push(log_line("Task stopped"));
        })
        .await;
    });
    Ok(())
  }

  /// Applies `update` only if no newer start/stop has happened since
  /// `generation` was issued.
  async fn record(&self, generation: u64, update: impl FnOnce(&mut StubState)) -> bool {
    let mut state = self.state.lock().await;
    if state.generation != generation {
      return false;
    }
    update(&mut state);
    true
  }
}

pub async fn process_simulated_task(backend: StubBackend, task: TaskIdentity, generation: u64) {
  sleep(backend.step).await;
  let running = backend
    .record(generation, |state| {
      state.status = status(WorkerState::Running, Some(task.clone()), "Running");
    })
    .await;
  if !running {
    return;
  }

  let steps = steps_for(&task);
  for (index, step) in steps.iter().enumerate() {
    sleep(backend.step).await;
    let detail = format!("Step {}/{}: {}", index + 1, steps.len(), step);
    let recorded = backend
      .record(generation, |state| {
        state.status.details = detail.clone();
        state.status.last_update = Some(now());
        state.logs.push(log_line(&detail));
      })
      .await;
    if !recorded {
      info!(%task, generation, "simulated task superseded");
      return;
    }
  }

  backend
    .record(generation, |state| {
      state.status = status(WorkerState::Idle, None, &format!("Task '{}' completed", task));
      state.logs.push(log_line(&format!("Task '{}' completed", task)));
    })
    .await;
  info!(%task, generation, "simulated task completed");
}

fn status(state: WorkerState, task: Option<TaskIdentity>, details: &str) -> WorkerStatus {
  WorkerStatus {
    state,
    task,
    details: details.to_string(),
    last_update: Some(now()),
  }
}

fn now() -> f64 {
  Utc::now().timestamp() as f64
}

fn log_line(message: &str) -> String {
  format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
}

fn object(value: Value) -> Map<String, Value> {
  match value {
    Value::Object(map) => map,
    _ => Map::new(),
  }
}

fn default_main_settings() -> Value {
  json!({
    "sheet_name": "Accounts Data",
    "profiles_score_check": [],
    "score_check_threads": 2,
    "pixelscan_check": true,
    "trust_score_check": false,
    "profiles_to_delete": []
  })
}

fn default_full_flow_settings() -> Value {
  json!({
    "full_flow_enabled": true,
    "threads": 2,
    "resume": false,
    "dev_mode": false,
    "profile_ids": [],
    "create_profiles": true,
    "num_profiles": 3,
    "group_id": "0",
    "name_prefix": "auto",
    "proxies": [],
    "check_consistency": true,
    "pixelscan_check": true,
    "trust_score_check": false,
    "create_gmail": true,
    "recovery_emails": [],
    "check_gmail_status": false,
    "subscribe_newsletter": false,
    "newsletter_url": "",
    "sheet_name": "Accounts Data",
    "timeouts": {"page_load": 30.0, "captcha": 120}
  })
}

fn demo_profiles() -> Vec<Value> {
  vec![
    json!({"ID": "k1a2b3", "Profile": "auto-1", "Email": "auto1@example.com", "IP Country": "us", "Gmail acc created": "TRUE"}),
    json!({"ID": "k4d5e6", "Profile": "auto-2", "Email": "", "IP Country": "de", "Gmail acc created": "FALSE"}),
  ]
}
