use chrono::{DateTime, Local};
use serde_json::Value;

use crate::form::FormBinder;
use crate::models::{TaskIdentity, WorkerState, WorkerStatus};
use crate::settings::{SettingsDocument, SettingsResource};

pub const CONSISTENCY_KEYS: [&str; 4] = [
  "profiles_score_check",
  "score_check_threads",
  "pixelscan_check",
  "trust_score_check",
];
pub const DELETE_KEYS: [&str; 1] = ["profiles_to_delete"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
  Summary,
  RunFullFlow,
  CheckConsistency,
  DeleteProfiles,
  FullFlowConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopScope {
  AnyTask,
  ThisTask,
}

impl Page {
  pub const ALL: [Page; 5] = [
    Page::Summary,
    Page::RunFullFlow,
    Page::CheckConsistency,
    Page::DeleteProfiles,
    Page::FullFlowConfig,
  ];

  pub fn title(self) -> &'static str {
    match self {
      Page::Summary => "Summary",
      Page::RunFullFlow => "Run Full Flow",
      Page::CheckConsistency => "Check Consistency",
      Page::DeleteProfiles => "Delete Profiles",
      Page::FullFlowConfig => "Full Flow Config",
    }
  }

  pub fn index(self) -> usize {
    Page::ALL.iter().position(|p| *p == self).unwrap_or(0)
  }

  pub fn next(self) -> Page {
    Page::ALL[(self.index() + 1) % Page::ALL.len()]
  }

  pub fn previous(self) -> Page {
    Page::ALL[(self.index() + Page::ALL.len() - 1) % Page::ALL.len()]
  }

  pub fn task(self) -> Option<TaskIdentity> {
    match self {
      Page::RunFullFlow => Some(TaskIdentity::full_flow()),
      Page::CheckConsistency => Some(TaskIdentity::consistency()),
      Page::DeleteProfiles => Some(TaskIdentity::delete()),
      Page::Summary | Page::FullFlowConfig => None,
    }
  }

  pub fn settings(self) -> Option<SettingsResource> {
    match self {
      Page::CheckConsistency | Page::DeleteProfiles => Some(SettingsResource::Main),
      Page::FullFlowConfig => Some(SettingsResource::FullFlow),
      Page::Summary | Page::RunFullFlow => None,
    }
  }

  pub fn form(self) -> Option<FormBinder> {
    match self {
      Page::CheckConsistency => Some(FormBinder::only(&CONSISTENCY_KEYS)),
      Page::DeleteProfiles => Some(FormBinder::only(&DELETE_KEYS)),
      Page::FullFlowConfig => Some(FormBinder::new()),
      Page::Summary | Page::RunFullFlow => None,
    }
  }

  pub fn stop_scope(self) -> StopScope {
    match self {
      Page::RunFullFlow => StopScope::AnyTask,
      _ => StopScope::ThisTask,
    }
  }

  /// Why this page's task cannot start with the saved settings, if at all.
  pub fn start_blocker(self, settings: Option<&SettingsDocument>) -> Option<String> {
    let non_empty_list = |key: &str| {
      settings
        .and_then(|doc| doc.get(key))
        .and_then(Value::as_array)
        .is_some_and(|items| !items.is_empty())
    };
    let enabled = |key: &str| settings.and_then(|doc| doc.get(key)).and_then(Value::as_bool).unwrap_or(false);

    match self {
      Page::CheckConsistency if settings.is_none() => Some("Settings not loaded.".into()),
      Page::CheckConsistency if !non_empty_list("profiles_score_check") => {
        Some("No Profile IDs saved in settings to check.".into())
      }
      Page::CheckConsistency if !enabled("pixelscan_check") && !enabled("trust_score_check") => {
        Some("Pixelscan and Trust Score checks are both disabled in settings.".into())
      }
      Page::DeleteProfiles if settings.is_none() => Some("Settings not loaded.".into()),
      Page::DeleteProfiles if !non_empty_list("profiles_to_delete") => {
        Some("No Profile IDs saved in settings to delete.".into())
      }
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
  Info,
  Success,
  Warning,
  Error,
}

impl Tone {
  pub fn for_state(state: WorkerState) -> Tone {
    match state {
      WorkerState::Idle | WorkerState::Stopped => Tone::Success,
      WorkerState::Error => Tone::Error,
      WorkerState::Starting | WorkerState::Stopping => Tone::Warning,
      WorkerState::Running | WorkerState::Unknown => Tone::Info,
    }
  }
}

/// What a page shows and allows, given the latest worker status.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlView {
  pub is_this_task_running: bool,
  pub is_any_task_running: bool,
  pub can_start: bool,
  pub can_stop: bool,
  pub start_blocker: Option<String>,
  pub tone: Tone,
  pub status_line: String,
  pub detail_line: String,
}

impl ControlView {
  pub fn derive(page: Page, status: &WorkerStatus, settings: Option<&SettingsDocument>) -> Self {
    let task = page.task();
    let is_any_task_running = status.is_active();
    let is_this_task_running = task.as_ref().is_some_and(|t| status.is_running(t));
    let start_blocker = task.as_ref().and_then(|_| page.start_blocker(settings));
    let can_start = task.is_some()
      && !is_any_task_running
      && status.state != WorkerState::Unknown
      && start_blocker.is_none();
    let can_stop = match page.stop_scope() {
      _ if task.is_none() => false,
      StopScope::AnyTask => is_any_task_running,
      StopScope::ThisTask => is_this_task_running,
    };

    Self {
      is_this_task_running,
      is_any_task_running,
      can_start,
      can_stop,
      start_blocker,
      tone: Tone::for_state(status.state),
      status_line: status_line(status, is_this_task_running),
      detail_line: format!("Latest Detail: {}", status.details),
    }
  }
}

fn status_line(status: &WorkerStatus, is_this_task_running: bool) -> String {
  let mut line = format!("Bot Status: {}", status.state.as_str().to_uppercase());
  if let Some(updated) = status.last_update.and_then(format_timestamp) {
    line.push_str(&format!(" (Updated: {})", updated));
  }
  if is_this_task_running {
    line.push_str(" (This Task)");
  } else if let Some(task) = &status.task {
    line.push_str(&format!(" (Task: {})", task));
  }
  line
}

fn format_timestamp(seconds: f64) -> Option<String> {
  let utc = DateTime::from_timestamp(seconds.trunc() as i64, 0)?;
  Some(utc.with_timezone(&Local).format("%H:%M:%S").to_string())
}
