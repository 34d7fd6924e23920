use regex::Regex;
use serde_json::json;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use super::{authorized, error_reply, with_backend};
use crate::models::{ControlAction, ControlCommand, TaskIdentity};
use crate::worker_processing::{KNOWN_TASKS, StubBackend};

fn sanitize_task_type(input: &str) -> bool {
  Regex::new(r"^[a-z_]+$").map(|re| re.is_match(input)).unwrap_or(false)
}

fn validate_command(command: &ControlCommand) -> Result<Option<TaskIdentity>, String> {
  match (command.action, &command.task_type) {
    (ControlAction::Stop, _) => Ok(None),
    (ControlAction::Start, None) => Err("Missing field 'task_type'".into()),
    (ControlAction::Start, Some(task)) if !sanitize_task_type(task.as_str()) => {
      Err("Invalid or unsafe 'task_type'".into())
    }
    (ControlAction::Start, Some(task)) if !KNOWN_TASKS.contains(&task.as_str()) => {
      Err(format!("Unsupported task type '{}'", task))
    }
    (ControlAction::Start, Some(task)) => Ok(Some(task.clone())),
  }
}

pub fn status_route(backend: StubBackend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  warp::path("status")
    .and(warp::path::end())
    .and(warp::get())
    .and(authorized(&backend))
    .and(with_backend(backend))
    .and_then(handle_status)
}

pub fn logs_route(backend: StubBackend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  warp::path("logs")
    .and(warp::path::end())
    .and(warp::get())
    .and(authorized(&backend))
    .and(with_backend(backend))
    .and_then(handle_logs)
}

pub fn control_route(backend: StubBackend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  warp::path("control")
    .and(warp::path::end())
    .and(warp::post())
    .and(authorized(&backend))
    .and(warp::body::json())
    .and(with_backend(backend))
    .and_then(handle_control)
}

async fn handle_status(backend: StubBackend) -> Result<impl Reply, Rejection> {
  Ok(warp::reply::json(&backend.status().await))
}

async fn handle_logs(backend: StubBackend) -> Result<impl Reply, Rejection> {
  Ok(warp::reply::json(&json!({ "logs": backend.logs().await })))
}

async fn handle_control(command: ControlCommand, backend: StubBackend) -> Result<Response, Rejection> {
  let task = match validate_command(&command) {
    Ok(task) => task,
    Err(e) => {
      error!("Control validation failed: {}", e);
      return Ok(error_reply(StatusCode::BAD_REQUEST, &e));
    }
  };

  let (result, message) = match task {
    Some(task) => {
      let message = format!("Task '{}' started.", task);
      (backend.start(task).await, message)
    }
    None => (backend.stop().await, "Stop requested.".to_string()),
  };
  match result {
    Ok(()) => {
      info!("{}", message);
      Ok(warp::reply::json(&json!({ "message": message })).into_response())
    }
    Err(e) => Ok(error_reply(StatusCode::CONFLICT, &e)),
  }
}
