use serde_json::{Value, json};
use tracing::error;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use super::{authorized, error_reply, with_backend};
use crate::worker_processing::StubBackend;

pub fn settings_routes(backend: StubBackend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  let load = warp::path!("settings" / String)
    .and(warp::get())
    .and(authorized(&backend))
    .and(with_backend(backend.clone()))
    .and_then(handle_load_settings);
  let save = warp::path!("settings" / String)
    .and(warp::post())
    .and(authorized(&backend))
    .and(warp::body::json())
    .and(with_backend(backend))
    .and_then(handle_save_settings);
  load.or(save)
}

pub fn summary_route(backend: StubBackend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  warp::path!("profiles" / "summary")
    .and(warp::get())
    .and(authorized(&backend))
    .and(with_backend(backend))
    .and_then(handle_summary)
}

fn unknown_resource(name: &str) -> Response {
  error_reply(StatusCode::NOT_FOUND, &format!("Unknown settings resource '{}'", name))
}

async fn handle_load_settings(name: String, backend: StubBackend) -> Result<Response, Rejection> {
  match backend.settings(&name).await {
    Some(document) => Ok(warp::reply::json(&document).into_response()),
    None => Ok(unknown_resource(&name)),
  }
}

async fn handle_save_settings(name: String, document: Value, backend: StubBackend) -> Result<Response, Rejection> {
  let Value::Object(document) = document else {
    error!("Settings payload for '{}' is not an object", name);
    return Ok(error_reply(StatusCode::BAD_REQUEST, "Settings must be a JSON object"));
  };
  if backend.save_settings(&name, document).await {
    Ok(warp::reply::json(&json!({ "message": format!("Settings '{}' saved.", name) })).into_response())
  } else {
    Ok(unknown_resource(&name))
  }
}

async fn handle_summary(backend: StubBackend) -> Result<impl Reply, Rejection> {
  Ok(warp::reply::json(&json!({ "profiles": backend.profiles().await })))
}
