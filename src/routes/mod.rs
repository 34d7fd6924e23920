use std::convert::Infallible;

use serde_json::json;
use tracing::error;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::worker_processing::StubBackend;

pub mod control;
pub mod settings;

pub fn routes(backend: StubBackend) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
  control::status_route(backend.clone())
    .or(control::logs_route(backend.clone()))
    .or(control::control_route(backend.clone()))
    .or(settings::settings_routes(backend.clone()))
    .or(settings::summary_route(backend))
    .recover(handle_rejection)
}

fn with_backend(backend: StubBackend) -> impl Filter<Extract = (StubBackend,), Error = Infallible> + Clone {
  warp::any().map(move || backend.clone())
}

#[derive(Debug)]
struct InvalidApiKey;
impl warp::reject::Reject for InvalidApiKey {}

/// Rejects requests whose `X-API-Key` does not match, when a key is configured.
fn authorized(backend: &StubBackend) -> impl Filter<Extract = (), Error = Rejection> + Clone + use<> {
  let expected = backend.api_key().map(str::to_owned);
  warp::header::optional::<String>("x-api-key")
    .and_then(move |provided: Option<String>| {
      let expected = expected.clone();
      async move {
        match expected {
          Some(key) if provided.as_deref() != Some(key.as_str()) => Err(warp::reject::custom(InvalidApiKey)),
          _ => Ok::<(), Rejection>(()),
        }
      }
    })
    .untuple_one()
}

fn error_reply(status: StatusCode, message: &str) -> Response {
  warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status).into_response()
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
  let (status, message) = if rejection.is_not_found() {
    (StatusCode::NOT_FOUND, "Not found".to_string())
  } else if rejection.find::<InvalidApiKey>().is_some() {
    (StatusCode::UNAUTHORIZED, "Invalid API key".to_string())
  } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
    (StatusCode::BAD_REQUEST, e.to_string())
  } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
  } else {
    error!("Unhandled rejection: {:?}", rejection);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
  };
  Ok(error_reply(status, &message))
}
