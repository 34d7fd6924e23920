use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "X-API-Key";

pub const STATUS_PATH: &str = "/status";
pub const LOGS_PATH: &str = "/logs";
pub const CONTROL_PATH: &str = "/control";
pub const SUMMARY_PATH: &str = "/profiles/summary";

pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(15);
pub const SETTINGS_LOAD_TIMEOUT: Duration = Duration::from_secs(15);
pub const SETTINGS_SAVE_TIMEOUT: Duration = Duration::from_secs(20);
pub const SUMMARY_TIMEOUT: Duration = Duration::from_secs(35);

/// JSON client for the control API. Cheap to clone; clones share one
/// connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
  http: Client,
  base_url: String,
  api_key: Option<String>,
}

impl ApiClient {
  pub fn new(base_url: &str, api_key: Option<String>) -> Self {
    Self {
      http: Client::new(),
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key,
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(&config.api_url, config.api_key.clone())
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub async fn get_json(&self, path: &str, timeout: Duration) -> Result<Value, ApiError> {
    let url = self.url(path);
    debug!(%url, "GET");
    let response = self
      .authorize(self.http.get(&url))
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| transport_error(&url, e))?;
    read_json(&url, response).await
  }

  pub async fn post_json<B: Serialize + ?Sized>(
    &self,
    path: &str,
    body: &B,
    timeout: Duration,
  ) -> Result<Value, ApiError> {
    let url = self.url(path);
    debug!(%url, "POST");
    let response = self
      .authorize(self.http.post(&url))
      .json(body)
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| transport_error(&url, e))?;
    read_json(&url, response).await
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
    match &self.api_key {
      Some(key) => request.header(API_KEY_HEADER, key),
      None => request,
    }
  }
}

fn transport_error(url: &str, err: reqwest::Error) -> ApiError {
  warn!(%url, error = %err, "request failed");
  if err.is_timeout() {
    ApiError::Timeout { url: url.to_string() }
  } else if err.is_connect() {
    ApiError::Connection { url: url.to_string() }
  } else {
    ApiError::Request(err.to_string())
  }
}

async fn read_json(url: &str, response: Response) -> Result<Value, ApiError> {
  let status = response.status();
  let body = response.text().await.map_err(|e| transport_error(url, e))?;
  if !status.is_success() {
    let message = error_message(status, &body);
    warn!(%url, status = status.as_u16(), %message, "backend returned an error");
    return Err(ApiError::Http { status: status.as_u16(), message });
  }
  serde_json::from_str(&body).map_err(|_| ApiError::Malformed {
    context: "JSON response",
    raw: body,
  })
}

/// Prefers the backend's `{"error": ...}` message, then the raw body, then
/// the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
  serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
    .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
    .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown status").to_string())
}
