use thiserror::Error;

/// Failure of a single call against the control API.
///
/// Every HTTP call site converts its failure into one of these instead of
/// letting it escape, so a page keeps working with its last good data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
  #[error("Connection Error: could not connect to backend API at {url}")]
  Connection { url: String },
  #[error("Timeout Error: request to {url} timed out")]
  Timeout { url: String },
  #[error("HTTP Error {status}: {message}")]
  Http { status: u16, message: String },
  #[error("Request Error: {0}")]
  Request(String),
  #[error("Invalid {context} received from backend: {raw}")]
  Malformed { context: &'static str, raw: String },
}

impl ApiError {
  pub fn category(&self) -> &'static str {
    match self {
      ApiError::Connection { .. } => "ConnectionError",
      ApiError::Timeout { .. } => "Timeout",
      ApiError::Http { .. } => "HTTPError",
      ApiError::Request(_) => "RequestException",
      ApiError::Malformed { .. } => "MalformedResponse",
    }
  }

  /// User-facing text: the failure category plus whatever the backend said.
  pub fn describe(&self) -> String {
    match self {
      ApiError::Http { status, message } => format!("API Error: {} ({}): {}", self.category(), status, message),
      ApiError::Malformed { context, .. } => format!("API Error: {}: invalid {}", self.category(), context),
      ApiError::Request(detail) => format!("API Error: {}: {}", self.category(), detail),
      ApiError::Connection { .. } | ApiError::Timeout { .. } => format!("API Error: {}", self.category()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn describe_carries_backend_message() {
    let err = ApiError::Http { status: 409, message: "A task is already running".into() };
    assert_eq!(err.describe(), "API Error: HTTPError (409): A task is already running");
  }

  #[test]
  fn malformed_keeps_raw_payload() {
    let err = ApiError::Malformed { context: "status payload", raw: "[]".into() };
    assert_eq!(err.describe(), "API Error: MalformedResponse: invalid status payload");
    assert_eq!(err.category(), "MalformedResponse");
    assert!(err.to_string().contains("[]"));
  }
}
