use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::cache::TtlCache;
use crate::client::{ApiClient, SUMMARY_PATH, SUMMARY_TIMEOUT};
use crate::error::ApiError;

pub const SUMMARY_TTL: Duration = Duration::from_secs(600);
pub const NO_PROFILES_MESSAGE: &str = "No profile data found in the backend/sheet.";

/// One row of the backend's profile sheet, kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
  fields: Map<String, Value>,
}

impl Profile {
  /// Display text for a column; missing, null and empty cells read "N/A".
  pub fn display(&self, column: &str) -> String {
    match self.fields.get(column) {
      None | Some(Value::Null) => "N/A".into(),
      Some(Value::String(s)) if s.trim().is_empty() => "N/A".into(),
      Some(Value::String(s)) => s.clone(),
      Some(other) => other.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryView {
  Empty { message: String },
  Loaded { profiles: Vec<Profile> },
}

pub fn summarize(payload: Value) -> Result<SummaryView, ApiError> {
  let rows = match payload.get("profiles") {
    Some(Value::Array(rows)) => rows.clone(),
    _ => {
      error!(%payload, "invalid summary data format");
      return Err(ApiError::Malformed {
        context: "summary data format",
        raw: payload.to_string(),
      });
    }
  };
  if rows.is_empty() {
    info!("backend returned an empty profile list");
    return Ok(SummaryView::Empty { message: NO_PROFILES_MESSAGE.into() });
  }

  let profiles = rows
    .into_iter()
    .filter_map(|row| match row {
      Value::Object(fields) => Some(Profile { fields }),
      _ => None,
    })
    .collect::<Vec<_>>();
  info!(count = profiles.len(), "fetched profile summary");
  Ok(SummaryView::Loaded { profiles })
}

pub struct SummaryStore {
  client: ApiClient,
  cache: Mutex<TtlCache<(), SummaryView>>,
}

impl SummaryStore {
  pub fn new(client: ApiClient) -> Self {
    Self {
      client,
      cache: Mutex::new(TtlCache::new(SUMMARY_TTL)),
    }
  }

  pub async fn fetch(&self) -> Result<SummaryView, ApiError> {
    if let Some(view) = self.cache.lock().await.get(&()) {
      return Ok(view);
    }
    let payload = self.client.get_json(SUMMARY_PATH, SUMMARY_TIMEOUT).await?;
    let view = summarize(payload)?;
    self.cache.lock().await.insert((), view.clone());
    Ok(view)
  }

  pub async fn refresh(&self) -> Result<SummaryView, ApiError> {
    self.cache.lock().await.clear();
    self.fetch().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tokio_test::{assert_err, assert_ok};
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[test]
  fn empty_list_is_informative_not_an_error() {
    let view = assert_ok!(summarize(json!({"profiles": []})));
    assert_eq!(view, SummaryView::Empty { message: NO_PROFILES_MESSAGE.into() });
  }

  #[test]
  fn missing_profiles_list_is_malformed() {
    let err = assert_err!(summarize(json!({"rows": []})));
    assert_eq!(err.category(), "MalformedResponse");
  }

  #[test]
  fn profile_cells_display_na_when_blank() {
    let view = assert_ok!(summarize(json!({"profiles": [
      {"ID": "k1abc", "Profile": "", "Email": null, "Number": 4}
    ]})));
    let SummaryView::Loaded { profiles } = view else { panic!("expected profiles") };
    assert_eq!(profiles[0].display("ID"), "k1abc");
    assert_eq!(profiles[0].display("Profile"), "N/A");
    assert_eq!(profiles[0].display("Email"), "N/A");
    assert_eq!(profiles[0].display("Number"), "4");
    assert_eq!(profiles[0].display("IP Country"), "N/A");
  }

  #[tokio::test]
  async fn summary_is_cached_until_refresh() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/profiles/summary"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"profiles": [{"ID": "a"}]})))
      .expect(2)
      .mount(&mock_server)
      .await;

    let store = SummaryStore::new(ApiClient::new(&mock_server.uri(), None));
    assert_ok!(store.fetch().await);
    assert_ok!(store.fetch().await);
    assert_ok!(store.refresh().await);
  }
}
