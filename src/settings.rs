use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::cache::TtlCache;
use crate::client::{ApiClient, SETTINGS_LOAD_TIMEOUT, SETTINGS_SAVE_TIMEOUT};
use crate::error::ApiError;

/// A schemaless settings resource as stored by the backend.
pub type SettingsDocument = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsResource {
  Main,
  FullFlow,
}

impl SettingsResource {
  pub fn path(self) -> &'static str {
    match self {
      SettingsResource::Main => "/settings/main",
      SettingsResource::FullFlow => "/settings/full_flow",
    }
  }

  pub fn cache_ttl(self) -> Duration {
    match self {
      SettingsResource::Main => Duration::from_secs(60),
      SettingsResource::FullFlow => Duration::from_secs(30),
    }
  }
}

impl fmt::Display for SettingsResource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SettingsResource::Main => f.write_str("main settings"),
      SettingsResource::FullFlow => f.write_str("full flow settings"),
    }
  }
}

/// Loads and saves settings documents, caching loads per resource.
pub struct SettingsStore {
  client: ApiClient,
  cache: Mutex<TtlCache<SettingsResource, SettingsDocument>>,
}

impl SettingsStore {
  pub fn new(client: ApiClient) -> Self {
    Self {
      client,
      cache: Mutex::new(TtlCache::new(SettingsResource::Main.cache_ttl())),
    }
  }

  pub async fn load(&self, resource: SettingsResource) -> Result<SettingsDocument, ApiError> {
    if let Some(document) = self.cache.lock().await.get(&resource) {
      debug!(%resource, "settings cache hit");
      return Ok(document);
    }

    let payload = self
      .client
      .get_json(resource.path(), SETTINGS_LOAD_TIMEOUT)
      .await
      .map_err(|e| {
        error!(%resource, error = %e, "settings fetch error");
        e
      })?;
    let document = match payload {
      Value::Object(document) => document,
      other => {
        error!(%resource, payload = %other, "settings payload is not a document");
        return Err(ApiError::Malformed {
          context: "settings document",
          raw: other.to_string(),
        });
      }
    };

    info!(%resource, keys = document.len(), "settings fetched");
    self
      .cache
      .lock()
      .await
      .insert_with_ttl(resource, document.clone(), resource.cache_ttl());
    Ok(document)
  }

  /// Posts the whole document. Only a confirmed save drops the cached copy.
  pub async fn save(&self, resource: SettingsResource, document: &SettingsDocument) -> Result<String, ApiError> {
    let payload = self
      .client
      .post_json(resource.path(), document, SETTINGS_SAVE_TIMEOUT)
      .await
      .map_err(|e| {
        error!(%resource, error = %e, "settings save error");
        e
      })?;

    self.cache.lock().await.invalidate(&resource);
    let message = payload
      .get("message")
      .and_then(Value::as_str)
      .unwrap_or("Saved successfully.")
      .to_string();
    info!(%resource, %message, "settings saved");
    Ok(message)
  }

  pub async fn reload(&self, resource: SettingsResource) -> Result<SettingsDocument, ApiError> {
    self.cache.lock().await.invalidate(&resource);
    self.load(resource).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tokio_test::{assert_err, assert_ok};
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn main_settings() -> Value {
    json!({"profiles_to_delete": ["k1", "k2"], "score_check_threads": 2, "pixelscan_check": true})
  }

  async fn mount_get(server: &MockServer, route: &str, body: Value, expected: u64) {
    Mock::given(method("GET"))
      .and(path(route))
      .respond_with(ResponseTemplate::new(200).set_body_json(body))
      .expect(expected)
      .mount(server)
      .await;
  }

  #[tokio::test]
  async fn repeated_loads_hit_the_cache() {
    let mock_server = MockServer::start().await;
    mount_get(&mock_server, "/settings/main", main_settings(), 1).await;

    let store = SettingsStore::new(ApiClient::new(&mock_server.uri(), None));
    let first = assert_ok!(store.load(SettingsResource::Main).await);
    let second = assert_ok!(store.load(SettingsResource::Main).await);
    assert_eq!(first, second);
    assert_eq!(Value::Object(first), main_settings());
  }

  #[tokio::test]
  async fn caches_are_scoped_per_resource() {
    let mock_server = MockServer::start().await;
    mount_get(&mock_server, "/settings/main", main_settings(), 1).await;
    mount_get(&mock_server, "/settings/full_flow", json!({"threads": 2}), 1).await;

    let store = SettingsStore::new(ApiClient::new(&mock_server.uri(), None));
    assert_ok!(store.load(SettingsResource::Main).await);
    let full_flow = assert_ok!(store.load(SettingsResource::FullFlow).await);
    assert_eq!(full_flow.get("threads"), Some(&json!(2)));
  }

  #[tokio::test]
  async fn successful_save_invalidates_cache() {
    let mock_server = MockServer::start().await;
    mount_get(&mock_server, "/settings/main", main_settings(), 2).await;
    Mock::given(method("POST"))
      .and(path("/settings/main"))
      .and(body_json(main_settings()))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Settings updated"})))
      .expect(1)
      .mount(&mock_server)
      .await;

    let store = SettingsStore::new(ApiClient::new(&mock_server.uri(), None));
    let document = assert_ok!(store.load(SettingsResource::Main).await);
    assert_eq!(assert_ok!(store.save(SettingsResource::Main, &document).await), "Settings updated");
    assert_ok!(store.load(SettingsResource::Main).await);
  }

  #[tokio::test]
  async fn failed_save_keeps_cache() {
    let mock_server = MockServer::start().await;
    mount_get(&mock_server, "/settings/full_flow", json!({"threads": 2}), 1).await;
    Mock::given(method("POST"))
      .and(path("/settings/full_flow"))
      .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "disk full"})))
      .mount(&mock_server)
      .await;

    let store = SettingsStore::new(ApiClient::new(&mock_server.uri(), None));
    let document = assert_ok!(store.load(SettingsResource::FullFlow).await);
    let err = assert_err!(store.save(SettingsResource::FullFlow, &document).await);
    assert_eq!(err, ApiError::Http { status: 500, message: "disk full".into() });
    assert_ok!(store.load(SettingsResource::FullFlow).await);
  }

  #[tokio::test]
  async fn non_document_payload_is_malformed() {
    let mock_server = MockServer::start().await;
    mount_get(&mock_server, "/settings/main", json!(["not", "a", "map"]), 1).await;

    let store = SettingsStore::new(ApiClient::new(&mock_server.uri(), None));
    let err = assert_err!(store.load(SettingsResource::Main).await);
    assert!(matches!(err, ApiError::Malformed { context: "settings document", .. }));
  }

  #[tokio::test]
  async fn reload_bypasses_cache() {
    let mock_server = MockServer::start().await;
    mount_get(&mock_server, "/settings/main", main_settings(), 2).await;

    let store = SettingsStore::new(ApiClient::new(&mock_server.uri(), None));
    assert_ok!(store.load(SettingsResource::Main).await);
    assert_ok!(store.reload(SettingsResource::Main).await);
  }
}
