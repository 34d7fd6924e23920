use std::sync::Arc;

use tokio::sync::{Notify, watch};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::app::AppState;

/// Drives `AppState::refresh` on the recommended cadence without blocking
/// the input surface.
pub struct PollScheduler {
  app: Arc<AppState>,
  refresh: Arc<Notify>,
  shutdown: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct SchedulerHandle {
  refresh: Arc<Notify>,
  shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
  /// Polls now, fetching logs regardless of worker state. A poll still in
  /// flight is abandoned.
  pub fn refresh_now(&self) {
    self.refresh.notify_one();
  }

  pub fn shutdown(&self) {
    let _ = self.shutdown.send(true);
  }
}

impl PollScheduler {
  pub fn new(app: Arc<AppState>) -> (Self, SchedulerHandle) {
    let refresh = Arc::new(Notify::new());
    let (tx, rx) = watch::channel(false);
    let scheduler = Self {
      app,
      refresh: refresh.clone(),
      shutdown: rx,
    };
    let handle = SchedulerHandle {
      refresh,
      shutdown: Arc::new(tx),
    };
    (scheduler, handle)
  }

  pub async fn run(mut self) {
    info!("poll scheduler started");
    let mut manual = false;
    loop {
      let interval = tokio::select! {
        interval = self.app.refresh(manual) => interval,
        _ = self.refresh.notified() => {
          debug!("refresh requested; superseding in-flight poll");
          manual = true;
          continue;
        }
        _ = self.shutdown.changed() => break,
      };
      manual = false;
      debug!(?interval, "next poll scheduled");

      tokio::select! {
        _ = sleep(interval) => {}
        _ = self.refresh.notified() => manual = true,
        _ = self.shutdown.changed() => break,
      }
    }
    info!("poll scheduler stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::ApiClient;
  use crate::poller::Cadence;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn refresh_request_wakes_the_loop_early() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/status"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "idle"})))
      .mount(&mock_server)
      .await;
    Mock::given(method("GET"))
      .and(path("/logs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"logs": ["manual"]})))
      .mount(&mock_server)
      .await;

    let app = Arc::new(AppState::with_client(
      ApiClient::new(&mock_server.uri(), None),
      Cadence::new(Duration::from_secs(3), Duration::from_secs(30)),
    ));
    let (scheduler, handle) = PollScheduler::new(app.clone());
    let task = tokio::spawn(scheduler.run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.refresh_now();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let requests = mock_server.received_requests().await.unwrap_or_default();
    let polls = requests.iter().filter(|r| r.url.path() == "/status").count();
    assert_eq!(polls, 2);
    assert_eq!(app.session.logs().await.lines(), ["manual"]);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn refresh_supersedes_a_slow_poll() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/status"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({"state": "running", "task": "delete"}))
          .set_delay(Duration::from_secs(5)),
      )
      .up_to_n_times(1)
      .mount(&mock_server)
      .await;
    Mock::given(method("GET"))
      .and(path("/status"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "stopped"})))
      .mount(&mock_server)
      .await;
    Mock::given(method("GET"))
      .and(path("/logs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"logs": []})))
      .mount(&mock_server)
      .await;

    let app = Arc::new(AppState::with_client(ApiClient::new(&mock_server.uri(), None), Cadence::default()));
    let (scheduler, handle) = PollScheduler::new(app.clone());
    let task = tokio::spawn(scheduler.run());

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.refresh_now();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(app.session.status().await.state, crate::models::WorkerState::Stopped);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
  }
}
