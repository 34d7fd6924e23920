use botdash::{config::StubConfig, routes::routes, worker_processing::StubBackend};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt::init();
  let config = StubConfig::from_env()?;
  if config.api_key.is_none() {
    info!("SIGNUP_API_KEY not set; accepting requests without X-API-Key");
  }

  let backend = StubBackend::new(config.step, config.api_key);
  info!("Sandbox backend listening on port {}", config.port);
  warp::serve(routes(backend))
    .run(([0, 0, 0, 0], config.port))
    .await;
  Ok(())
}
