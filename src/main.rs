use std::sync::Arc;
use tracing::{info, warn};
use taskgate::{
  callback::{CallbackDispatcher, CallbackPool},
  config::Config,
  database::setup_database,
  gateway::Gateway,
  messaging::{create_rabbit_channel, QueueSubmitter},
  routes::routes,
  routing::RoutingTable,
  store::{MemoryTaskStore, PgTaskStore, TaskStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt::init();
  let config = Config::from_env()?;

  let store: Arc<dyn TaskStore> = match &config.database_url {
    Some(url) => Arc::new(PgTaskStore::new(setup_database(url).await?)),
    None => {
      warn!("DATABASE_URL not set, tasks are kept in memory");
      Arc::new(MemoryTaskStore::new())
    }
  };
  let rabbit_channel = create_rabbit_channel(config.require_rabbitmq_url()?).await?;

  let dispatcher = Arc::new(CallbackDispatcher::new(store.clone(), config.callback.clone())?);
  let (callbacks, _pool) = CallbackPool::start(dispatcher, config.callback.concurrency);

  let routing = Arc::new(RoutingTable::default());
  info!(models = routing.supported_models().len(), "Routing table loaded");
  let gateway = Gateway::new(routing, store, Arc::new(QueueSubmitter::new(rabbit_channel)), callbacks);

  info!(port = config.server_port, "taskgate API listening");
  warp::serve(routes(gateway))
    .run(([0, 0, 0, 0], config.server_port))
    .await;
  Ok(())
}
