use lapin::{options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions}, types::FieldTable};
use std::sync::Arc;
use tracing::{info, warn, error};
use futures::StreamExt;
use taskgate::{
  callback::{CallbackDispatcher, CallbackPool},
  config::Config,
  database::setup_database,
  messaging::{create_rabbit_channel, TerminalEvent, CALLBACK_QUEUE},
  store::{MemoryTaskStore, PgTaskStore, TaskStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt::init();
  let config = Config::from_env()?;

  let store: Arc<dyn TaskStore> = match &config.database_url {
    Some(url) => Arc::new(PgTaskStore::new(setup_database(url).await?)),
    None => {
      warn!("DATABASE_URL not set, callback worker only sees an empty in-memory store");
      Arc::new(MemoryTaskStore::new())
    }
  };
  let rabbit_channel = create_rabbit_channel(config.require_rabbitmq_url()?).await?;

  let mut consumer = rabbit_channel
    .basic_consume(CALLBACK_QUEUE, "callback_worker", BasicConsumeOptions::default(), FieldTable::default())
    .await?;

  let dispatcher = Arc::new(CallbackDispatcher::new(store.clone(), config.callback.clone())?);
  let (callbacks, pool) = CallbackPool::start(dispatcher, config.callback.concurrency);
  info!(concurrency = config.callback.concurrency, "Callback worker consuming {}", CALLBACK_QUEUE);

  while let Some(delivery) = consumer.next().await {
    let delivery = match delivery {
      Ok(d) => d,
      Err(e) => {
        error!("Consumer error: {:?}", e);
        continue;
      }
    };
    let event = match serde_json::from_slice::<TerminalEvent>(&delivery.data) {
      Ok(ev) => ev,
      Err(e) => {
        error!("Failed to parse terminal event: {:?}", e);
        let _ = delivery.ack(BasicAckOptions::default()).await;
        continue;
      }
    };
    match callbacks.schedule_terminal(store.as_ref(), &event.task_id).await {
      Ok(scheduled) => {
        info!(task_id = %event.task_id, scheduled, "Terminal event handled");
        let _ = delivery.ack(BasicAckOptions::default()).await;
      }
      Err(e) => {
        error!(task_id = %event.task_id, "Failed to load task for callback: {:?}", e);
        let _ = delivery.nack(BasicNackOptions { requeue: true, ..Default::default() }).await;
      }
    }
  }

  warn!("Terminal event stream closed, stopping callback pool");
  drop(callbacks);
  let _ = pool.await;
  Ok(())
}
