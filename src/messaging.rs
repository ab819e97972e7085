use lapin::{Connection, ConnectionProperties, Channel, options::{BasicPublishOptions, QueueDeclareOptions}, types::FieldTable, BasicProperties};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{info, error};
use anyhow::Result;
use uuid::Uuid;
use crate::gateway::{SubmitContext, SubmitError, TaskSubmitter};

static MAX_RETRIES: usize = 5;
static DELAY: u64 = 100;

/// Admitted tasks, consumed by the upstream executors.
pub const TASK_QUEUE: &str = "task_queue";
/// Terminal-state events, consumed by the callback worker.
pub const CALLBACK_QUEUE: &str = "task_callbacks";

pub async fn create_rabbit_channel(rabbitmq_url: &str) -> Result<Channel> {
  let conn = Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || {
    Connection::connect(rabbitmq_url, ConnectionProperties::default())
  })
    .await?;
  let channel = conn.create_channel().await?;
  for queue in [TASK_QUEUE, CALLBACK_QUEUE] {
    channel.queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default()).await?;
  }
  info!("RabbitMQ channel created");
  Ok(channel)
}

pub async fn publish_message(channel: &Channel, queue: &str, payload: &[u8]) -> Result<()> {
  Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || async {
    channel.basic_publish("", queue, BasicPublishOptions::default(), payload, BasicProperties::default()).await
  })
    .await?;
  Ok(())
}

/// Message on [`TASK_QUEUE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTaskMessage {
  pub task_id: String,
  pub caller_id: i64,
  pub model: String,
  pub platform: String,
  pub action: String,
  pub channel_type: u32,
  pub input: Map<String, Value>,
}

/// Message on [`CALLBACK_QUEUE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalEvent {
  pub task_id: String,
}

/// Called by the poller once a task reaches a terminal status.
pub async fn publish_terminal_event(channel: &Channel, task_id: &str) -> Result<()> {
  let payload = terminal_event_payload(task_id)?;
  publish_message(channel, CALLBACK_QUEUE, &payload).await
}

fn terminal_event_payload(task_id: &str) -> serde_json::Result<Vec<u8>> {
  serde_json::to_vec(&TerminalEvent { task_id: task_id.to_string() })
}

/// Hands admitted tasks to the upstream executors over RabbitMQ.
pub struct QueueSubmitter {
  channel: Channel,
}

impl QueueSubmitter {
  pub fn new(channel: Channel) -> Self {
    Self { channel }
  }
}

#[async_trait]
impl TaskSubmitter for QueueSubmitter {
  async fn submit(&self, ctx: &SubmitContext) -> Result<String, SubmitError> {
    let task_id = format!("task_{}", Uuid::new_v4().simple());
    let message = SubmittedTaskMessage {
      task_id: task_id.clone(),
      caller_id: ctx.caller_id,
      model: ctx.model.clone(),
      platform: ctx.route.platform.clone(),
      action: ctx.route.action.clone(),
      channel_type: ctx.route.channel_type,
      input: ctx.input.clone(),
    };
    let payload = serde_json::to_vec(&message).map_err(|e| {
      error!("Serialization failed: {:?}", e);
      SubmitError { status: 500, message: "Serialization Failed.".to_string() }
    })?;

    publish_message(&self.channel, TASK_QUEUE, &payload)
      .await
      .map_err(|e| {
        error!("Failed to publish task {}: {:?}", task_id, e);
        SubmitError { status: 503, message: "An error occurred when publishing task.".to_string() }
      })?;
    Ok(task_id)
  }
}
