use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use chrono::Utc;
use thiserror::Error;
use tokio_retry::Retry;
use tracing::{info, warn, error};
use crate::callback::guard;
use crate::config::CallbackConfig;
use crate::models::{CallbackStatus, Task};
use crate::normalize::CallbackPayload;
use crate::store::{CallbackUpdate, TaskStore};

pub const USER_AGENT: &str = "taskgate-callback/1.0";

#[derive(Error, Debug)]
pub enum DeliveryError {
  #[error("send request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("callback returned status {0}")]
  Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
  /// Task has no callback URL.
  Skipped,
  /// Callback URL refused by the SSRF guard.
  Rejected,
  Delivered { attempts: u32 },
  Exhausted { attempts: u32 },
}

/// Delivers a terminal task's payload to its callback URL.
pub struct CallbackDispatcher {
  client: reqwest::Client,
  store: Arc<dyn TaskStore>,
  config: CallbackConfig,
}

impl CallbackDispatcher {
  pub fn new(store: Arc<dyn TaskStore>, config: CallbackConfig) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .timeout(config.timeout)
      .user_agent(USER_AGENT)
      .build()?;
    Ok(Self::with_client(client, store, config))
  }

  /// The client is used as-is; the caller owns its timeout and user agent.
  pub fn with_client(client: reqwest::Client, store: Arc<dyn TaskStore>, config: CallbackConfig) -> Self {
    Self { client, store, config }
  }

  /// Waits between attempts: `base`, `2 * base`, `4 * base`, ...
  fn backoff(&self) -> Vec<Duration> {
    let base = self.config.backoff_base;
    (0..self.config.max_attempts.saturating_sub(1)).map(|i| base * 2u32.pow(i)).collect()
  }

  /// Runs the whole attempt sequence for one task. Never fails; the outcome is
  /// persisted to the store and logged.
  pub async fn dispatch(&self, task: &Task) -> DispatchOutcome {
    let url = match task.callback_url.as_deref() {
      Some(u) if !u.is_empty() => u,
      _ => return DispatchOutcome::Skipped,
    };
    if !guard::is_allowed(url) {
      warn!(task_id = %task.task_id, url, "Invalid callback URL, dispatch dropped");
      return DispatchOutcome::Rejected;
    }

    let body = match serde_json::to_vec(&CallbackPayload::from_task(task)) {
      Ok(b) => b,
      Err(e) => {
        error!(task_id = %task.task_id, "Failed to serialize callback payload: {:?}", e);
        return DispatchOutcome::Skipped;
      }
    };

    let max_attempts = self.config.max_attempts;
    let attempt = AtomicU32::new(0);
    let result = Retry::spawn(self.backoff(), || {
      let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
      let body = body.clone();
      async move {
        match self.send(url, body).await {
          Ok(()) => {
            self.persist(task, CallbackUpdate {
              status: Some(CallbackStatus::Success),
              retry_count: Some(n),
              time: Some(Utc::now().timestamp()),
            }).await;
            Ok(n)
          }
          Err(e) => {
            warn!(task_id = %task.task_id, attempt = n, max_attempts, "Task callback failed: {}", e);
            self.persist(task, CallbackUpdate { retry_count: Some(n), ..Default::default() }).await;
            Err(e)
          }
        }
      }
    })
      .await;

    match result {
      Ok(attempts) => {
        info!(task_id = %task.task_id, attempts, "Task callback delivered");
        DispatchOutcome::Delivered { attempts }
      }
      Err(_) => {
        let attempts = attempt.load(Ordering::SeqCst);
        self.persist(task, CallbackUpdate {
          status: Some(CallbackStatus::Failed),
          time: Some(Utc::now().timestamp()),
          ..Default::default()
        }).await;
        error!(task_id = %task.task_id, attempts, "Task callback failed after all retries");
        DispatchOutcome::Exhausted { attempts }
      }
    }
  }

  async fn send(&self, url: &str, body: Vec<u8>) -> Result<(), DeliveryError> {
    let resp = self.client
      .post(url)
      .header(reqwest::header::CONTENT_TYPE, "application/json")
      .body(body)
      .send()
      .await?;
    let status = resp.status();
    if !status.is_success() {
      return Err(DeliveryError::Status(status.as_u16()));
    }
    Ok(())
  }

  async fn persist(&self, task: &Task, update: CallbackUpdate) {
    if let Err(e) = self.store.update_callback(&task.task_id, update).await {
      error!(task_id = %task.task_id, "Failed to persist callback state: {:?}", e);
    }
  }
}
