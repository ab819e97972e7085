//! Orchestration behind the unified task endpoints.

use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn, error};
use crate::callback::CallbackPool;
use crate::error::GatewayError;
use crate::models::Task;
use crate::normalize::{normalize, UnifiedState, UnifiedTaskDetail};
use crate::routing::{Route, RoutingTable};
use crate::store::{ProgressUpdate, TaskStore};

pub const MAX_BATCH_IDS: usize = 50;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateTaskRequest {
  pub model: String,
  #[serde(rename = "callBackUrl", default, skip_serializing_if = "Option::is_none")]
  pub callback_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTask {
  pub task_id: String,
  pub model: String,
  pub state: UnifiedState,
}

/// Everything the submission collaborator needs for one create request.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitContext {
  pub caller_id: i64,
  pub model: String,
  pub route: Route,
  pub input: Map<String, Value>,
  /// `input` serialized once, as stored on the task.
  pub input_json: String,
  pub callback_url: Option<String>,
}

/// Relay failure: the status and message reach the client unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitError {
  pub status: u16,
  pub message: String,
}

impl From<SubmitError> for GatewayError {
  fn from(e: SubmitError) -> Self {
    GatewayError::Submission { status: e.status, message: e.message }
  }
}

/// Performs the upstream call for an admitted task and returns its id.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
  async fn submit(&self, ctx: &SubmitContext) -> Result<String, SubmitError>;
}

#[derive(Clone)]
pub struct Gateway {
  routes: Arc<RoutingTable>,
  store: Arc<dyn TaskStore>,
  submitter: Arc<dyn TaskSubmitter>,
  callbacks: CallbackPool,
}

impl Gateway {
  pub fn new(
    routes: Arc<RoutingTable>,
    store: Arc<dyn TaskStore>,
    submitter: Arc<dyn TaskSubmitter>,
    callbacks: CallbackPool,
  ) -> Self {
    Self { routes, store, submitter, callbacks }
  }

  pub fn supported_models(&self) -> Vec<String> {
    self.routes.supported_models()
  }

  pub async fn create(&self, caller_id: i64, req: CreateTaskRequest) -> Result<CreatedTask, GatewayError> {
    let route = self.routes.resolve(&req.model)?;
    let input = self.routes.admit_input(&req.model, req.input)?;
    let input_json = serde_json::to_string(&input)
      .map_err(|e| GatewayError::InvalidRequest(format!("invalid input parameters: {}", e)))?;

    let ctx = SubmitContext {
      caller_id,
      model: req.model,
      route,
      input,
      input_json,
      callback_url: req.callback_url.filter(|u| !u.is_empty()),
    };

    let task_id = self.submitter.submit(&ctx).await.map_err(|e| {
      warn!(model = %ctx.model, status = e.status, "Task submission failed: {}", e.message);
      GatewayError::from(e)
    })?;

    let mut task = Task::submitted(task_id.clone(), caller_id, Utc::now().timestamp())
      .with_callback_url(ctx.callback_url.clone());
    task.platform = ctx.route.platform.clone();
    task.action = ctx.route.action.clone();
    task.properties.origin_model_name = ctx.model.clone();
    task.properties.input = ctx.input_json.clone();

    self.store.insert(&task).await.map_err(|e| {
      error!(task_id = %task_id, "Failed to persist submitted task: {:?}", e);
      GatewayError::from(e)
    })?;

    info!(task_id = %task_id, model = %ctx.model, platform = %ctx.route.platform, "Task {} submitted successfully", task_id);
    Ok(CreatedTask { task_id, model: ctx.model, state: UnifiedState::Queued })
  }

  pub async fn fetch(&self, caller_id: i64, task_id: &str) -> Result<UnifiedTaskDetail, GatewayError> {
    if task_id.is_empty() {
      return Err(GatewayError::InvalidRequest("taskId is required".into()));
    }
    let task = self.store
      .get_for_user(caller_id, task_id)
      .await
      .map_err(|e| {
        error!(task_id, "Task lookup failed: {:?}", e);
        GatewayError::from(e)
      })?
      .ok_or(GatewayError::NotFound)?;
    Ok(normalize(&task).into())
  }

  pub async fn fetch_batch(&self, caller_id: i64, raw_ids: Option<&str>) -> Result<Vec<UnifiedTaskDetail>, GatewayError> {
    let ids = parse_task_ids(raw_ids)?;
    let tasks = self.store
      .get_many_for_user(caller_id, &ids)
      .await
      .map_err(|e| {
        error!("Batch task lookup failed: {:?}", e);
        GatewayError::from(e)
      })?;
    Ok(tasks.iter().map(|t| normalize(t).into()).collect())
  }

  /// Poller hook: patches upstream progress and, once the task is terminal,
  /// schedules its callback.
  pub async fn apply_progress(&self, task_id: &str, update: ProgressUpdate) -> Result<bool, GatewayError> {
    self.store.update_progress(task_id, update).await?;
    self.notify_terminal(task_id).await
  }

  /// Schedules the callback of a terminal task. Returns whether a dispatch was
  /// handed to the pool; delivery itself happens in the background.
  pub async fn notify_terminal(&self, task_id: &str) -> Result<bool, GatewayError> {
    Ok(self.callbacks.schedule_terminal(self.store.as_ref(), task_id).await?)
  }
}

/// Splits `a, b,,c` into trimmed, non-empty ids, capped at [`MAX_BATCH_IDS`].
pub fn parse_task_ids(raw: Option<&str>) -> Result<Vec<String>, GatewayError> {
  let raw = match raw {
    Some(r) if !r.is_empty() => r,
    _ => return Err(GatewayError::InvalidRequest("taskIds is required".into())),
  };
  let ids: Vec<String> = raw.split(',')
    .map(str::trim)
    .filter(|id| !id.is_empty())
    .map(String::from)
    .collect();
  if ids.is_empty() {
    return Err(GatewayError::InvalidRequest("no valid taskIds provided".into()));
  }
  if ids.len() > MAX_BATCH_IDS {
    return Err(GatewayError::InvalidRequest(format!("taskIds count exceeds limit (max {})", MAX_BATCH_IDS)));
  }
  Ok(ids)
}
