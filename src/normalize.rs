//! Normalization of stored upstream tasks into the unified task shape.
//!
//! Platforms encode results differently. Everything here is a pure function of
//! the stored [`Task`]: no I/O and no failure paths, malformed upstream data
//! degrades to an empty result.

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use crate::models::{Task, TaskStatus};

pub const TASK_FAILED_CODE: &str = "task_failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnifiedState {
  Queued,
  Processing,
  Succeeded,
  Failed,
  Unknown,
}

impl From<&TaskStatus> for UnifiedState {
  fn from(status: &TaskStatus) -> Self {
    match status {
      TaskStatus::NotStarted | TaskStatus::Submitted | TaskStatus::Queued => UnifiedState::Queued,
      TaskStatus::InProgress => UnifiedState::Processing,
      TaskStatus::Success => UnifiedState::Succeeded,
      TaskStatus::Failure => UnifiedState::Failed,
      TaskStatus::Other(_) => UnifiedState::Unknown,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
  pub code: String,
  pub message: String,
}

/// Everything the unified API and the webhook payload derive from a task.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedView {
  pub task_id: String,
  pub model: String,
  pub state: UnifiedState,
  pub progress: String,
  pub result: Option<Map<String, Value>>,
  pub error: Option<TaskError>,
  pub created_at: i64,
  pub completed_at: Option<i64>,
  pub cost_time: Option<i64>,
}

pub fn normalize(task: &Task) -> UnifiedView {
  let state = UnifiedState::from(&task.status);
  let model = if task.properties.origin_model_name.is_empty() {
    task.properties.upstream_model_name.clone()
  } else {
    task.properties.origin_model_name.clone()
  };

  let (result, error) = match task.status {
    TaskStatus::Success => (success_result(task), None),
    TaskStatus::Failure => (None, Some(TaskError {
      code: TASK_FAILED_CODE.to_string(),
      message: task.fail_reason.clone(),
    })),
    _ => (None, None),
  };

  let terminal = task.status.is_terminal();
  UnifiedView {
    task_id: task.task_id.clone(),
    model,
    state,
    progress: task.progress.clone(),
    result,
    error,
    created_at: task.created_at,
    completed_at: terminal.then_some(task.finish_time),
    cost_time: terminal.then(|| task.finish_time - task.created_at),
  }
}

fn success_result(task: &Task) -> Option<Map<String, Value>> {
  match serde_json::from_str::<Map<String, Value>>(&task.data) {
    Ok(result) if !result.is_empty() => return Some(result),
    _ => {}
  }
  // Some platforms report the output URL in fail_reason and leave data empty.
  if task.fail_reason.starts_with("http") {
    let mut result = Map::new();
    result.insert("resultUrls".to_string(), Value::Array(vec![Value::String(task.fail_reason.clone())]));
    return Some(result);
  }
  None
}

/// Response shape of the fetch endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedTaskDetail {
  pub task_id: String,
  pub model: String,
  pub state: UnifiedState,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub progress: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<Map<String, Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<TaskError>,
  pub created_at: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<i64>,
}

impl From<UnifiedView> for UnifiedTaskDetail {
  fn from(view: UnifiedView) -> Self {
    Self {
      task_id: view.task_id,
      model: view.model,
      state: view.state,
      progress: view.progress,
      result: view.result,
      error: view.error,
      created_at: view.created_at,
      completed_at: view.completed_at,
    }
  }
}

/// Body POSTed to a client's callback URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
  pub task_id: String,
  pub model: String,
  pub state: UnifiedState,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub progress: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<Map<String, Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result_json: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<TaskError>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub param: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fail_code: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fail_msg: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cost_time: Option<i64>,
  #[serde(rename = "createTime")]
  pub created_at: i64,
  #[serde(rename = "completeTime", default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<i64>,
}

impl CallbackPayload {
  pub fn from_task(task: &Task) -> Self {
    let view = normalize(task);
    let result_json = view.result
      .as_ref()
      .and_then(|r| serde_json::to_string(r).ok());
    let param = Some(task.properties.input.clone()).filter(|p| !p.is_empty());
    Self {
      fail_code: view.error.as_ref().map(|e| e.code.clone()),
      fail_msg: view.error.as_ref().map(|e| e.message.clone()),
      task_id: view.task_id,
      model: view.model,
      state: view.state,
      progress: view.progress,
      result: view.result,
      result_json,
      error: view.error,
      param,
      cost_time: view.cost_time,
      created_at: view.created_at,
      completed_at: view.completed_at,
    }
  }
}
