use serde::{Serialize, Deserialize};

/// Upstream-reported lifecycle state of a task.
///
/// Statuses the gateway does not model yet are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
  NotStarted,
  Submitted,
  Queued,
  InProgress,
  Success,
  Failure,
  Other(String),
}

impl TaskStatus {
  pub fn as_str(&self) -> &str {
    match self {
      TaskStatus::NotStarted => "NOT_START",
      TaskStatus::Submitted => "SUBMITTED",
      TaskStatus::Queued => "QUEUED",
      TaskStatus::InProgress => "IN_PROGRESS",
      TaskStatus::Success => "SUCCESS",
      TaskStatus::Failure => "FAILURE",
      TaskStatus::Other(s) => s,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, TaskStatus::Success | TaskStatus::Failure)
  }
}

impl From<String> for TaskStatus {
  fn from(s: String) -> Self {
    match s.as_str() {
      "NOT_START" => TaskStatus::NotStarted,
      "SUBMITTED" => TaskStatus::Submitted,
      "QUEUED" => TaskStatus::Queued,
      "IN_PROGRESS" => TaskStatus::InProgress,
      "SUCCESS" => TaskStatus::Success,
      "FAILURE" => TaskStatus::Failure,
      _ => TaskStatus::Other(s),
    }
  }
}

impl From<TaskStatus> for String {
  fn from(status: TaskStatus) -> Self {
    status.as_str().to_string()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallbackStatus {
  Pending,
  Success,
  Failed,
}

impl CallbackStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      CallbackStatus::Pending => "PENDING",
      CallbackStatus::Success => "SUCCESS",
      CallbackStatus::Failed => "FAILED",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "PENDING" => Some(CallbackStatus::Pending),
      "SUCCESS" => Some(CallbackStatus::Success),
      "FAILED" => Some(CallbackStatus::Failed),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskProperties {
  pub origin_model_name: String,
  pub upstream_model_name: String,
  /// Original request input, serialized as JSON.
  pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub task_id: String,
  pub user_id: i64,
  pub platform: String,
  pub action: String,
  pub status: TaskStatus,
  pub progress: String,
  pub data: String,
  pub fail_reason: String,
  pub callback_url: Option<String>,
  pub callback_status: Option<CallbackStatus>,
  pub callback_retry_count: u32,
  pub callback_time: Option<i64>,
  pub created_at: i64,
  pub finish_time: i64,
  pub properties: TaskProperties,
}

impl Task {
  /// A freshly submitted task. Callback bookkeeping starts out pending only
  /// when the client asked for a callback.
  pub fn submitted(task_id: String, user_id: i64, created_at: i64) -> Self {
    Self {
      task_id,
      user_id,
      platform: String::new(),
      action: String::new(),
      status: TaskStatus::Submitted,
      progress: String::new(),
      data: String::new(),
      fail_reason: String::new(),
      callback_url: None,
      callback_status: None,
      callback_retry_count: 0,
      callback_time: None,
      created_at,
      finish_time: 0,
      properties: TaskProperties::default(),
    }
  }

  pub fn with_callback_url(mut self, url: Option<String>) -> Self {
    self.callback_url = url.filter(|u| !u.is_empty());
    self.callback_status = self.callback_url.as_ref().map(|_| CallbackStatus::Pending);
    self
  }
}
