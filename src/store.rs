use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use sqlx::postgres::PgRow;
use tokio::sync::RwLock;
use crate::error::StoreError;
use crate::models::{CallbackStatus, Task, TaskProperties, TaskStatus};

/// Field-level patch of the callback bookkeeping. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackUpdate {
  pub status: Option<CallbackStatus>,
  pub retry_count: Option<u32>,
  pub time: Option<i64>,
}

/// Field-level patch written by the poller as upstream state changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
  pub status: Option<TaskStatus>,
  pub progress: Option<String>,
  pub data: Option<String>,
  pub fail_reason: Option<String>,
  pub finish_time: Option<i64>,
}

/// Durable task storage. Updates touch only the fields they name, so the
/// poller and the callback dispatcher can write the same row concurrently.
#[async_trait]
pub trait TaskStore: Send + Sync {
  async fn insert(&self, task: &Task) -> Result<(), StoreError>;

  /// Unscoped lookup for background work.
  async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

  async fn get_for_user(&self, user_id: i64, task_id: &str) -> Result<Option<Task>, StoreError>;

  /// Unmatched ids are simply absent from the result.
  async fn get_many_for_user(&self, user_id: i64, task_ids: &[String]) -> Result<Vec<Task>, StoreError>;

  async fn update_callback(&self, task_id: &str, update: CallbackUpdate) -> Result<(), StoreError>;

  /// Once the stored status is terminal, `status` and `finish_time` are left as they are.
  async fn update_progress(&self, task_id: &str, update: ProgressUpdate) -> Result<(), StoreError>;
}

#[derive(Clone, Default)]
pub struct MemoryTaskStore {
  tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl MemoryTaskStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
  async fn insert(&self, task: &Task) -> Result<(), StoreError> {
    let mut tasks = self.tasks.write().await;
    if tasks.contains_key(&task.task_id) {
      return Err(StoreError::Duplicate(task.task_id.clone()));
    }
    tasks.insert(task.task_id.clone(), task.clone());
    Ok(())
  }

  async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
    Ok(self.tasks.read().await.get(task_id).cloned())
  }

  async fn get_for_user(&self, user_id: i64, task_id: &str) -> Result<Option<Task>, StoreError> {
    Ok(self.tasks.read().await
      .get(task_id)
      .filter(|t| t.user_id == user_id)
      .cloned())
  }

  async fn get_many_for_user(&self, user_id: i64, task_ids: &[String]) -> Result<Vec<Task>, StoreError> {
    let tasks = self.tasks.read().await;
    Ok(task_ids.iter()
      .filter_map(|id| tasks.get(id))
      .filter(|t| t.user_id == user_id)
      .cloned()
      .collect())
  }

  async fn update_callback(&self, task_id: &str, update: CallbackUpdate) -> Result<(), StoreError> {
    if let Some(t) = self.tasks.write().await.get_mut(task_id) {
      if let Some(status) = update.status {
        t.callback_status = Some(status);
      }
      if let Some(count) = update.retry_count {
        t.callback_retry_count = count;
      }
      if let Some(time) = update.time {
        t.callback_time = Some(time);
      }
    }
    Ok(())
  }

  async fn update_progress(&self, task_id: &str, update: ProgressUpdate) -> Result<(), StoreError> {
    if let Some(t) = self.tasks.write().await.get_mut(task_id) {
      // Terminal status and finish time are final.
      if !t.status.is_terminal() {
        if let Some(status) = update.status {
          t.status = status;
        }
        if let Some(finish) = update.finish_time {
          t.finish_time = finish;
        }
      }
      if let Some(progress) = update.progress {
        t.progress = progress;
      }
      if let Some(data) = update.data {
        t.data = data;
      }
      if let Some(reason) = update.fail_reason {
        t.fail_reason = reason;
      }
    }
    Ok(())
  }
}

const TASK_COLUMNS: &str = "task_id, user_id, platform, action, status, progress, data, fail_reason, \
  callback_url, callback_status, callback_retry_count, callback_time, created_at, finish_time, \
  origin_model_name, upstream_model_name, input";

#[derive(Clone)]
pub struct PgTaskStore {
  pool: Pool<Postgres>,
}

impl PgTaskStore {
  pub fn new(pool: Pool<Postgres>) -> Self {
    Self { pool }
  }
}

fn task_from_row(row: &PgRow) -> Result<Task, sqlx::Error> {
  let status: String = row.try_get("status")?;
  let callback_status: Option<String> = row.try_get("callback_status")?;
  let retry_count: i32 = row.try_get("callback_retry_count")?;
  Ok(Task {
    task_id: row.try_get("task_id")?,
    user_id: row.try_get("user_id")?,
    platform: row.try_get("platform")?,
    action: row.try_get("action")?,
    status: TaskStatus::from(status),
    progress: row.try_get("progress")?,
    data: row.try_get("data")?,
    fail_reason: row.try_get("fail_reason")?,
    callback_url: row.try_get("callback_url")?,
    callback_status: callback_status.as_deref().and_then(CallbackStatus::parse),
    callback_retry_count: retry_count.max(0) as u32,
    callback_time: row.try_get("callback_time")?,
    created_at: row.try_get("created_at")?,
    finish_time: row.try_get("finish_time")?,
    properties: TaskProperties {
      origin_model_name: row.try_get("origin_model_name")?,
      upstream_model_name: row.try_get("upstream_model_name")?,
      input: row.try_get("input")?,
    },
  })
}

#[async_trait]
impl TaskStore for PgTaskStore {
  async fn insert(&self, task: &Task) -> Result<(), StoreError> {
    sqlx::query(&format!(
      "INSERT INTO tasks ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
      TASK_COLUMNS
    ))
      .bind(&task.task_id)
      .bind(task.user_id)
      .bind(&task.platform)
      .bind(&task.action)
      .bind(task.status.as_str())
      .bind(&task.progress)
      .bind(&task.data)
      .bind(&task.fail_reason)
      .bind(&task.callback_url)
      .bind(task.callback_status.map(|s| s.as_str()))
      .bind(task.callback_retry_count as i32)
      .bind(task.callback_time)
      .bind(task.created_at)
      .bind(task.finish_time)
      .bind(&task.properties.origin_model_name)
      .bind(&task.properties.upstream_model_name)
      .bind(&task.properties.input)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
    let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE task_id = $1", TASK_COLUMNS))
      .bind(task_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.as_ref().map(task_from_row).transpose()?)
  }

  async fn get_for_user(&self, user_id: i64, task_id: &str) -> Result<Option<Task>, StoreError> {
    let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE user_id = $1 AND task_id = $2", TASK_COLUMNS))
      .bind(user_id)
      .bind(task_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.as_ref().map(task_from_row).transpose()?)
  }

  async fn get_many_for_user(&self, user_id: i64, task_ids: &[String]) -> Result<Vec<Task>, StoreError> {
    let rows = sqlx::query(&format!("SELECT {} FROM tasks WHERE user_id = $1 AND task_id = ANY($2)", TASK_COLUMNS))
      .bind(user_id)
      .bind(task_ids)
      .fetch_all(&self.pool)
      .await?;
    Ok(rows.iter().map(task_from_row).collect::<Result<Vec<_>, _>>()?)
  }

  async fn update_callback(&self, task_id: &str, update: CallbackUpdate) -> Result<(), StoreError> {
    sqlx::query(
      "UPDATE tasks SET callback_status = COALESCE($2, callback_status), \
       callback_retry_count = COALESCE($3, callback_retry_count), \
       callback_time = COALESCE($4, callback_time) WHERE task_id = $1",
    )
      .bind(task_id)
      .bind(update.status.map(|s| s.as_str()))
      .bind(update.retry_count.map(|c| c as i32))
      .bind(update.time)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn update_progress(&self, task_id: &str, update: ProgressUpdate) -> Result<(), StoreError> {
    sqlx::query(
      "UPDATE tasks SET \
       status = CASE WHEN status IN ('SUCCESS', 'FAILURE') THEN status ELSE COALESCE($2, status) END, \
       progress = COALESCE($3, progress), data = COALESCE($4, data), fail_reason = COALESCE($5, fail_reason), \
       finish_time = CASE WHEN status IN ('SUCCESS', 'FAILURE') THEN finish_time ELSE COALESCE($6, finish_time) END \
       WHERE task_id = $1",
    )
      .bind(task_id)
      .bind(update.status.as_ref().map(|s| s.as_str().to_string()))
      .bind(update.progress)
      .bind(update.data)
      .bind(update.fail_reason)
      .bind(update.finish_time)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn task(id: &str, user_id: i64) -> Task {
    Task::submitted(id.into(), user_id, 100)
  }

  #[tokio::test]
  async fn lookups_are_scoped_to_the_owner() {
    let store = MemoryTaskStore::new();
    store.insert(&task("a", 1)).await.unwrap();
    store.insert(&task("b", 2)).await.unwrap();

    assert!(store.get_for_user(1, "a").await.unwrap().is_some());
    assert!(store.get_for_user(1, "b").await.unwrap().is_none());
    assert!(store.get("b").await.unwrap().is_some());

    let ids = vec!["a".to_string(), "b".to_string(), "missing".to_string()];
    let found = store.get_many_for_user(1, &ids).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].task_id, "a");
  }

  #[tokio::test]
  async fn duplicate_insert_is_rejected() {
    let store = MemoryTaskStore::new();
    tokio_test::assert_ok!(store.insert(&task("a", 1)).await);
    let err = tokio_test::assert_err!(store.insert(&task("a", 1)).await);
    assert!(matches!(err, StoreError::Duplicate(_)));
  }

  #[tokio::test]
  async fn terminal_status_is_never_regressed() {
    let store = MemoryTaskStore::new();
    store.insert(&task("a", 1)).await.unwrap();
    store.update_progress("a", ProgressUpdate {
      status: Some(TaskStatus::Success),
      finish_time: Some(200),
      ..Default::default()
    }).await.unwrap();

    store.update_progress("a", ProgressUpdate {
      status: Some(TaskStatus::InProgress),
      progress: Some("50%".into()),
      finish_time: Some(300),
      ..Default::default()
    }).await.unwrap();

    let t = store.get("a").await.unwrap().unwrap();
    assert_eq!(t.status, TaskStatus::Success);
    assert_eq!(t.finish_time, 200);
    assert_eq!(t.progress, "50%");
  }

  #[tokio::test]
  async fn disjoint_patches_do_not_clobber_each_other() {
    let store = MemoryTaskStore::new();
    store.insert(&task("a", 1).with_callback_url(Some("https://h.example/cb".into()))).await.unwrap();

    let progress = store.update_progress("a", ProgressUpdate {
      status: Some(TaskStatus::Success),
      progress: Some("100%".into()),
      finish_time: Some(200),
      ..Default::default()
    });
    let callback = store.update_callback("a", CallbackUpdate {
      retry_count: Some(1),
      ..Default::default()
    });
    let (p, c) = tokio::join!(progress, callback);
    p.unwrap();
    c.unwrap();

    let t = store.get("a").await.unwrap().unwrap();
    assert_eq!(t.status, TaskStatus::Success);
    assert_eq!(t.progress, "100%");
    assert_eq!(t.finish_time, 200);
    assert_eq!(t.callback_retry_count, 1);
    assert_eq!(t.callback_status, Some(CallbackStatus::Pending));
    assert_eq!(t.callback_time, None);
  }
}
