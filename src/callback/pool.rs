use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn, error};
use crate::callback::dispatcher::CallbackDispatcher;
use crate::error::StoreError;
use crate::models::{CallbackStatus, Task};
use crate::store::TaskStore;

/// Runs callback dispatches in the background, off the request path.
///
/// At most `concurrency` deliveries run at once, and a task already being
/// delivered is not picked up a second time.
#[derive(Clone)]
pub struct CallbackPool {
  tx: mpsc::UnboundedSender<Task>,
  in_flight: Arc<Mutex<HashSet<String>>>,
}

impl CallbackPool {
  pub fn start(dispatcher: Arc<CallbackDispatcher>, concurrency: usize) -> (Self, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
    let in_flight = Arc::new(Mutex::new(HashSet::new()));
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let running = in_flight.clone();
    let handle = tokio::spawn(async move {
      while let Some(task) = rx.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
          Ok(p) => p,
          Err(e) => {
            error!("Callback pool semaphore closed: {:?}", e);
            break;
          }
        };
        let dispatcher = dispatcher.clone();
        let running = running.clone();
        tokio::spawn(async move {
          let outcome = dispatcher.dispatch(&task).await;
          info!(task_id = %task.task_id, ?outcome, "Callback dispatch finished");
          running.lock().await.remove(&task.task_id);
          drop(permit);
        });
      }
      info!("Callback pool stopped");
    });

    (Self { tx, in_flight }, handle)
  }

  /// Hands the task to the pool without waiting for delivery. Returns false if
  /// the task is already queued or in flight, or the pool has shut down.
  pub async fn submit(&self, task: Task) -> bool {
    let task_id = task.task_id.clone();
    if !self.in_flight.lock().await.insert(task_id.clone()) {
      info!(task_id = %task_id, "Callback already in flight, skipping");
      return false;
    }
    if self.tx.send(task).is_err() {
      warn!(task_id = %task_id, "Callback pool is closed, dispatch dropped");
      self.in_flight.lock().await.remove(&task_id);
      return false;
    }
    true
  }

  /// Looks the task up and schedules its callback if it is terminal, has a
  /// callback URL and has not been settled by an earlier dispatch.
  pub async fn schedule_terminal(&self, store: &dyn TaskStore, task_id: &str) -> Result<bool, StoreError> {
    let task = match store.get(task_id).await? {
      Some(t) => t,
      None => {
        warn!(task_id, "Terminal notification for unknown task");
        return Ok(false);
      }
    };
    if !task.status.is_terminal() || task.callback_url.is_none() {
      return Ok(false);
    }
    if matches!(task.callback_status, Some(CallbackStatus::Success | CallbackStatus::Failed)) {
      info!(task_id, "Callback already settled, not dispatching again");
      return Ok(false);
    }
    Ok(self.submit(task).await)
  }
}
