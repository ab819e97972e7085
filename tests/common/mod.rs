#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use serde_json::Value;
use warp::Filter;
use warp::http::{HeaderMap, StatusCode};
use taskgate::callback::{CallbackDispatcher, CallbackPool};
use taskgate::callback::dispatcher::USER_AGENT;
use taskgate::config::CallbackConfig;
use taskgate::error::StoreError;
use taskgate::gateway::{Gateway, SubmitContext, SubmitError, TaskSubmitter};
use taskgate::models::Task;
use taskgate::routing::RoutingTable;
use taskgate::store::{CallbackUpdate, MemoryTaskStore, ProgressUpdate, TaskStore};

/// Public-looking host the test client resolves to the local hook server.
pub const HOOK_HOST: &str = "hooks.example.test";

#[derive(Debug, Clone)]
pub struct Hit {
  pub at: Instant,
  pub headers: HeaderMap,
  pub body: Value,
}

pub struct Hook {
  pub addr: SocketAddr,
  pub hits: Arc<Mutex<Vec<Hit>>>,
}

impl Hook {
  pub fn url(&self) -> String {
    format!("http://{}:{}/cb", HOOK_HOST, self.addr.port())
  }

  pub fn hits(&self) -> Vec<Hit> {
    self.hits.lock().unwrap().clone()
  }

  pub async fn wait_for_hits(&self, n: usize) -> Vec<Hit> {
    for _ in 0..200 {
      if self.hits.lock().unwrap().len() >= n {
        break;
      }
      tokio::time::sleep(Duration::from_millis(25)).await;
    }
    self.hits()
  }
}

/// Webhook receiver answering with `statuses` in order, repeating the last one.
pub async fn spawn_hook(statuses: Vec<u16>, delay: Duration) -> Hook {
  let hits = Arc::new(Mutex::new(Vec::new()));
  let recorded = hits.clone();
  let statuses = Arc::new(statuses);
  let counter = Arc::new(AtomicUsize::new(0));

  let route = warp::post()
    .and(warp::path("cb"))
    .and(warp::header::headers_cloned())
    .and(warp::body::json::<Value>())
    .and_then(move |headers: HeaderMap, body: Value| {
      let recorded = recorded.clone();
      let statuses = statuses.clone();
      let n = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        recorded.lock().unwrap().push(Hit { at: Instant::now(), headers, body });
        if !delay.is_zero() {
          tokio::time::sleep(delay).await;
        }
        let code = statuses.get(n).or(statuses.last()).copied().unwrap_or(200);
        Ok::<_, warp::Rejection>(warp::reply::with_status(warp::reply(), StatusCode::from_u16(code).unwrap()))
      }
    });

  let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
  tokio::spawn(server);
  Hook { addr, hits }
}

pub fn hook_client(addr: SocketAddr, timeout: Duration) -> reqwest::Client {
  reqwest::Client::builder()
    .timeout(timeout)
    .user_agent(USER_AGENT)
    .resolve(HOOK_HOST, addr)
    .build()
    .unwrap()
}

pub fn fast_config() -> CallbackConfig {
  CallbackConfig {
    backoff_base: Duration::from_millis(10),
    ..CallbackConfig::default()
  }
}

pub fn dispatcher(addr: SocketAddr, store: Arc<dyn TaskStore>, config: CallbackConfig) -> CallbackDispatcher {
  CallbackDispatcher::with_client(hook_client(addr, config.timeout), store, config)
}

/// Hands out `task-1`, `task-2`, ... or fails every call with a relay error.
pub struct FakeSubmitter {
  next: AtomicUsize,
  pub failure: Option<SubmitError>,
  pub seen: Mutex<Vec<SubmitContext>>,
}

impl FakeSubmitter {
  pub fn ok() -> Self {
    Self { next: AtomicUsize::new(1), failure: None, seen: Mutex::new(Vec::new()) }
  }

  pub fn failing(status: u16, message: &str) -> Self {
    Self {
      failure: Some(SubmitError { status, message: message.to_string() }),
      ..Self::ok()
    }
  }
}

#[async_trait]
impl TaskSubmitter for FakeSubmitter {
  async fn submit(&self, ctx: &SubmitContext) -> Result<String, SubmitError> {
    self.seen.lock().unwrap().push(ctx.clone());
    if let Some(f) = &self.failure {
      return Err(f.clone());
    }
    Ok(format!("task-{}", self.next.fetch_add(1, Ordering::SeqCst)))
  }
}

/// In-memory store that records batch queries.
#[derive(Default)]
pub struct RecordingStore {
  pub inner: MemoryTaskStore,
  pub batch_queries: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl TaskStore for RecordingStore {
  async fn insert(&self, task: &Task) -> Result<(), StoreError> {
    self.inner.insert(task).await
  }

  async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
    self.inner.get(task_id).await
  }

  async fn get_for_user(&self, user_id: i64, task_id: &str) -> Result<Option<Task>, StoreError> {
    self.inner.get_for_user(user_id, task_id).await
  }

  async fn get_many_for_user(&self, user_id: i64, task_ids: &[String]) -> Result<Vec<Task>, StoreError> {
    self.batch_queries.lock().unwrap().push(task_ids.to_vec());
    self.inner.get_many_for_user(user_id, task_ids).await
  }

  async fn update_callback(&self, task_id: &str, update: CallbackUpdate) -> Result<(), StoreError> {
    self.inner.update_callback(task_id, update).await
  }

  async fn update_progress(&self, task_id: &str, update: ProgressUpdate) -> Result<(), StoreError> {
    self.inner.update_progress(task_id, update).await
  }
}

pub struct Harness {
  pub gateway: Gateway,
  pub store: Arc<RecordingStore>,
  pub submitter: Arc<FakeSubmitter>,
}

/// A gateway whose callbacks go to `hook_addr` (or nowhere reachable).
pub fn harness(submitter: FakeSubmitter, hook_addr: Option<SocketAddr>) -> Harness {
  let store = Arc::new(RecordingStore::default());
  let submitter = Arc::new(submitter);
  let addr = hook_addr.unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 9)));
  let dispatcher = Arc::new(dispatcher(addr, store.clone(), fast_config()));
  let (callbacks, _) = CallbackPool::start(dispatcher, 4);
  let gateway = Gateway::new(Arc::new(RoutingTable::default()), store.clone(), submitter.clone(), callbacks);
  Harness { gateway, store, submitter }
}
