use std::collections::HashMap;
use std::convert::Infallible;
use warp::{Filter, Rejection, Reply};
use warp::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::error;
use crate::error::GatewayError;
use crate::gateway::{CreateTaskRequest, Gateway};
use crate::routes::deprecation::with_deprecation;

const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Envelope of every unified-API response; `code` mirrors the HTTP status.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
  pub code: u16,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<T>,
}

#[derive(Debug)]
struct MissingCaller;
impl warp::reject::Reject for MissingCaller {}

fn respond<T: Serialize>(result: Result<T, GatewayError>) -> warp::reply::Response {
  match result {
    Ok(data) => json_reply(StatusCode::OK, "success".to_string(), Some(data)),
    Err(e) => error_reply(e.status(), e.to_string()),
  }
}

fn error_reply(status: StatusCode, message: String) -> warp::reply::Response {
  json_reply::<()>(status, message, None)
}

fn json_reply<T: Serialize>(status: StatusCode, message: String, data: Option<T>) -> warp::reply::Response {
  let body = ApiResponse { code: status.as_u16(), message, data };
  warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn with_gateway(gateway: Gateway) -> impl Filter<Extract = (Gateway,), Error = Infallible> + Clone {
  warp::any().map(move || gateway.clone())
}

/// Caller principal, set by the authentication layer in front of the gateway.
fn with_caller() -> impl Filter<Extract = (i64,), Error = Rejection> + Clone {
  warp::header::optional::<String>("x-user-id").and_then(|raw: Option<String>| async move {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
      .ok_or_else(|| warp::reject::custom(MissingCaller))
  })
}

fn create_filter(gateway: Gateway) -> impl Filter<Extract = (CreateTaskRequest, i64, Gateway), Error = Rejection> + Clone {
  warp::post()
    .and(warp::body::content_length_limit(MAX_BODY_BYTES))
    .and(warp::body::json::<CreateTaskRequest>())
    .and(with_caller())
    .and(with_gateway(gateway))
}

pub fn create_route(gateway: Gateway) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  warp::path!("v1" / "tasks")
    .and(create_filter(gateway))
    .and_then(handle_create)
}

/// The pre-unification submit path, kept for existing clients.
pub fn legacy_submit_route(gateway: Gateway) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  with_deprecation(
    warp::path!("v1" / "task" / "submit")
      .and(create_filter(gateway))
      .and_then(handle_create),
    Some("/v1/tasks"),
  )
}

pub fn fetch_route(gateway: Gateway) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  warp::path!("v1" / "tasks" / String)
    .and(warp::get())
    .and(with_caller())
    .and(with_gateway(gateway))
    .and_then(handle_fetch)
}

pub fn fetch_batch_route(gateway: Gateway) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  warp::path!("v1" / "tasks")
    .and(warp::get())
    .and(with_caller())
    .and(warp::query::<HashMap<String, String>>())
    .and(with_gateway(gateway))
    .and_then(handle_fetch_batch)
}

pub fn models_route(gateway: Gateway) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
  warp::path!("v1" / "models")
    .and(warp::get())
    .and(with_gateway(gateway))
    .map(|gateway: Gateway| {
      let mut models = gateway.supported_models();
      models.sort();
      respond::<Vec<String>>(Ok(models))
    })
}

async fn handle_create(req: CreateTaskRequest, caller_id: i64, gateway: Gateway) -> Result<warp::reply::Response, Rejection> {
  Ok(respond(gateway.create(caller_id, req).await))
}

async fn handle_fetch(task_id: String, caller_id: i64, gateway: Gateway) -> Result<warp::reply::Response, Rejection> {
  Ok(respond(gateway.fetch(caller_id, &task_id).await))
}

async fn handle_fetch_batch(caller_id: i64, query: HashMap<String, String>, gateway: Gateway) -> Result<warp::reply::Response, Rejection> {
  let raw = query.get("taskIds").map(String::as_str);
  Ok(respond(gateway.fetch_batch(caller_id, raw).await))
}

/// Turns warp rejections into the same `{code, message}` body the handlers use.
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
  let (status, message) = if err.find::<MissingCaller>().is_some() {
    (StatusCode::UNAUTHORIZED, "missing or invalid X-User-Id header".to_string())
  } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
    (StatusCode::BAD_REQUEST, format!("invalid request: {}", e))
  } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
    (StatusCode::BAD_REQUEST, format!("invalid request: {}", e))
  } else if err.find::<warp::reject::LengthRequired>().is_some() {
    (StatusCode::LENGTH_REQUIRED, "content-length required".to_string())
  } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
    (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
  } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
    (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected application/json".to_string())
  } else if err.is_not_found() {
    (StatusCode::NOT_FOUND, "not found".to_string())
  } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
    (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
  } else {
    error!("Unhandled rejection: {:?}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
  };
  Ok(error_reply(status, message))
}
