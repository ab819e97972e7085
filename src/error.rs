use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("task already exists: {0}")]
  Duplicate(String),
}

#[derive(Error, Debug)]
pub enum GatewayError {
  #[error("unsupported model: {0}")]
  UnsupportedModel(String),

  #[error("{0}")]
  InvalidRequest(String),

  #[error("{0}")]
  Unauthorized(String),

  /// Relay failure reported by the submission collaborator, passed through as-is.
  #[error("{message}")]
  Submission { status: u16, message: String },

  #[error("task not found")]
  NotFound,

  #[error("query task failed: {0}")]
  Store(#[from] StoreError),
}

impl GatewayError {
  pub fn status(&self) -> StatusCode {
    match self {
      GatewayError::UnsupportedModel(_) | GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
      GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      GatewayError::Submission { status, .. } => {
        StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
      }
      GatewayError::NotFound => StatusCode::NOT_FOUND,
      GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn client_errors_never_map_to_500() {
    assert_eq!(GatewayError::UnsupportedModel("x".into()).status(), StatusCode::BAD_REQUEST);
    assert_eq!(GatewayError::NotFound.status(), StatusCode::NOT_FOUND);
    let relay = GatewayError::Submission { status: 429, message: "rate limited".into() };
    assert_eq!(relay.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(relay.to_string(), "rate limited");
  }

  #[test]
  fn bogus_submission_status_becomes_bad_gateway() {
    let relay = GatewayError::Submission { status: 42, message: "?".into() };
    assert_eq!(relay.status(), StatusCode::BAD_GATEWAY);
  }
}
