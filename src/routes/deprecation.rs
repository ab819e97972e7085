use warp::{Filter, Rejection, Reply};
use warp::http::HeaderValue;
use warp::http::header::LINK;

pub const DEPRECATION_DATE: &str = r#"date="2026-06-01""#;
pub const SUNSET: &str = "Fri, 01 Jun 2026 00:00:00 GMT";

/// Marks a reply as coming from a legacy endpoint (RFC 8594), optionally
/// pointing at its replacement (RFC 8288).
pub fn deprecated(reply: impl Reply, migrate_to: Option<&str>) -> warp::reply::Response {
  let mut resp = reply.into_response();
  let headers = resp.headers_mut();
  headers.insert("X-API-Deprecated", HeaderValue::from_static("true"));
  headers.insert("Deprecation", HeaderValue::from_static(DEPRECATION_DATE));
  if let Some(path) = migrate_to {
    if let Ok(link) = HeaderValue::from_str(&format!("<{}>; rel=\"alternate\"", path)) {
      headers.insert(LINK, link);
    }
  }
  headers.insert("Sunset", HeaderValue::from_static(SUNSET));
  resp
}

pub fn with_deprecation<F, R>(filter: F, migrate_to: Option<&'static str>) -> impl Filter<Extract = (warp::reply::Response,), Error = Rejection> + Clone
where
  F: Filter<Extract = (R,), Error = Rejection> + Clone,
  R: Reply,
{
  filter.map(move |reply: R| deprecated(reply, migrate_to))
}
