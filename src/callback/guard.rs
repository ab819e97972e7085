//! Denylist check for client-supplied callback URLs.
//!
//! Matching is textual on the host component. Names that resolve to private
//! addresses, or private ranges written in other notations, are not caught.

use url::Url;

const BLOCKED_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "::1"];

pub fn is_allowed(callback_url: &str) -> bool {
  let parsed = match Url::parse(callback_url) {
    Ok(u) => u,
    Err(_) => return false,
  };

  if parsed.scheme() != "http" && parsed.scheme() != "https" {
    return false;
  }

  let host = match parsed.host_str() {
    Some(h) => h.trim_start_matches('[').trim_end_matches(']'),
    None => return false,
  };
  if host.is_empty() {
    return false;
  }

  if BLOCKED_HOSTS.iter().any(|b| host.eq_ignore_ascii_case(b)) {
    return false;
  }

  if host.starts_with("192.168.") || host.starts_with("10.") {
    return false;
  }

  // 172.16.0.0/12
  if host.starts_with("172.") {
    if let Some(second) = host.split('.').nth(1).and_then(leading_number) {
      if (16..=31).contains(&second) {
        return false;
      }
    }
  }

  true
}

fn leading_number(segment: &str) -> Option<u32> {
  let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
  digits.parse().ok()
}
