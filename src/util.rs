//! Small utility helpers used across modules.

use chrono::{DateTime, SubsecRound, Utc};

/// Current instant at millisecond precision, matching what the remote stores.
pub fn now_millis() -> DateTime<Utc> {
  Utc::now().trunc_subsecs(3)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
