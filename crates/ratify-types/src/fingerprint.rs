use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Opaque token identifying one revision of a resource.
///
/// Fingerprints only support equality. They are never parsed or ordered, so
/// a registry may back them with counters, content hashes or timestamps
/// without the rest of the system caring which.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  /// Wrap a registry-provided revision token.
  pub fn new(token: impl Into<String>) -> Self {
    Self(token.into())
  }

  /// Wrap a last-modified timestamp.
  ///
  /// The timestamp is rendered at nanosecond precision and then treated as an
  /// opaque token like any other fingerprint.
  pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
    Self(timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true))
  }

  /// The raw token.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
