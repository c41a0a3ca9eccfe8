use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// The authoritative, published record held by the resource registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
  pub resource_id: String,
  pub content: serde_json::Value,
  /// Changes on every write to the resource.
  pub fingerprint: Fingerprint,
}
