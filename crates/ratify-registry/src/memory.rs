use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use ratify_types::{Fingerprint, Resource};

use crate::{Error, ResourceRegistry, Revision};

/// In-memory resource registry.
///
/// Every write stamps the resource with a fresh random fingerprint. Tests can
/// also place a resource at an exact fingerprint with [`put`](Self::put), or
/// simulate other actors with [`put`](Self::put) and [`remove`](Self::remove).
#[derive(Debug, Default)]
pub struct InMemoryResourceRegistry {
  resources: RwLock<HashMap<String, Resource>>,
  write_attempts: AtomicUsize,
}

impl InMemoryResourceRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store a resource at the given fingerprint, bypassing the version check.
  ///
  /// Not counted as a write attempt.
  pub fn put(&self, resource_id: &str, content: serde_json::Value, fingerprint: Fingerprint) {
    let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
    resources.insert(
      resource_id.to_string(),
      Resource {
        resource_id: resource_id.to_string(),
        content,
        fingerprint,
      },
    );
  }

  /// Delete a resource. Returns whether it existed.
  pub fn remove(&self, resource_id: &str) -> bool {
    let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
    resources.remove(resource_id).is_some()
  }

  /// Number of `create`/`update` calls received, successful or not.
  pub fn write_attempts(&self) -> usize {
    self.write_attempts.load(Ordering::SeqCst)
  }

  fn next_fingerprint() -> Fingerprint {
    Fingerprint::new(uuid::Uuid::new_v4().simple().to_string())
  }
}

#[async_trait]
impl ResourceRegistry for InMemoryResourceRegistry {
  async fn get(&self, resource_id: &str) -> Result<Resource, Error> {
    let resources = self.resources.read().unwrap_or_else(PoisonError::into_inner);
    resources
      .get(resource_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(resource_id.to_string()))
  }

  async fn create(&self, content: &serde_json::Value) -> Result<Revision, Error> {
    self.write_attempts.fetch_add(1, Ordering::SeqCst);

    let resource_id = uuid::Uuid::new_v4().to_string();
    let fingerprint = Self::next_fingerprint();
    self.put(&resource_id, content.clone(), fingerprint.clone());

    Ok(Revision {
      resource_id,
      fingerprint,
    })
  }

  async fn update(
    &self,
    resource_id: &str,
    content: &serde_json::Value,
    expected: &Fingerprint,
  ) -> Result<Revision, Error> {
    self.write_attempts.fetch_add(1, Ordering::SeqCst);

    let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
    let resource = resources
      .get_mut(resource_id)
      .ok_or_else(|| Error::NotFound(resource_id.to_string()))?;

    if &resource.fingerprint != expected {
      return Err(Error::FingerprintMismatch {
        resource_id: resource_id.to_string(),
        expected: expected.clone(),
      });
    }

    resource.content = content.clone();
    resource.fingerprint = Self::next_fingerprint();

    Ok(Revision {
      resource_id: resource_id.to_string(),
      fingerprint: resource.fingerprint.clone(),
    })
  }
}
