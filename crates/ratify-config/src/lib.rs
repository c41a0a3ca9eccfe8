//! Ratify Config
//!
//! Serializable configuration for the approval coordinator. Every field has a
//! default, so an empty JSON object (or no file at all) is a valid config:
//!
//! ```json
//! {
//!   "listen_addr": "0.0.0.0:8080",
//!   "adapter_timeout_ms": 5000,
//!   "draft_store": { "database_url": "sqlite:///var/lib/ratify/drafts.db" },
//!   "workflow_engine": {
//!     "base_url": "http://camunda:8080/engine-rest",
//!     "process_key": "benefit-plan-approval"
//!   },
//!   "resource_registry": {
//!     "base_url": "http://fhir:8081/fhir",
//!     "resource_type": "InsurancePlan"
//!   }
//! }
//! ```

mod error;

pub use error::ConfigError;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
  /// Address the HTTP API binds to.
  pub listen_addr: String,
  /// Upper bound for every single adapter call.
  pub adapter_timeout_ms: u64,
  pub draft_store: DraftStoreConfig,
  pub workflow_engine: WorkflowEngineConfig,
  pub resource_registry: ResourceRegistryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftStoreConfig {
  /// sqlx connection URL. Defaults to `drafts.db` inside the data directory.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub database_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowEngineConfig {
  pub base_url: String,
  /// Key of the process definition started for each submission.
  pub process_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRegistryConfig {
  pub base_url: String,
  pub resource_type: String,
  /// Whether the server stamps `meta.versionId` and honours `If-Match`.
  pub version_ids: bool,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      listen_addr: "127.0.0.1:8080".to_string(),
      adapter_timeout_ms: 10_000,
      draft_store: DraftStoreConfig::default(),
      workflow_engine: WorkflowEngineConfig::default(),
      resource_registry: ResourceRegistryConfig::default(),
    }
  }
}

impl Default for WorkflowEngineConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080/engine-rest".to_string(),
      process_key: "benefit-plan-approval".to_string(),
    }
  }
}

impl Default for ResourceRegistryConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8081/fhir".to_string(),
      resource_type: "InsurancePlan".to_string(),
      version_ids: true,
    }
  }
}

impl CoordinatorConfig {
  /// Load a config file. A missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = match std::fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
      Err(source) => {
        return Err(ConfigError::Io {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  /// Check values that deserialize fine but cannot work.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.adapter_timeout_ms == 0 {
      return Err(ConfigError::Invalid {
        field: "adapter_timeout_ms",
        message: "must be greater than zero".to_string(),
      });
    }
    if self.workflow_engine.process_key.trim().is_empty() {
      return Err(ConfigError::Invalid {
        field: "workflow_engine.process_key",
        message: "must not be empty".to_string(),
      });
    }
    for (field, url) in [
      ("workflow_engine.base_url", &self.workflow_engine.base_url),
      ("resource_registry.base_url", &self.resource_registry.base_url),
    ] {
      if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Invalid {
          field,
          message: format!("'{}' is not an http(s) URL", url),
        });
      }
    }
    Ok(())
  }

  pub fn adapter_timeout(&self) -> Duration {
    Duration::from_millis(self.adapter_timeout_ms)
  }

  /// The draft database URL, falling back to `drafts.db` in `data_dir`.
  pub fn database_url(&self, data_dir: &Path) -> String {
    self.draft_store.database_url.clone().unwrap_or_else(|| {
      format!("sqlite://{}?mode=rwc", data_dir.join("drafts.db").display())
    })
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    file.write_all(content.as_bytes()).expect("failed to write config");
    file
  }

  #[test]
  fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoordinatorConfig::load(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, CoordinatorConfig::default());
  }

  #[test]
  fn test_partial_file_keeps_other_defaults() {
    let file = write_config(r#"{ "adapter_timeout_ms": 2500, "workflow_engine": { "process_key": "plan-review" } }"#);
    let config = CoordinatorConfig::load(file.path()).unwrap();

    assert_eq!(config.adapter_timeout(), Duration::from_millis(2500));
    assert_eq!(config.workflow_engine.process_key, "plan-review");
    assert_eq!(config.workflow_engine.base_url, "http://localhost:8080/engine-rest");
    assert_eq!(config.resource_registry.resource_type, "InsurancePlan");
  }

  #[test]
  fn test_registry_without_version_ids() {
    assert!(CoordinatorConfig::default().resource_registry.version_ids);

    let file = write_config(r#"{ "resource_registry": { "version_ids": false } }"#);
    let config = CoordinatorConfig::load(file.path()).unwrap();
    assert!(!config.resource_registry.version_ids);
    assert_eq!(config.resource_registry.base_url, "http://localhost:8081/fhir");
  }

  #[test]
  fn test_malformed_file_is_parse_error() {
    let file = write_config("{ not json");
    let err = CoordinatorConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn test_zero_timeout_is_invalid() {
    let file = write_config(r#"{ "adapter_timeout_ms": 0 }"#);
    let err = CoordinatorConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "adapter_timeout_ms", .. }));
  }

  #[test]
  fn test_database_url_defaults_to_data_dir() {
    let config = CoordinatorConfig::default();
    let url = config.database_url(Path::new("/tmp/ratify"));
    assert_eq!(url, "sqlite:///tmp/ratify/drafts.db?mode=rwc");
  }
}
