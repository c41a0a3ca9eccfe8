use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ratify_types::{Fingerprint, Resource};
use reqwest::header::{ACCEPT, CONTENT_TYPE, IF_MATCH, LOCATION};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::{Error, ResourceRegistry, Revision};

const FHIR_JSON: &str = "application/fhir+json";

/// Resource registry backed by a FHIR-style REST server.
///
/// Each resource lives at `{base_url}/{resource_type}/{id}`. The resource's
/// `meta.versionId` is used as its fingerprint and updates are made
/// conditional with `If-Match: W/"<versionId>"`.
///
/// Servers that do not version resources only expose `meta.lastUpdated`,
/// and an `If-Match` carrying that instant never matches. For those, build
/// the registry with [`without_version_ids`](Self::without_version_ids):
/// updates then re-read the resource and compare fingerprints before an
/// unconditional `PUT`. A write landing between that read and the `PUT` is
/// not detected in this mode.
pub struct FhirResourceRegistry {
  client: Client,
  base_url: String,
  resource_type: String,
  conditional_updates: bool,
}

impl FhirResourceRegistry {
  /// Create a registry client for one resource type, e.g. `InsurancePlan`.
  pub fn new(client: Client, base_url: impl Into<String>, resource_type: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
      resource_type: resource_type.into(),
      conditional_updates: true,
    }
  }

  /// Guard updates by re-reading the resource instead of `If-Match`.
  pub fn without_version_ids(mut self) -> Self {
    self.conditional_updates = false;
    self
  }

  fn collection_url(&self) -> String {
    format!("{}/{}", self.base_url, self.resource_type)
  }

  fn resource_url(&self, resource_id: &str) -> String {
    format!("{}/{}/{}", self.base_url, self.resource_type, resource_id)
  }

  /// Stamp the body with the resource type (and id, for updates).
  fn prepare_body(&self, content: &Value, resource_id: Option<&str>) -> Value {
    let mut body = content.clone();
    if let Value::Object(map) = &mut body {
      map.insert(
        "resourceType".to_string(),
        Value::String(self.resource_type.clone()),
      );
      if let Some(id) = resource_id {
        map.insert("id".to_string(), Value::String(id.to_string()));
      }
      // The server owns meta; sending a stale copy is at best ignored.
      map.remove("meta");
    }
    body
  }

  /// Read a write response into a revision.
  async fn revision_from(&self, response: Response) -> Result<Revision, Error> {
    let location = response
      .headers()
      .get(LOCATION)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string);

    let text = response.text().await?;
    let body: Value = if text.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&text).map_err(|e| Error::InvalidResponse {
        message: format!("invalid JSON body: {}", e),
      })?
    };

    let from_body = body
      .get("id")
      .and_then(Value::as_str)
      .map(str::to_string)
      .zip(version_id(&body));

    let (resource_id, fingerprint) = match from_body {
      Some(found) => found,
      None => location
        .as_deref()
        .and_then(parse_history_location)
        .ok_or_else(|| Error::InvalidResponse {
          message: "response carries neither a resource body nor a versioned Location".to_string(),
        })?,
    };

    Ok(Revision {
      resource_id,
      fingerprint,
    })
  }
}

/// Fingerprint of a FHIR resource body.
///
/// `meta.versionId` when the server versions resources, otherwise the
/// `meta.lastUpdated` instant. Instants are normalised to UTC so the same
/// moment written with different offsets compares equal; an instant that
/// does not parse is kept verbatim.
fn version_id(body: &Value) -> Option<Fingerprint> {
  if let Some(vid) = body.pointer("/meta/versionId").and_then(Value::as_str) {
    return Some(Fingerprint::new(vid));
  }

  let last_updated = body.pointer("/meta/lastUpdated").and_then(Value::as_str)?;
  Some(match DateTime::parse_from_rfc3339(last_updated) {
    Ok(instant) => Fingerprint::from_timestamp(instant.with_timezone(&Utc)),
    Err(_) => Fingerprint::new(last_updated),
  })
}

/// Parse `.../{type}/{id}/_history/{vid}` into (id, vid).
fn parse_history_location(location: &str) -> Option<(String, Fingerprint)> {
  let mut segments = location.trim_end_matches('/').rsplit('/');
  let vid = segments.next()?;
  if segments.next()? != "_history" {
    return None;
  }
  let id = segments.next()?;
  Some((id.to_string(), Fingerprint::new(vid)))
}

async fn unexpected(response: Response) -> Error {
  let status = response.status().as_u16();
  let body = response.text().await.unwrap_or_default();
  Error::UnexpectedStatus { status, body }
}

#[async_trait]
impl ResourceRegistry for FhirResourceRegistry {
  async fn get(&self, resource_id: &str) -> Result<Resource, Error> {
    let url = self.resource_url(resource_id);
    debug!(url = %url, "registry_get");

    let response = self.client.get(&url).header(ACCEPT, FHIR_JSON).send().await?;

    match response.status() {
      StatusCode::NOT_FOUND | StatusCode::GONE => Err(Error::NotFound(resource_id.to_string())),
      status if status.is_success() => {
        let content: Value = response.json().await?;
        let fingerprint = version_id(&content).ok_or_else(|| Error::InvalidResponse {
          message: format!("resource '{}' has no meta.versionId or meta.lastUpdated", resource_id),
        })?;
        Ok(Resource {
          resource_id: resource_id.to_string(),
          content,
          fingerprint,
        })
      }
      _ => Err(unexpected(response).await),
    }
  }

  async fn create(&self, content: &Value) -> Result<Revision, Error> {
    let url = self.collection_url();
    debug!(url = %url, "registry_create");

    let response = self
      .client
      .post(&url)
      .header(CONTENT_TYPE, FHIR_JSON)
      .header(ACCEPT, FHIR_JSON)
      .header("Prefer", "return=representation")
      .json(&self.prepare_body(content, None))
      .send()
      .await?;

    if !response.status().is_success() {
      return Err(unexpected(response).await);
    }

    self.revision_from(response).await
  }

  async fn update(
    &self,
    resource_id: &str,
    content: &Value,
    expected: &Fingerprint,
  ) -> Result<Revision, Error> {
    let url = self.resource_url(resource_id);
    debug!(url = %url, expected = %expected, "registry_update");

    let mut request = self
      .client
      .put(&url)
      .header(CONTENT_TYPE, FHIR_JSON)
      .header(ACCEPT, FHIR_JSON)
      .header("Prefer", "return=representation");

    if self.conditional_updates {
      request = request.header(IF_MATCH, format!("W/\"{}\"", expected));
    } else {
      let current = self.get(resource_id).await?;
      if current.fingerprint != *expected {
        return Err(Error::FingerprintMismatch {
          resource_id: resource_id.to_string(),
          expected: expected.clone(),
        });
      }
    }

    let response = request
      .json(&self.prepare_body(content, Some(resource_id)))
      .send()
      .await?;

    match response.status() {
      StatusCode::NOT_FOUND | StatusCode::GONE => Err(Error::NotFound(resource_id.to_string())),
      StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Err(Error::FingerprintMismatch {
        resource_id: resource_id.to_string(),
        expected: expected.clone(),
      }),
      status if status.is_success() => self.revision_from(response).await,
      _ => Err(unexpected(response).await),
    }
  }
}
