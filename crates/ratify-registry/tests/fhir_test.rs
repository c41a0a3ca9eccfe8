//! Tests for FhirResourceRegistry against a mock FHIR server.

use ratify_registry::{Error, FhirResourceRegistry, ResourceRegistry};
use ratify_types::Fingerprint;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry(server: &MockServer) -> FhirResourceRegistry {
  FhirResourceRegistry::new(reqwest::Client::new(), server.uri(), "InsurancePlan")
}

#[tokio::test]
async fn test_get_uses_version_id_as_fingerprint() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/InsurancePlan/plan-1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "resourceType": "InsurancePlan",
      "id": "plan-1",
      "meta": { "versionId": "3" },
      "name": "Gold PPO"
    })))
    .mount(&server)
    .await;

  let resource = registry(&server).get("plan-1").await.unwrap();
  assert_eq!(resource.fingerprint, Fingerprint::new("3"));
  assert_eq!(resource.content["name"], "Gold PPO");
}

#[tokio::test]
async fn test_gone_resource_is_not_found() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/InsurancePlan/plan-1"))
    .respond_with(ResponseTemplate::new(410))
    .mount(&server)
    .await;

  let registry = registry(&server);
  assert!(matches!(registry.get("plan-1").await, Err(Error::NotFound(_))));
  assert_eq!(registry.current_fingerprint("plan-1").await.unwrap(), None);
}

#[tokio::test]
async fn test_create_reads_revision_from_body() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/InsurancePlan"))
    .respond_with(ResponseTemplate::new(201).set_body_json(json!({
      "resourceType": "InsurancePlan",
      "id": "new-plan",
      "meta": { "versionId": "1" }
    })))
    .mount(&server)
    .await;

  let revision = registry(&server).create(&json!({ "name": "Bronze" })).await.unwrap();
  assert_eq!(revision.resource_id, "new-plan");
  assert_eq!(revision.fingerprint, Fingerprint::new("1"));
}

#[tokio::test]
async fn test_create_falls_back_to_location_header() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/InsurancePlan"))
    .respond_with(
      ResponseTemplate::new(201)
        .insert_header("Location", "http://fhir/InsurancePlan/loc-plan/_history/1"),
    )
    .mount(&server)
    .await;

  let revision = registry(&server).create(&json!({})).await.unwrap();
  assert_eq!(revision.resource_id, "loc-plan");
  assert_eq!(revision.fingerprint, Fingerprint::new("1"));
}

#[tokio::test]
async fn test_update_sends_if_match() {
  let server = MockServer::start().await;
  Mock::given(method("PUT"))
    .and(path("/InsurancePlan/plan-1"))
    .and(header("If-Match", "W/\"3\""))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "resourceType": "InsurancePlan",
      "id": "plan-1",
      "meta": { "versionId": "4" }
    })))
    .expect(1)
    .mount(&server)
    .await;

  let revision = registry(&server)
    .update("plan-1", &json!({ "name": "Gold" }), &Fingerprint::new("3"))
    .await
    .unwrap();
  assert_eq!(revision.fingerprint, Fingerprint::new("4"));
}

#[tokio::test]
async fn test_update_precondition_failed_is_mismatch() {
  let server = MockServer::start().await;
  Mock::given(method("PUT"))
    .and(path("/InsurancePlan/plan-1"))
    .respond_with(ResponseTemplate::new(412))
    .mount(&server)
    .await;

  let result = registry(&server)
    .update("plan-1", &json!({}), &Fingerprint::new("3"))
    .await;
  assert!(matches!(
    result,
    Err(Error::FingerprintMismatch { expected, .. }) if expected == Fingerprint::new("3")
  ));
}

#[tokio::test]
async fn test_server_error_is_unexpected_status() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/InsurancePlan/plan-1"))
    .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
    .mount(&server)
    .await;

  let result = registry(&server).get("plan-1").await;
  assert!(matches!(
    result,
    Err(Error::UnexpectedStatus { status: 500, body }) if body == "boom"
  ));
}

fn unversioned_plan(last_updated: &str) -> serde_json::Value {
  json!({
    "resourceType": "InsurancePlan",
    "id": "plan-1",
    "meta": { "lastUpdated": last_updated },
    "name": "Gold PPO"
  })
}

#[tokio::test]
async fn test_unversioned_update_rereads_then_puts_without_if_match() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/InsurancePlan/plan-1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(unversioned_plan("2026-01-01T00:00:00Z")))
    .mount(&server)
    .await;
  Mock::given(method("PUT"))
    .and(path("/InsurancePlan/plan-1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(unversioned_plan("2026-01-02T00:00:00Z")))
    .expect(1)
    .mount(&server)
    .await;

  let registry = registry(&server).without_version_ids();
  let base = registry.get("plan-1").await.unwrap().fingerprint;
  let revision = registry
    .update("plan-1", &json!({ "name": "Gold" }), &base)
    .await
    .unwrap();
  assert_ne!(revision.fingerprint, base);

  let requests = server.received_requests().await.unwrap();
  let put = requests
    .iter()
    .find(|r| r.method.as_str() == "PUT")
    .unwrap();
  assert!(put.headers.get("If-Match").is_none());
}

#[tokio::test]
async fn test_unversioned_update_refuses_stale_fingerprint() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/InsurancePlan/plan-1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(unversioned_plan("2026-03-01T09:30:00Z")))
    .mount(&server)
    .await;
  Mock::given(method("PUT"))
    .and(path("/InsurancePlan/plan-1"))
    .respond_with(ResponseTemplate::new(200))
    .expect(0)
    .mount(&server)
    .await;

  let stale = Fingerprint::new("2026-01-01T00:00:00.000000000Z");
  let result = registry(&server)
    .without_version_ids()
    .update("plan-1", &json!({}), &stale)
    .await;
  assert!(matches!(
    result,
    Err(Error::FingerprintMismatch { expected, .. }) if expected == stale
  ));
}
