
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use agency_supervisor::agency::{Agency, InMemoryAgency};
use agency_supervisor::config::SupervisionConfig;
use agency_supervisor::dashboard::{router, DashboardState};
use agency_supervisor::supervision::Supervisor;
use test_harness::*;

fn create_test_app(agency: &Arc<InMemoryAgency>) -> Router {
    router(DashboardState {
        agency: agency.clone(),
        prefix: PREFIX.to_string(),
    })
}

fn cluster() -> Arc<InMemoryAgency> {
    ClusterBuilder::new()
        .server("A", "BAD")
        .server("B", "GOOD")
        .server("C", "GOOD")
        .collection("db", "c", 2, &[("s1", &["A", "B"])])
        .build()
}

fn tick(agency: &Arc<InMemoryAgency>) {
    let shared: Arc<dyn Agency> = agency.clone();
    Supervisor::new(shared, SupervisionConfig::new(PREFIX))
        .with_rng(rng())
        .tick()
        .unwrap();
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_list_jobs_empty() {
    let agency = cluster();
    let (status, json) = send(create_test_app(&agency), get("/api/jobs")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_list_jobs_shows_age_and_state() {
    let agency = cluster();
    tick(&agency);

    let (status, json) = send(create_test_app(&agency), get("/api/jobs")).await;
    assert_eq!(status, StatusCode::OK);

    let jobs = json.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job["status"] == "Pending"));
    assert!(jobs.iter().all(|job| job["age_secs"].as_i64().unwrap() >= 0));

    let parent = jobs.iter().find(|job| job["job_type"] == "failedServer").unwrap();
    assert_eq!(parent["server"], "A");
    let child = jobs.iter().find(|job| job["job_type"] == "failedLeader").unwrap();
    assert_eq!(child["shard"], "s1");
}

#[tokio::test]
async fn test_servers_endpoint() {
    let agency = cluster();
    tick(&agency);

    let (status, json) = send(create_test_app(&agency), get("/api/servers")).await;
    assert_eq!(status, StatusCode::OK);

    let servers = json["servers"].as_array().unwrap();
    assert_eq!(servers.len(), 3);
    assert_eq!(servers[0]["server"], "A");
    assert_eq!(servers[0]["health"], "BAD");
    assert_eq!(servers[0]["failed"], true);
    assert!(servers[0]["blocked_by"].is_string());
    assert_eq!(servers[1]["failed"], false);
    assert_eq!(json["blocked_shards"][0]["shard"], "s1");
}

#[tokio::test]
async fn test_agency_endpoint_returns_tree() {
    let agency = cluster();
    let (status, json) = send(create_test_app(&agency), get("/api/agency")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["Supervision"]["Health"]["A"]["Status"], "BAD");
    assert_eq!(json["Plan"]["Collections"]["db"]["c"]["shards"]["s1"], json!(["A", "B"]));
}

#[tokio::test]
async fn test_agency_write_applies_batch() {
    let agency = cluster();
    let batch = json!([
        [{"/arango/Supervision/Health/B/Status": "BAD"}, {"/arango/Supervision/Health/B/Status": {"old": "GOOD"}}],
        [{"/arango/Target/FailedServers/B": []}]
    ]);

    let (status, json) = send(create_test_app(&agency), post_json("/_api/agency/write", batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["accepted"], true);
    assert_eq!(json["indices"], json!([1, 2]));

    let snap = snapshot(&agency);
    assert_eq!(snap.get_str("/Supervision/Health/B/Status").unwrap(), "BAD");
    assert!(snap.exists("/Target/FailedServers/B"));
}

#[tokio::test]
async fn test_agency_write_reports_rejection() {
    let agency = cluster();
    let batch = json!([
        [{"/arango/Target/BlockedServers/B": {"jobId": "1"}}, {"/arango/Target/BlockedServers/B": {"oldEmpty": true}}],
        [{"/arango/Target/BlockedServers/B": {"jobId": "2"}}, {"/arango/Target/BlockedServers/B": {"oldEmpty": true}}]
    ]);

    let (status, json) = send(create_test_app(&agency), post_json("/_api/agency/write", batch)).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(json["accepted"], false);
    assert_eq!(json["indices"], json!([1, 0]));
    assert_eq!(
        snapshot(&agency).get_str("/Target/BlockedServers/B/jobId").unwrap(),
        "1"
    );
}

#[tokio::test]
async fn test_agency_write_rejects_malformed_body() {
    let agency = cluster();
    let (status, json) = send(
        create_test_app(&agency),
        post_json("/_api/agency/write", json!({"not": "a batch"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, _) = send(
        create_test_app(&agency),
        post_json("/_api/agency/write", json!([[{"/x": {"op": "increment"}}]])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(agency.log_len().unwrap(), 0);
}

#[tokio::test]
async fn test_abort_endpoint() {
    let agency = cluster();
    tick(&agency);
    let job_id = jobs_of_type(&agency, "failedServer")[0].1.clone();

    let uri = format!("/api/jobs/{}/abort", job_id);
    let (status, json) = send(create_test_app(&agency), post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["aborted"], true);
    assert!(snapshot(&agency).child_keys("/Target/BlockedServers").is_empty());

    let (status, json) = send(create_test_app(&agency), post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["aborted"], false);
}
