use std::sync::Arc;

use crate::support::{model_archive, TestServer, SLUG};
use mmis::jobs::{HttpInferenceBackend, ScoringWorker};
use mmis::storage::object_store::ObjectStore;
use mmis::types::job::ObjectLocator;
use serde_json::{json, Value};

fn worker_for(server: &TestServer) -> ScoringWorker {
    ScoringWorker::new(
        server.jobs.clone(),
        server.objects.clone(),
        Arc::new(HttpInferenceBackend::new(reqwest::Client::new(), server.base.clone())),
    )
}

fn locator(bucket: &str, object: &str) -> ObjectLocator {
    ObjectLocator {
        namespace: "ns".to_string(),
        bucket_name: bucket.to_string(),
        object_name: object.to_string(),
    }
}

async fn stage_input(server: &TestServer, input: Value) {
    server
        .objects
        .put_object(&locator("in", "prompts.json"), serde_json::to_vec(&input).unwrap())
        .await
        .unwrap();
}

fn job_request(ll_model: &str, measure_model: &str) -> Value {
    json!({
        "ll_model": ll_model,
        "measure_model": measure_model,
        "input": { "namespace": "ns", "bucket_name": "in", "object_name": "prompts.json" },
        "output": { "namespace": "ns", "bucket_name": "out", "prefix": "results" },
    })
}

async fn upload(server: &TestServer, model_id: &str) {
    let (status, _) = server
        .post_bytes(&format!("/uploadmodel/{model_id}"), model_archive(SLUG))
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn job_runs_through_both_models() {
    let server = TestServer::start().await;
    upload(&server, "llm").await;
    upload(&server, "judge").await;
    stage_input(
        &server,
        json!({ "prompts": ["hello", "world"], "references": ["HELLO", "earth"] }),
    )
    .await;

    let (status, body) = server.post_json("/jobs", &job_request("llm", "judge")).await;
    assert_eq!(status, 202);
    assert_eq!(body["status"], "ACCEPTED");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, job) = server.get(&format!("/jobs/{job_id}")).await;
    assert_eq!(status, 200);
    assert_eq!(job["status"], "ACCEPTED");
    assert!(job["output_locator"].is_null());

    let finished = worker_for(&server).poll_once().await.unwrap().unwrap();
    assert_eq!(finished.job_id, job_id);

    let (_, job) = server.get(&format!("/jobs/{job_id}")).await;
    assert_eq!(job["status"], "COMPLETED");
    let object_name = format!("results/{job_id}.json");
    assert_eq!(job["output_locator"]["bucket_name"], "out");
    assert_eq!(job["output_locator"]["object_name"], object_name.as_str());

    let raw = server.objects.get_object(&locator("out", &object_name)).await.unwrap();
    let output: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(output["job_id"], job_id.as_str());
    assert_eq!(output["predictions"], json!(["HELLO", "WORLD"]));
    assert_eq!(output["scores"], json!([{ "f1": 1.0 }, { "f1": 0.0 }]));

    // both models were invoked through the score endpoint
    let (_, info) = server.get("/serverinfo").await;
    let calls: u64 = info["models"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["invocation_count"].as_u64().unwrap())
        .sum();
    assert_eq!(calls, 4);
}

#[tokio::test]
async fn job_with_unloaded_model_fails_and_stays_failed() {
    let server = TestServer::start().await;
    stage_input(&server, json!({ "prompts": ["hello"], "references": ["HELLO"] })).await;

    let (_, body) = server.post_json("/jobs", &job_request("not-loaded", "")).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let worker = worker_for(&server);
    worker.poll_once().await.unwrap();
    let (_, job) = server.get(&format!("/jobs/{job_id}")).await;
    assert_eq!(job["status"], "FAILED");
    assert!(job["error"].as_str().unwrap().contains("not-loaded"));

    // nothing left to claim; the terminal state does not move
    assert!(worker.poll_once().await.unwrap().is_none());
    let (_, job) = server.get(&format!("/jobs/{job_id}")).await;
    assert_eq!(job["status"], "FAILED");
}

#[tokio::test]
async fn job_without_models_is_rejected() {
    let server = TestServer::start().await;
    let (status, body) = server.post_json("/jobs", &job_request("", " ")).await;
    assert_eq!(status, 422);
    assert_eq!(body["operation"], "submit");
    assert!(worker_for(&server).poll_once().await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_job_answers_with_db_message() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/jobs/nope").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "db_msg": "Inference Job id: [nope] not found!" }));
}

#[tokio::test]
async fn malformed_submission_gets_failure_envelope() {
    let server = TestServer::start().await;

    let (status, body) = server.post_json("/jobs", &json!({ "ll_model": "m1" })).await;
    assert_eq!(status, 422);
    assert_eq!(body["operation"], "submit");
    assert_eq!(body["status"], "FAILED");
    assert!(body["err_detail"].as_str().unwrap().contains("input"));

    let resp = server
        .client
        .post(server.url("/jobs"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "FAILED");
    assert!(worker_for(&server).poll_once().await.unwrap().is_none());
}
