use std::sync::Arc;
use std::time::Duration;

use crate::support::{model_archive, TestServer, API_SECRET, SLUG};
use mmis::storage::object_store::ObjectStore;
use mmis::transfer::{AgentOutcome, HttpServerLink, TransferAgent};
use mmis::types::job::ObjectLocator;
use serde_json::{json, Value};
use tokio::sync::watch;

fn agent_for(server: &TestServer, api_secret: &str) -> TransferAgent {
    let link = HttpServerLink::new(reqwest::Client::new(), server.base.clone(), api_secret);
    TransferAgent::new(server.store.clone(), server.objects.clone(), Arc::new(link))
        .with_intervals(Duration::from_millis(20), Duration::from_millis(20))
}

async fn registered_agent(server: &TestServer) -> TransferAgent {
    let agent = agent_for(server, API_SECRET);
    let (_tx, mut rx) = watch::channel(false);
    assert!(agent.register(&mut rx).await);
    agent
}

async fn stage_archive(server: &TestServer, object: &str, archive: Vec<u8>) {
    let locator = ObjectLocator {
        namespace: "ns".to_string(),
        bucket_name: "models".to_string(),
        object_name: object.to_string(),
    };
    server.objects.put_object(&locator, archive).await.unwrap();
}

fn upload_request(model_id: &str, artifact: &str) -> Value {
    json!({
        "model_id": model_id,
        "model_name": format!("{model_id}-display"),
        "namespace": "ns",
        "bucket_name": "models",
        "artifact_name": artifact,
    })
}

#[tokio::test]
async fn object_store_upload_requires_registered_sidecar() {
    let server = TestServer::start().await;
    let (status, body) = server
        .post_json("/uploadmodel/oss", &upload_request("t1", "t1.zip"))
        .await;
    assert_eq!(status, 503);
    assert_eq!(body["status"], "FAILED");
}

#[tokio::test]
async fn sidecar_registration_checks_api_secret() {
    let server = TestServer::start().await;

    let (status, _) = server.post_json("/registersc?api_secret=wrong&sidecar_id=s1", &json!({})).await;
    assert_eq!(status, 401);

    let (status, body) = server
        .post_json(&format!("/registersc?api_secret={API_SECRET}&sidecar_id=s1"), &json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "succeeded");
}

#[tokio::test]
async fn sidecar_installs_model_and_reports_back() {
    let server = TestServer::start().await;
    let agent = registered_agent(&server).await;
    stage_archive(&server, "artifacts/t1.zip", model_archive(SLUG)).await;

    let (status, body) = server
        .post_json("/uploadmodel/oss", &upload_request("t1", "artifacts/t1.zip"))
        .await;
    assert_eq!(status, 202);
    assert_eq!(body["status"], "ACCEPTED");
    assert_eq!(body["model_id"], "t1");

    // a second request for the same model waits on the first
    let (status, _) = server
        .post_json("/uploadmodel/oss", &upload_request("t1", "artifacts/t1.zip"))
        .await;
    assert_eq!(status, 409);

    let outcome = agent.process_next().await.unwrap();
    assert_eq!(outcome, AgentOutcome::Installed("t1".to_string()));
    assert!(!server.store.models_dir().join("temp_t1").exists());
    assert_eq!(
        server.store.registry().get("t1").await.unwrap().as_deref(),
        Some("t1-display")
    );

    let (status, body) = server.post_json("/score?model_id=t1", &json!({ "x": 1 })).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["echo"]["x"], 1);

    assert_eq!(agent.process_next().await.unwrap(), AgentOutcome::Idle);
}

#[tokio::test]
async fn forged_callback_is_rejected_without_side_effects() {
    let server = TestServer::start().await;
    let _agent = registered_agent(&server).await;
    stage_archive(&server, "t1.zip", model_archive(SLUG)).await;
    server.post_json("/uploadmodel/oss", &upload_request("t1", "t1.zip")).await;

    let (status, body) = server
        .post_json(
            "/uploadmodel/callback?model_id=t1&model_name=evil&status=COMPLETED&secret=guess",
            &json!({}),
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["operation"], "callback");
    assert_eq!(server.registry_len().await, 0);
    assert!(server.store.models_dir().join("temp_t1").exists());
}

#[tokio::test]
async fn sidecar_discards_request_when_model_already_present() {
    let server = TestServer::start().await;
    let agent = registered_agent(&server).await;
    stage_archive(&server, "t2.zip", model_archive(SLUG)).await;
    server.post_json("/uploadmodel/oss", &upload_request("t2", "t2.zip")).await;

    // installed by a concurrent load before the sidecar got to it
    server.store.extract_bytes("t2", model_archive(SLUG)).await.unwrap();

    let outcome = agent.process_next().await.unwrap();
    assert_eq!(outcome, AgentOutcome::Discarded("t2".to_string()));
    assert!(!server.store.models_dir().join("temp_t2").exists());
    assert_eq!(server.registry_len().await, 0);
}

#[tokio::test]
async fn failed_transfer_cleans_up_and_allows_retry() {
    let server = TestServer::start().await;
    let agent = registered_agent(&server).await;

    // artifact was never staged
    let (status, _) = server
        .post_json("/uploadmodel/oss", &upload_request("t3", "missing.zip"))
        .await;
    assert_eq!(status, 202);

    let outcome = agent.process_next().await.unwrap();
    assert!(matches!(outcome, AgentOutcome::Failed { ref model_id, .. } if model_id == "t3"));
    assert!(!server.store.models_dir().join("temp_t3").exists());
    assert!(!server.store.model_dir("t3").unwrap().exists());
    assert_eq!(server.registry_len().await, 0);

    stage_archive(&server, "t3.zip", model_archive(SLUG)).await;
    let (status, _) = server.post_json("/uploadmodel/oss", &upload_request("t3", "t3.zip")).await;
    assert_eq!(status, 202);
    assert_eq!(
        agent.process_next().await.unwrap(),
        AgentOutcome::Installed("t3".to_string())
    );
}

#[tokio::test]
async fn sidecar_rejects_archive_for_other_environment() {
    let server = TestServer::start().await;
    let agent = registered_agent(&server).await;
    stage_archive(&server, "gpu.zip", model_archive("pytorch_p38_gpu_v1")).await;
    server.post_json("/uploadmodel/oss", &upload_request("t4", "gpu.zip")).await;

    let outcome = agent.process_next().await.unwrap();
    assert!(matches!(outcome, AgentOutcome::Failed { .. }));
    assert!(!server.store.model_dir("t4").unwrap().exists());
    assert_eq!(server.registry_len().await, 0);
}

#[tokio::test]
async fn requests_for_another_sidecar_are_ignored() {
    let server = TestServer::start().await;
    let first = registered_agent(&server).await;
    stage_archive(&server, "t5.zip", model_archive(SLUG)).await;
    server.post_json("/uploadmodel/oss", &upload_request("t5", "t5.zip")).await;

    // a newer sidecar replaces the first registration
    let second = registered_agent(&server).await;
    assert_eq!(second.process_next().await.unwrap(), AgentOutcome::Idle);
    assert_eq!(
        first.process_next().await.unwrap(),
        AgentOutcome::Installed("t5".to_string())
    );
}

#[tokio::test]
async fn agent_run_stops_on_shutdown() {
    let server = TestServer::start().await;
    let agent = agent_for(&server, API_SECRET);
    stage_archive(&server, "t6.zip", model_archive(SLUG)).await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { agent.run(rx).await });

    // wait for the registration to land before queueing work
    let mut accepted = false;
    for _ in 0..100 {
        let (status, _) = server.post_json("/uploadmodel/oss", &upload_request("t6", "t6.zip")).await;
        if status == 202 {
            accepted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(accepted);

    for _ in 0..100 {
        if server.store.registry().contains("t6").await.unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(server.store.registry().contains("t6").await.unwrap());

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn malformed_transfer_requests_get_failure_envelope() {
    let server = TestServer::start().await;
    let _agent = registered_agent(&server).await;

    let (status, body) = server
        .post_json("/uploadmodel/oss", &json!({ "model_id": "t7", "model_name": "x" }))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["operation"], "upload");
    assert_eq!(body["status"], "FAILED");

    let (status, body) = server
        .post_json("/uploadmodel/callback?model_id=t7&status=DONE&secret=s", &json!({}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["operation"], "callback");

    let (status, body) = server.post_json("/registersc?sidecar_id=s1", &json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["operation"], "registersc");
    assert!(!server.store.models_dir().join("temp_t7").exists());
}
