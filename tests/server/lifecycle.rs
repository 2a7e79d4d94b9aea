use crate::support::{model_archive, runtime_yaml, zip_archive, TestServer, SLUG};
use mmis::storage::artifacts::RUNTIME_FILE;
use serde_json::json;

#[tokio::test]
async fn healthcheck_reports_up() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/healthcheck").await;
    assert_eq!(status, 200);
    assert_eq!(body["HealthStatus"], "UP");
    assert_eq!(body["status"], "succeeded");
}

#[tokio::test]
async fn load_installs_once_then_conflicts() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/loadmodel/m1").await;
    assert_eq!(status, 200);
    assert_eq!(body["operation"], "load");
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["model_id"], "m1");
    assert_eq!(body["model_name"], "m1-name");
    assert!(server.store.is_present("m1").await.unwrap());

    let (status, body) = server.get("/loadmodel/m1").await;
    assert_eq!(status, 409);
    assert_eq!(body["status"], "FAILED");
    assert_eq!(server.registry_len().await, 1);
    assert_eq!(server.catalog.fetches(), 1);
}

#[tokio::test]
async fn load_rejects_inactive_and_foreign_env_models() {
    let server = TestServer::start().await;

    let (status, _) = server.get("/loadmodel/retired").await;
    assert_eq!(status, 400);

    let (status, _) = server.get("/loadmodel/gpu-model").await;
    assert_eq!(status, 400);
    assert!(!server.store.is_present("gpu-model").await.unwrap());

    let (status, _) = server.get("/loadmodel/unknown").await;
    assert_eq!(status, 404);
    assert_eq!(server.registry_len().await, 0);
    assert_eq!(server.catalog.fetches(), 0);
}

#[tokio::test]
async fn upload_installs_archive_under_given_name() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post_bytes("/uploadmodel/u1?model_name=churn", model_archive(SLUG))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["model_name"], "churn");
    assert_eq!(
        server.store.registry().get("u1").await.unwrap().as_deref(),
        Some("churn")
    );

    let (status, _) = server.post_bytes("/uploadmodel/u1", model_archive(SLUG)).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn upload_without_entry_point_leaves_nothing_behind() {
    let server = TestServer::start().await;
    let runtime = runtime_yaml(SLUG);
    let archive = zip_archive(&[(RUNTIME_FILE, &runtime)]);

    let (status, body) = server.post_bytes("/uploadmodel/u2", archive).await;
    assert_eq!(status, 422);
    assert_eq!(body["operation"], "upload");
    assert!(!server.store.is_present("u2").await.unwrap());
    assert!(!server.store.model_dir("u2").unwrap().exists());
    assert_eq!(server.registry_len().await, 0);
}

#[tokio::test]
async fn upload_for_other_environment_is_rejected() {
    let server = TestServer::start().await;

    let (status, _) = server
        .post_bytes("/uploadmodel/u3", model_archive("pytorch_p38_gpu_v1"))
        .await;
    assert_eq!(status, 400);
    assert!(!server.store.model_dir("u3").unwrap().exists());
    assert_eq!(server.registry_len().await, 0);
}

#[tokio::test]
async fn upload_with_empty_body_is_rejected() {
    let server = TestServer::start().await;
    let (status, _) = server.post_bytes("/uploadmodel/u4", Vec::new()).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn score_runs_loaded_model_and_counts_invocations() {
    let server = TestServer::start().await;
    server.get("/loadmodel/m1").await;

    let (status, body) = server
        .post_json("/score?model_id=m1", &json!({ "rows": [1, 2, 3] }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["operation"], "score");
    assert_eq!(body["model_id"], "m1");
    assert_eq!(body["data"], json!({ "echo": { "rows": [1, 2, 3] } }));

    server.post_json("/score?model_id=m1", &json!({ "rows": [] })).await;

    let (status, info) = server.get("/serverinfo").await;
    assert_eq!(status, 200);
    assert_eq!(info["env_slug"], SLUG);
    assert_eq!(info["models"][0]["model_id"], "m1");
    assert_eq!(info["models"][0]["invocation_count"], 2);
    assert_eq!(info["models"][0]["reload_count"], 1);
}

#[tokio::test]
async fn score_rejects_bad_payloads() {
    let server = TestServer::start().await;
    server.get("/loadmodel/m1").await;

    let (status, _) = server.post_bytes("/score?model_id=m1", Vec::new()).await;
    assert_eq!(status, 400);

    let (status, _) = server.post_bytes("/score?model_id=m1", b"{not json".to_vec()).await;
    assert_eq!(status, 400);

    let (status, body) = server.post_json("/score?model_id=m1", &json!({ "fail": true })).await;
    assert_eq!(status, 422);
    assert_eq!(body["status"], "FAILED");
}

#[tokio::test]
async fn score_on_missing_model_is_rejected() {
    let server = TestServer::start().await;
    let (status, _) = server.post_json("/score?model_id=m2", &json!({ "x": 1 })).await;
    assert_eq!(status, 400);
    assert_eq!(server.catalog.fetches(), 0);
}

#[tokio::test]
async fn remove_deletes_artifacts_and_registry_entry() {
    let server = TestServer::start().await;

    let (status, _) = server.delete("/removemodel/m1").await;
    assert_eq!(status, 404);

    server.get("/loadmodel/m1").await;
    let (status, body) = server.delete("/removemodel/m1").await;
    assert_eq!(status, 200);
    assert_eq!(body["model_id"], "m1");
    assert!(!server.store.model_dir("m1").unwrap().exists());
    assert_eq!(server.registry_len().await, 0);

    let (_, info) = server.get("/serverinfo").await;
    assert_eq!(info["models"], json!([]));

    // a removed model can be loaded again
    let (status, _) = server.get("/loadmodel/m1").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn model_info_loads_on_demand() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/getmodelinfo/m2").await;
    assert_eq!(status, 200);
    assert_eq!(
        body["MODEL_DEPLOYMENT"]["INFERENCE_CONDA_ENV"]["INFERENCE_ENV_SLUG"],
        SLUG
    );
    assert!(server.store.is_present("m2").await.unwrap());

    // served from disk the second time
    server.get("/getmodelinfo/m2").await;
    assert_eq!(server.catalog.fetches(), 1);
}

#[tokio::test]
async fn list_models_returns_active_catalog_entries() {
    let server = TestServer::start().await;

    let (status, body) = server
        .get("/listmodels?compartment_id=c1&project_id=p1&no_of_models=2")
        .await;
    assert_eq!(status, 200);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["gpu-model", "m1"]);
}

#[tokio::test]
async fn registry_entry_with_artifacts_is_adopted() {
    let server = TestServer::start().await;
    server
        .store
        .extract_bytes("m1", model_archive(SLUG))
        .await
        .unwrap();
    server.store.registry().insert("m1", "installed-elsewhere").await.unwrap();

    let (status, _) = server.get("/loadmodel/m1").await;
    assert_eq!(status, 409);
    assert_eq!(server.catalog.fetches(), 0);

    let (_, info) = server.get("/serverinfo").await;
    assert_eq!(info["models"][0]["display_name"], "installed-elsewhere");
}

#[tokio::test]
async fn malformed_query_gets_failure_envelope() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/listmodels?project_id=p1").await;
    assert_eq!(status, 400);
    assert_eq!(body["operation"], "listmodels");
    assert_eq!(body["status"], "FAILED");
    assert!(body["err_detail"].as_str().unwrap().contains("compartment_id"));

    let (status, body) = server.post_json("/score", &json!({ "x": 1 })).await;
    assert_eq!(status, 400);
    assert_eq!(body["operation"], "score");

    let (_, info) = server.get("/serverinfo").await;
    assert_eq!(info["runtime_info"]["failed_requests"], 1);
}

#[tokio::test]
async fn reserved_model_ids_are_rejected() {
    let server = TestServer::start().await;

    for id in ["oss", "callback", "temp_m1"] {
        let (status, body) = server.get(&format!("/loadmodel/{id}")).await;
        assert_eq!(status, 400, "load {id}");
        assert_eq!(body["status"], "FAILED");
    }
    let (status, _) = server.delete("/removemodel/temp_m1").await;
    assert_eq!(status, 400);
    assert_eq!(server.catalog.fetches(), 0);
}
