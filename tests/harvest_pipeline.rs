//! End-to-end pipeline tests over a mocked HTTP catalog.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mocap_dl::{
    ApiConfig, Config, Harvester, HarvestConfig, HttpMocapClient, JsonCatalogCache,
    JsonStateStore, MocapApi, RetryConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn test_config(server: &MockServer, tmp: &tempfile::TempDir) -> Config {
    let token_file = tmp.path().join("mixamo_token.txt");
    std::fs::write(&token_file, format!("{TOKEN}\n")).unwrap();
    Config {
        api: ApiConfig {
            base_url: server.uri(),
            token_file,
            ..ApiConfig::default()
        },
        harvest: HarvestConfig {
            output_dir: tmp.path().join("animations"),
            failure_dir: tmp.path().join("failed_logs"),
            state_file: tmp.path().join("state.json"),
            character_cache: tmp.path().join("characters.json"),
            poll_interval: Duration::from_millis(10),
            ..HarvestConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

fn harvester(config: &Config) -> Harvester {
    let api = HttpMocapClient::new(&config.api, config.harvest.page_size).unwrap();
    Harvester::with_parts(
        config.clone(),
        Arc::new(api),
        Arc::new(JsonStateStore::new(&config.harvest.state_file)),
        Arc::new(JsonCatalogCache::new(&config.harvest.character_cache)),
    )
}

/// One character page (short, ends pagination) with required auth headers.
async fn mount_character_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("type", "Character"))
        .and(header("X-Api-Key", "mixamo2"))
        .and(header("Authorization", format!("Bearer {TOKEN}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "C1", "name": "X Bot", "type": "Character"}],
        })))
        .mount(server)
        .await;
}

/// Page 1 carries the listings, page 2 is empty and ends pagination.
async fn mount_animation_pages(server: &MockServer, listings: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("type", "Motion,MotionPack"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": listings })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("type", "Motion,MotionPack"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn harvests_a_motion_end_to_end() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    mount_character_page(&server).await;
    mount_animation_pages(
        &server,
        json!([
            {"id": "a1", "name": "Walk", "motion_id": "m1", "type": "Motion"},
            {"id": "a2", "name": "Locomotion Pack", "motion_id": "p1", "type": "MotionPack"},
        ]),
    )
    .await;

    // Detail fetch for the Motion only; the MotionPack must never be fetched.
    Mock::given(method("GET"))
        .and(path("/products/a1"))
        .and(query_param("similar", "0"))
        .and(query_param("character_id", "C1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "details": {"gms_hash": {"model-id": 7, "params": [["Posture", 1.0], ["Step", 0.5]]}},
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Export submission carries the comma-joined params and fixed preferences.
    Mock::given(method("POST"))
        .and(path("/animations/export"))
        .and(wiremock::matchers::body_partial_json(json!({
            "character_id": "C1",
            "product_name": "Walk",
            "type": "Motion",
            "gms_hash": [{"params": "1.0,0.5", "model-id": 7}],
            "preferences": {"format": "fbx7", "fps": "60"},
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // First poll sees the job in progress, the second sees it done.
    Mock::given(method("GET"))
        .and(path("/characters/C1/monitor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "processing",
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/characters/C1/monitor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "job_result": format!("{}/artifacts/walk.fbx", server.uri()),
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/artifacts/walk.fbx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fbx-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server, &tmp);
    let summary = harvester(&config).run().await.unwrap();

    assert_eq!(summary.characters, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped, 1); // the motion pack
    assert_eq!(summary.failed, 0);

    let artifact = tmp
        .path()
        .join("animations")
        .join("X Bot_C1")
        .join("Walk_m1_C1.fbx");
    assert_eq!(std::fs::read(&artifact).unwrap(), b"fbx-bytes");

    // The snapshot records the completed filename under the character id.
    let snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("state.json")).unwrap())
            .unwrap();
    assert_eq!(snapshot["C1"], json!(["Walk_m1_C1.fbx"]));

    // The character catalog got cached for the next run.
    assert!(tmp.path().join("characters.json").exists());
}

#[tokio::test]
async fn resumes_from_output_tree_without_touching_export_endpoints() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    mount_character_page(&server).await;
    mount_animation_pages(
        &server,
        json!([{"id": "a1", "name": "Walk", "motion_id": "m1", "type": "Motion"}]),
    )
    .await;
    // A previous interrupted run left the artifact but no snapshot.
    let character_dir = tmp.path().join("animations").join("X Bot_C1");
    std::fs::create_dir_all(&character_dir).unwrap();
    std::fs::write(character_dir.join("Walk_m1_C1.fbx"), b"fbx-bytes").unwrap();

    Mock::given(method("POST"))
        .and(path("/animations/export"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&server, &tmp);
    let summary = harvester(&config).run().await.unwrap();

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    // Reconstruction persisted a fresh snapshot from the directory scan.
    let snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("state.json")).unwrap())
            .unwrap();
    assert_eq!(snapshot["C1"], json!(["Walk_m1_C1.fbx"]));
}

#[tokio::test]
async fn transient_listing_failure_is_retried() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    mount_character_page(&server).await;
    // First animation-page request fails with a retryable status, the
    // retried request succeeds with an empty catalog.
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("type", "Motion,MotionPack"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("type", "Motion,MotionPack"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;

    let config = test_config(&server, &tmp);
    let summary = harvester(&config).run().await.unwrap();

    assert_eq!(summary.characters, 1);
    assert_eq!(summary.completed + summary.skipped + summary.failed, 0);
}

#[tokio::test]
async fn remote_job_failure_leaves_a_record_and_spares_siblings() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    mount_character_page(&server).await;
    mount_animation_pages(
        &server,
        json!([{"id": "a1", "name": "Bad/Take", "motion_id": "m9", "type": "Motion"}]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/products/a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "details": {"gms_hash": {"model-id": 7, "params": []}},
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/animations/export"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/characters/C1/monitor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "message": "retarget error",
        })))
        .mount(&server)
        .await;

    let config = test_config(&server, &tmp);
    let summary = harvester(&config).run().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 0);

    // Sanitized record name, original listing plus error text inside.
    let record_path = tmp.path().join("failed_logs").join("C1_Bad-Take_m9.json");
    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&record_path).unwrap()).unwrap();
    assert_eq!(record["character_id"], "C1");
    assert_eq!(record["name"], "Bad/Take");
    assert!(record["error"]
        .as_str()
        .unwrap()
        .contains("retarget error"));
}

#[tokio::test]
async fn missing_token_file_fails_before_any_request() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        api: ApiConfig {
            token_file: tmp.path().join("no-such-token.txt"),
            ..ApiConfig::default()
        },
        ..Config::default()
    };

    let err = Harvester::new(config).unwrap_err();
    assert!(matches!(err, mocap_dl::Error::MissingCredential(_)));
}

#[tokio::test]
async fn client_surfaces_http_errors_with_status_and_url() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let config = test_config(&server, &tmp);
    let client = HttpMocapClient::new(&config.api, config.harvest.page_size).unwrap();

    let err = client.list_characters(1).await.unwrap_err();
    match err {
        mocap_dl::Error::Http { status, url } => {
            assert_eq!(status, 401);
            assert!(url.contains("/products"));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}
