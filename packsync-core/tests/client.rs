use packsync_core::{
    ApiErrorClass, GameEnvironment, PackSyncClient, PackSyncError, SESSION_HEADER, SyncRequest,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn environment() -> GameEnvironment {
    GameEnvironment {
        mc_version: "1.21.1".into(),
        loader_version: "4.0.0".into(),
        loader_api_version: "21.1.0".into(),
        dev: false,
        dedicated_server: false,
    }
}

#[tokio::test]
async fn fetch_version_reads_body_and_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/version/my-pack"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("v42\n")
                .insert_header("X-Pack-Sync-Session-ID", "sess-1")
                .insert_header("X-Pack-Sync-Pack-ID", "pack-9"),
        )
        .mount(&server)
        .await;

    let api = format!("{}/api", server.uri());
    let client = PackSyncClient::new(&api, "my-pack", Some("test-token")).unwrap();
    let info = client.fetch_version().await.unwrap();

    assert_eq!(info.version, "v42");
    assert_eq!(info.session_id.as_deref(), Some("sess-1"));
    assert_eq!(info.pack_id.as_deref(), Some("pack-9"));
}

#[tokio::test]
async fn fetch_version_without_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/version/pack"))
        .respond_with(ResponseTemplate::new(200).set_body_string("v1"))
        .mount(&server)
        .await;

    let client = PackSyncClient::new(&server.uri(), "pack", None).unwrap();
    let info = client.fetch_version().await.unwrap();

    assert_eq!(info.version, "v1");
    assert_eq!(info.session_id, None);
    assert_eq!(info.pack_id, None);
}

#[tokio::test]
async fn sync_posts_request_and_decodes_manifest() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync/pack"))
        .and(header(SESSION_HEADER, "sess-1"))
        .and(body_partial_json(json!({
            "pack_version": "v42",
            "mc_version": "1.21.1",
            "server": false,
            "supported_features": ["gzip", "session_id", "server_list"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "warnings": ["heads up"],
            "mods": [{
                "checksum": "900150983cd24fb0d6963f7d28e17f72",
                "filename": "jei.jar",
                "size": 3,
                "url": "https://cdn.example/jei.jar",
                "artifact": "jei",
                "version": "19.0"
            }],
            "extra_files": [{
                "checksum": "",
                "filename": "deleted",
                "size": 0,
                "url": "",
                "path": "config/old.toml"
            }],
            "server_list": [{"name": "S1", "ip": "1.2.3.4"}],
            "options": [{"key": "renderDistance", "value": 12, "force": true}]
        })))
        .mount(&server)
        .await;

    let mut client = PackSyncClient::new(&server.uri(), "pack", None).unwrap();
    client.set_session_id(Some("sess-1".into()));
    let manifest = client
        .sync(&SyncRequest::new("v42", &environment()))
        .await
        .unwrap();

    assert_eq!(manifest.warnings, vec!["heads up".to_string()]);
    let mods = manifest.mods.unwrap();
    assert_eq!(mods.len(), 1);
    assert_eq!(mods[0].info.artifact.to_string(), "jei:19.0");
    assert!(manifest.extra_files[0].is_deletion());
    assert_eq!(manifest.server_list.unwrap()[0].ip, "1.2.3.4");
    let options = manifest.options.unwrap();
    assert_eq!(options[0].value, "12");
    assert!(options[0].force);
    assert!(manifest.server_properties.is_none());
}

#[tokio::test]
async fn sync_reports_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync/pack"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&server)
        .await;

    let client = PackSyncClient::new(&server.uri(), "pack", Some("bad")).unwrap();
    let err = client
        .sync(&SyncRequest::new("v1", &environment()))
        .await
        .unwrap_err();

    match &err {
        PackSyncError::Api { status, body } => {
            assert_eq!(status.as_u16(), 403);
            assert_eq!(body, "denied");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn sync_rejects_malformed_manifest() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync/pack"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let client = PackSyncClient::new(&server.uri(), "pack", None).unwrap();
    let err = client
        .sync(&SyncRequest::new("v1", &environment()))
        .await
        .unwrap_err();

    assert!(matches!(err, PackSyncError::Decode(_)));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn exit_sends_session_header() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/exit"))
        .and(header(SESSION_HEADER, "sess-7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = PackSyncClient::new(&server.uri(), "pack", None).unwrap();
    client.set_session_id(Some("sess-7".into()));
    client.exit().await.unwrap();
}
