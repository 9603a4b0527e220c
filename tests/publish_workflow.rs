use mockito::{Matcher, Server};
use serde_json::{json, Value};
use storefront_publisher::api::ApiClient;
use storefront_publisher::descriptor::Submission;
use storefront_publisher::publish::Publisher;
use storefront_publisher::upload::UploadOptions;
use storefront_publisher::workspace::Workspace;
use tempfile::TempDir;

fn api(server: &Server) -> ApiClient {
    let mut api = ApiClient::new(&server.url(), None).unwrap();
    api.set_api_key("api-key");
    api
}

fn workspace() -> (TempDir, Workspace) {
    let dir = TempDir::new().unwrap();
    let ws = Workspace::new(dir.path());
    ws.ensure_layout().unwrap();
    (dir, ws)
}

fn upload_options(scratch: &TempDir) -> UploadOptions {
    UploadOptions {
        staging_dir: Some(scratch.path().to_path_buf()),
        ..UploadOptions::default()
    }
}

#[test]
fn save_creates_package_uploads_archive_and_updates_version() {
    let (dir, ws) = workspace();
    let scratch = TempDir::new().unwrap();
    let archive = dir.path().join("demo.unitypackage");
    std::fs::write(&archive, vec![1u8; 100]).unwrap();
    std::fs::write(
        ws.descriptor_path("demo"),
        serde_json::to_string_pretty(&json!({
            "category": "tools",
            "versionName": "1.0.0",
            "metadatas": {"en_US": {"name": "Demo Tool"}},
            "unitypackages": {"2021.3": {"source": archive, "slices": 2, "threads": 2}},
            "tags": "a, b",
            "notes": "kept as is"
        }))
        .unwrap(),
    )
    .unwrap();

    let mut server = Server::new();
    let create = server
        .mock("POST", "/store-publishing/package")
        .match_header("authorization", "Bearer api-key")
        .match_body(Matcher::Json(json!({"name": "Demo Tool", "category": "tools"})))
        .with_status(200)
        .with_body(r#"{"id": 77, "versions": [{"id": 5, "status": "draft"}]}"#)
        .create();
    let package = server
        .mock("GET", "/store-publishing/package/77")
        .with_status(200)
        .with_body(r#"{"id": 77, "versions": [{"id": 5, "status": "draft"}]}"#)
        .create();
    let version = server
        .mock("GET", "/store-publishing/package-version/5")
        .with_status(200)
        .with_body(r#"{"id": 5, "status": "draft", "artworks": [], "unitypackages": {}}"#)
        .create();
    let prepare = server
        .mock("POST", "/store-publishing/package-version/5/unitypackage/prepare")
        .match_body(Matcher::Json(json!({"unityVersion": "2021.3", "sizes": [50, 50]})))
        .with_status(204)
        .create();
    let slices = server
        .mock("POST", "/store-publishing/package-version/5/unitypackage")
        .with_status(200)
        .expect(2)
        .create();
    let update = server
        .mock("PUT", "/store-publishing/package-version/5")
        .match_body(Matcher::PartialJson(json!({
            "versionName": "1.0.0",
            "tags": ["a", "b"],
            "unitypackages": {"2021.3": {"srps": [], "dependencies": []}}
        })))
        .with_status(200)
        .with_body(r#"{"id": 5, "status": "draft"}"#)
        .create();

    let api = api(&server);
    let publisher = Publisher::new(&api, &ws, upload_options(&scratch));
    let desc = publisher.save_named("demo").unwrap();

    for m in [&create, &package, &version, &prepare, &slices, &update] {
        m.assert();
    }
    assert_eq!(desc.package_id, Some(json!(77)));
    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(ws.descriptor_path("demo")).unwrap()).unwrap();
    assert_eq!(written["packageId"], 77);
    assert_eq!(written["notes"], "kept as is");
    assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
}

#[test]
fn unchanged_archive_is_not_uploaded_again() {
    let (dir, ws) = workspace();
    let archive = dir.path().join("same.unitypackage");
    std::fs::write(&archive, vec![0u8; 64]).unwrap();
    std::fs::write(
        ws.descriptor_path("same"),
        json!({
            "packageId": 12,
            "unitypackages": {"2022.3": {"source": archive}}
        })
        .to_string(),
    )
    .unwrap();

    let mut server = Server::new();
    let _package = server
        .mock("GET", "/store-publishing/package/12")
        .with_status(200)
        .with_body(r#"{"id": 12, "versions": [{"id": 3, "status": "published"}]}"#)
        .create();
    let draft = server
        .mock("POST", "/store-publishing/package-version")
        .match_body(Matcher::Json(json!({"packageId": 12})))
        .with_status(200)
        .with_body(r#"{"id": 4, "status": "draft", "unitypackages": {"2022.3": {"size": "64"}}}"#)
        .create();
    let prepare = server
        .mock("POST", "/store-publishing/package-version/4/unitypackage/prepare")
        .expect(0)
        .create();
    let _update = server
        .mock("PUT", "/store-publishing/package-version/4")
        .with_status(200)
        .with_body(r#"{"id": 4, "status": "draft"}"#)
        .create();

    let api = api(&server);
    let scratch = TempDir::new().unwrap();
    Publisher::new(&api, &ws, upload_options(&scratch))
        .save_named("same")
        .unwrap();

    draft.assert();
    prepare.assert();
}

#[test]
fn failed_slice_fails_the_save_without_updating_metadata() {
    let (dir, ws) = workspace();
    let archive = dir.path().join("big.unitypackage");
    std::fs::write(&archive, vec![9u8; 300]).unwrap();
    std::fs::write(
        ws.descriptor_path("big"),
        json!({
            "packageId": 1,
            "unitypackages": {"2021.3": {"source": archive, "slices": 3, "alwaysUpload": true}}
        })
        .to_string(),
    )
    .unwrap();

    let mut server = Server::new();
    let _package = server
        .mock("GET", "/store-publishing/package/1")
        .with_status(200)
        .with_body(r#"{"id": 1, "versions": [{"id": 2, "status": "draft"}]}"#)
        .create();
    let _version = server
        .mock("GET", "/store-publishing/package-version/2")
        .with_status(200)
        .with_body(r#"{"id": 2, "status": "draft"}"#)
        .create();
    let _prepare = server
        .mock("POST", "/store-publishing/package-version/2/unitypackage/prepare")
        .with_status(200)
        .create();
    let slices = server
        .mock("POST", "/store-publishing/package-version/2/unitypackage")
        .with_status(500)
        .with_body(r#"{"message": "storage unavailable"}"#)
        .expect(3)
        .create();
    let update = server
        .mock("PUT", "/store-publishing/package-version/2")
        .expect(0)
        .create();

    let api = api(&server);
    let scratch = TempDir::new().unwrap();
    let err = Publisher::new(&api, &ws, upload_options(&scratch))
        .save_named("big")
        .unwrap_err();

    assert!(format!("{err:#}").contains("storage unavailable"));
    slices.assert();
    update.assert();
    assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
}

#[test]
fn submit_checks_the_resulting_status() {
    let (_dir, ws) = workspace();
    let mut server = Server::new();
    let submit = server
        .mock("POST", "/store-publishing/package-version/5/submit")
        .match_body(Matcher::Json(json!({
            "submitMessage": "ready",
            "autoPublish": false,
            "acceptLatestTerms": true
        })))
        .with_status(200)
        .create();
    let _status = server
        .mock("GET", "/store-publishing/package-version/5")
        .with_status(200)
        .with_body(r#"{"id": 5, "status": "submitted"}"#)
        .create();

    let api = api(&server);
    let scratch = TempDir::new().unwrap();
    let publisher = Publisher::new(&api, &ws, upload_options(&scratch));
    publisher
        .submit(
            "5",
            &Submission {
                submit_message: Some("ready".into()),
                auto_publish: Some(false),
                accept_latest_terms: Some(true),
            },
        )
        .unwrap();
    submit.assert();
}

#[test]
fn submit_fails_when_status_does_not_change() {
    let (_dir, ws) = workspace();
    let mut server = Server::new();
    let _submit = server
        .mock("POST", "/store-publishing/package-version/6/submit")
        .with_status(204)
        .create();
    let _status = server
        .mock("GET", "/store-publishing/package-version/6")
        .with_status(200)
        .with_body(r#"{"id": 6, "status": "draft"}"#)
        .create();

    let api = api(&server);
    let scratch = TempDir::new().unwrap();
    let err = Publisher::new(&api, &ws, upload_options(&scratch))
        .submit("6", &Submission::default())
        .unwrap_err();
    assert!(err.to_string().contains("draft"));
}

#[test]
fn save_all_keeps_going_after_a_broken_descriptor() {
    let (_dir, ws) = workspace();
    std::fs::write(ws.descriptor_path("broken"), "{ not json").unwrap();
    std::fs::write(ws.descriptor_path("good"), json!({"packageId": 8}).to_string()).unwrap();

    let mut server = Server::new();
    let _package = server
        .mock("GET", "/store-publishing/package/8")
        .with_status(200)
        .with_body(r#"{"id": 8, "versions": [{"id": 80, "status": "draft"}]}"#)
        .create();
    let _version = server
        .mock("GET", "/store-publishing/package-version/80")
        .with_status(200)
        .with_body(r#"{"id": 80, "status": "draft"}"#)
        .create();
    let update = server
        .mock("PUT", "/store-publishing/package-version/80")
        .with_status(200)
        .with_body(r#"{"id": 80, "status": "draft"}"#)
        .create();

    let api = api(&server);
    let scratch = TempDir::new().unwrap();
    let summary = Publisher::new(&api, &ws, upload_options(&scratch))
        .save_all()
        .unwrap();

    update.assert();
    assert_eq!(summary.saved, 1);
    assert_eq!(summary.failed, vec!["broken".to_string()]);

    let logs: Vec<_> = std::fs::read_dir(ws.logs_dir()).unwrap().collect();
    assert_eq!(logs.len(), 1);
    let log = std::fs::read_to_string(logs[0].as_ref().unwrap().path()).unwrap();
    assert!(log.contains("good (8)"));
    assert!(log.contains("broken:"));
    assert!(log.contains("Failed"));
}
