//! End-to-end: browse proxying, taxonomy lifecycle routes, admin gating, and session routes.

mod common;

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tdt::auth::{sign_token, Permission, SessionClaims};
use tdt::exec::SystemRunner;

use common::{listing, spawn_gateway, test_config, FixedLookup, RecordingRunner, TOKEN_SECRET};

/// Tool that echoes its CGI environment and tries to set a cookie.
#[cfg(unix)]
const ECHO_TOOL: &str = r#"#!/bin/sh
printf 'Content-Type: text/plain\n'
printf 'Set-Cookie: leaked=1\n'
printf 'X-Readonly: %s\n' "$RLTBL_READONLY"
printf 'X-User: %s\n' "$RLTBL_USER"
printf 'Status: 200 OK\n'
printf '\n'
printf '%s %s %s' "$REQUEST_METHOD" "$PATH_INFO" "$QUERY_STRING"
"#;

/// An initialized rltbl taxonomy whose tool is `script`.
#[cfg(unix)]
fn install_taxonomy(volume: &Path, name: &str, script: &str) {
    use std::os::unix::fs::PermissionsExt;
    let dir = volume.join(name);
    std::fs::create_dir_all(dir.join("bin")).unwrap();
    std::fs::create_dir_all(dir.join(".relatable")).unwrap();
    std::fs::write(dir.join(".relatable/relatable.db"), b"").unwrap();
    let tool = dir.join("bin/rltbl");
    std::fs::write(&tool, script).unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn token(name: &str, org: &str) -> String {
    sign_token(
        &SessionClaims {
            name: Some(name.to_string()),
            email: Some(format!("{}@example.com", name)),
            repo_org: Some(org.to_string()),
            ..Default::default()
        },
        TOKEN_SECRET,
    )
    .unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn anonymous_browse_is_proxied_read_only() {
    let volume = tempfile::tempdir().unwrap();
    install_taxonomy(volume.path(), "demo", ECHO_TOOL);
    let lookup = FixedLookup::new(Permission::Write, 200);
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        Arc::new(SystemRunner),
        lookup.clone(),
    )
    .await;

    let res = reqwest::get(format!("{}/browser/demo/table1", base))
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-readonly"], "TRUE");
    assert_eq!(res.headers()["x-user"], "visitor");
    assert_eq!(res.headers()["content-type"], "text/plain");
    assert!(res.headers().get("set-cookie").is_none());
    assert_eq!(res.text().await.unwrap(), "GET /table1 ");
    assert_eq!(lookup.calls(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn writer_posts_with_write_access() {
    let volume = tempfile::tempdir().unwrap();
    install_taxonomy(volume.path(), "demo", ECHO_TOOL);
    let lookup = FixedLookup::new(Permission::Write, 200);
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        Arc::new(SystemRunner),
        lookup.clone(),
    )
    .await;

    let client = reqwest::Client::new();
    let url = format!("{}/browser/demo/table1?token={}", base, token("alice", "org"));
    for _ in 0..2 {
        let res = client
            .post(&url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body("row=1")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["x-readonly"], "FALSE");
        assert_eq!(res.headers()["x-user"], "alice");
        assert!(res.text().await.unwrap().starts_with("POST /table1 token="));
    }
    assert_eq!(lookup.calls(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_tool_is_500_with_message() {
    let volume = tempfile::tempdir().unwrap();
    install_taxonomy(
        volume.path(),
        "demo",
        "#!/bin/sh\nprintf 'Content-Type: text/html\\n\\nok'\nexit 3\n",
    );
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        Arc::new(SystemRunner),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;

    let res = reqwest::get(format!("{}/browser/demo", base)).await.unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("exit status 3"));
}

#[cfg(unix)]
#[tokio::test]
async fn hanging_tool_is_504() {
    let volume = tempfile::tempdir().unwrap();
    install_taxonomy(volume.path(), "demo", "#!/bin/sh\nexec /bin/sleep 5\n");
    let mut config = test_config();
    config.taxonomies.tool_timeout_secs = 1;
    let base = spawn_gateway(
        config,
        volume.path(),
        Arc::new(SystemRunner),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;

    let started = std::time::Instant::now();
    let res = reqwest::get(format!("{}/browser/demo", base)).await.unwrap();
    assert_eq!(res.status(), 504);
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("did not finish within 1 seconds"));
}

#[tokio::test]
async fn browse_unknown_or_escaping_taxonomy() {
    let volume = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        runner.clone(),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;

    let res = reqwest::get(format!("{}/browser/ghost/table1", base))
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = reqwest::get(format!("{}/browser/a%2F..%2F..%2Fetc/passwd", base))
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().starts_with("Invalid repository name"));
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn bad_session_token_is_forbidden() {
    let volume = tempfile::tempdir().unwrap();
    std::fs::create_dir(volume.path().join("demo")).unwrap();
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        Arc::new(RecordingRunner::default()),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;
    let forged = sign_token(&SessionClaims::default(), "not-the-secret").unwrap();
    let res = reqwest::get(format!("{}/browser/demo/t?token={}", base, forged))
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
}

#[tokio::test]
async fn add_taxonomy_clones_once() {
    let volume = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        runner.clone(),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;
    let client = reqwest::Client::new();
    let payload = json!({"repo_url": "https://example.com/org/repo", "branch": "main"});

    let res = client
        .post(format!("{}/add_taxonomy", base))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Repository cloned and initialized successfully.");
    assert_eq!(
        runner.commands(),
        vec![
            "git clone https://example.com/org/repo.git repo",
            "git checkout main",
            "make init",
        ]
    );

    let res = client
        .post(format!("{}/add_taxonomy", base))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Taxonomy already initialized.");
    assert_eq!(runner.commands().len(), 3);
}

#[tokio::test]
async fn add_taxonomy_rejects_traversal_and_bad_bodies() {
    let volume = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        runner.clone(),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/add_taxonomy", base))
        .json(&json!({"repo_url": "https://example.com/org/..", "branch": "main"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let res = client
        .post(format!("{}/add_taxonomy", base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].is_string());

    assert!(runner.commands().is_empty());
    assert!(listing(volume.path()).is_empty());
}

#[tokio::test]
async fn init_taxonomy_forces_make_init() {
    let volume = tempfile::tempdir().unwrap();
    std::fs::create_dir(volume.path().join("demo")).unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        runner.clone(),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;
    let res = reqwest::get(format!("{}/init_taxonomy/demo", base))
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(runner.commands(), vec!["make init"]);
}

#[tokio::test]
async fn admin_routes_reject_wrong_secret_without_side_effects() {
    let volume = tempfile::tempdir().unwrap();
    std::fs::create_dir(volume.path().join("existing")).unwrap();
    std::fs::write(volume.path().join("existing/keep.txt"), b"x").unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        runner.clone(),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;
    let before = listing(volume.path());
    let client = reqwest::Client::new();

    let calls = [
        (
            "init_taxonomies",
            json!({"repositories": {"https://example.com/org/fresh.git": "main"}, "admin_secret": "wrong"}),
        ),
        (
            "reload_taxonomy",
            json!({"repository": "https://example.com/org/existing", "branch": "main", "admin_secret": "wrong"}),
        ),
        (
            "update_taxonomies",
            json!({"repositories": {"https://example.com/org/existing": "main"}, "tdt_version": "2.0.0"}),
        ),
    ];
    for (route, payload) in calls {
        let res = client
            .post(format!("{}/{}", base, route))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 403, "{route}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"], "Invalid admin secret.");
    }

    assert_eq!(listing(volume.path()), before);
    assert!(volume.path().join("existing/keep.txt").exists());
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn admin_init_and_reload_with_secret() {
    let volume = tempfile::tempdir().unwrap();
    std::fs::create_dir(volume.path().join("existing")).unwrap();
    std::fs::write(volume.path().join("existing/stale.txt"), b"x").unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        runner.clone(),
        FixedLookup::new(Permission::Read, 200),
    )
    .await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/init_taxonomies", base))
        .json(&json!({
            "repositories": {
                "https://example.com/org/existing.git": "main",
                "https://example.com/org/fresh.git": "cloud"
            },
            "admin_secret": common::ADMIN_SECRET
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(listing(volume.path()), vec!["existing", "fresh"]);
    assert_eq!(runner.commands().len(), 3);

    let res = client
        .post(format!("{}/reload_taxonomy", base))
        .json(&json!({
            "repository": "https://example.com/org/existing",
            "branch": "main",
            "admin_secret": common::ADMIN_SECRET
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(!volume.path().join("existing/stale.txt").exists());
    assert_eq!(runner.commands().len(), 6);

    let res = client
        .post(format!("{}/init_taxonomies", base))
        .json(&json!({"admin_secret": common::ADMIN_SECRET}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn session_info_and_check_permissions() {
    let volume = tempfile::tempdir().unwrap();
    let lookup = FixedLookup::new(Permission::Write, 200);
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        Arc::new(RecordingRunner::default()),
        lookup.clone(),
    )
    .await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/session_info/demo", base))
        .header("cookie", format!("tdtAuthToken={}", token("alice", "org")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"], "alice");
    assert_eq!(body["permission"], "write");
    assert_eq!(body["readonly"], false);

    let res = client
        .get(format!("{}/session_info/demo", base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"], "visitor");
    assert_eq!(body["permission"], "no_access");

    let res = client
        .get(format!("{}/check_permissions/org/demo/alice", base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["permission"], "write");
    assert_eq!(lookup.calls(), 1);
}

#[tokio::test]
async fn upstream_status_is_mirrored() {
    let volume = tempfile::tempdir().unwrap();
    let base = spawn_gateway(
        test_config(),
        volume.path(),
        Arc::new(RecordingRunner::default()),
        FixedLookup::new(Permission::NoAccess, 404),
    )
    .await;
    let res = reqwest::get(format!("{}/check_permissions/org/demo/mallory", base))
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["permission"], "no_access");
    assert_eq!(body["readonly"], true);
}
