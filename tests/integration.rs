use sds_indexer::config::Config;
use sds_indexer::indexer::Indexer;
use sds_indexer::{migrate, server};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sds_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sds");
    path
}

const DEPENDENCIES: &str = r#"
[[dependency]]
primary_instrument = "swe"
primary_data_level = "l1b"
primary_descriptor = "sci"
dependent_instrument = "hi-45"
dependent_data_level = "l1c"
dependent_descriptor = "sci"
relationship = "SOFT"
direction = "DOWNSTREAM"

[[dependency]]
primary_instrument = "swe"
primary_data_level = "l1b"
primary_descriptor = "sci"
dependent_instrument = "lo"
dependent_data_level = "l1c"
dependent_descriptor = "sci"
relationship = "SOFT"
direction = "DOWNSTREAM"

[[dependency]]
primary_instrument = "swapi"
primary_data_level = "l2"
primary_descriptor = "sci-1m"
dependent_instrument = "swapi"
dependent_data_level = "l1"
dependent_descriptor = "hk"
relationship = "HARD"
direction = "UPSTREAM"
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("dependencies.toml"), DEPENDENCIES).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/sds.sqlite"

[server]
bind = "127.0.0.1:7341"

[ingest]
mission = "imap"
arrival_levels = ["l0"]
dependencies = "{root}/config/dependencies.toml"

[events]
publisher = "log"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("sds.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sds(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sds_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sds binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn write_event(dir: &Path, name: &str, event: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(event).unwrap()).unwrap();
    path
}

#[test]
fn test_init_creates_database_and_loads_dependencies() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sds(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(stdout.contains("loaded 3 dependency edges"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sds(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (stdout, _, success2) = run_sds(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
    assert!(stdout.contains("loaded 3 dependency edges"));
}

#[test]
fn test_deps_show_preserves_order() {
    let (_tmp, config_path) = setup_test_env();
    run_sds(&config_path, &["init"]);

    let (stdout, stderr, success) = run_sds(
        &config_path,
        &["deps", "show", "swe", "l1b", "sci", "--direction", "DOWNSTREAM", "--relationship", "SOFT"],
    );
    assert!(success, "deps show failed: {}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("-> hi-45 l1c sci"));
    assert!(lines[1].contains("-> lo l1c sci"));

    let (stdout, _, success) = run_sds(
        &config_path,
        &["deps", "show", "swe", "l1b", "sci", "--relationship", "HARD"],
    );
    assert!(success);
    assert!(stdout.contains("No dependencies."));
}

#[test]
fn test_handle_and_query_roundtrip() {
    let (tmp, config_path) = setup_test_env();
    run_sds(&config_path, &["init"]);

    let key = "imap/hit/l0/2024/01/imap_hit_l0_sci-test_20240101_20240104_v02-01.pkts";
    let event = write_event(
        tmp.path(),
        "s3.json",
        &json!({
            "detail-type": "Object Created",
            "source": "aws.s3",
            "time": "2024-01-16T17:35:08Z",
            "detail": {"bucket": {"name": "sds-data"}, "object": {"key": key, "reason": "PutObject"}}
        }),
    );

    let (stdout, stderr, success) = run_sds(&config_path, &["handle", event.to_str().unwrap()]);
    assert!(success, "handle failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains(r#""statusCode":200"#));

    let (stdout, _, success) = run_sds(&config_path, &["query", "--filter", "instrument=hit"]);
    assert!(success);
    let rows: Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["file_path"], key);
    assert_eq!(rows[0]["start_date"], "2024-01-01T00:00:00");

    let (stdout, _, success) = run_sds(&config_path, &["query", "--filter", "size=500"]);
    assert!(!success);
    assert!(stdout.contains("size is not a valid query parameter"));
}

#[test]
fn test_handle_rejected_event_exits_nonzero() {
    let (tmp, config_path) = setup_test_env();
    run_sds(&config_path, &["init"]);

    let event = write_event(tmp.path(), "unknown.json", &json!({"source": "test"}));
    let (stdout, _, success) = run_sds(&config_path, &["handle", event.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("Unknown event source"));
}

#[test]
fn test_status_command() {
    let (tmp, config_path) = setup_test_env();
    run_sds(&config_path, &["init"]);

    let path = "imap/swapi/l1/2023/01/imap_swapi_l1_sci-1m_20230724_20230724_v02-01.cdf";
    let event = write_event(
        tmp.path(),
        "start.json",
        &json!({
            "detail-type": "Job Started",
            "source": "imap.lambda",
            "detail": {"file_path_to_create": path, "status": "INPROGRESS"}
        }),
    );
    let (_, _, success) = run_sds(&config_path, &["handle", event.to_str().unwrap()]);
    assert!(success);

    let (stdout, _, success) = run_sds(&config_path, &["status", path]);
    assert!(success);
    assert!(stdout.contains("INPROGRESS"));

    let (_, stderr, success) = run_sds(&config_path, &["status", "missing/path.cdf"]);
    assert!(!success);
    assert!(stderr.contains("no status tracked"));
}

// ─── HTTP ───────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

#[tokio::test]
async fn test_http_events_and_query() {
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();
    let cfg: Config = toml::from_str(&format!(
        "[db]\npath = \"{}\"\n\n[server]\nbind = \"127.0.0.1:{}\"\n",
        tmp.path().join("sds.sqlite").display(),
        port
    ))
    .unwrap();
    migrate::run_migrations(&cfg).await.unwrap();

    let indexer = Indexer::from_config(&cfg).await.unwrap();
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(indexer)).await.unwrap();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    // Unknown source → 400 with the router's body
    let resp = client
        .post(format!("{}/events", base))
        .json(&json!({"source": "test"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"statusCode": 400, "body": "Unknown event source"}));

    // Malformed body → uniform 400, not the extractor's plain-text rejection
    let resp = client
        .post(format!("{}/events", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["statusCode"], 400);
    assert!(body["body"].as_str().unwrap().starts_with("Invalid JSON body"));

    // Missing content type is still routed
    let resp = client
        .post(format!("{}/events", base))
        .body(r#"{"source": "test"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"statusCode": 400, "body": "Unknown event source"}));

    // Arrival → 200 and visible through /query
    let key = "imap/hit/l0/2024/01/imap_hit_l0_sci-test_20240101_20240104_v02-01.pkts";
    let resp = client
        .post(format!("{}/events", base))
        .json(&json!({
            "detail-type": "Object Created",
            "source": "aws.s3",
            "detail": {"bucket": {"name": "sds-data"}, "object": {"key": key}}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client
        .get(format!("{}/query?instrument=hit&data_level=l0", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let rows: Value = resp.json().await.unwrap();
    assert_eq!(rows[0]["file_path"], key);

    let resp = client
        .get(format!("{}/query?size=500", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let msg: Value = resp.json().await.unwrap();
    assert!(msg.as_str().unwrap().starts_with("size is not a valid query parameter"));
}
