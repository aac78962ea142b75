//! End-to-end CLI tests for the setup-downloader binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::zip_bundle;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Command with HOME and XDG_CONFIG_HOME pointed into `home` and no ambient token.
fn isolated_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("setup-downloader").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("xdg-config"))
        .env("RUST_LOG", "warn")
        .env_remove("GOFAST_TOKEN")
        .env_remove("GOFAST_ENDPOINT")
        .env_remove("CDA_SESSION_ID")
        .env_remove("CDA_CSRF_TOKEN")
        .env_remove("CDA_ENDPOINT")
        .env_remove("TT_ACCESS_TOKEN")
        .env_remove("TT_USER_ID")
        .env_remove("TT_ENDPOINT")
        .env_remove("SETUP_DOWNLOADER_CATALOG");
    cmd
}

fn write_config(home: &Path, contents: &str) {
    let config_dir = home.join("xdg-config").join("setup-downloader");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), contents).unwrap();
}

fn toml_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

fn write(path: &Path, body: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

async fn mount_listing(server: &MockServer) {
    let body = serde_json::json!({
        "status": true,
        "data": {"records": [{
            "id": 1,
            "download_name": "IR - V1 - Ferrari 296 GT3 - Spa",
            "download_url": format!("{}/f/1", server.uri()),
            "updated_date": "2024-01-01",
            "series": "GT3",
            "ver": "26 S1"
        }]}
    });
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(header("authorization", "Bearer e2e-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn setup_files_under(root: &Path) -> Vec<std::path::PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sto"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

// ==================== Help and Version Tests ====================

#[test]
fn test_binary_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    isolated_cmd(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("organize"))
        .stdout(predicate::str::contains("resolve"));
}

#[test]
fn test_binary_version_prints_name() {
    let temp = TempDir::new().unwrap();
    isolated_cmd(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("setup-downloader"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let temp = TempDir::new().unwrap();
    isolated_cmd(temp.path()).assert().failure();
}

// ==================== Resolve Tests ====================

#[test]
fn test_binary_resolve_known_track() {
    let temp = TempDir::new().unwrap();
    isolated_cmd(temp.path())
        .args(["resolve", "Spa-Francorchamps"])
        .assert()
        .success()
        .stdout(predicate::str::contains("path = spa/gp"))
        .stdout(predicate::str::contains("tier = "));
}

#[test]
fn test_binary_resolve_with_category_hint() {
    let temp = TempDir::new().unwrap();
    isolated_cmd(temp.path())
        .args(["resolve", "Charlotte", "--category", "GT3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("path = charlotte/roval"));
}

#[test]
fn test_binary_resolve_unknown_track_exits_one() {
    let temp = TempDir::new().unwrap();
    let assert = isolated_cmd(temp.path())
        .args(["resolve", "Zzyzx Proving Ground"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("unresolved"));
    assert_eq!(assert.get_output().status.code(), Some(1));
}

#[test]
fn test_binary_resolve_uses_catalog_env_override() {
    let temp = TempDir::new().unwrap();
    let catalog = temp.path().join("catalog.json");
    std::fs::write(
        &catalog,
        r#"[{"name": "Lime Rock Park", "category": "road",
            "subConfigs": [{"name": "full", "path": "limerock/full"}]}]"#,
    )
    .unwrap();

    isolated_cmd(temp.path())
        .env("SETUP_DOWNLOADER_CATALOG", &catalog)
        .args(["resolve", "Lime Rock Park"])
        .assert()
        .success()
        .stdout(predicate::str::contains("path = limerock/full"));
}

// ==================== Config Tests ====================

#[test]
fn test_binary_config_show_defaults() {
    let temp = TempDir::new().unwrap();
    isolated_cmd(temp.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_file = not found (using defaults)"))
        .stdout(predicate::str::contains("catalog = <bundled>"))
        .stdout(predicate::str::contains("gofast_token = <not set>"));
}

#[test]
fn test_binary_config_show_reads_file_and_env() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("my-setups");
    write_config(
        temp.path(),
        &format!(
            "output_dir = \"{}\"\nconcurrency = 7\nmax_retries = 5\n",
            toml_path(&output)
        ),
    );

    isolated_cmd(temp.path())
        .env("GOFAST_TOKEN", "from-env")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_file = loaded"))
        .stdout(predicate::str::contains("concurrency = 7"))
        .stdout(predicate::str::contains("max_retries = 5"))
        .stdout(predicate::str::contains("my-setups"))
        .stdout(predicate::str::contains("gofast_token = <set>"));
}

#[test]
fn test_binary_invalid_config_value_fails() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "concurrency = 99\n");

    isolated_cmd(temp.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

// ==================== Organize Tests ====================

#[test]
fn test_binary_organize_dry_run_reports_plan_and_keeps_files() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("setups");
    let file = source.join("mx5").join("GoFast_MX5_26S1_Spa_Race.sto");
    write(&file, b"race");

    isolated_cmd(temp.path())
        .arg("organize")
        .arg(&source)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("would move"))
        .stdout(predicate::str::contains("Dry run"));

    assert!(file.is_file());
    assert!(!source.join("mx5").join("spa").exists());
}

#[test]
fn test_binary_organize_moves_into_layout() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("setups");
    write(&source.join("mx5").join("GoFast_MX5_26S1_Spa_Race.sto"), b"race");

    isolated_cmd(temp.path())
        .arg("-q")
        .arg("organize")
        .arg(&source)
        .assert()
        .success();

    assert!(
        source
            .join("mx5")
            .join("spa")
            .join("gp")
            .join("GoFast_MX5_26S1_Spa_Race.sto")
            .is_file()
    );
}

// ==================== Download Tests ====================

#[test]
fn test_binary_download_without_token_fails() {
    let temp = TempDir::new().unwrap();
    let assert = isolated_cmd(temp.path())
        .args(["download", "gofast", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GoFast token not configured"));
    assert_eq!(assert.get_output().status.code(), Some(1));
}

#[test]
fn test_binary_download_without_partner_credentials_fails() {
    let temp = TempDir::new().unwrap();
    let assert = isolated_cmd(temp.path())
        .env("CDA_SESSION_ID", "only-half")
        .args(["download", "cda", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CDA session not configured"));
    assert_eq!(assert.get_output().status.code(), Some(1));

    let assert = isolated_cmd(temp.path())
        .args(["list", "tracktitan", "--token", "access-only"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Track Titan credentials not configured"));
    assert_eq!(assert.get_output().status.code(), Some(1));
}

#[test]
fn test_binary_download_rejects_out_of_range_concurrency() {
    let temp = TempDir::new().unwrap();
    isolated_cmd(temp.path())
        .args(["download", "gofast", "-c", "21"])
        .assert()
        .failure();
}

#[tokio::test]
async fn test_binary_download_dry_run_lists_planned_setups() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_listing(&server).await;

    let temp = TempDir::new().unwrap();
    let output = temp.path().join("out");

    isolated_cmd(temp.path())
        .env("GOFAST_TOKEN", "e2e-token")
        .env("GOFAST_ENDPOINT", format!("{}/list", server.uri()))
        .args(["download", "gofast", "--dry-run", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run: 1 of 1"))
        .stdout(predicate::str::contains("- 1 -> "));

    assert!(setup_files_under(&output).is_empty());
}

#[tokio::test]
async fn test_binary_download_writes_setup_and_second_run_skips() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_listing(&server).await;
    Mock::given(method("GET"))
        .and(path("/f/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_bundle(&[(
                    "ferrari296gt3/IR GT3 Spa Race.sto",
                    b"spa setup body",
                )]))
                .insert_header("Content-Disposition", "attachment; filename=\"GT3 Spa.zip\""),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let output = temp.path().join("out");
    let run = || {
        let mut cmd = isolated_cmd(temp.path());
        cmd.env("GOFAST_TOKEN", "e2e-token")
            .env("GOFAST_ENDPOINT", format!("{}/list", server.uri()))
            .args(["download", "gofast", "--min-delay", "0", "--max-delay", "0", "--output"])
            .arg(&output);
        cmd
    };

    run()
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded: 1"));

    let files = setup_files_under(&output);
    assert_eq!(files.len(), 1, "files: {files:?}");
    assert_eq!(
        files[0],
        output
            .join("ferrari296gt3")
            .join("spa")
            .join("gp")
            .join("GoFast_GT3_26S1_Spa_Race.sto")
    );
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"spa setup body");
    assert!(temp.path().join(".setup-downloader").join("state.json").is_file());

    run()
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded: 0"))
        .stdout(predicate::str::contains("Skipped: 1"));
}

#[tokio::test]
async fn test_binary_download_rejected_token_exits_one() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let assert = isolated_cmd(temp.path())
        .env("GOFAST_TOKEN", "expired")
        .env("GOFAST_ENDPOINT", format!("{}/list", server.uri()))
        .args(["download", "gofast", "--output"])
        .arg(temp.path().join("out"))
        .assert()
        .failure();
    assert_eq!(assert.get_output().status.code(), Some(1));
}

#[tokio::test]
async fn test_binary_download_cda_bundle_lands_under_car_folder() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let catalog = serde_json::json!({
        "code": 200,
        "data": {"porsche-911-gt3-r-992": {"road-america": {"25S4 IMSA Racing Series": [
            {"series": 160, "seriesName": "25S4 IMSA Racing Series", "bundle": 9, "week": 3}
        ]}}}
    });
    Mock::given(method("GET"))
        .and(path("/api/driving/iracing/catalog"))
        .and(header("cookie", "PHPSESSID=e2e-session"))
        .and(header("x-elle-csrf-token", "e2e-csrf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/iracing/install/160/9/3/setups/zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bundle(&[
            ("setups/porsche 992rgt3 @ roadamerica Race.sto", b"cda race"),
            ("setups/readme.txt", b"notes"),
        ])))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let output = temp.path().join("output");
    isolated_cmd(temp.path())
        .env("CDA_CSRF_TOKEN", "e2e-csrf")
        .env("CDA_ENDPOINT", server.uri())
        .args(["-q", "download", "cda", "--token", "e2e-session"])
        .args(["--min-delay", "0", "--max-delay", "0", "--output"])
        .arg(&output)
        .assert()
        .success();

    let files = setup_files_under(&output);
    assert_eq!(files.len(), 1, "{files:?}");
    let stored = files[0].strip_prefix(&output).unwrap();
    assert!(stored.starts_with("porsche992rgt3"), "{}", stored.display());
    assert_eq!(stored.file_name().unwrap(), "CDA_IMSA_25S4_Road_America_Race.sto");
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"cda race");
}

#[tokio::test]
async fn test_binary_list_tracktitan_reads_one_page() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let page = serde_json::json!({
        "success": true,
        "data": {"setups": [{
            "id": "tt-7",
            "config": [{"carId": "bmw-m4-gt3", "trackId": "spa"}],
            "setupCombos": [{"car": {"name": "BMW M4 GT3"}, "track": {"name": "Spa"}}],
            "period": {"season": 1, "week": 8, "year": 2026},
            "hymoSeries": {"seriesName": "GT Sprint Series by Simucube"},
            "lastUpdatedAt": 1_767_225_600_000_i64
        }]}
    });
    Mock::given(method("GET"))
        .and(path("/api/v2/games/iRacing/setups"))
        .and(header("authorization", "e2e-access"))
        .and(header("x-user-id", "e2e-user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    isolated_cmd(temp.path())
        .env("TT_ACCESS_TOKEN", "e2e-access")
        .env("TT_USER_ID", "e2e-user")
        .env("TT_ENDPOINT", server.uri())
        .args(["list", "tracktitan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tt-7"))
        .stdout(predicate::str::contains("BMW M4 GT3"));
}
