//! Binary exit codes and output placement

use assert_cmd::Command;
use std::collections::HashMap;
use tempfile::TempDir;

use crate::support::StubLims;

fn publisher_cmd() -> Command {
    let mut cmd = Command::cargo_bin("lims-publisher").unwrap();
    cmd.env_remove("LIMS_BASE_URL")
        .env_remove("LIMS_USERNAME")
        .env_remove("LIMS_PASSWORD")
        .env("RUST_LOG", "lims_publisher=warn");
    cmd
}

#[test]
fn malformed_start_date_exits_with_two() {
    publisher_cmd()
        .args(["--start-date", "2024-01-01", "--base-url", "http://127.0.0.1:9"])
        .assert()
        .code(2);
}

#[test]
fn end_before_start_exits_with_two() {
    publisher_cmd()
        .args([
            "--start-date",
            "2024/03/15",
            "--end-date",
            "2024/03/01",
            "--base-url",
            "http://127.0.0.1:9",
        ])
        .assert()
        .code(2);
}

#[test]
fn missing_base_url_exits_with_one() {
    publisher_cmd()
        .args(["--start-date", "2024/01/01"])
        .assert()
        .code(1);
}

#[test]
fn unreachable_lims_exits_with_one() {
    publisher_cmd()
        .args([
            "--start-date",
            "2024/01/01",
            "--base-url",
            "http://127.0.0.1:9",
            "--max-retries",
            "0",
        ])
        .assert()
        .code(1);
}

#[test]
fn unknown_settings_key_exits_with_one() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("publisher.toml");
    std::fs::write(&path, "[pipeline]\nworkers = 4\n").unwrap();

    publisher_cmd()
        .args(["--start-date", "2024/01/01", "--config"])
        .arg(&path)
        .assert()
        .code(1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_failure_run_exits_zero_and_prints_report() {
    let mut routes = HashMap::new();
    routes.insert(
        "/LimsRest/api/getDeliveries?timestamp=1704067200000".to_string(),
        (
            200,
            r#"[{"request":"R1","deliveryDate":1704412800000}]"#.to_string(),
        ),
    );
    routes.insert(
        "/LimsRest/api/getRequestSamples?request=R1".to_string(),
        (
            200,
            r#"{"samples":[{"igoSampleId":"S1"},{"igoSampleId":"S2"}]}"#.to_string(),
        ),
    );
    routes.insert(
        "/LimsRest/api/getSampleManifest?igoSampleId=S1".to_string(),
        (200, r#"[{"igoSampleId":"S1"}]"#.to_string()),
    );
    let stub = StubLims::start(routes).await;

    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("requests.ndjson");
    let settings_path = dir.path().join("publisher.toml");
    std::fs::write(
        &settings_path,
        format!(
            "[lims]\nbase_url = \"{}\"\nusername = \"svc\"\npassword = \"secret\"\nmax_retries = 0\n\n[pipeline]\nchunk_size = 5\n",
            stub.base_url()
        ),
    )
    .unwrap();

    let output = tokio::task::spawn_blocking({
        let settings_path = settings_path.clone();
        let output_path = output_path.clone();
        move || {
            publisher_cmd()
                .args(["--start-date", "2024/01/01", "--end-date", "2024/01/31"])
                .arg("--config")
                .arg(&settings_path)
                .arg("--output")
                .arg(&output_path)
                .output()
                .unwrap()
        }
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let report = String::from_utf8(output.stdout).unwrap();
    assert!(report.contains("ERROR SUMMARY REPORT BY REQUEST"));
    assert!(report.contains("Request: R1, errors: 1"));
    assert!(report.contains("Samples: S2"));

    let published = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(
        published.trim_end(),
        r#"{"requestId":"R1","samples":[{"igoSampleId":"S1"}]}"#
    );
}
