use assert_cmd::Command;
use predicates::str::contains;
use tempfile::NamedTempFile;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("ingestor").unwrap();
    // Tests never expect a real vendor/database round trip; clearing these
    // keeps `status`/`ingest` failures deterministic regardless of the
    // environment the test runner happens to have set.
    cmd.env_remove("DATABENTO_API_KEY");
    cmd.env_remove("TIMESCALEDB_HOST");
    cmd.env_remove("TIMESCALEDB_PORT");
    cmd.env_remove("TIMESCALEDB_DB");
    cmd.env_remove("TIMESCALEDB_USER");
    cmd.env_remove("TIMESCALEDB_PASSWORD");
    cmd
}

#[test]
fn help() {
    cmd().arg("--help").assert().success().stdout(contains("Commands:"));
}

#[test]
fn version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn status_reports_missing_vendor_key_and_database_config() {
    cmd()
        .arg("status")
        .assert()
        .failure()
        .stdout(contains("vendor API key"))
        .stdout(contains("database"));
}

#[test]
fn ingest_without_job_or_explicit_flags_fails() {
    cmd()
        .args(["ingest"])
        .assert()
        .failure()
        .stderr(contains("--job"));
}

#[test]
fn ingest_with_unknown_job_name_fails() {
    let config = NamedTempFile::new().unwrap();
    std::fs::write(config.path(), "system: {}\njobs: []\nrules: {}\n").unwrap();
    cmd()
        .args(["ingest", "--api", config.path().to_str().unwrap(), "--job", "nightly-es"])
        .assert()
        .failure()
        .stderr(contains("no job named"));
}

#[test]
fn query_without_required_flags_fails() {
    cmd().args(["query", "--schema", "trades"]).assert().failure();
}

#[test]
fn list_jobs_with_no_jobs_reports_none_configured() {
    let config = NamedTempFile::new().unwrap();
    std::fs::write(config.path(), "system: {}\njobs: []\nrules: {}\n").unwrap();
    cmd()
        .args(["list-jobs", "--api", config.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("no jobs configured"));
}

#[test]
fn list_jobs_lists_a_configured_job() {
    let config = NamedTempFile::new().unwrap();
    std::fs::write(
        config.path(),
        r#"
system: {}
rules: {}
jobs:
  - name: nightly-es
    vendor: databento
    dataset: GLBX.MDP3
    schema: ohlcv-1d
    symbols: ["ES.c.0"]
    symbol_type: continuous
    start_date: 2024-01-01
    end_date: 2024-01-02
"#,
    )
    .unwrap();
    cmd()
        .args(["list-jobs", "--api", config.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("nightly-es"))
        .stdout(contains("GLBX.MDP3"));
}

#[test]
fn list_jobs_with_missing_file_fails() {
    cmd()
        .args(["list-jobs", "--api", "/nonexistent/pipeline.yaml"])
        .assert()
        .failure()
        .stderr(contains("could not read pipeline config"));
}
