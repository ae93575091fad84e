//! Black-box coverage of the `chanwatchd` binary's `migrate` subcommand.

use assert_cmd::Command;

#[test]
fn migrate_creates_a_fresh_database_and_exits_cleanly() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = dir.path().join("chanwatch.db");
    let connection_string = format!("sqlite://{}", db_path.display());

    Command::cargo_bin("chanwatchd")
        .expect("binary should build")
        .env("CHANWATCH_STORE_URL", &connection_string)
        .arg("migrate")
        .assert()
        .success();

    assert!(db_path.exists(), "migrate should create the database file");
}

#[test]
fn migrate_is_idempotent() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = dir.path().join("chanwatch.db");
    let connection_string = format!("sqlite://{}", db_path.display());

    for _ in 0..2 {
        Command::cargo_bin("chanwatchd")
            .expect("binary should build")
            .env("CHANWATCH_STORE_URL", &connection_string)
            .arg("migrate")
            .assert()
            .success();
    }
}
