mod common;

use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn group_generate_then_sync_creates_grouped_works() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();

    common::cmd(&project)
        .args(["group-generate", "--field", "subject"])
        .assert()
        .success()
        .stdout(predicate::str::contains("distinct_keys=2"));

    let mapping = fs::read_to_string(project.join("group_mappings.csv")).expect("mapping");
    assert!(mapping.starts_with("id,group_key\n"));
    assert!(mapping.contains("1,subject:maps\n"));
    assert!(mapping.contains("5,\n"));

    common::cmd(&project)
        .arg("group-sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("groups_created=2"))
        .stdout(predicate::str::contains("members_grouped=4"));

    let output = common::cmd(&project)
        .args(["status", "--json"])
        .output()
        .expect("status");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    let details: Vec<&str> = report["details"]
        .as_array()
        .expect("details")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(details.contains(&"records.grouped_work=2"));
    assert!(details.contains(&"group_mapping_field=subject"));
    assert_eq!(report["ok"], serde_json::Value::Bool(true));
}

#[test]
fn group_sync_requires_generated_mapping() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();

    common::cmd(&project)
        .arg("group-sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("has not been generated"));
}

#[test]
fn group_generate_rejects_unknown_field_and_existing_mapping() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();

    common::cmd(&project)
        .args(["group-generate", "--field", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_INPUT"));

    common::cmd(&project)
        .args(["group-generate", "--field", "subject"])
        .assert()
        .success();
    common::cmd(&project)
        .args(["group-generate", "--field", "date"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ALREADY_EXISTS"));
    common::cmd(&project)
        .args(["group-generate", "--field", "date", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("distinct_keys=5"));
}
