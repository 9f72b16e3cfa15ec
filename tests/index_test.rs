mod common;

use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn index_loads_exports_and_refuses_to_overwrite() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());

    common::cmd(&project)
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("records=5"))
        .stdout(predicate::str::contains("compound_objects=0"));
    assert!(project.join("index.db").is_file());

    common::cmd(&project)
        .arg("index")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ALREADY_EXISTS"));

    common::cmd(&project)
        .args(["index", "--force"])
        .assert()
        .success();

    let state = fs::read_to_string(project.join(".project.json")).expect("state");
    assert!(state.contains("indexed_date"));
}

#[test]
fn malformed_export_leaves_no_index_behind() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    fs::write(project.join("exports/zz_broken.jsonl"), "{not json\n").expect("write");

    common::cmd(&project)
        .arg("index")
        .assert()
        .failure()
        .stderr(predicate::str::contains("LOAD_FAILED"));
    assert!(!project.join("index.db").exists());
    assert!(!project.join(".project.json").exists());
}

#[test]
fn index_remove_deletes_store_and_status_reports_it() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();

    common::cmd(&project)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("records.regular=5"));

    common::cmd(&project)
        .arg("index-remove")
        .assert()
        .success()
        .stdout(predicate::str::contains("removed=true"));
    assert!(!project.join("index.db").exists());

    common::cmd(&project)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("index=missing"))
        .stdout(predicate::str::contains("indexed=never"));
}

#[test]
fn commands_needing_an_index_fail_with_invalid_state() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());

    common::cmd(&project)
        .arg("group-sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_STATE"));
}
