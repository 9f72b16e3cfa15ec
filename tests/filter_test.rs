mod common;

use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn dry_run_reports_remainder_without_changing_the_index() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();

    common::cmd(&project)
        .args([
            "filter",
            "--field",
            "date",
            "--include-range-start",
            "1900",
            "--include-range-end",
            "1910",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("total=5"))
        .stdout(predicate::str::contains("remainder=3"));

    common::cmd(&project)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("records=5"));
}

#[test]
fn degenerate_selection_is_reported_and_refused() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();

    common::cmd(&project)
        .args(["filter", "--field", "subject", "--include", "nothing", "--dry-run"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("remainder=0"))
        .stdout(predicate::str::contains("issue: selection would remove every record"));

    common::cmd(&project)
        .args(["filter", "--field", "subject", "--include", "nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_INPUT"));

    common::cmd(&project)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("records=5"));
}

#[test]
fn filter_apply_keeps_only_selected_records() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();

    common::cmd(&project)
        .args(["filter", "--field", "subject", "--exclude", "letters"])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed=2"));

    common::cmd(&project)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("records=3"));
}

#[test]
fn conflicting_selections_are_rejected() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();

    common::cmd(&project)
        .args([
            "filter", "--field", "subject", "--include", "maps", "--exclude", "letters",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn filter_after_group_sync_keeps_matching_members() {
    let tmp = tempdir().expect("tempdir");
    let project = common::project(tmp.path());
    common::cmd(&project).arg("index").assert().success();
    common::cmd(&project)
        .args(["group-generate", "--field", "subject"])
        .assert()
        .success();
    common::cmd(&project).arg("group-sync").assert().success();

    common::cmd(&project)
        .args([
            "filter",
            "--field",
            "date",
            "--include-range-start",
            "1900",
            "--include-range-end",
            "1910",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("total=7"))
        .stdout(predicate::str::contains("remainder=4"))
        .stdout(predicate::str::contains("removed=3"));

    common::cmd(&project)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("records=4"))
        .stdout(predicate::str::contains("records.regular=3"))
        .stdout(predicate::str::contains("records.grouped_work=1"));
}
