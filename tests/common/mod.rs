#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const CATALOG: &str = "nick,export_as,description,skip_export,cdm_required\n\
    title,title,Title,false,true\n\
    find,file,Filename,false,false\n\
    subjec,subject,Subject,false,false\n\
    date,date,Date,false,false\n\
    fullrs,full_text,Full text,y,n\n";

pub fn record(id: &str, file: &str, subject: &str, date: &str) -> String {
    format!(
        r#"{{"fields":{{"dmrecord":"{id}","title":"Item {id}","find":"{file}","subjec":"{subject}","date":"{date}","dmcreated":"2020-01-0{id}","dmmodified":"2021-01-01"}}}}"#
    )
}

/// A project with five records: 1 and 2 share subject "maps", 3 and 4 share "letters".
pub fn project(root: &Path) -> PathBuf {
    let dir = root.join("project");
    fs::create_dir_all(dir.join("exports/cpds")).expect("mkdir exports");
    fs::write(dir.join("cdm_fields.csv"), CATALOG).expect("write catalog");
    let lines = [
        record("1", "276_182_E.tif", "maps", "1901"),
        record("2", "two.tif", "maps", "1905"),
        record("3", "three.tif", "letters", "1910"),
        record("4", "four.tif", "letters", "1920"),
        record("5", "five.tif", "", "1930"),
    ];
    fs::write(dir.join("exports/batch.jsonl"), lines.join("\n") + "\n").expect("write export");
    dir
}

pub fn files(root: &Path, names: &[&str]) -> PathBuf {
    let base = root.join("files");
    for name in names {
        let path = base.join(name);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir files");
        fs::write(path, b"data").expect("write file");
    }
    fs::create_dir_all(&base).expect("mkdir base");
    fs::canonicalize(base).expect("canonical base")
}

pub fn cmd(project: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cdm-migrate");
    cmd.env_remove("CDM_MIGRATE_PROJECT")
        .env_remove("CDM_MIGRATE_CONFIG_PATH")
        .env_remove("CDM_MIGRATE_LOG")
        .env_remove("RUST_LOG")
        .current_dir(project)
        .arg("--project")
        .arg(project);
    cmd
}
