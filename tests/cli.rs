use std::fs;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::json;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

fn prepare_data_dir() -> Result<TempDir> {
    let data_dir = TempDir::new()?;
    let mut entries = vec![];
    for i in 0..3 {
        let name = format!("sunset{}.jpg", i);
        data_dir.child(&name).touch()?;
        entries.push(json!({
            "filename": name,
            "description": "beach at sunset",
            "detailed_description": "golden waves over the ocean",
            "meta_tags": ["beach", "sunset"],
        }));
    }
    data_dir.child("party.jpg").touch()?;
    entries.push(json!({
        "filename": "party.jpg",
        "description": "beach party",
        "detailed_description": "friends dancing near the ocean",
        "meta_tags": ["beach", "party"],
        "face_count": 2,
        "face_encodings": [[0.0, 0.0], [0.1, 0.0]],
    }));
    data_dir.child("images_metadata.json").write_str(&serde_json::to_string(&entries)?)?;
    Ok(data_dir)
}

#[test]
fn train_then_enhance() -> Result<()> {
    let data_dir = prepare_data_dir()?;

    cargo_run!("imsense", "-d", data_dir.path(), "train")
        .success()
        .stdout(predicate::str::contains("\"status\": \"completed\""));

    data_dir.child("category_patterns.json").assert(predicate::path::exists());
    data_dir.child("description_patterns.json").assert(predicate::path::exists());
    data_dir.child("search_index.json").assert(predicate::path::exists());
    data_dir.child("face_clusters.bin").assert(predicate::path::exists());
    data_dir.child("training_report.json").assert(predicate::path::exists());

    let input = data_dir.child("analysis.json");
    input.write_str(r#"{"description": "a sandy beach", "meta_tags": ["beach"], "faces_detected": 0}"#)?;

    cargo_run!("imsense", "-d", data_dir.path(), "enhance", input.path())
        .success()
        .stdout(predicate::str::contains("commonly associated with ocean, golden, waves"))
        .stdout(predicate::str::contains("\"sunset\""));

    cargo_run!("imsense", "-d", data_dir.path(), "status", "--json")
        .success()
        .stdout(predicate::str::contains("\"face_clusters\": \"loaded\""));

    Ok(())
}

#[test]
fn enhance_from_stdin_without_training() -> Result<()> {
    let data_dir = TempDir::new()?;

    assert_cmd::Command::cargo_bin("imsense")?
        .arg("-d")
        .arg(data_dir.path())
        .arg("enhance")
        .arg("-")
        .write_stdin(r#"{"description": "a cat", "meta_tags": ["cat"]}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"enhanced_description\": \"a cat\""));

    Ok(())
}

#[test]
fn train_without_faces() -> Result<()> {
    let data_dir = prepare_data_dir()?;

    cargo_run!("imsense", "-d", data_dir.path(), "train", "--no-faces").success();

    let report = fs::read_to_string(data_dir.path().join("training_report.json"))?;
    assert!(report.contains("\"images_with_faces\": 1"));

    cargo_run!("imsense", "-d", data_dir.path(), "status")
        .success()
        .stdout(predicate::str::contains("face_clusters: Loaded (0 个聚类，0 个编码)"));

    Ok(())
}

#[test]
fn train_missing_metadata_fails() -> Result<()> {
    let data_dir = TempDir::new()?;
    cargo_run!("imsense", "-d", data_dir.path(), "train").failure();
    Ok(())
}
