use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::tempdir;

fn nativa_cmd() -> Command {
    let mut cmd = Command::cargo_bin("nativa").expect("nativa binary");
    cmd.env_remove("NATIVA_COMPILER").env_remove("NATIVA_JOBS");
    cmd
}

fn write_config(dir: &Path, config: serde_json::Value) -> String {
    let path = dir.join("nativa.json");
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path.to_str().expect("utf8 path").to_string()
}

#[test]
fn help_lists_subcommands() {
    nativa_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("build").and(contains("stubs")).and(contains("clean")));
}

#[test]
fn missing_config_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nowhere.json");

    nativa_cmd()
        .args(["clean", "--config", missing.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("Configuration file not found"));
}

#[test]
fn invalid_arch_reports_hint() {
    let dir = tempdir().unwrap();
    let config = write_config(
        dir.path(),
        serde_json::json!({ "name": "demo", "archs": ["mips"] }),
    );

    nativa_cmd()
        .args(["stubs", "--config", &config])
        .assert()
        .failure()
        .stderr(contains("invalid arch `mips'").and(contains("hint: see nativa.json")));
}

#[test]
fn clean_removes_build_directory() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), serde_json::json!({ "name": "demo" }));

    nativa_cmd()
        .args(["clean", "--config", &config])
        .assert()
        .success()
        .stdout(contains("Nothing to clean"));

    let root = dir.path().join("build").join("Development-30");
    fs::create_dir_all(root.join("obj")).unwrap();

    nativa_cmd()
        .args(["clean", "--config", &config])
        .assert()
        .success()
        .stdout(contains("Delete"));
    assert!(!root.exists());
}

#[test]
fn release_flag_selects_release_directory() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), serde_json::json!({ "name": "demo" }));
    let development = dir.path().join("build").join("Development-30");
    fs::create_dir_all(&development).unwrap();

    nativa_cmd()
        .args(["clean", "--release", "--config", &config])
        .assert()
        .success()
        .stdout(contains("Nothing to clean"));
    assert!(development.exists());
}

#[test]
fn stubs_generated_from_existing_maps() {
    let dir = tempdir().unwrap();
    let config = write_config(
        dir.path(),
        serde_json::json!({
            "name": "demo",
            "package": "com.example.demo",
            "archs": ["armv7"],
        }),
    );

    let obj_dir = dir
        .path()
        .join("build")
        .join("Development-30")
        .join("obj")
        .join("local")
        .join("armeabi-v7a");
    fs::create_dir_all(&obj_dir).unwrap();
    fs::write(
        obj_dir.join("main.rb.map"),
        "MainActivity : android.app.Activity <>\n\
         \tpublic native void onCreate(android.os.Bundle arg0);\n",
    )
    .unwrap();

    nativa_cmd()
        .args(["stubs", "--config", &config])
        .assert()
        .success()
        .stdout(contains("Create").and(contains("1 written")));

    let stub = dir
        .path()
        .join("build/Development-30/java/com/example/demo/MainActivity.java");
    let text = fs::read_to_string(&stub).unwrap();
    assert!(text.contains("public class MainActivity extends android.app.Activity {"));
    assert!(text.contains("java.lang.System.loadLibrary(\"payload\");"));

    // Unchanged maps leave the stub alone.
    nativa_cmd()
        .args(["stubs", "--config", &config])
        .assert()
        .success()
        .stdout(contains("0 written, 1 unchanged"));
}

#[test]
fn build_rejects_zero_jobs() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), serde_json::json!({ "name": "demo" }));

    nativa_cmd()
        .args(["build", "--config", &config, "--jobs", "0"])
        .assert()
        .failure()
        .stderr(contains("--jobs must be at least 1"));
}
