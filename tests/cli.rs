use assert_cmd::prelude::*;
use predicates::str::{contains, is_empty};
use tempfile::TempDir;

use std::fs;
use std::net::TcpListener;
use std::process::Command;

const BIN: &str = "ycsb-bind";

fn jcr(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.args(&["-b", "jcr", "-p"])
        .arg(format!("jcr.url=file://{}", dir.path().display()));
    cmd
}

// `ycsb-bind` with no subcommand should fail
#[test]
fn cli_no_args() {
    Command::cargo_bin(BIN).unwrap().assert().failure();
}

#[test]
fn cli_invalid_binding() {
    Command::cargo_bin(BIN)
        .unwrap()
        .args(&["-b", "mongodb", "read", "t", "k"])
        .assert()
        .failure();
}

#[test]
fn cli_invalid_field() {
    let temp_dir = TempDir::new().unwrap();
    jcr(&temp_dir)
        .args(&["insert", "t", "k", "novalue"])
        .assert()
        .failure();
}

#[test]
fn cli_insert_read() {
    let temp_dir = TempDir::new().unwrap();
    jcr(&temp_dir)
        .args(&["insert", "usertable", "user1", "name=alice", "age=30"])
        .assert()
        .success()
        .stdout(is_empty());

    jcr(&temp_dir)
        .args(&["read", "usertable", "user1"])
        .assert()
        .success()
        .stdout("age=30\nname=alice\n");

    jcr(&temp_dir)
        .args(&["read", "usertable", "user1", "name"])
        .assert()
        .success()
        .stdout("name=alice\n");
}

#[test]
fn cli_update_delete() {
    let temp_dir = TempDir::new().unwrap();
    jcr(&temp_dir)
        .args(&["insert", "usertable", "user1", "name=alice", "age=30"])
        .assert()
        .success();
    jcr(&temp_dir)
        .args(&["update", "usertable", "user1", "age=31"])
        .assert()
        .success();
    jcr(&temp_dir)
        .args(&["read", "usertable", "user1"])
        .assert()
        .success()
        .stdout("age=31\nname=alice\n");

    jcr(&temp_dir)
        .args(&["delete", "usertable", "user1"])
        .assert()
        .success();
    jcr(&temp_dir)
        .args(&["read", "usertable", "user1"])
        .assert()
        .failure()
        .stdout(is_empty());
    jcr(&temp_dir)
        .args(&["delete", "usertable", "user1"])
        .assert()
        .failure();
}

#[test]
fn cli_duplicate_insert() {
    let temp_dir = TempDir::new().unwrap();
    jcr(&temp_dir)
        .args(&["insert", "t", "k", "f=1"])
        .assert()
        .success();
    jcr(&temp_dir)
        .args(&["insert", "t", "k", "f=2"])
        .assert()
        .failure();
    jcr(&temp_dir)
        .args(&["read", "t", "k"])
        .assert()
        .success()
        .stdout("f=1\n");
}

#[test]
fn cli_truncate() {
    let temp_dir = TempDir::new().unwrap();
    for key in &["a", "b"] {
        jcr(&temp_dir)
            .args(&["insert", "t", key, "f=v"])
            .assert()
            .success();
    }
    jcr(&temp_dir).args(&["truncate", "t"]).assert().success();
    jcr(&temp_dir).args(&["read", "t", "a"]).assert().failure();
    jcr(&temp_dir).args(&["read", "t", "b"]).assert().failure();
}

#[test]
fn cli_jcr_scan_unsupported() {
    let temp_dir = TempDir::new().unwrap();
    jcr(&temp_dir)
        .args(&["insert", "t", "a", "f=v"])
        .assert()
        .success();
    jcr(&temp_dir)
        .args(&["scan", "t", "a", "10"])
        .assert()
        .failure()
        .stdout(is_empty());
}

#[test]
fn cli_property_file() {
    let temp_dir = TempDir::new().unwrap();
    let props = temp_dir.path().join("workload.properties");
    let repo = temp_dir.path().join("repo");
    fs::write(
        &props,
        format!(
            "# bench settings\njcr.url=file://{}\njcr.database: bench\njcr.writeCommit=false\n",
            repo.display()
        ),
    )
    .unwrap();

    Command::cargo_bin(BIN)
        .unwrap()
        .args(&["-b", "jcr", "-P"])
        .arg(&props)
        .args(&["-p", "jcr.properties=true"])
        .args(&["insert", "t", "k", "f=v"])
        .assert()
        .success()
        .stdout(contains("jcr.database:    bench"))
        .stdout(contains("jcr.writeCommit: false"));

    Command::cargo_bin(BIN)
        .unwrap()
        .args(&["-b", "jcr", "-P"])
        .arg(&props)
        .args(&["read", "t", "k"])
        .assert()
        .success()
        .stdout("f=v\n");
}

#[test]
fn cli_bad_property() {
    let temp_dir = TempDir::new().unwrap();
    Command::cargo_bin(BIN)
        .unwrap()
        .args(&["-p", "redis.port=http", "read", "t", "k"])
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(contains("Error"));
    jcr(&temp_dir)
        .args(&["-p", "=nokey", "read", "t", "k"])
        .assert()
        .failure();
}

#[test]
fn cli_redis_unreachable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    Command::cargo_bin(BIN)
        .unwrap()
        .args(&["-p"])
        .arg(format!("redis.host=127.0.0.1:{}", port))
        .args(&["read", "t", "k"])
        .assert()
        .failure()
        .stderr(contains("cannot initialize redis binding"));
}
