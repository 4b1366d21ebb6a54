#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A backing directory for the remote plus a cache directory.
struct Env {
    remote: TempDir,
    cache: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            remote: TempDir::new().expect("Failed to create remote dir"),
            cache: TempDir::new().expect("Failed to create cache dir"),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("objvfs").unwrap();
        cmd.env_remove("RUST_LOG")
            .env_remove("OBJVFS_CONFIG")
            .arg("--remote-root")
            .arg(self.remote.path())
            .arg("--cache-dir")
            .arg(self.cache.path());
        cmd
    }

    fn cmd_in_mode(&self, mode: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("--cache-mode").arg(mode);
        cmd
    }

    fn remote_file(&self, rel: &str) -> std::path::PathBuf {
        self.remote.path().join(rel)
    }
}

fn write_local(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Basic CLI tests
// ============================================================================

#[test]
fn test_help() {
    Command::cargo_bin("objvfs")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ls"))
        .stdout(predicate::str::contains("put"))
        .stdout(predicate::str::contains("cache-clean"));
}

#[test]
fn test_version() {
    Command::cargo_bin("objvfs")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("objvfs"));
}

#[test]
fn test_missing_remote_root() {
    Command::cargo_bin("objvfs")
        .unwrap()
        .env_remove("OBJVFS_REMOTE_ROOT")
        .arg("ls")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--remote-root"));
}

#[test]
fn test_invalid_cache_mode() {
    let env = Env::new();
    env.cmd_in_mode("sometimes")
        .arg("ls")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown cache mode"));
}

// ============================================================================
// File operations
// ============================================================================

#[test]
fn test_put_then_cat_in_every_mode() {
    for mode in ["off", "minimal", "writes", "full"] {
        let env = Env::new();
        let local = TempDir::new().unwrap();
        let content = format!("written in {mode} mode\n");
        let source = write_local(local.path(), "in.txt", content.as_bytes());

        env.cmd_in_mode(mode)
            .arg("put")
            .arg(&source)
            .arg("/docs.txt")
            .assert()
            .success();
        assert_eq!(fs::read_to_string(env.remote_file("docs.txt")).unwrap(), content);

        env.cmd_in_mode(mode)
            .args(["cat", "/docs.txt"])
            .assert()
            .success()
            .stdout(content);
    }
}

#[test]
fn test_put_from_stdin_and_get() {
    let env = Env::new();
    let local = TempDir::new().unwrap();
    env.cmd()
        .args(["mkdir", "/inbox"])
        .assert()
        .success();
    env.cmd()
        .args(["put", "-", "inbox/note.txt"])
        .write_stdin("from stdin")
        .assert()
        .success();

    let dest = local.path().join("out.txt");
    env.cmd()
        .args(["get", "/inbox/note.txt"])
        .arg(&dest)
        .assert()
        .success();
    assert_eq!(fs::read_to_string(dest).unwrap(), "from stdin");
}

#[test]
fn test_append_depends_on_cache_mode() {
    let env = Env::new();
    fs::write(env.remote_file("log.txt"), "one\n").unwrap();

    env.cmd_in_mode("writes")
        .args(["put", "--append", "-", "/log.txt"])
        .write_stdin("two\n")
        .assert()
        .success();
    assert_eq!(fs::read_to_string(env.remote_file("log.txt")).unwrap(), "one\ntwo\n");

    // Direct writers cannot append; the upload replaces the object.
    env.cmd_in_mode("off")
        .args(["put", "--append", "-", "/log.txt"])
        .write_stdin("three\n")
        .assert()
        .success();
    assert_eq!(fs::read_to_string(env.remote_file("log.txt")).unwrap(), "three\n");
}

#[test]
fn test_ls_json_and_long() {
    let env = Env::new();
    fs::create_dir(env.remote_file("sub")).unwrap();
    fs::write(env.remote_file("a.txt"), "abc").unwrap();

    env.cmd()
        .args(["ls", "--json", "/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"a.txt\""))
        .stdout(predicate::str::contains("\"size\": 3"))
        .stdout(predicate::str::contains("\"type\": \"directory\""));

    env.cmd()
        .args(["ls", "-l"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sub/"))
        .stdout(predicate::str::contains("-rw-rw-rw-"));
}

#[test]
fn test_stat_json() {
    let env = Env::new();
    fs::write(env.remote_file("f.bin"), vec![0u8; 2048]).unwrap();
    env.cmd()
        .args(["stat", "--json", "f.bin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"size\": 2048"))
        .stdout(predicate::str::contains("\"mode\": \"666\""));
}

#[test]
fn test_stat_missing_exits_not_found() {
    let env = Env::new();
    env.cmd()
        .args(["stat", "/nope"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_mkdir_existing_exits_already_exists() {
    let env = Env::new();
    env.cmd().args(["mkdir", "/d"]).assert().success();
    env.cmd().args(["mkdir", "/d"]).assert().code(4);
    env.cmd().args(["mkdir", "-p", "/d/e/f"]).assert().success();
    assert!(env.remote_file("d/e/f").is_dir());
}

#[test]
fn test_mv_and_rm() {
    let env = Env::new();
    fs::create_dir_all(env.remote_file("tree/nested")).unwrap();
    fs::write(env.remote_file("tree/nested/leaf.txt"), "leaf").unwrap();
    fs::write(env.remote_file("tree/top.txt"), "top").unwrap();

    env.cmd()
        .args(["mv", "/tree/top.txt", "/tree/moved.txt"])
        .assert()
        .success();
    assert!(env.remote_file("tree/moved.txt").is_file());
    assert!(!env.remote_file("tree/top.txt").exists());

    env.cmd().args(["rm", "/tree"]).assert().failure();
    env.cmd().args(["rm", "-r", "/tree"]).assert().success();
    assert!(!env.remote_file("tree").exists());

    env.cmd().args(["rm", "/tree"]).assert().code(3);
    env.cmd().args(["rm", "-f", "/tree"]).assert().success();
}

// ============================================================================
// Cache management
// ============================================================================

#[test]
fn test_stats_json() {
    let env = Env::new();
    env.cmd_in_mode("full")
        .args(["stats", "--format", "json", "--reconcile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"cache_mode\": \"full\""))
        .stdout(predicate::str::contains("\"reconcile\""))
        .stdout(predicate::str::contains("\"bytes_uploaded\""));
}

#[test]
fn test_cache_clean_removes_cache_area() {
    let env = Env::new();
    let local = TempDir::new().unwrap();
    let source = write_local(local.path(), "big.bin", &vec![7u8; 100_000]);
    env.cmd_in_mode("full")
        .arg("put")
        .arg(&source)
        .arg("/big.bin")
        .assert()
        .success();
    assert!(fs::read_dir(env.cache.path()).unwrap().next().is_some());

    env.cmd()
        .arg("cache-clean")
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed cache area"));
    assert!(fs::read_dir(env.cache.path()).unwrap().next().is_none());
    assert_eq!(fs::read(env.remote_file("big.bin")).unwrap().len(), 100_000);
}

#[test]
fn test_config_file_sets_mode() {
    let env = Env::new();
    let config_dir = TempDir::new().unwrap();
    let config = write_local(
        config_dir.path(),
        "objvfs.toml",
        b"cache_mode = \"writes\"\ndir_cache_time = \"10s\"\n",
    );
    env.cmd()
        .arg("--config")
        .arg(&config)
        .args(["stats", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"cache_mode\": \"writes\""));
}
