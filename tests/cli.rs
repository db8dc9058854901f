use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn bin(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pwvault"));
    cmd.env_remove("PWVAULT_PASSWORD")
        .env_remove("PWVAULT_NEW_PASSWORD")
        .env_remove("PWVAULT_DIR")
        .arg("--dir")
        .arg(dir);
    cmd
}

fn with_password(dir: &Path, pw: &str) -> Command {
    let mut cmd = bin(dir);
    cmd.env("PWVAULT_PASSWORD", pw);
    cmd
}

fn init(dir: &Path) {
    with_password(dir, "pw")
        .args(["init", "--iterations", "1000", "--file-iterations", "1500"])
        .assert()
        .success();
}

fn add(dir: &Path, website: &str, username: &str, secret: &str) {
    with_password(dir, "pw")
        .args(["add", website, username, "--password", secret])
        .assert()
        .success()
        .stdout(predicate::str::contains("added entry"));
}

#[test]
fn init_leaves_vault_locked() {
    let dir = tempdir().unwrap();

    with_password(dir.path(), "pw")
        .args(["init", "--iterations", "1000", "--file-iterations", "1500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vault initialized"));

    assert!(dir.path().join("passwords.db.enc").exists());
    assert!(dir.path().join("passwords.db.auth").exists());
    assert!(!dir.path().join("passwords.db").exists());
}

#[test]
fn init_warns_only_about_weak_passwords() {
    let weak = tempdir().unwrap();
    with_password(weak.path(), "pw")
        .args(["init", "--iterations", "1000", "--file-iterations", "1500"])
        .assert()
        .success()
        .stderr(predicate::str::contains("weak master password"));

    let strong = tempdir().unwrap();
    with_password(strong.path(), "Zq7!Wm2#Kp9$")
        .args(["init", "--iterations", "1000", "--file-iterations", "1500"])
        .assert()
        .success()
        .stderr(predicate::str::contains("weak master password").not());
}

#[test]
fn init_reads_confirmed_password_from_stdin() {
    let dir = tempdir().unwrap();

    bin(dir.path())
        .args(["init", "--iterations", "1000", "--file-iterations", "1500"])
        .write_stdin("pw\npw\n")
        .assert()
        .success();

    bin(dir.path())
        .arg("list")
        .write_stdin("pw\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("No entries found"));
}

#[test]
fn init_rejects_mismatched_confirmation() {
    let dir = tempdir().unwrap();

    bin(dir.path())
        .args(["init", "--iterations", "1000", "--file-iterations", "1500"])
        .write_stdin("pw\nother\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("passwords do not match"));

    assert!(!dir.path().join("passwords.db.auth").exists());
}

#[test]
fn init_fails_if_vault_exists() {
    let dir = tempdir().unwrap();
    init(dir.path());

    with_password(dir.path(), "pw")
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("vault already exists"));
}

#[test]
fn init_rejects_invalid_iterations() {
    let dir = tempdir().unwrap();

    with_password(dir.path(), "pw")
        .args(["init", "--iterations", "10", "--file-iterations", "1500"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn commands_fail_without_vault() {
    let dir = tempdir().unwrap();

    with_password(dir.path(), "pw")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pwvault init"));
}

#[test]
fn add_and_get_roundtrip() {
    let dir = tempdir().unwrap();
    init(dir.path());
    add(dir.path(), "github.com", "octo", "s3cret");

    with_password(dir.path(), "pw")
        .args(["get", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Website:  github.com"))
        .stdout(predicate::str::contains("Password: s3cret"));

    assert!(!dir.path().join("passwords.db").exists());
}

#[test]
fn added_secret_is_not_stored_in_plaintext() {
    let dir = tempdir().unwrap();
    init(dir.path());
    add(dir.path(), "example.com", "me", "needle-in-the-vault");

    let enc = fs::read(dir.path().join("passwords.db.enc")).unwrap();
    let needle = b"needle-in-the-vault";
    assert!(!enc.windows(needle.len()).any(|w| w == needle));
}

#[test]
fn add_with_generated_password() {
    let dir = tempdir().unwrap();
    init(dir.path());

    with_password(dir.path(), "pw")
        .args(["add", "example.com", "me", "--generate", "--length", "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("generated password: "));
}

#[test]
fn wrong_password_fails_and_keeps_vault_file() {
    let dir = tempdir().unwrap();
    init(dir.path());
    let enc = dir.path().join("passwords.db.enc");
    let before = fs::read(&enc).unwrap();

    with_password(dir.path(), "wrong")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("authentication failed"));

    assert_eq!(fs::read(&enc).unwrap(), before);
    assert!(!dir.path().join("passwords.db").exists());
}

#[test]
fn repeated_failures_lock_the_vault() {
    let dir = tempdir().unwrap();
    init(dir.path());

    for _ in 0..5 {
        with_password(dir.path(), "wrong").arg("list").assert().failure();
    }

    with_password(dir.path(), "pw")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("authentication failed"));
}

#[test]
fn search_finds_matching_entries() {
    let dir = tempdir().unwrap();
    init(dir.path());
    add(dir.path(), "gitlab.com", "a", "1");
    add(dir.path(), "example.com", "b", "2");
    add(dir.path(), "github.com", "c", "3");

    with_password(dir.path(), "pw")
        .args(["search", "git"])
        .assert()
        .success()
        .stdout(predicate::str::contains("github.com"))
        .stdout(predicate::str::contains("gitlab.com"))
        .stdout(predicate::str::contains("example.com").not());
}

#[test]
fn list_hides_secrets() {
    let dir = tempdir().unwrap();
    init(dir.path());
    add(dir.path(), "example.com", "me", "hidden-secret");

    with_password(dir.path(), "pw")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("example.com"))
        .stdout(predicate::str::contains("hidden-secret").not());
}

#[test]
fn update_changes_only_given_fields() {
    let dir = tempdir().unwrap();
    init(dir.path());
    add(dir.path(), "example.com", "me", "old-secret");

    with_password(dir.path(), "pw")
        .args(["update", "1", "--username", "you"])
        .assert()
        .success()
        .stdout(predicate::str::contains("entry 1 updated"));

    with_password(dir.path(), "pw")
        .args(["get", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Username: you"))
        .stdout(predicate::str::contains("Password: old-secret"));
}

#[test]
fn remove_entry_works() {
    let dir = tempdir().unwrap();
    init(dir.path());
    add(dir.path(), "example.com", "me", "p");

    with_password(dir.path(), "pw")
        .args(["remove", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("entry 1 removed"));

    with_password(dir.path(), "pw")
        .args(["get", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("entry 1 not found"));
}

#[test]
fn passwd_changes_master_password() {
    let dir = tempdir().unwrap();
    init(dir.path());
    add(dir.path(), "example.com", "me", "kept-secret");

    with_password(dir.path(), "pw")
        .env("PWVAULT_NEW_PASSWORD", "new-pw")
        .arg("passwd")
        .assert()
        .success()
        .stdout(predicate::str::contains("master password changed"));

    with_password(dir.path(), "pw").arg("list").assert().failure();

    with_password(dir.path(), "new-pw")
        .args(["get", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Password: kept-secret"));
}

#[test]
fn passwd_reads_new_password_from_stdin() {
    let dir = tempdir().unwrap();
    init(dir.path());

    with_password(dir.path(), "pw")
        .arg("passwd")
        .write_stdin("next\nnext\n")
        .assert()
        .success();

    with_password(dir.path(), "next").arg("list").assert().success();
}

#[test]
fn export_and_import_restore_snapshot() {
    let dir = tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.db");
    init(dir.path());
    add(dir.path(), "first.com", "me", "1");

    with_password(dir.path(), "pw")
        .arg("export")
        .arg(&snapshot)
        .assert()
        .success();
    add(dir.path(), "second.com", "me", "2");

    with_password(dir.path(), "pw")
        .arg("import")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 1 entries"));

    with_password(dir.path(), "pw")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("first.com"))
        .stdout(predicate::str::contains("second.com").not());
}

#[test]
fn import_of_garbage_keeps_vault() {
    let dir = tempdir().unwrap();
    let garbage = dir.path().join("garbage.db");
    fs::write(&garbage, vec![0x42u8; 4096]).unwrap();
    init(dir.path());
    add(dir.path(), "kept.com", "me", "1");

    with_password(dir.path(), "pw")
        .arg("import")
        .arg(&garbage)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to import"));

    with_password(dir.path(), "pw")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("kept.com"));
}

#[test]
fn encrypted_export_needs_no_password() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("copy.enc");
    init(dir.path());

    bin(dir.path())
        .args(["export", "--encrypted"])
        .arg(&dest)
        .assert()
        .success();

    assert_eq!(
        fs::read(&dest).unwrap(),
        fs::read(dir.path().join("passwords.db.enc")).unwrap()
    );
}

#[test]
fn generate_respects_length_and_classes() {
    let dir = tempdir().unwrap();

    let out = bin(dir.path())
        .args(["generate", "--length", "24", "--no-symbols"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let pw = String::from_utf8(out).unwrap();
    let pw = pw.trim();
    assert_eq!(pw.len(), 24);
    assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
}
