use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("terakoya-timeline").expect("binary builds");
    cmd.env("TERAKOYA_API__BASE_URL", "http://127.0.0.1:9/")
        .env_remove("TERAKOYA_SESSION__UUID")
        .arg("--config")
        .arg(home.path().join("config.yaml"));
    cmd
}

fn home() -> TempDir {
    tempfile::tempdir().expect("tempdir")
}

#[test]
fn prints_version() {
    cli(&home())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    cli(&home())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--pages"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn rejects_unknown_flags() {
    cli(&home())
        .arg("--bogus")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown argument"));
}

#[test]
fn offline_feed_pages_to_the_end() {
    cli(&home())
        .args(["--offline", "--pages", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[welcome]"))
        .stdout(predicate::str::contains("[saturday]"))
        .stdout(predicate::str::contains("end of timeline"));
}

#[test]
fn offline_first_page_only() {
    cli(&home())
        .args(["--offline", "--pages", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[tuesday]"))
        .stdout(predicate::str::contains("[math]").not());
}

#[test]
fn offline_comments_for_a_post() {
    cli(&home())
        .args(["--offline", "--comments", "math"])
        .assert()
        .success()
        .stdout(predicate::str::contains("I can share mine on Tuesday."));
}

#[test]
fn posting_requires_a_signed_in_member() {
    cli(&home())
        .args(["--offline", "--post", "Hello from the command line"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sign in"));
}

#[test]
fn offline_like_as_configured_member() {
    cli(&home())
        .env("TERAKOYA_SESSION__UUID", "u1")
        .env("TERAKOYA_SESSION__NAME", "Hanako")
        .args(["--offline", "--like", "math"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Liked math."));
}

#[test]
fn reads_member_from_config_file() {
    let home = home();
    std::fs::write(
        home.path().join("config.yaml"),
        "session:\n  uuid: u2\n  name: Taro\n",
    )
    .expect("write config");
    cli(&home)
        .args(["--offline", "--post", "Hello from the command line"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Posted."))
        .stdout(predicate::str::contains("Taro"));
}

#[test]
fn sign_in_is_remembered_for_later_runs() {
    let home = home();
    cli(&home)
        .args(["--sign-in", "u3", "Kenji"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed in as Kenji"));
    let saved = std::fs::read_to_string(home.path().join("config.yaml")).expect("config saved");
    assert!(saved.contains("u3"));

    cli(&home)
        .args(["--offline", "--like", "welcome"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Liked welcome."));
}
