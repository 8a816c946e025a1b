use assert_cmd::Command;
use predicates::prelude::*;

fn media_fetch() -> Command {
    let mut cmd = Command::cargo_bin("media-fetch").unwrap();
    cmd.env_remove("MEDIA_FETCH_BIND")
        .env_remove("MEDIA_FETCH_DOWNLOADS_DIR")
        .env_remove("MEDIA_FETCH_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    media_fetch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("strategies"));
}

#[test]
fn strategies_follow_config_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "extraction:\n  strategies:\n    - yt-dlp\n    - resolver\n").unwrap();

    media_fetch()
        .current_dir(dir.path())
        .args(["strategies", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("1. yt-dlp"))
        .stdout(predicate::str::contains("2. resolver"));
}

#[test]
fn default_strategies_try_resolver_first() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "{}\n").unwrap();

    media_fetch()
        .current_dir(dir.path())
        .args(["strategies", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("1. resolver"))
        .stdout(predicate::str::contains("2. yt-dlp"));
}

#[test]
fn audio_and_with_audio_conflict() {
    media_fetch()
        .args(["fetch", "https://example.com/v", "--audio", "--with-audio"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "server:\n  bind_address: not-an-address\n").unwrap();

    media_fetch()
        .current_dir(dir.path())
        .args(["strategies", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid bind address"));
}

#[test]
fn config_command_writes_the_file_given_with_config_flag() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().join("home");
    let config = dir.path().join("custom.yaml");
    std::fs::write(&config, "server:\n  bind_address: 127.0.0.1:9200\n").unwrap();

    media_fetch()
        .current_dir(dir.path())
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .args(["config", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.yaml"));

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("127.0.0.1:9200"));
    assert!(written.contains("you_get"));
    assert!(!home.exists());
    assert!(!dir.path().join("config.yaml").exists());
}

#[test]
fn fetch_rejects_empty_downloads_dir_before_running() {
    let dir = tempfile::tempdir().unwrap();

    media_fetch()
        .current_dir(dir.path())
        .args(["fetch", "https://example.com/v", "--downloads-dir", ""])
        .assert()
        .failure();

    assert!(!dir.path().join("downloads").exists());
}
