use assert_cmd::Command;

fn relay() -> Command {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    // Keep the user's real config out of the way.
    cmd.arg("--config").arg("/nonexistent/relay-config.toml");
    cmd
}

#[test]
fn url_uses_default_origin() {
    let out = relay().args(["url", "build-box"]).output().unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "ws://localhost:8080/ws/terminal/build-box");
}

#[test]
fn url_follows_secure_origin() {
    let out = relay()
        .args(["--origin", "https://relay.example.com/app/", "url", "h1"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "wss://relay.example.com/ws/terminal/h1");
}

#[test]
fn url_reads_origin_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[default]\norigin = \"http://10.1.2.3:3000\"\n").unwrap();

    let out = Command::cargo_bin("relay")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .args(["url", "h1"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "ws://10.1.2.3:3000/ws/terminal/h1");
}

#[test]
fn url_rejects_bad_origin() {
    let out = relay().args(["--origin", "ftp://files", "url", "h1"]).output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("relay:"));
}

#[test]
fn connect_requires_a_host() {
    let out = relay().arg("connect").output().unwrap();
    assert!(!out.status.success());
}
