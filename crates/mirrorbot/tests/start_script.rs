use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const REQUIRED: [&str; 4] = ["BOT_TOKEN", "OWNER_ID", "TELEGRAM_API", "TELEGRAM_HASH"];

fn script() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../start.sh")
}

fn run_script(dir: &Path, vars: &[(&str, &str)]) -> Output {
    let mut command = Command::new("bash");
    command
        .arg(script())
        .current_dir(dir)
        .env_clear()
        .env("PATH", std::env::var_os("PATH").unwrap_or_default());
    for (key, value) in vars {
        command.env(key, value);
    }
    command.output().unwrap()
}

fn full_env() -> Vec<(&'static str, &'static str)> {
    vec![
        ("BOT_TOKEN", "123:abc"),
        ("OWNER_ID", "100"),
        ("TELEGRAM_API", "12345"),
        ("TELEGRAM_HASH", "deadbeef"),
    ]
}

#[test]
fn test_missing_variable_is_named() {
    for missing in REQUIRED {
        let dir = tempfile::tempdir().unwrap();
        let vars: Vec<_> = full_env().into_iter().filter(|(k, _)| *k != missing).collect();

        let output = run_script(dir.path(), &vars);
        let stderr = String::from_utf8_lossy(&output.stderr);

        assert!(!output.status.success(), "{missing} unset should fail");
        assert!(stderr.contains(&format!("{missing} is not set")), "stderr: {stderr}");
        assert!(!stderr.contains("bot binary not found"));
    }
}

#[test]
fn test_creates_working_directories() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), &[]);

    assert!(!output.status.success());
    for name in ["downloads", "uploads", "logs"] {
        assert!(dir.path().join(name).is_dir(), "{name} missing");
    }
}

#[test]
fn test_empty_variable_counts_as_unset() {
    let dir = tempfile::tempdir().unwrap();
    let mut vars = full_env();
    vars[1] = ("OWNER_ID", "");

    let output = run_script(dir.path(), &vars);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("OWNER_ID is not set"));
}

#[cfg(unix)]
#[test]
fn test_launches_binary_when_configured() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("mirrorbot");
    std::fs::write(&fake, "#!/bin/sh\necho launched \"$OWNER_ID\"\n").unwrap();
    std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

    let output = run_script(dir.path(), &full_env());
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("launched 100"));
}

#[test]
fn test_missing_binary_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), &full_env());

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bot binary not found"));
}
