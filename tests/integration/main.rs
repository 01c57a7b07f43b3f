//! Integration tests for token-sessions

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SCENARIO: &str = r#"
[[step]]
op = "open"
rw = true

[[step]]
op = "open"

[[step]]
op = "close"
handle = 0

[[step]]
op = "login"
handle = 1
user = "user"

[[step]]
op = "close"
handle = 1
"#;

    /// Temp dir with a config that keeps the audit log out of the user's state dir
    fn workspace() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(
            &config,
            "[general]\naudit_log = false\n\n[token]\nlabel = \"it-token\"\nmax_sessions = 8\n",
        )
        .unwrap();
        (dir, config)
    }

    fn token_sessions(config: &PathBuf) -> Command {
        let mut cmd = cargo_bin_cmd!("token-sessions");
        cmd.arg("--config").arg(config);
        cmd
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("token-sessions")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Session registry"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("token-sessions")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("token-sessions"));
    }

    #[test]
    fn config_path() {
        let (_dir, config) = workspace();
        token_sessions(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let (_dir, config) = workspace();
        token_sessions(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[token]"))
            .stdout(predicate::str::contains("it-token"));
    }

    #[test]
    fn config_init_does_not_overwrite() {
        let (_dir, config) = workspace();
        token_sessions(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_fails() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "[token]\nmax_sessions = 0\n").unwrap();

        token_sessions(&config)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn config_init_force_repairs_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "[token]\nmax_sessions = 0\n").unwrap();

        token_sessions(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));

        token_sessions(&config)
            .args(["config", "init", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        token_sessions(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_sessions = 1024"));
    }

    #[test]
    fn run_scenario_table() {
        let (dir, config) = workspace();
        let scenario = dir.path().join("scenario.toml");
        std::fs::write(&scenario, SCENARIO).unwrap();

        token_sessions(&config)
            .arg("run")
            .arg(&scenario)
            .assert()
            .success()
            .stdout(predicate::str::contains("it-token"))
            .stdout(predicate::str::contains("5 step(s), 0 failed"));
    }

    #[test]
    fn run_scenario_json() {
        let (dir, config) = workspace();
        let scenario = dir.path().join("scenario.toml");
        std::fs::write(&scenario, SCENARIO).unwrap();

        let output = token_sessions(&config)
            .arg("run")
            .arg(&scenario)
            .args(["--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let reports = reports.as_array().unwrap();
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[0]["rv"], 0);
        assert_eq!(reports[0]["ck_state"], 2);
        assert_eq!(reports[1]["counts"]["rw"], 1);
        assert_eq!(reports[3]["login"]["user"], "user");
        assert_eq!(reports[4]["counts"]["all"], 0);
        assert!(reports[4]["login"]["user"].is_null());
    }

    #[test]
    fn run_fail_fast_reports_error() {
        let (dir, config) = workspace();
        let scenario = dir.path().join("scenario.toml");
        std::fs::write(&scenario, "[[step]]\nop = \"logout\"\nhandle = 3\n").unwrap();

        token_sessions(&config)
            .arg("run")
            .arg(&scenario)
            .arg("--fail-fast")
            .assert()
            .failure()
            .stdout(predicate::str::contains("Invalid session handle: 3"));
    }

    #[test]
    fn run_missing_scenario() {
        let (dir, config) = workspace();
        token_sessions(&config)
            .arg("run")
            .arg(dir.path().join("missing.toml"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("reading scenario"));
    }

    #[test]
    fn stress_runs() {
        let (_dir, config) = workspace();
        token_sessions(&config)
            .args(["stress", "--threads", "4", "--iterations", "200", "--seed", "7"])
            .assert()
            .success()
            .stdout(predicate::str::contains("4 workers"));
    }
}
