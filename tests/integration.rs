//! Integration tests for the sync harness CLI
//!
//! The default tests exercise the binary and the library against temporary
//! trees only. The end-to-end runs need the desktop application, a driver
//! and the WebDAV server, so they are ignored unless asked for:
//!
//! ```text
//! WEBDRIVER_VERSION=... OBSIDIAN_LOCATION=... cargo test -- --ignored
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use filetime::{set_file_mtime, FileTime};
use harness::fixtures::vault::copy_tree;
use harness::oracle::{assert_converged, compare_trees};
use harness::testing::{discover_scenarios, Side, TestScenario, TestStep};
use harness::SyncDirection;
use serde_json::Value;

/// Test context with a scratch directory and a config file
struct TestContext {
    /// Temporary directory for this test
    temp_dir: PathBuf,
    /// Config file handed to every command
    config_path: PathBuf,
}

impl TestContext {
    /// Create a new test context
    fn new(test_name: &str) -> Self {
        let temp_dir = env::temp_dir().join("sync-harness-tests").join(test_name);

        // Clean up any previous test artifacts
        let _ = fs::remove_dir_all(&temp_dir);
        fs::create_dir_all(&temp_dir).expect("Failed to create temp dir");

        let config_path = temp_dir.join("harness.toml");
        fs::write(
            &config_path,
            "[remote]\nbase_url = \"http://localhost:62170\"\n",
        )
        .expect("Failed to write config");

        Self {
            temp_dir,
            config_path,
        }
    }

    /// Write a file below the scratch directory, creating parents
    fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Run a harness command
    fn run_harness(&self, args: &[&str]) -> HarnessOutput {
        let output = Command::new(env!("CARGO_BIN_EXE_sync-harness"))
            .arg("--config")
            .arg(&self.config_path)
            .args(args)
            .current_dir(&self.temp_dir)
            .env("NO_COLOR", "1")
            .env_remove(harness::common::config::ENV_WORKDIR)
            .output()
            .expect("Failed to run sync-harness");

        HarnessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }

    /// Run a harness command expecting success
    fn run_harness_ok(&self, args: &[&str]) -> String {
        let output = self.run_harness(args);
        assert!(
            output.success,
            "Harness command {:?} failed:\nstdout: {}\nstderr: {}",
            args,
            output.stdout,
            output.stderr
        );
        output.stdout
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.temp_dir);
    }
}

/// Output from a harness command
#[derive(Debug)]
struct HarnessOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

fn integration_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("integration")
}

fn set_mtime(path: &Path, secs: i64) {
    set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

// ============== Tests ==============

#[test]
fn test_settings_prints_defaults() {
    let ctx = TestContext::new("settings_defaults");
    let stdout = ctx.run_harness_ok(&["settings"]);

    let settings: Value = serde_json::from_str(&stdout).expect("settings output is JSON");
    assert_eq!(settings["server_conf"]["url"], "http://localhost:62170");
    assert_eq!(settings["server_conf"]["username"], "admin");
    assert_eq!(settings["server_conf"]["password"], "hunter2");
    assert_eq!(settings["sync"]["full_vault_sync"], true);
    assert_eq!(settings["sync"]["root_folder"]["dest"], "/vault");
    assert_eq!(settings["sync"]["ignore_workspace"], true);
    assert_eq!(settings["sync"]["ignore_config_folder"], false);
}

#[test]
fn test_compare_identical_trees() {
    let ctx = TestContext::new("compare_identical");
    ctx.write("left/Index.md", "# Index");
    ctx.write("left/canary/awooken.md", "awoo");
    copy_tree(&ctx.temp_dir.join("left"), &ctx.temp_dir.join("right")).unwrap();

    let left = ctx.temp_dir.join("left");
    let right = ctx.temp_dir.join("right");
    let stdout = ctx.run_harness_ok(&[
        "compare",
        left.to_str().unwrap(),
        right.to_str().unwrap(),
        "--json",
    ]);

    let cmp: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(cmp["common_files"], serde_json::json!(["Index.md"]));
    assert_eq!(cmp["common_dirs"], serde_json::json!(["canary"]));
    assert_eq!(cmp["diff_files"], serde_json::json!([]));
}

#[test]
fn test_compare_reports_differences() {
    let ctx = TestContext::new("compare_differences");
    ctx.write("left/Index.md", "# Index");
    ctx.write("left/only-left.md", "");
    ctx.write("right/Index.md", "# Index, edited");

    let left = ctx.temp_dir.join("left");
    let right = ctx.temp_dir.join("right");
    let output = ctx.run_harness(&[
        "compare",
        left.to_str().unwrap(),
        right.to_str().unwrap(),
    ]);

    assert!(!output.success, "differing trees should fail the command");
    assert!(output.stdout.contains("Differing files:"), "{}", output.stdout);
    assert!(output.stdout.contains("only-left.md"), "{}", output.stdout);
    assert!(output.stderr.contains("1 file(s) differ"), "{}", output.stderr);
}

#[test]
fn test_run_rejects_missing_scenario_path() {
    let ctx = TestContext::new("run_missing_path");
    let missing = ctx.temp_dir.join("nope");
    let output = ctx.run_harness(&["run", missing.to_str().unwrap()]);

    assert!(!output.success);
    assert!(output.stderr.contains("does not exist"), "{}", output.stderr);
}

#[test]
fn test_run_file_only_scenario() {
    let ctx = TestContext::new("run_file_only");
    ctx.write("template/Index.md", "# Index");
    fs::create_dir_all(ctx.temp_dir.join("dist")).unwrap();
    fs::write(
        &ctx.config_path,
        format!(
            "workdir = \"{}\"\n[vault]\ntemplate = \"template\"\n[app]\nplugin_dist = \"dist\"\n",
            ctx.temp_dir.display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();
    let scenario = ctx.write(
        "scenarios/files.yaml",
        r#"
name: file only
fixtures: { vault: true }
steps:
  - action: write_file
    path: notes/new.md
    content: hi
  - action: expect_exists
    path: notes/new.md
  - action: expect_exists
    path: Index.md
"#,
    );

    let stdout = ctx.run_harness_ok(&["run", scenario.to_str().unwrap()]);
    assert!(stdout.contains("1 passed"), "{}", stdout);
    assert!(
        !ctx.temp_dir.join("test_vault").exists(),
        "vault should be released after the run"
    );
}

#[test]
fn test_shipped_scenarios_parse() {
    let files = discover_scenarios(&[integration_dir().join("scenarios")]).unwrap();
    assert!(files.len() >= 13, "expected the full suite, found {}", files.len());

    let mut names = Vec::new();
    for file in &files {
        let scenario = TestScenario::load(file)
            .unwrap_or_else(|e| panic!("{} failed to load: {}", file.display(), e));
        assert!(!scenario.steps.is_empty(), "{} has no steps", file.display());
        names.push(scenario.name);
    }
    names.sort();
    names.dedup();
    assert_eq!(names.len(), files.len(), "scenario names must be unique");
}

fn load_shipped() -> Vec<TestScenario> {
    discover_scenarios(&[integration_dir().join("scenarios")])
        .unwrap()
        .iter()
        .map(|file| TestScenario::load(file).unwrap())
        .collect()
}

#[test]
fn test_connection_scenario_wants_exactly_one_notice() {
    let scenarios = load_shipped();
    let connection = scenarios
        .iter()
        .find(|s| {
            s.steps
                .iter()
                .any(|step| matches!(step, TestStep::TestConnection))
        })
        .expect("a connection scenario ships");
    assert!(
        connection.steps.iter().any(|step| matches!(
            step,
            TestStep::ExpectSingleNotice { contains } if contains.contains("Connection succeeded")
        )),
        "{} should expect a single success notice",
        connection.name
    );
}

#[test]
fn test_ignored_config_folder_is_checked_on_pull() {
    let covered = load_shipped().iter().any(|scenario| {
        let ignores = scenario.steps.iter().any(|step| match step {
            TestStep::InjectSettings { overrides: Some(o) } => {
                o["sync"]["ignore_config_folder"] == Value::Bool(true)
            }
            _ => false,
        });
        let pulls = scenario
            .steps
            .iter()
            .any(|step| matches!(step, TestStep::Download));
        let stays_out = scenario.steps.iter().any(|step| {
            matches!(
                step,
                TestStep::ExpectExists { side: Side::Vault, path, present: false }
                    if path.starts_with(".obsidian/")
            )
        });
        ignores && pulls && stays_out
    });
    assert!(covered, "no scenario pulls with the config folder ignored");
}

#[test]
fn test_template_vault_layout() {
    let template = integration_dir()
        .join("test-vaults")
        .join("trans-rights-are-human-rights");
    for relative in [
        "Index.md",
        "canary/awooken.md",
        "private_subfolder/mrrp meow.md",
        ".obsidian/app.json",
    ] {
        assert!(
            template.join(relative).is_file(),
            "template vault is missing {}",
            relative
        );
    }
}

#[test]
fn test_converged_trees_after_copy() {
    let ctx = TestContext::new("converged_after_copy");
    let vault = ctx.temp_dir.join("vault");
    let remote = ctx.temp_dir.join("remote");
    ctx.write("vault/Index.md", "# Index");
    ctx.write("vault/canary/awooken.md", "awoo");
    set_mtime(&vault.join("canary/awooken.md"), 1_700_000_000);

    copy_tree(&vault, &remote).unwrap();

    assert!(compare_trees(&vault, &remote).unwrap().diff_files.is_empty());
    assert_converged(&vault, &remote, SyncDirection::Push).unwrap();
    assert_converged(&vault, &remote, SyncDirection::Pull).unwrap();
}

#[test]
fn test_stale_mtime_is_not_converged() {
    let ctx = TestContext::new("stale_mtime");
    let vault = ctx.temp_dir.join("vault");
    let remote = ctx.temp_dir.join("remote");
    ctx.write("vault/canary/awooken.md", "awoo");
    ctx.write("vault/Index.md", "# Index");
    copy_tree(&vault, &remote).unwrap();

    set_mtime(&vault.join("canary/awooken.md"), 1_700_000_000);
    set_mtime(&remote.join("canary/awooken.md"), 1_700_000_100);

    let err = assert_converged(&vault, &remote, SyncDirection::Push).unwrap_err();
    assert!(err.is_assertion(), "{}", err);
}

#[test]
#[ignore = "requires copyparty on PATH"]
fn test_check_server() {
    let output = Command::new(env!("CARGO_BIN_EXE_sync-harness"))
        .arg("check-server")
        .current_dir(integration_dir())
        .output()
        .expect("Failed to run sync-harness");
    assert!(
        output.status.success(),
        "check-server failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
#[ignore = "requires the desktop application, a driver and copyparty"]
fn test_full_suite() {
    let output = Command::new(env!("CARGO_BIN_EXE_sync-harness"))
        .args(["run", "scenarios", "--verbose"])
        .current_dir(integration_dir())
        .output()
        .expect("Failed to run sync-harness");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "suite failed:\n{}", stdout);
    assert!(stdout.contains("0 failed"), "{}", stdout);
}
