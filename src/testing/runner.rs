//! Test runner implementation
//!
//! Executes test scenarios inside a fixture scope, so the vault, the remote
//! store and the application are torn down however the scenario ends.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use colored::Colorize;
use serde_json::Value;

use crate::app;
use crate::bridge::{self, settings, SettingsObject};
use crate::common::config::Config;
use crate::common::paths::scenario_artifacts_dir;
use crate::common::{Error, Platform, Result};
use crate::fixtures::{scope, AppSession, Fixtures};
use crate::oracle::{self, FolderRemoval, SyncDirection};

use super::config::{Side, TestScenario, TestStep};

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub skipped: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

/// State carried between steps
struct StepContext<'a> {
    fixtures: &'a Fixtures,
    injected: Option<SettingsObject>,
    notices: Vec<String>,
    /// Direction of the last upload or download, `None` after other actions
    last_sync: Option<SyncDirection>,
    verbose: bool,
}

impl<'a> StepContext<'a> {
    fn app(&self) -> Result<&'a AppSession> {
        self.fixtures.app()
    }

    fn path(&self, side: Side, relative: &str) -> Result<PathBuf> {
        Ok(self.root(side)?.join(relative))
    }

    fn root(&self, side: Side) -> Result<PathBuf> {
        match side {
            Side::Vault => Ok(self.fixtures.vault()?.root().to_path_buf()),
            Side::Remote => self.fixtures.remote()?.root_vault_path(),
        }
    }
}

/// Run a test scenario from a YAML file
pub async fn run_scenario(path: &Path, config: &Config, verbose: bool) -> Result<TestResult> {
    let scenario = TestScenario::load(path)?;
    let steps_total = scenario.steps.len();

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    let platform = Platform::current();
    if scenario
        .skip_on
        .iter()
        .any(|name| Platform::from_name(name) == Some(platform))
    {
        println!("  {} skipped on {}", "-".yellow(), platform);
        return Ok(TestResult {
            name: scenario.name,
            passed: true,
            skipped: true,
            steps_run: 0,
            steps_total,
            error: None,
        });
    }

    let artifacts = scenario_artifacts_dir(&config.resolve(&config.artifacts.dir), &scenario.name);
    println!("\n{}", "Steps:".cyan());

    let progress = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&progress);
    let steps = scenario.steps;
    let outcome = scope(config, scenario.fixtures, artifacts, move |fixtures| {
        Box::pin(async move { run_steps(fixtures, &steps, &counter, verbose).await })
    })
    .await;

    let steps_run = progress.load(Ordering::SeqCst);
    match outcome {
        Ok(()) => {
            println!(
                "\n{} {}\n",
                "✓".green().bold(),
                "Test Passed".green().bold()
            );
            Ok(TestResult {
                name: scenario.name,
                passed: true,
                skipped: false,
                steps_run,
                steps_total,
                error: None,
            })
        }
        Err(e) => {
            if steps_run == 0 {
                println!("  {} Setup: {}", "✗".red(), e);
            }
            Ok(TestResult {
                name: scenario.name,
                passed: false,
                skipped: false,
                steps_run,
                steps_total,
                error: Some(e.to_string()),
            })
        }
    }
}

async fn run_steps(
    fixtures: &mut Fixtures,
    steps: &[TestStep],
    progress: &AtomicUsize,
    verbose: bool,
) -> Result<()> {
    let mut ctx = StepContext {
        fixtures,
        injected: None,
        notices: Vec::new(),
        last_sync: None,
        verbose,
    };

    for (i, step) in steps.iter().enumerate() {
        let step_num = i + 1;
        progress.store(step_num, Ordering::SeqCst);
        tracing::info!("Step {}: {}", step_num, step.describe());

        match execute_step(&mut ctx, step).await {
            Ok(()) => {
                println!(
                    "  {} Step {}: {}",
                    "✓".green(),
                    step_num,
                    step.describe().dimmed()
                );
            }
            Err(e) => {
                println!("  {} Step {}: {}", "✗".red(), step_num, e);
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Execute a single test step
async fn execute_step(ctx: &mut StepContext<'_>, step: &TestStep) -> Result<()> {
    match step {
        TestStep::InjectSettings { overrides } => {
            execute_inject_step(ctx, overrides.as_ref()).await
        }
        TestStep::ExtractSettings { expect } => execute_extract_step(ctx, expect.as_ref()).await,
        TestStep::WriteFile {
            side,
            path,
            content,
        } => {
            let path = ctx.path(*side, path)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, content)?;
            Ok(())
        }
        TestStep::Remove { side, path } => {
            let path = ctx.path(*side, path)?;
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
            Ok(())
        }
        TestStep::Wipe { side } => {
            // Recreate the root; a missing root is a different failure mode
            let root = ctx.root(*side)?;
            std::fs::remove_dir_all(&root)?;
            std::fs::create_dir_all(&root)?;
            Ok(())
        }
        TestStep::Upload => {
            ctx.notices = app::upload(ctx.app()?).await?;
            ctx.last_sync = Some(SyncDirection::Push);
            Ok(())
        }
        TestStep::Download => {
            ctx.notices = app::download(ctx.app()?).await?;
            ctx.last_sync = Some(SyncDirection::Pull);
            Ok(())
        }
        TestStep::TestConnection => {
            ctx.notices = app::test_connection(ctx.app()?).await?;
            ctx.last_sync = None;
            Ok(())
        }
        TestStep::ExpectNotice { contains, count } => {
            let matching = ctx.notices.iter().filter(|n| n.contains(contains.as_str())).count();
            let ok = match count {
                Some(expected) => matching == *expected,
                None => matching > 0,
            };
            if !ok {
                return Err(Error::assertion(format!(
                    "expected {} notice(s) containing '{}', notices were {:?}",
                    count.map(|c| c.to_string()).unwrap_or_else(|| "some".to_string()),
                    contains,
                    ctx.notices
                )));
            }
            Ok(())
        }
        TestStep::ExpectSingleNotice { contains } => {
            let notice = check_single_notice(ctx.last_sync, ctx.notices.clone(), contains)?;
            if ctx.verbose {
                println!("    notice: {}", notice.dimmed());
            }
            Ok(())
        }
        TestStep::CloseNotices => {
            app::close_notices(ctx.app()?).await?;
            ctx.notices.clear();
            Ok(())
        }
        TestStep::CloseSyncModal => app::close_sync_modal(ctx.app()?).await,
        TestStep::ExpectExists {
            side,
            path,
            present,
        } => {
            let full = ctx.path(*side, path)?;
            if full.exists() != *present {
                return Err(Error::assertion(format!(
                    "expected {} to be {}",
                    full.display(),
                    if *present { "present" } else { "absent" }
                )));
            }
            Ok(())
        }
        TestStep::ExpectTreesConverged { direction } => {
            let vault = ctx.root(Side::Vault)?;
            let remote = ctx.root(Side::Remote)?;
            oracle::assert_converged(&vault, &remote, *direction)
        }
        TestStep::ExpectFolderRemoved {
            removed,
            sibling,
            removed_count,
        } => {
            let vault = ctx.root(Side::Vault)?;
            let remote = ctx.root(Side::Remote)?;
            let expected = FolderRemoval {
                removed,
                sibling,
                removed_count: *removed_count,
            };
            oracle::verify_folder_removed(&vault, &remote, &expected, ctx.notices.clone())?;
            Ok(())
        }
        TestStep::ExpectSetting { label, present } => {
            let app = ctx.app()?;
            app::open_settings(app).await?;
            app::click_settings_nav(app).await?;
            match (app::find_setting(app, label).await, *present) {
                (Ok(_), true) => Ok(()),
                (Err(Error::ElementNotFound { .. }), false) => Ok(()),
                (Ok(_), false) => Err(Error::assertion(format!(
                    "setting '{}' should not be shown",
                    label
                ))),
                (Err(e), _) => Err(e),
            }
        }
        TestStep::ToggleSetting { label, key } => {
            let app = ctx.app()?;
            app::open_settings(app).await?;
            app::click_settings_nav(app).await?;
            let keys: Vec<&str> = key.iter().map(String::as_str).collect();
            let toggled = app::toggle_setting(app, label, &keys).await?;
            if !toggled.flipped() {
                return Err(Error::assertion(format!(
                    "toggling '{}' stored {} -> {}, expected the boolean to flip",
                    label, toggled.before, toggled.after
                )));
            }
            Ok(())
        }
        TestStep::Screenshot { label } => {
            app::screenshot(ctx.app()?, label).await;
            Ok(())
        }
        TestStep::Evaluate { expression, expect } => {
            let value = bridge::execute_value(ctx.app()?, expression).await?;
            if ctx.verbose {
                println!("    = {}", value.to_string().dimmed());
            }
            match expect {
                Some(expected) if !values_match(expected, &value) => Err(Error::assertion(
                    format!("'{}' evaluated to {}, expected {}", expression, value, expected),
                )),
                _ => Ok(()),
            }
        }
    }
}

async fn execute_inject_step(ctx: &mut StepContext<'_>, overrides: Option<&Value>) -> Result<()> {
    let base = SettingsObject::for_server(&ctx.fixtures.config().remote.base_url);
    let settings = match overrides {
        Some(patch) => base.merged(patch)?,
        None => base,
    };
    let app = ctx.app()?;
    bridge::inject_settings(app, app.plugin_id(), Some(&settings)).await?;
    ctx.injected = Some(settings);
    Ok(())
}

async fn execute_extract_step(ctx: &mut StepContext<'_>, expect: Option<&Value>) -> Result<()> {
    let app = ctx.app()?;
    let actual = settings::extract_settings_raw(app, app.plugin_id()).await?;
    let expected = match (expect, &ctx.injected) {
        (Some(value), _) => value.clone(),
        (None, Some(injected)) => serde_json::to_value(injected)?,
        (None, None) => serde_json::to_value(settings::default_settings())?,
    };
    if actual != expected {
        return Err(Error::assertion(format!(
            "live settings differ from what was injected:\n  expected {}\n  actual   {}",
            expected, actual
        )));
    }
    Ok(())
}

/// Exactly one notice containing `needle`, checked against the last sync
///
/// After an upload or download the notice must either be a refusal (when
/// `needle` names the blocked marker) or an error-free completion report for
/// that direction.
fn check_single_notice(
    last_sync: Option<SyncDirection>,
    notices: Vec<String>,
    needle: &str,
) -> Result<String> {
    let notice = oracle::notice::expect_single_containing(notices, needle)?;
    match last_sync {
        Some(_) if oracle::is_blocked(needle) => oracle::verify_blocked(vec![notice]),
        Some(direction) => {
            oracle::verify_completed(direction, vec![notice.clone()])?;
            Ok(notice)
        }
        None => Ok(notice),
    }
}

/// Compare an expected value from YAML with a script result
///
/// YAML integers and script numbers compare numerically, so `42` matches
/// `42.0`.
fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(e), Value::Number(a)) => e.as_f64() == a.as_f64(),
        _ => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_match_numbers_loosely() {
        assert!(values_match(&json!(42), &json!(42.0)));
        assert!(values_match(&json!("a"), &json!("a")));
        assert!(!values_match(&json!(42), &json!("42")));
    }

    #[test]
    fn test_single_notice_after_sync() {
        let pushed =
            "Push complete. 2 files were updated, and 0 stale folders were removed (0 errors).";
        let failed =
            "Push complete. 0 files were updated, and 0 stale folders were removed (3 errors).";

        let push = Some(SyncDirection::Push);
        check_single_notice(push, vec![pushed.to_string()], "Push complete").unwrap();
        assert!(check_single_notice(push, vec![failed.to_string()], "Push complete")
            .unwrap_err()
            .is_assertion());
        assert!(check_single_notice(
            Some(SyncDirection::Pull),
            vec![pushed.to_string()],
            "complete"
        )
        .is_err());
        assert!(
            check_single_notice(push, vec![pushed.to_string(), pushed.to_string()], "Push")
                .is_err()
        );

        let blocked = "Action blocked: the vault appears to have been wiped".to_string();
        check_single_notice(push, vec![blocked], "Action blocked").unwrap();
        assert!(check_single_notice(push, vec![pushed.to_string()], "Action blocked").is_err());
    }

    #[test]
    fn test_single_notice_outside_sync() {
        let connected = "Connection succeeded. Found folder with 4 direct files and folders.";
        check_single_notice(None, vec![connected.to_string()], "Connection succeeded").unwrap();
        assert!(check_single_notice(
            None,
            vec![connected.to_string(), connected.to_string()],
            "Connection succeeded"
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_skipped_scenario_touches_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("skip.yaml");
        std::fs::write(
            &path,
            format!(
                "name: skip me\nskip_on: [{}]\nfixtures: {{ app: true }}\nsteps:\n  - action: upload\n",
                Platform::current()
            ),
        )
        .unwrap();

        let result = run_scenario(&path, &Config::default(), false).await.unwrap();
        assert!(result.skipped && result.passed);
        assert_eq!(result.steps_run, 0);
    }

    #[tokio::test]
    async fn test_file_steps_without_app() {
        let tmp = tempfile::TempDir::new().unwrap();
        let template = tmp.path().join("template");
        std::fs::create_dir_all(template.join("canary")).unwrap();
        std::fs::write(template.join("canary/awooken.md"), "awoo").unwrap();
        let dist = tmp.path().join("dist");
        std::fs::create_dir_all(&dist).unwrap();

        let mut config = Config::default();
        config.workdir = tmp.path().to_path_buf();
        config.vault.template = template;
        config.app.plugin_dist = dist;

        let path = tmp.path().join("files.yaml");
        std::fs::write(
            &path,
            r#"
name: file steps
fixtures: { vault: true }
steps:
  - action: write_file
    path: notes/new.md
    content: hello
  - action: expect_exists
    path: notes/new.md
  - action: remove
    path: canary
  - action: expect_exists
    path: canary/awooken.md
    present: false
  - action: expect_exists
    path: notes/new.md
    present: false
"#,
        )
        .unwrap();

        let result = run_scenario(&path, &config, false).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.steps_run, 5);
        assert!(result.error.unwrap().contains("absent"));
        assert!(!tmp.path().join("test_vault").exists());
    }
}
