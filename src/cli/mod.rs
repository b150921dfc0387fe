//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

use std::path::Path;
use std::time::Duration;

use colored::Colorize;

use crate::bridge::SettingsObject;
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{logging, Error, Result};
use crate::fixtures::{RemoteStore, TeardownStrategy};
use crate::oracle::{compare_trees, DirectoryComparison};
use crate::setup;
use crate::testing::{self, TestScenario};

/// Landing text the remote store shows anonymous visitors
pub const ANONYMOUS_LANDING_TEXT: &str = "howdy stranger";

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Settings => {
            let config = Config::load(config_path)?;
            let settings = SettingsObject::for_server(&config.remote.base_url);
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }

        Commands::Compare { left, right, json } => {
            let comparison = compare_trees(&left, &right)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            } else {
                print_comparison(&left, &right, &comparison);
            }
            if comparison.diff_files.is_empty() {
                Ok(())
            } else {
                Err(Error::assertion(format!(
                    "{} file(s) differ",
                    comparison.diff_files.len()
                )))
            }
        }

        Commands::Driver { version } => {
            let mut config = Config::load(config_path)?;
            if version.is_some() {
                config.driver.version = version;
            }
            let path = setup::ensure_driver(&config).await?;
            println!("{}", path.display());
            Ok(())
        }

        Commands::CheckServer => {
            let config = Config::load(config_path)?;
            check_server(&config).await
        }

        Commands::Run {
            paths,
            verbose,
            filter,
        } => {
            // Scenario runs own their subscriber so the log lands next to the screenshots
            let config = Config::load(config_path)?;
            let artifacts = config.resolve(&config.artifacts.dir);
            let _guard = logging::init_run(&artifacts).map(|(guard, path)| {
                println!("Logging to {}", path.display().to_string().dimmed());
                guard
            });
            run_scenarios(&config, &paths, verbose, filter.as_deref()).await
        }
    }
}

async fn run_scenarios(
    config: &Config,
    paths: &[std::path::PathBuf],
    verbose: bool,
    filter: Option<&str>,
) -> Result<()> {
    let files = testing::discover_scenarios(paths)?;
    let mut results = Vec::new();

    for file in files {
        if let Some(filter) = filter {
            let scenario = TestScenario::load(&file)?;
            if !scenario.name.contains(filter) {
                continue;
            }
        }
        let result = testing::run_scenario(&file, config, verbose).await?;
        if let Some(error) = &result.error {
            println!("  {} {}", "Error:".red().bold(), error);
        }
        results.push(result);
    }

    let passed = results.iter().filter(|r| r.passed && !r.skipped).count();
    let skipped = results.iter().filter(|r| r.skipped).count();
    let failed: Vec<_> = results.iter().filter(|r| !r.passed).collect();

    println!(
        "{} {} passed, {} failed, {} skipped",
        "Summary:".bold(),
        passed.to_string().green(),
        failed.len().to_string().red(),
        skipped.to_string().yellow()
    );
    for result in &failed {
        println!(
            "  {} {} (step {}/{})",
            "✗".red(),
            result.name,
            result.steps_run,
            result.steps_total
        );
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::assertion(format!("{} scenario(s) failed", failed.len())))
    }
}

async fn check_server(config: &Config) -> Result<()> {
    let mut store = RemoteStore::start(config).await?;
    let outcome = probe_landing_page(store.base_url()).await;
    store
        .release(&TeardownStrategy::current(Duration::from_millis(
            config.remote.kill_wait_ms,
        )))
        .await;
    outcome?;
    println!("{} remote store answered at {}", "✓".green(), config.remote.base_url);
    Ok(())
}

async fn probe_landing_page(base_url: &str) -> Result<()> {
    let response = reqwest::get(base_url).await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(Error::ServerStartFailed(format!(
            "{} answered with HTTP {}",
            base_url, status
        )));
    }
    if !body.contains(ANONYMOUS_LANDING_TEXT) {
        return Err(Error::ServerStartFailed(format!(
            "{} did not serve the anonymous landing page",
            base_url
        )));
    }
    Ok(())
}

fn print_comparison(left: &Path, right: &Path, cmp: &DirectoryComparison) {
    println!("{} {}", "Left: ".bold(), left.display());
    println!("{} {}", "Right:".bold(), right.display());

    let section = |title: &str, items: &std::collections::BTreeSet<String>| {
        if items.is_empty() {
            return;
        }
        println!("\n{}", title.cyan());
        for item in items {
            println!("  {}", item);
        }
    };

    let same: std::collections::BTreeSet<String> = cmp.same_files().cloned().collect();
    section("Identical files:", &same);
    section("Common directories:", &cmp.common_dirs);
    if !cmp.diff_files.is_empty() {
        println!("\n{}", "Differing files:".red());
        for item in &cmp.diff_files {
            println!("  {}", item.red());
        }
    }
    section("Only left:", &cmp.left_only);
    section("Only right:", &cmp.right_only);
}
