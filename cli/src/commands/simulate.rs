// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Policy Chain Simulation Command
//!
//! Implements `warden simulate`, which runs every check of a YAML scenario
//! through one enforcer and one shared evaluation cache, then reports the
//! verdicts.
//!
//! # Usage
//!
//! ```bash
//! # Human-readable table
//! warden simulate scenario.yaml
//!
//! # Machine-readable report
//! warden simulate scenario.yaml --json
//! ```
//!
//! The command fails when any check's `expect` is not met, so scenarios can
//! double as regression suites for a policy set.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use warden_core::{EnforcerConfig, Enforcer, EvaluationCache};

use crate::scenario::{CheckReport, Scenario, Verdict};

#[derive(Args)]
pub struct SimulateCommand {
    /// Scenario file to run
    #[arg(value_name = "SCENARIO")]
    pub scenario: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(command: SimulateCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = EnforcerConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let scenario = Scenario::from_yaml_file(&command.scenario)
        .with_context(|| format!("Failed to read scenario {:?}", command.scenario))?;
    let compiled = scenario.compile().context("Failed to compile scenario")?;

    let enforcer = Enforcer::with_settings(Arc::new(EvaluationCache::new()), config.spec.clone());
    let reports = compiled.run(&enforcer)?;
    info!(
        checks = reports.len(),
        cached_decisions = enforcer.cache().len(),
        "Scenario simulated"
    );

    if command.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_reports(scenario.name.as_deref(), &reports);
    }

    let failed = reports.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        bail!("{} of {} checks did not meet their expectation", failed, reports.len());
    }

    Ok(())
}

fn print_reports(name: Option<&str>, reports: &[CheckReport]) {
    println!(
        "{}",
        format!("Scenario: {}", name.unwrap_or("(unnamed)")).bold()
    );
    println!();

    for report in reports {
        let verdict = match report.verdict {
            Verdict::Allow => report.verdict.to_string().green(),
            Verdict::Deny => report.verdict.to_string().yellow(),
            Verdict::Error => report.verdict.to_string().red(),
        };
        let status = if report.passed { "✓".green() } else { "✗".red() };
        let who = report.actor.as_deref().unwrap_or("-");

        println!(
            "  {} {:<6} {} ({} {} on {})",
            status, verdict, report.check, report.context, who, report.subject
        );
        if let Some(error) = &report.error {
            println!("      {}", error.dimmed());
        }
        if let (Some(expected), false) = (report.expected, report.passed) {
            println!("      expected {}", expected.to_string().bold());
        }
    }

    println!();
    let passed = reports.iter().filter(|r| r.passed).count();
    let summary = format!("{}/{} checks passed", passed, reports.len());
    if passed == reports.len() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red());
    }
}
