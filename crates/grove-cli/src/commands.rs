//! CLI command implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use grove_migrate::api::list_all_groups;
use grove_migrate::{
    plan_tree, ConsoleProgressReporter, GitLabClient, GroupRef, Migration, MigrationConfig,
    MigrationProgress, MigrationReport, PlannedAction, PlannedGroup, SourceApi, TargetApi,
};

use crate::settings::{self, Overrides};

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The run completed but some groups or projects failed.
    PartialFailure,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::PartialFailure => 2,
        }
    }

    fn from_report(report: &MigrationReport) -> Self {
        if report.is_successful() {
            Self::Success
        } else {
            Self::PartialFailure
        }
    }
}

fn clients(config: &MigrationConfig) -> Result<(GitLabClient, GitLabClient)> {
    let source = GitLabClient::new(&config.source, config.request_timeout())
        .context("failed to create source client")?;
    let target = GitLabClient::new(&config.target, config.request_timeout())
        .context("failed to create target client")?;
    Ok((source, target))
}

/// Replicate the group tree and migrate the projects.
pub async fn migrate(
    config_path: Option<&Path>,
    overrides: &Overrides,
    report_path: Option<&Path>,
) -> Result<Outcome> {
    let config = settings::load(config_path, overrides)?;
    let (source, target) = clients(&config)?;

    tracing::info!(
        source = %source.base_url(),
        target = %target.base_url(),
        root = %config.target_root,
        "Starting migration"
    );

    let source: Arc<dyn SourceApi> = Arc::new(source);
    let target: Arc<dyn TargetApi> = Arc::new(target);

    let reporter = ConsoleProgressReporter::new();
    let progress = MigrationProgress::with_callback(reporter.callback());
    let migration = Migration::new(source, target, config)?.with_progress(progress);

    let result = migration.run().await;
    reporter.finish(if result.is_ok() { "done" } else { "aborted" });
    let report = result.context("migration aborted")?;

    report.print_summary();

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("\nReport written to {}", path.display());
    }

    Ok(Outcome::from_report(&report))
}

/// Print what a migration would do with the current source tree.
pub async fn plan(config_path: Option<&Path>, overrides: &Overrides) -> Result<Outcome> {
    let config = settings::load(config_path, overrides)?;
    let (source, _) = clients(&config)?;

    let groups = list_all_groups(&source, config.per_page)
        .await
        .context("failed to list source groups")?;
    let filter = config.namespace_filter();
    let plan = plan_tree(&groups, &config.root_layout(), filter.as_ref());

    println!("Plan for {} source groups into {}\n", groups.len(), config.target_root);
    for line in &plan {
        println!("{}", render_plan_line(line));
    }

    let creates = plan
        .iter()
        .filter(|p| matches!(p.action, PlannedAction::Create { .. }))
        .count();
    let skipped = plan
        .iter()
        .filter(|p| matches!(p.action, PlannedAction::SkipPersonal | PlannedAction::SkipOrphaned))
        .count();
    println!("\n{creates} groups to create or reuse, {skipped} skipped");

    Ok(Outcome::Success)
}

fn render_plan_line(line: &PlannedGroup) -> String {
    match &line.action {
        PlannedAction::MergeIntoRoot => format!("  merge   {} -> (root)", line.source_path),
        PlannedAction::Create { target_path } => {
            format!("  create  {} -> {target_path}", line.source_path)
        }
        PlannedAction::SkipPersonal => format!("  skip    {} (personal)", line.source_path),
        PlannedAction::SkipOrphaned => format!("  skip    {} (parent not replicated)", line.source_path),
    }
}

/// Verify both tokens and that the instances answer.
pub async fn check(config_path: Option<&Path>) -> Result<Outcome> {
    let config = settings::load(config_path, &Overrides::default())?;
    let (source, target) = clients(&config)?;

    let source_user = source
        .current_user()
        .await
        .with_context(|| format!("source {} rejected the token", source.base_url()))?;
    let groups = source
        .list_groups(1, 1)
        .await
        .context("failed to list source groups")?;
    println!(
        "source  {}  authenticated as {source_user} ({} group(s) on first page)",
        source.base_url(),
        groups.items.len()
    );

    let target_user = target
        .current_user()
        .await
        .with_context(|| format!("target {} rejected the token", target.base_url()))?;
    let root = TargetApi::get_group(&target, &GroupRef::Path(config.target_root.clone()))
        .await
        .context("failed to look up target root")?;
    println!(
        "target  {}  authenticated as {target_user}, root {} {}",
        target.base_url(),
        config.target_root,
        if root.is_some() { "exists" } else { "will be created" }
    );

    Ok(Outcome::Success)
}
