//! Pipeline orchestrator.
//!
//! Coordinates one invocation: load and validate the inventory, resolve the
//! fleet, derive every tunnel (the only fleet-wide barrier), then fan out per
//! router: compile policy, render, validate and converge. A failing router is
//! reported and skipped as a whole; the others proceed.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::config_loader::load_inventory;
use crate::converge::{self, ApplyOutcome, HostPlan};
use crate::error::{CompileError, SchemaError, Violation};
use crate::gate::validate_artifacts;
use crate::ip::{derive_fleet, Derivation};
use crate::policy::compile_router;
use crate::process::CommandRunner;
use crate::render::{render_router, ArtifactCategory};
use crate::topology::{resolve, Fleet, Router};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Render, validate and diff without touching the deploy root
    Plan,
    /// Render, validate and converge
    Apply,
    /// Write rendered artifacts to an output directory, no validation
    Render,
}

/// Which hosts and artifact categories a run considers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Hosts to process; empty means all
    pub limit: Vec<String>,
    /// Categories to process; empty means all
    pub tags: Vec<ArtifactCategory>,
}

impl Scope {
    pub fn categories(&self) -> Vec<ArtifactCategory> {
        if self.tags.is_empty() {
            return ArtifactCategory::ALL.to_vec();
        }
        let tags: BTreeSet<ArtifactCategory> = self.tags.iter().copied().collect();
        tags.into_iter().collect()
    }

    pub fn includes_host(&self, host: &str) -> bool {
        self.limit.is_empty() || self.limit.iter().any(|h| h == host)
    }

    /// Every `--limit` entry must name a router of the fleet
    fn check_hosts(&self, fleet: &Fleet) -> Result<(), SchemaError> {
        let unknown: Vec<Violation> = self
            .limit
            .iter()
            .filter(|h| fleet.router(h).is_none())
            .map(|h| Violation::new("--limit", format!("unknown host '{}'", h)))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::new(unknown))
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub inventory: PathBuf,
    pub mode: Mode,
    pub scope: Scope,
    /// Root under which `{host}/{artifact path}` is deployed
    pub deploy_root: PathBuf,
    /// Destination of `render`
    pub output: PathBuf,
}

/// Outcome of one router's pipeline
#[derive(Debug, Serialize)]
pub struct HostReport {
    pub host: String,
    /// Rendered artifacts in scope
    pub artifacts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<HostPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<ApplyOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exit_code: i32,
}

impl HostReport {
    fn failed(host: &str, err: &CompileError) -> Self {
        HostReport {
            host: host.to_string(),
            artifacts: 0,
            plan: None,
            applied: None,
            error: Some(err.to_string()),
            exit_code: err.exit_code(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub hosts: Vec<HostReport>,
}

impl RunReport {
    /// Highest-numbered failure class across hosts, 0 if all succeeded
    pub fn exit_code(&self) -> i32 {
        self.hosts.iter().map(|h| h.exit_code).max().unwrap_or(0)
    }

    pub fn failed_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|h| h.exit_code != 0)
            .map(|h| h.host.as_str())
            .collect()
    }

    /// Human-readable summary for the terminal
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for host in &self.hosts {
            if let Some(err) = &host.error {
                let _ = writeln!(out, "{}: FAILED\n{}", host.host, indent(err));
                continue;
            }
            match (&host.plan, &host.applied) {
                (_, Some(applied)) => {
                    let _ = writeln!(
                        out,
                        "{}: {} written, {} removed, {} reload(s)",
                        host.host,
                        applied.written,
                        applied.removed,
                        applied.reloads.len()
                    );
                    for action in &applied.reloads {
                        let _ = writeln!(out, "  -> {}", action);
                    }
                }
                (Some(plan), None) => {
                    let _ = writeln!(
                        out,
                        "{}: {} change(s), {} unchanged",
                        host.host,
                        plan.changes.len(),
                        plan.unchanged
                    );
                    for change in &plan.changes {
                        let _ = writeln!(out, "  {:?} {}", change.kind, change.path.display());
                        if !change.diff.is_empty() {
                            out.push_str(&indent(&change.diff));
                        }
                    }
                    for action in &plan.actions {
                        let _ = writeln!(out, "  -> {}", action);
                    }
                }
                (None, None) => {
                    let _ = writeln!(out, "{}: {} artifact(s) rendered", host.host, host.artifacts);
                }
            }
        }
        out
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {}\n", l)).collect()
}

/// Run one invocation. `Err` only for fleet-wide failures (schema); per-host
/// failures are carried in the report.
pub fn run(options: &RunOptions, runner: &dyn CommandRunner) -> Result<RunReport, CompileError> {
    let inventory = load_inventory(&options.inventory)?;
    let fleet = resolve(inventory)?;
    options.scope.check_hosts(&fleet)?;

    let derivation = derive_fleet(&fleet);

    let routers: Vec<&Router> = fleet
        .routers
        .values()
        .filter(|r| options.scope.includes_host(&r.name))
        .collect();
    let categories = options.scope.categories();

    let hosts: Vec<HostReport> = routers
        .par_iter()
        .map(|router| match run_host(options, &fleet, &derivation, router, &categories, runner) {
            Ok(report) => report,
            Err(err) => {
                error!("{}", err);
                HostReport::failed(&router.name, &err)
            }
        })
        .collect();

    let report = RunReport {
        mode: options.mode,
        hosts,
    };
    let failed = report.failed_hosts();
    if failed.is_empty() {
        info!("Completed {:?} for {} router(s)", options.mode, report.hosts.len());
    } else {
        warn!("{} router(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(report)
}

fn run_host(
    options: &RunOptions,
    fleet: &Fleet,
    derivation: &Derivation,
    router: &Router,
    categories: &[ArtifactCategory],
    runner: &dyn CommandRunner,
) -> Result<HostReport, CompileError> {
    let host = router.name.as_str();

    let failures = derivation.errors_for(host);
    if !failures.is_empty() {
        return Err(CompileError::Derivation {
            router: host.to_string(),
            errors: failures.to_vec(),
        });
    }

    let policy = compile_router(fleet, router).map_err(|errors| CompileError::Policy {
        router: host.to_string(),
        errors,
    })?;

    let artifacts: Vec<_> = render_router(fleet, router, derivation, &policy)
        .into_iter()
        .filter(|a| categories.contains(&a.category))
        .collect();
    let mut report = HostReport {
        host: host.to_string(),
        artifacts: artifacts.len(),
        plan: None,
        applied: None,
        error: None,
        exit_code: 0,
    };

    if options.mode == Mode::Render {
        write_rendered(&options.output, host, &artifacts)?;
        info!("{}: rendered {} artifact(s)", host, artifacts.len());
        return Ok(report);
    }

    let rejected = validate_artifacts(host, router.os_family, &artifacts, &fleet.validation, runner)?;
    if !rejected.is_empty() {
        return Err(CompileError::Validation {
            router: host.to_string(),
            errors: rejected,
        });
    }

    let plan = converge::plan_host(&options.deploy_root, host, &artifacts, categories)?;
    if options.mode == Mode::Apply {
        if plan.is_empty() {
            info!("{}: up to date", host);
        }
        let outcome = converge::apply_plan(&options.deploy_root, &plan, &fleet.reload, router.os_family, runner)?;
        report.applied = Some(outcome);
    }
    report.plan = Some(plan);
    Ok(report)
}

fn write_rendered(output: &Path, host: &str, artifacts: &[crate::render::Artifact]) -> Result<(), CompileError> {
    let root = output.join(host);
    for artifact in artifacts {
        let path = root.join(&artifact.path);
        converge::state::write_atomic(&path, &artifact.content).map_err(|e| CompileError::io(&path, e))?;
    }
    Ok(())
}
