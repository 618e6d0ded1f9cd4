//! Convergence and diff engine.
//!
//! A [`HostPlan`] compares one host's rendered artifacts with what is
//! deployed under the deploy root and lists the changes and the reload
//! actions they trigger. [`apply_plan`] performs it: atomic writes, stale
//! file removal, then reloads. Any failure restores the files replaced so far.

pub mod actions;
pub mod diff;
pub mod state;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{CommandTable, OsFamily, Secret};
use crate::error::ConvergenceError;
use crate::process::CommandRunner;
use crate::render::{Artifact, ArtifactCategory};

pub use actions::ReloadAction;
pub use diff::{content_hash, render_diff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Remove,
}

/// One file that differs from what is deployed
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub category: ArtifactCategory,
    pub path: PathBuf,
    pub unit: String,
    pub old_hash: Option<String>,
    pub new_hash: Option<String>,
    /// Redacted line diff
    pub diff: String,
    /// New content; absent for removals
    #[serde(skip)]
    content: Option<Secret>,
}

/// Everything `apply` would do on one host
#[derive(Debug, Clone, Serialize)]
pub struct HostPlan {
    pub host: String,
    pub changes: Vec<Change>,
    pub actions: Vec<ReloadAction>,
    /// Artifacts in scope whose deployed copy already matches
    pub unchanged: usize,
}

impl HostPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compare rendered artifacts with the deployed state of `host`.
///
/// Only artifacts in `categories` are considered; managed files in those
/// categories that are no longer rendered are planned for removal.
pub fn plan_host(
    deploy_root: &Path,
    host: &str,
    artifacts: &[Artifact],
    categories: &[ArtifactCategory],
) -> Result<HostPlan, ConvergenceError> {
    let root = state::host_root(deploy_root, host);
    let read_error = |path: &Path, source: std::io::Error| ConvergenceError::Read {
        host: host.to_string(),
        path: path.to_path_buf(),
        source,
    };

    let mut changes = Vec::new();
    let mut unchanged = 0;
    let mut rendered = BTreeSet::new();

    for artifact in artifacts.iter().filter(|a| categories.contains(&a.category)) {
        rendered.insert(artifact.path.clone());
        let abs = root.join(&artifact.path);
        let deployed = state::read_deployed(&abs).map_err(|e| read_error(&abs, e))?;
        let new_hash = content_hash(&artifact.content);
        let old_hash = deployed.as_deref().map(content_hash);

        if old_hash.as_deref() == Some(new_hash.as_str()) {
            unchanged += 1;
            continue;
        }
        let kind = if deployed.is_some() {
            ChangeKind::Update
        } else {
            ChangeKind::Create
        };
        changes.push(Change {
            kind,
            category: artifact.category,
            path: artifact.path.clone(),
            unit: artifact.unit.clone(),
            diff: render_diff(deployed.as_deref().unwrap_or(""), &artifact.content),
            old_hash,
            new_hash: Some(new_hash),
            content: Some(Secret::new(artifact.content.clone())),
        });
    }

    let managed = state::managed_files(&root, categories).map_err(|e| read_error(&root, e))?;
    for path in managed.into_iter().filter(|p| !rendered.contains(p)) {
        let Some(category) = ArtifactCategory::of_path(&path) else {
            continue;
        };
        let abs = root.join(&path);
        let deployed = state::read_deployed(&abs).map_err(|e| read_error(&abs, e))?;
        changes.push(Change {
            kind: ChangeKind::Remove,
            category,
            unit: state::unit_from_path(category, &path),
            old_hash: deployed.as_deref().map(content_hash),
            new_hash: None,
            diff: render_diff(deployed.as_deref().unwrap_or(""), ""),
            path,
            content: None,
        });
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    let actions: BTreeSet<ReloadAction> = changes
        .iter()
        .map(|c| ReloadAction::for_change(c.category, &c.unit, c.kind == ChangeKind::Remove))
        .collect();

    Ok(HostPlan {
        host: host.to_string(),
        changes,
        actions: actions.into_iter().collect(),
        unchanged,
    })
}

/// Result of applying one host's plan
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub host: String,
    pub written: usize,
    pub removed: usize,
    pub reloads: Vec<ReloadAction>,
}

/// Apply a plan: write and remove files, then run reload actions in order.
/// On failure every file touched so far is put back as it was.
pub fn apply_plan(
    deploy_root: &Path,
    plan: &HostPlan,
    reload: &CommandTable,
    os_family: OsFamily,
    runner: &dyn CommandRunner,
) -> Result<ApplyOutcome, ConvergenceError> {
    let host = plan.host.as_str();
    let root = state::host_root(deploy_root, host);

    // Previous content of every touched path, for rollback
    let mut backups: BTreeMap<PathBuf, Option<String>> = BTreeMap::new();
    let mut written = 0;
    let mut removed = 0;

    for change in &plan.changes {
        let abs = root.join(&change.path);
        let previous = match state::read_deployed(&abs) {
            Ok(previous) => previous,
            Err(source) => {
                restore(&root, &backups);
                return Err(ConvergenceError::Read {
                    host: host.to_string(),
                    path: change.path.clone(),
                    source,
                });
            }
        };
        backups.insert(change.path.clone(), previous);

        let result = match &change.content {
            Some(content) => state::write_atomic(&abs, content.expose()),
            None => state::remove(&abs),
        };
        if let Err(source) = result {
            restore(&root, &backups);
            return Err(ConvergenceError::Write {
                host: host.to_string(),
                path: change.path.clone(),
                source,
            });
        }
        match change.kind {
            ChangeKind::Remove => removed += 1,
            _ => written += 1,
        }
        debug!("{}: {:?} {}", host, change.kind, change.path.display());
    }

    let mut completed: Vec<ReloadAction> = Vec::new();
    for action in &plan.actions {
        let cmd = action.command(reload, os_family, host);
        if let Err(message) = runner.run(&cmd) {
            warn!("{}: {} failed, restoring previous artifacts", host, action);
            restore(&root, &backups);
            // Bring daemons that already reloaded back onto the restored files
            for done in &completed {
                let undo = rollback_action(done, plan, &backups);
                if let Err(e) = runner.run(&undo.command(reload, os_family, host)) {
                    warn!("{}: {} after rollback failed: {}", host, undo, e);
                }
            }
            return Err(ConvergenceError::Reload {
                host: host.to_string(),
                action: action.to_string(),
                message: message.trim().to_string(),
            });
        }
        info!("{}: {}", host, action);
        completed.push(action.clone());
    }

    Ok(ApplyOutcome {
        host: host.to_string(),
        written,
        removed,
        reloads: completed,
    })
}

/// Action matching the restored state of whatever `done` acted on. A tunnel
/// created in this apply is gone again and is stopped; one removed in this
/// apply is back and is restarted.
fn rollback_action(
    done: &ReloadAction,
    plan: &HostPlan,
    backups: &BTreeMap<PathBuf, Option<String>>,
) -> ReloadAction {
    let interface = match done {
        ReloadAction::RestartTunnel { interface } | ReloadAction::StopTunnel { interface } => interface,
        _ => return done.clone(),
    };
    let restored = plan
        .changes
        .iter()
        .find(|c| c.category == ArtifactCategory::Wireguard && &c.unit == interface)
        .and_then(|c| backups.get(&c.path));
    match restored {
        Some(None) => ReloadAction::StopTunnel {
            interface: interface.clone(),
        },
        Some(Some(_)) => ReloadAction::RestartTunnel {
            interface: interface.clone(),
        },
        None => done.clone(),
    }
}

/// Put every backed-up path back to its previous state. Best effort.
fn restore(root: &Path, backups: &BTreeMap<PathBuf, Option<String>>) {
    for (path, previous) in backups {
        let abs = root.join(path);
        let result = match previous {
            Some(content) => state::write_atomic(&abs, content),
            None => state::remove(&abs),
        };
        if let Err(e) = result {
            warn!("failed to restore {}: {}", abs.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockRunner;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = "# Managed by dn42gen. Do not edit.\n";

    fn wg(iface: &str, port: u16) -> Artifact {
        Artifact::new(
            ArtifactCategory::Wireguard,
            format!("etc/wireguard/{}.conf", iface),
            iface,
            format!("{}[Interface]\nListenPort = {}\n", HEADER, port),
        )
    }

    fn frr(body: &str) -> Artifact {
        Artifact::new(
            ArtifactCategory::Frr,
            "etc/frr/frr.conf",
            "frr",
            format!("! Managed by dn42gen. Do not edit.\n{}", body),
        )
    }

    #[test]
    fn test_first_apply_then_idempotent() {
        let temp = TempDir::new().unwrap();
        let artifacts = vec![wg("wg-ewr-lhr", 5323), frr("hostname lhr-r001\n")];
        let runner = MockRunner::new();

        let plan = plan_host(temp.path(), "lhr-r001", &artifacts, &ArtifactCategory::ALL).unwrap();
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.iter().all(|c| c.kind == ChangeKind::Create));
        assert_eq!(
            plan.actions,
            vec![
                ReloadAction::RestartTunnel {
                    interface: "wg-ewr-lhr".to_string()
                },
                ReloadAction::ReloadRoutingDaemon
            ]
        );

        let outcome = apply_plan(temp.path(), &plan, &CommandTable::default(), OsFamily::Debian, &runner).unwrap();
        assert_eq!(outcome.written, 2);
        assert_eq!(runner.executed_commands().len(), 2);

        let again = plan_host(temp.path(), "lhr-r001", &artifacts, &ArtifactCategory::ALL).unwrap();
        assert!(again.is_empty());
        assert!(again.actions.is_empty());
        assert_eq!(again.unchanged, 2);
    }

    #[test]
    fn test_only_changed_tunnel_restarts() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let first = vec![wg("wg-ewr-lhr", 5323), wg("wg-lhr-sea", 5400), frr("hostname lhr-r001\n")];
        let plan = plan_host(temp.path(), "lhr-r001", &first, &ArtifactCategory::ALL).unwrap();
        apply_plan(temp.path(), &plan, &CommandTable::default(), OsFamily::Debian, &runner).unwrap();
        runner.clear();

        let second = vec![wg("wg-ewr-lhr", 5323), wg("wg-lhr-sea", 5401), frr("hostname lhr-r001\n")];
        let plan = plan_host(temp.path(), "lhr-r001", &second, &ArtifactCategory::ALL).unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert!(plan.changes[0].diff.contains("+ListenPort = 5401"));
        apply_plan(temp.path(), &plan, &CommandTable::default(), OsFamily::Debian, &runner).unwrap();
        assert_eq!(runner.executed_commands(), vec!["systemctl restart wg-quick@wg-lhr-sea"]);
    }

    #[test]
    fn test_stale_managed_file_removed_and_stopped() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let root = temp.path().join("lhr-r001");
        state::write_atomic(&root.join("etc/wireguard/wg-lhr-old.conf"), HEADER).unwrap();
        state::write_atomic(&root.join("etc/wireguard/wg-manual.conf"), "[Interface]\n").unwrap();

        let plan = plan_host(temp.path(), "lhr-r001", &[wg("wg-ewr-lhr", 5323)], &[ArtifactCategory::Wireguard]).unwrap();
        let removal = plan.changes.iter().find(|c| c.kind == ChangeKind::Remove).unwrap();
        assert_eq!(removal.path, PathBuf::from("etc/wireguard/wg-lhr-old.conf"));
        assert!(plan.actions.contains(&ReloadAction::StopTunnel {
            interface: "wg-lhr-old".to_string()
        }));

        apply_plan(temp.path(), &plan, &CommandTable::default(), OsFamily::Debian, &runner).unwrap();
        assert!(!root.join("etc/wireguard/wg-lhr-old.conf").exists());
        assert!(root.join("etc/wireguard/wg-manual.conf").exists());
    }

    #[test]
    fn test_tags_leave_other_categories_untouched() {
        let temp = TempDir::new().unwrap();
        let artifacts = vec![wg("wg-ewr-lhr", 5323), frr("hostname lhr-r001\n")];
        let plan = plan_host(temp.path(), "lhr-r001", &artifacts, &[ArtifactCategory::Frr]).unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].category, ArtifactCategory::Frr);
        assert_eq!(plan.actions, vec![ReloadAction::ReloadRoutingDaemon]);
    }

    #[test]
    fn test_reload_failure_restores_previous_state() {
        let temp = TempDir::new().unwrap();
        let ok = MockRunner::new();
        let before = vec![wg("wg-ewr-lhr", 5323), frr("hostname lhr-r001\n")];
        let plan = plan_host(temp.path(), "lhr-r001", &before, &ArtifactCategory::ALL).unwrap();
        apply_plan(temp.path(), &plan, &CommandTable::default(), OsFamily::Debian, &ok).unwrap();

        let failing = MockRunner::new().fail_on("reload frr", "frr: reload failed");
        let after = vec![wg("wg-ewr-lhr", 5324), frr("hostname lhr-r002\n"), wg("wg-lhr-sea", 5400)];
        let plan = plan_host(temp.path(), "lhr-r001", &after, &ArtifactCategory::ALL).unwrap();
        let err = apply_plan(temp.path(), &plan, &CommandTable::default(), OsFamily::Debian, &failing).unwrap_err();
        assert!(matches!(err, ConvergenceError::Reload { .. }));

        let root = temp.path().join("lhr-r001");
        let wg_now = fs::read_to_string(root.join("etc/wireguard/wg-ewr-lhr.conf")).unwrap();
        assert!(wg_now.contains("ListenPort = 5323"));
        let frr_now = fs::read_to_string(root.join("etc/frr/frr.conf")).unwrap();
        assert!(frr_now.contains("hostname lhr-r001"));
        assert!(!root.join("etc/wireguard/wg-lhr-sea.conf").exists());

        // Tunnels restarted before the failure are restarted again on the restored files
        assert_eq!(failing.commands_matching("wg-quick@wg-ewr-lhr").len(), 2);
        // and the one created by this apply is taken down with its file
        assert_eq!(
            failing.commands_matching("wg-quick@wg-lhr-sea"),
            vec![
                "systemctl restart wg-quick@wg-lhr-sea",
                "systemctl stop wg-quick@wg-lhr-sea"
            ]
        );
    }
}
