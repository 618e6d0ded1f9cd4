//! Validation gate.
//!
//! Every rendered artifact is written to a scratch directory and checked with
//! the dry-run tool of its category before convergence may touch the host.
//! A category without a command is skipped with a warning.

use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::config::{CommandTable, OsFamily};
use crate::error::{CompileError, ValidationError};
use crate::process::CommandRunner;
use crate::render::{Artifact, ArtifactCategory};

pub const DEFAULT_FRR_CHECK: &str = "vtysh --dryrun --inputfile {file}";
pub const DEFAULT_WIREGUARD_CHECK: &str = "wg-quick strip {file}";
pub const DEFAULT_IFUPDOWN_CHECK: &str = "ifup --no-act --interfaces={file} -a";

/// Built-in dry-run command; systemd-networkd units have none
pub fn default_command(category: ArtifactCategory, os_family: OsFamily) -> Option<&'static str> {
    match (category, os_family) {
        (ArtifactCategory::Frr, _) => Some(DEFAULT_FRR_CHECK),
        (ArtifactCategory::Wireguard, _) => Some(DEFAULT_WIREGUARD_CHECK),
        (ArtifactCategory::Network, OsFamily::Debian) => Some(DEFAULT_IFUPDOWN_CHECK),
        (ArtifactCategory::Network, OsFamily::Systemd) => None,
    }
}

/// Command for `category`: the configured one, else the default. An empty
/// configured string disables validation for the category.
pub fn command_for(table: &CommandTable, category: ArtifactCategory, os_family: OsFamily) -> Option<String> {
    let configured = match category {
        ArtifactCategory::Wireguard => &table.wireguard,
        ArtifactCategory::Frr => &table.frr,
        ArtifactCategory::Network => &table.network,
    };
    match configured {
        Some(cmd) if cmd.trim().is_empty() => None,
        Some(cmd) => Some(cmd.clone()),
        None => default_command(category, os_family).map(str::to_string),
    }
}

/// Fill `{file}` and `{host}` placeholders
pub fn substitute(template: &str, file: &Path, host: &str) -> String {
    template
        .replace("{file}", &file.display().to_string())
        .replace("{host}", host)
}

/// Dry-run every artifact of one host. Returns every rejection, not just the first.
pub fn validate_artifacts(
    host: &str,
    os_family: OsFamily,
    artifacts: &[Artifact],
    commands: &CommandTable,
    runner: &dyn CommandRunner,
) -> Result<Vec<ValidationError>, CompileError> {
    let scratch = tempfile::Builder::new()
        .prefix("dn42gen-gate-")
        .tempdir()
        .map_err(|e| CompileError::io(std::env::temp_dir(), e))?;

    let mut errors = Vec::new();
    let mut skipped = Vec::new();

    for artifact in artifacts {
        let Some(template) = command_for(commands, artifact.category, os_family) else {
            if !skipped.contains(&artifact.category) {
                skipped.push(artifact.category);
            }
            continue;
        };

        // Validators key off the file name (wg-quick wants `<iface>.conf`)
        let file_name = artifact
            .path
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| artifact.unit.clone().into());
        let dir = scratch.path().join(artifact.category.name());
        fs::create_dir_all(&dir).map_err(|e| CompileError::io(&dir, e))?;
        let file = dir.join(file_name);
        fs::write(&file, &artifact.content).map_err(|e| CompileError::io(&file, e))?;

        let cmd = substitute(&template, &file, host);
        match runner.run(&cmd) {
            Ok(_) => debug!("{}: {} passed validation", host, artifact.path.display()),
            Err(message) => errors.push(ValidationError {
                host: host.to_string(),
                category: artifact.category,
                path: artifact.path.clone(),
                message: message.trim().to_string(),
            }),
        }
    }

    for category in skipped {
        warn!(
            "{}: no validation command for {} artifacts, skipping dry-run",
            host, category
        );
    }
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockRunner;

    fn artifacts() -> Vec<Artifact> {
        vec![
            Artifact::new(
                ArtifactCategory::Wireguard,
                "etc/wireguard/wg-ewr-lhr.conf",
                "wg-ewr-lhr",
                "[Interface]\n".to_string(),
            ),
            Artifact::new(
                ArtifactCategory::Frr,
                "etc/frr/frr.conf",
                "frr",
                "hostname lhr-r001\n".to_string(),
            ),
            Artifact::new(
                ArtifactCategory::Network,
                "etc/systemd/network/50-dn42.netdev",
                "dn42",
                "[NetDev]\n".to_string(),
            ),
        ]
    }

    #[test]
    fn test_defaults_per_category() {
        let table = CommandTable::default();
        assert_eq!(
            command_for(&table, ArtifactCategory::Frr, OsFamily::Debian).as_deref(),
            Some(DEFAULT_FRR_CHECK)
        );
        assert_eq!(command_for(&table, ArtifactCategory::Network, OsFamily::Systemd), None);

        let disabled = CommandTable {
            frr: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(command_for(&disabled, ArtifactCategory::Frr, OsFamily::Debian), None);
    }

    #[test]
    fn test_validator_sees_artifact_file_name() {
        let runner = MockRunner::new();
        let errors = validate_artifacts(
            "lhr-r001",
            OsFamily::Systemd,
            &artifacts(),
            &CommandTable::default(),
            &runner,
        )
        .unwrap();
        assert!(errors.is_empty());

        let commands = runner.executed_commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("wg-quick strip "));
        assert!(commands[0].ends_with("/wireguard/wg-ewr-lhr.conf"));
        assert!(commands[1].starts_with("vtysh --dryrun --inputfile "));
    }

    #[test]
    fn test_rejection_carries_tool_output() {
        let runner = MockRunner::new().fail_on("vtysh", "line 1: % Unknown command: hostnme");
        let table = CommandTable {
            network: Some("check-net {host} {file}".to_string()),
            ..Default::default()
        };
        let errors = validate_artifacts("lhr-r001", OsFamily::Systemd, &artifacts(), &table, &runner).unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, ArtifactCategory::Frr);
        assert_eq!(errors[0].path, Path::new("etc/frr/frr.conf"));
        assert!(errors[0].message.contains("Unknown command"));
        assert_eq!(runner.commands_matching("check-net lhr-r001 ").len(), 1);
    }
}
