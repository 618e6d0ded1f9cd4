//! Deployed artifact state under the deploy root.
//!
//! Each host's files live at `{deploy_root}/{host}/{artifact path}`. Writes go
//! through a temporary file in the target directory and a rename, so readers
//! see either the old or the new content.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::render::{ArtifactCategory, MANAGED_MARKER};

pub fn host_root(deploy_root: &Path, host: &str) -> PathBuf {
    deploy_root.join(host)
}

/// Current content of a deployed file; `None` if it does not exist
pub fn read_deployed(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Replace `path` with `content` atomically
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "artifact path has no parent"))?;
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn remove(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Whether `content` carries the managed-file header in its first line
pub fn is_managed(content: &str) -> bool {
    content
        .lines()
        .next()
        .is_some_and(|line| line.contains(MANAGED_MARKER))
}

/// Managed files currently deployed for the given categories, as paths
/// relative to the host root, sorted
pub fn managed_files(host_root: &Path, categories: &[ArtifactCategory]) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for category in categories {
        for dir in category.directories() {
            let abs = host_root.join(dir);
            let entries = match fs::read_dir(&abs) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let path = entry.path();
                if read_deployed(&path)?.is_some_and(|c| is_managed(&c)) {
                    found.push(Path::new(dir).join(entry.file_name()));
                }
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Interface (or daemon) a deployed file configures, from its file name
pub fn unit_from_path(category: ArtifactCategory, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match category {
        ArtifactCategory::Wireguard => name.trim_end_matches(".conf").to_string(),
        ArtifactCategory::Frr => crate::render::frr::UNIT.to_string(),
        ArtifactCategory::Network => {
            let stem = name
                .trim_end_matches(".netdev")
                .trim_end_matches(".network");
            stem.strip_prefix("50-").unwrap_or(stem).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lhr-r001/etc/wireguard/wg-ewr-lhr.conf");
        write_atomic(&path, "# Managed by dn42gen. Do not edit.\n").unwrap();
        assert_eq!(read_deployed(&path).unwrap().as_deref(), Some("# Managed by dn42gen. Do not edit.\n"));

        write_atomic(&path, "replaced\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "replaced\n");
        assert_eq!(read_deployed(&temp.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn test_only_managed_files_are_listed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_atomic(&root.join("etc/wireguard/wg-ewr-lhr.conf"), "# Managed by dn42gen. Do not edit.\n").unwrap();
        write_atomic(&root.join("etc/wireguard/wg0.conf"), "[Interface]\n").unwrap();
        write_atomic(&root.join("etc/frr/frr.conf"), "! Managed by dn42gen. Do not edit.\n").unwrap();

        let wireguard = managed_files(root, &[ArtifactCategory::Wireguard]).unwrap();
        assert_eq!(wireguard, vec![PathBuf::from("etc/wireguard/wg-ewr-lhr.conf")]);
        assert_eq!(managed_files(root, &ArtifactCategory::ALL).unwrap().len(), 2);
    }

    #[test]
    fn test_unit_from_path() {
        assert_eq!(
            unit_from_path(ArtifactCategory::Wireguard, Path::new("etc/wireguard/wg4242423914.conf")),
            "wg4242423914"
        );
        assert_eq!(
            unit_from_path(ArtifactCategory::Network, Path::new("etc/systemd/network/50-dn42.netdev")),
            "dn42"
        );
        assert_eq!(
            unit_from_path(ArtifactCategory::Network, Path::new("etc/network/interfaces.d/dn42")),
            "dn42"
        );
    }
}
