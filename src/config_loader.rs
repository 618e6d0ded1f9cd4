//! Inventory loading.
//!
//! Reads the three layers of an inventory directory:
//!
//! ```text
//! <inventory>/hosts.yml                      router group membership
//! <inventory>/group_vars/all/global.yml      fleet-wide defaults and tunnels
//! <inventory>/host_vars/<host>/main.yml      per-router settings
//! ```
//!
//! Every document is schema-checked before deserialization, and problems from
//! all documents are collected into one [`SchemaError`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::config::{GlobalConfig, HostConfig, GLOBAL_SCHEMA, HOSTS_SCHEMA, HOST_SCHEMA};
use crate::error::{SchemaError, Violation};
use crate::utils::validation::{check_document, Field};

pub const HOSTS_FILE: &str = "hosts.yml";
pub const GLOBAL_FILE: &str = "group_vars/all/global.yml";

/// Inventory documents after schema validation, before layer resolution
#[derive(Debug, Clone)]
pub struct Inventory {
    pub root: PathBuf,
    pub global: GlobalConfig,
    /// Keyed by hostname
    pub hosts: BTreeMap<String, HostConfig>,
}

/// Relative path of one router's host document
pub fn host_file(host: &str) -> String {
    format!("host_vars/{}/main.yml", host)
}

/// Load and validate a whole inventory directory
pub fn load_inventory(root: &Path) -> Result<Inventory, SchemaError> {
    info!("Loading inventory from: {:?}", root);
    let mut violations = Vec::new();

    let host_names = match read_document(root, HOSTS_FILE, HOSTS_SCHEMA, HOSTS_FILE) {
        Ok(value) => router_names(&value),
        Err(mut found) => {
            violations.append(&mut found);
            Vec::new()
        }
    };
    debug!("Inventory lists {} router(s)", host_names.len());

    let global = load_layer::<GlobalConfig>(root, GLOBAL_FILE, GLOBAL_SCHEMA, "global")
        .map_err(|mut found| violations.append(&mut found))
        .ok();

    let mut hosts = BTreeMap::new();
    for name in &host_names {
        let label = format!("host_vars/{}", name);
        match load_layer::<HostConfig>(root, &host_file(name), HOST_SCHEMA, &label) {
            Ok(host) => {
                hosts.insert(name.clone(), host);
            }
            Err(mut found) => violations.append(&mut found),
        }
    }

    match global {
        Some(global) if violations.is_empty() => {
            info!("Loaded global configuration and {} host(s)", hosts.len());
            Ok(Inventory {
                root: root.to_path_buf(),
                global,
                hosts,
            })
        }
        _ => Err(SchemaError::new(violations)),
    }
}

/// Read, schema-check and deserialize one document
fn load_layer<T: DeserializeOwned>(
    root: &Path,
    relative: &str,
    schema: &'static [Field],
    label: &str,
) -> Result<T, Vec<Violation>> {
    let value = read_document(root, relative, schema, label)?;
    // An empty document is an empty mapping once the schema accepted it
    let value = if value.is_null() {
        Value::Mapping(Default::default())
    } else {
        value
    };
    serde_yaml::from_value(value)
        .map_err(|e| vec![Violation::new(label, format!("invalid document: {}", e))])
}

fn read_document(
    root: &Path,
    relative: &str,
    schema: &'static [Field],
    label: &str,
) -> Result<Value, Vec<Violation>> {
    let path = root.join(relative);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        let message = if e.kind() == std::io::ErrorKind::NotFound {
            format!("{} not found", relative)
        } else {
            format!("cannot read {}: {}", relative, e)
        };
        vec![Violation::new(label, message)]
    })?;

    let value: Value = serde_yaml::from_str(&content)
        .map_err(|e| vec![Violation::new(label, format!("invalid YAML: {}", e))])?;

    let violations = check_document(&value, schema, label);
    if violations.is_empty() {
        Ok(value)
    } else {
        Err(violations)
    }
}

fn router_names(hosts: &Value) -> Vec<String> {
    hosts
        .get("all")
        .and_then(|v| v.get("children"))
        .and_then(|v| v.get("routers"))
        .and_then(|v| v.get("hosts"))
        .and_then(Value::as_mapping)
        .map(|map| {
            map.keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
