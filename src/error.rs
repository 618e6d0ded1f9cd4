//! Error types for the compiler pipeline.
//!
//! Each failure class maps to its own exit code so operators (and wrapping
//! automation) can tell a broken model apart from a rejected artifact.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::render::ArtifactCategory;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// A single violated field in the declarative model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    /// Dotted path of the offending field, prefixed with its source document
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The model failed validation. Carries every violation found, not just the first.
#[derive(Debug, Clone, Error)]
#[error("schema validation failed with {} violation(s):\n{}", .violations.len(), join_lines(.violations))]
pub struct SchemaError {
    pub violations: Vec<Violation>,
}

impl SchemaError {
    pub fn new(mut violations: Vec<Violation>) -> Self {
        violations.sort();
        violations.dedup();
        Self { violations }
    }

    /// Fields named by the violations, in sorted order
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

/// Tunnel parameter derivation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    #[error("tunnel {tunnel}: link subnet index {index} is already used by tunnel {other}")]
    SubnetCollision {
        tunnel: String,
        other: String,
        index: u8,
    },

    #[error("tunnel {tunnel}: no free link subnet for router ranks {ranks:?}, set subnet_index explicitly")]
    SubnetsExhausted { tunnel: String, ranks: (u16, u16) },

    #[error("port {port} on router {router} resolved for both {first} and {second}")]
    PortCollision {
        router: String,
        port: u16,
        first: String,
        second: String,
    },

    #[error("interface {interface} on router {router} resolved for both {first} and {second}")]
    InterfaceCollision {
        router: String,
        interface: String,
        first: String,
        second: String,
    },

    #[error("{owner}: '{interface}' is not a valid interface name")]
    InvalidInterfaceName { owner: String, interface: String },

    #[error("{owner}: derived port {port} is out of range")]
    PortOutOfRange { owner: String, port: u32 },
}

/// Inconsistent or ambiguous policy definitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("route-map {route_map} seq {seq} references undefined {kind} '{name}'")]
    UndefinedReference {
        route_map: String,
        seq: u32,
        kind: &'static str,
        name: String,
    },

    #[error("local-preference tiers {first} and {second} are both configured with preference {value}")]
    AmbiguousTier {
        first: String,
        second: String,
        value: u32,
    },

    #[error("{owner}: no community code is known for {kind} '{value}'")]
    UnknownCommunity {
        owner: String,
        kind: &'static str,
        value: String,
    },

    #[error("{owner}: route-map '{name}' is not defined")]
    UndefinedRouteMap { owner: String, name: String },

    #[error("prefix-list {name} mixes IPv4 and IPv6 prefixes")]
    MixedAddressFamily { name: String },
}

/// An external dry-run tool rejected a rendered artifact
#[derive(Debug, Clone, Error)]
#[error("{host} [{category}] {}: {message}", .path.display())]
pub struct ValidationError {
    pub host: String,
    pub category: ArtifactCategory,
    pub path: PathBuf,
    pub message: String,
}

/// Applying a validated artifact failed; already-replaced artifacts were restored
#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error("{host}: failed to read deployed {}: {source}", .path.display())]
    Read {
        host: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{host}: failed to write {}: {source}", .path.display())]
    Write {
        host: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{host}: reload action '{action}' failed: {message}")]
    Reload {
        host: String,
        action: String,
        message: String,
    },
}

/// Umbrella error for one pipeline run or one router's pipeline
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("router {router}: tunnel derivation failed:\n{}", join_lines(.errors))]
    Derivation {
        router: String,
        errors: Vec<DerivationError>,
    },

    #[error("router {router}: policy compilation failed:\n{}", join_lines(.errors))]
    Policy {
        router: String,
        errors: Vec<PolicyError>,
    },

    #[error("router {router}: {} artifact(s) failed validation:\n{}", .errors.len(), join_lines(.errors))]
    Validation {
        router: String,
        errors: Vec<ValidationError>,
    },

    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// Process exit code for this failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Schema(_) => 2,
            CompileError::Derivation { .. } => 3,
            CompileError::Policy { .. } => 4,
            CompileError::Validation { .. } => 5,
            CompileError::Convergence(_) => 6,
            CompileError::Io { .. } => 1,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }
}

fn join_lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("  - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
