//! # dn42gen - configuration compiler for a WireGuard/BGP router fleet on DN42
//!
//! This library turns a declarative, Ansible-style inventory describing a
//! small fleet of routers into the concrete files each router runs:
//! WireGuard interface definitions, an integrated FRRouting configuration and
//! a loopback dummy interface definition. It then validates them with the
//! daemons' own dry-run tools and converges each host idempotently.
//!
//! ## Pipeline
//!
//! ```text
//! inventory ─► config_loader ─► topology::resolve ─► ip::derive_fleet
//!                                                        │  (fleet-wide barrier)
//!                      ┌─────────────── per router, in parallel ───────────────┐
//!                      │ policy::compile_router ─► render ─► gate ─► converge  │
//!                      └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: typed inventory documents and their schema tables
//! - `config_loader`: reads `hosts.yml`, `group_vars/` and `host_vars/`
//! - `topology`: two-layer resolution into the per-router [`topology::Fleet`]
//! - `ip`: tunnel interface names, link addresses and ports, collision checks
//! - `policy`: community tables, local-preference tiers and route-maps
//! - `render`: WireGuard, FRR and network-interface artifacts
//! - `gate`: dry-run validation of rendered artifacts
//! - `converge`: diffing, atomic replacement, reloads and rollback
//! - `process`: shell command runner used by the gate and reload actions
//! - `orchestrator`: one `plan`, `apply` or `render` invocation
//! - `error`: failure classes and their exit codes
//! - `utils`: prefix arithmetic, duration parsing, schema walking
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use dn42gen::orchestrator::{self, Mode, RunOptions, Scope};
//! use dn42gen::process::ShellRunner;
//!
//! let options = RunOptions {
//!     inventory: PathBuf::from("inventory"),
//!     mode: Mode::Plan,
//!     scope: Scope::default(),
//!     deploy_root: PathBuf::from("deploy"),
//!     output: PathBuf::from("rendered"),
//! };
//! let report = orchestrator::run(&options, &ShellRunner)?;
//! print!("{}", report.to_text());
//! # Ok::<(), dn42gen::error::CompileError>(())
//! ```
//!
//! ## Error Handling
//!
//! Library code returns the typed errors of [`error`]; each failure class has
//! its own process exit code. The binary installs `color_eyre` for top-level
//! reports.

pub mod config;
pub mod config_loader;
pub mod converge;
pub mod error;
pub mod gate;
pub mod ip;
pub mod orchestrator;
pub mod policy;
pub mod process;
pub mod render;
pub mod topology;
pub mod utils;
