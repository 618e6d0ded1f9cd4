use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;

use dn42gen::orchestrator::{self, Mode, RunOptions, Scope};
use dn42gen::process::ShellRunner;
use dn42gen::render::ArtifactCategory;

/// Configuration compiler for a WireGuard/BGP router fleet on DN42
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Inventory directory (hosts.yml, group_vars/, host_vars/)
    #[arg(short, long, default_value = ".", global = true)]
    inventory: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct ScopeArgs {
    /// Only these hosts (comma separated)
    #[arg(long, value_delimiter = ',')]
    limit: Vec<String>,

    /// Only these artifact categories: wireguard, frr, network
    #[arg(long, value_delimiter = ',')]
    tags: Vec<ArtifactCategory>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render, validate and show what apply would change
    Plan {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Root holding each host's deployed files under {root}/{host}/
        #[arg(long, default_value = "deploy")]
        deploy_root: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render, validate and converge every host in scope
    Apply {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Root holding each host's deployed files under {root}/{host}/
        #[arg(long, default_value = "deploy")]
        deploy_root: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write rendered artifacts to a directory without validating
    Render {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Output directory; files land under {output}/{host}/
        #[arg(short, long, default_value = "rendered")]
        output: PathBuf,
    },
}

impl Cli {
    fn run_options(&self) -> (RunOptions, bool) {
        let (mode, scope, deploy_root, output, json) = match &self.command {
            Command::Plan {
                scope,
                deploy_root,
                json,
            } => (Mode::Plan, scope, deploy_root.clone(), PathBuf::new(), *json),
            Command::Apply {
                scope,
                deploy_root,
                json,
            } => (Mode::Apply, scope, deploy_root.clone(), PathBuf::new(), *json),
            Command::Render { scope, output } => {
                (Mode::Render, scope, PathBuf::new(), output.clone(), false)
            }
        };
        let options = RunOptions {
            inventory: self.inventory.clone(),
            mode,
            scope: Scope {
                limit: scope.limit.clone(),
                tags: scope.tags.clone(),
            },
            deploy_root,
            output,
        };
        (options, json)
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let (options, json) = cli.run_options();
    info!("Inventory: {:?}", options.inventory);

    let report = match orchestrator::run(&options, &ShellRunner) {
        Ok(report) => report,
        Err(err) => {
            error!("{}", err);
            std::process::exit(err.exit_code());
        }
    };

    if json {
        let text = serde_json::to_string_pretty(&report).wrap_err("Failed to serialize run report")?;
        println!("{}", text);
    } else {
        print!("{}", report.to_text());
    }

    let code = report.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "dn42gen",
            "--inventory",
            "inventory",
            "plan",
            "--limit",
            "lhr-r001,ewr-r001",
            "--tags",
            "wireguard,frr",
            "--json",
        ]);
        let (options, json) = cli.run_options();
        assert!(json);
        assert_eq!(options.mode, Mode::Plan);
        assert_eq!(options.inventory, PathBuf::from("inventory"));
        assert_eq!(options.scope.limit, vec!["lhr-r001", "ewr-r001"]);
        assert_eq!(
            options.scope.tags,
            vec![ArtifactCategory::Wireguard, ArtifactCategory::Frr]
        );
        assert_eq!(options.deploy_root, PathBuf::from("deploy"));
    }

    #[test]
    fn test_render_defaults() {
        let cli = Cli::parse_from(["dn42gen", "render"]);
        let (options, json) = cli.run_options();
        assert!(!json);
        assert_eq!(options.mode, Mode::Render);
        assert_eq!(options.output, PathBuf::from("rendered"));
        assert!(options.scope.limit.is_empty());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!(Cli::try_parse_from(["dn42gen", "apply", "--tags", "dns"]).is_err());
    }
}
