use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lb_core::config::Config;
use lb_core::{logging, TracingLogger};
use lb_engine::Engine;

#[derive(Parser)]
#[command(name = "lb")]
#[command(about = "Dependency-aware build orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the workflow configuration document (YAML)
    #[arg(short, long, global = true, default_value = "workflow.yaml")]
    config: PathBuf,

    /// Path to the persisted build state file
    #[arg(long, global = true, default_value = ".lb_state.json", env = "LB_STATE_FILE")]
    state_file: PathBuf,

    /// Emit debug-level logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all but warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a profile's workflow, rebuilding only what is stale
    Build {
        /// Profile to build
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Build only up to this step (and its dependencies)
        #[arg(long)]
        final_step: Option<String>,

        /// Run every profile in this PROFILE_GROUPS entry in sequence instead of a single profile
        #[arg(long, conflicts_with = "profile")]
        group: Option<String>,

        /// Override a GENERAL variable, e.g. --var REGION=us-west. May be repeated.
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },

    /// Print the resolved workflow graph and each step's command as Markdown
    Describe {
        #[arg(short, long, default_value = "default")]
        profile: String,

        #[arg(long)]
        final_step: Option<String>,

        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,

        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the profiles defined in the workflow configuration
    Profiles {
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=value, got '{raw}'"))?;
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    if !cli.quiet {
        logging::init_telemetry(cli.verbose);
    }

    match cli.command {
        Commands::Build {
            profile,
            final_step,
            group,
            vars,
        } => {
            let config = load_config(&cli.config, &vars)?;
            let engine = Engine::new(config, &cli.state_file);
            let logger = Arc::new(TracingLogger);

            let ok = match group {
                Some(group) => engine.execute_group(&group, logger, None).await?,
                None => engine.execute(&profile, final_step.as_deref(), logger, None).await?,
            };

            if !ok {
                anyhow::bail!("build failed");
            }
            Ok(())
        }
        Commands::Describe {
            profile,
            final_step,
            vars,
            output,
        } => {
            let config = load_config(&cli.config, &vars)?;
            let engine = Engine::new(config, &cli.state_file);
            let report = engine.describe(&profile, final_step.as_deref()).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &report)
                        .with_context(|| format!("writing report to {}", path.display()))?;
                }
                None => println!("{report}"),
            }
            Ok(())
        }
        Commands::Profiles { vars } => {
            let config = load_config(&cli.config, &vars)?;
            let engine = Engine::new(config, &cli.state_file);
            for name in engine.profile_names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn load_config(path: &PathBuf, vars: &[(String, String)]) -> Result<Config> {
    let cli_vars: HashMap<String, String> = vars.iter().cloned().collect();
    Config::from_file(path, &cli_vars).with_context(|| format!("loading workflow config from {}", path.display()))
}
