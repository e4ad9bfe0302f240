use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use geoflow_solver::SolverError;

mod commands;

#[derive(Parser)]
#[command(
    name = "geoflow",
    about = "geoflow: cost, runtime and carbon aware placement of serverless workflows",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank deployments of a workflow and print the response as JSON.
    ///
    /// Exits 4 when the deadline expired; partial results are still printed.
    Solve {
        /// Path to the metrics database
        #[arg(short, long)]
        store: PathBuf,
        /// Solve request JSON file, or `-` for stdin
        #[arg(short, long)]
        request: String,
        /// Optional geoflow.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Load a fixture document (`{ "<table>": [rows] }`) into the store.
    Import {
        #[arg(short, long)]
        store: PathBuf,
        #[arg(short, long)]
        fixture: PathBuf,
    },
    /// List the regions of the datacenter catalog with their indices.
    Regions {
        #[arg(short, long)]
        store: PathBuf,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("geoflow=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Solve {
            store,
            request,
            config,
        } => commands::solve::solve(&store, &request, config.as_deref()),
        Commands::Import { store, fixture } => {
            commands::import::import(&store, &fixture).map(|_| ExitCode::SUCCESS)
        }
        Commands::Regions { store } => commands::regions::regions(&store).map(|_| ExitCode::SUCCESS),
    }
}

/// Exit code for a failed command: solver errors carry their own, anything
/// else is a generic failure.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<SolverError>() {
        Some(e) => ExitCode::from(e.exit_code() as u8),
        None => ExitCode::FAILURE,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_json) {
        eprintln!("error: cannot initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_errors_map_to_their_exit_codes() {
        let err = anyhow::Error::new(SolverError::SearchSpaceTooLarge { size: 9, cap: 1 });
        assert_eq!(exit_code(&err), ExitCode::from(5));
        let err = anyhow::anyhow!("disk full");
        assert_eq!(exit_code(&err), ExitCode::FAILURE);
    }

    #[test]
    fn parses_solve_arguments() {
        let cli = Cli::try_parse_from([
            "geoflow", "solve", "--store", "m.redb", "--request", "-", "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);
        match cli.command {
            Commands::Solve { request, config, .. } => {
                assert_eq!(request, "-");
                assert!(config.is_none());
            }
            _ => panic!("expected solve"),
        }
    }
}
