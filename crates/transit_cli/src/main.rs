//! Transit CLI - command-line interface for the record migration engine.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::OutputFormat;

#[derive(Parser)]
#[command(name = "transit")]
#[command(version)]
#[command(about = "Migrate a parent/child dataset into a JSON-RPC record store")]
#[command(
    long_about = "Transit copies planets and the people who live on them from a numbered \
collection API into an Odoo-style record store, attaching each person's portrait from an \
image service. Writes are find-or-create by natural key, so an interrupted or partial run \
can simply be repeated."
)]
#[command(after_long_help = r#"EXAMPLES
    Check connectivity and source sizes without writing anything:
        $ transit check

    Run a full migration:
        $ transit run

    Run with tighter limits and a JSON summary:
        $ transit run --sink-concurrency 5 --output json

    Use an explicit configuration file:
        $ transit run --config ./staging.toml

    Generate shell completions:
        $ transit completions bash > ~/.local/share/bash-completion/completions/transit

CONFIGURATION
    Transit reads configuration from (later entries win):
      1. ~/.config/transit/config.toml (or $XDG_CONFIG_HOME/transit/config.toml)
      2. ./transit.toml
      3. The file given with --config (TOML or JSON)
      4. Environment variables (TRANSIT__ prefix, `__` between keys)
      5. .env file in current directory

    Systems are declared under [systems.<name>], where <name> is one of
    swapi, swimg or odoo:

        [systems.swapi]
        url = "https://swapi.dev/api"

        [systems.swimg]
        url = "https://starwars-visualguide.com/assets/img/characters"

        [systems.odoo]
        url = "http://localhost:8069"
        db = "odoo"
        username = "admin"
        password = "admin"

ENVIRONMENT VARIABLES
    TRANSIT__SYSTEMS__ODOO__PASSWORD           Sink password
    TRANSIT__MIGRATION__SINK_CONCURRENCY       In-flight sink calls (default: 20)
    TRANSIT__MIGRATION__SOURCE_CONCURRENCY     In-flight source requests (default: 50)
    RUST_LOG                                   Log filter for non-interactive output
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate parents, then children, into the sink
    #[command(after_help = "EXAMPLES:
    transit run
    transit run --source-mode paginated
    transit run --output json > summary.json")]
    Run {
        /// Configuration file layered over the default locations
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Summary output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
        /// Maximum in-flight requests against the source
        #[arg(long, value_name = "N")]
        source_concurrency: Option<usize>,
        /// Maximum in-flight requests against the image service
        #[arg(long, value_name = "N")]
        asset_concurrency: Option<usize>,
        /// Maximum in-flight calls against the sink
        #[arg(long, value_name = "N")]
        sink_concurrency: Option<usize>,
        /// How records are written to the sink
        #[arg(long, value_enum)]
        write_mode: Option<commands::WriteModeArg>,
        /// How the source collection is enumerated
        #[arg(long, value_enum)]
        source_mode: Option<commands::SourceModeArg>,
    },
    /// Authenticate against the sink and report source sizes
    Check {
        /// Configuration file layered over the default locations
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Generate shell completions
    #[command(after_help = "EXAMPLES:
    transit completions bash > ~/.local/share/bash-completion/completions/transit
    transit completions zsh > ~/.zfunc/_transit
    transit completions fish > ~/.config/fish/completions/transit.fish")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // Progress bars replace per-item logs on a TTY.
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("transit=info,transit_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
        Commands::Check { config, output } => {
            let config = config::Config::load(config.as_deref())?;
            commands::check::handle_check(&config, output).await?;
        }
        Commands::Run {
            config,
            output,
            source_concurrency,
            asset_concurrency,
            sink_concurrency,
            write_mode,
            source_mode,
        } => {
            let mut config = config::Config::load(config.as_deref())?;
            config.apply_overrides(config::Overrides {
                source_concurrency,
                asset_concurrency,
                sink_concurrency,
                write_mode: write_mode.map(Into::into),
                source_mode: source_mode.map(Into::into),
            });
            commands::run::handle_run(&config, output).await?;
        }
    }

    Ok(())
}
