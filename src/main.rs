use arbolado::catalog::Catalog;
use arbolado::config::{Config, ConfigError};
use arbolado::db::{Database, DbError, CURRENT_SCHEMA};
use arbolado::error::RecordError;
use arbolado::{records, serve};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "arbolado")]
#[command(author, version, about = "Urban tree census - record service for trees, measurements and surveys")]
struct Args {
    /// SQLite database file (overrides the config file and DATABASE_URL)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Config file (default: arbolado.toml, searched upward from the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Number of worker threads
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Create the database schema and fill the lookup tables
    Init {
        /// Only create tables, leave lookup tables empty
        #[arg(long)]
        no_seed: bool,
    },

    /// Print the enumerated values accepted by census fields
    Catalog,

    /// Generate shell completion script
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arbolado=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Args::command(), "arbolado", &mut std::io::stdout());
            Ok(())
        }
        Command::Catalog => {
            print_catalog();
            Ok(())
        }
        Command::Init { no_seed } => {
            let config = load_config(args.config, args.database)?;
            let db = Database::open(&config.database)?;
            let stored = db
                .stored_schema_version()?
                .unwrap_or_else(|| "unregistered".to_string());
            println!(
                "{} {} (schema v{} stored, {})",
                "Initialized".green().bold(),
                db.path().display(),
                stored,
                CURRENT_SCHEMA.name
            );
            if no_seed {
                return Ok(());
            }
            let mut conn = db.session()?;
            let added = records::seed_lookups(&mut conn)?;
            println!("{} {} lookup row(s)", "Seeded".green().bold(), added);
            Ok(())
        }
        Command::Serve { host, port, workers } => {
            let mut config = load_config(args.config, args.database)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(workers) = workers {
                config.server.workers = workers;
            }
            let db = Database::open(&config.database)?;
            serve::start_server(db, &config)?;
            Ok(())
        }
    }
}

/// Config file and environment, then the `--database` flag on top
fn load_config(path: Option<PathBuf>, database: Option<String>) -> Result<Config, ConfigError> {
    let mut config = Config::load(path.as_deref())?;
    if let Some(url) = database {
        config.database.url = url;
    }
    Ok(config)
}

fn print_catalog() {
    let catalog = Catalog::current();
    for (field, values) in catalog.entries() {
        println!("{}", field.cyan().bold());
        for value in values {
            println!("  {}", value);
        }
    }
}
