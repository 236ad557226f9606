//! Cashdesk server
//!
//! Serves the JSON API, applies schema migrations and runs the retention sweep.

use anyhow::{bail, Context};
use cashdesk::http::{CashdeskService, Router};
use cashdesk::migration::MigrationStatus;
use cashdesk::{migrations, AppConfig, Services};
use clap::{Parser, Subcommand};
use std::process;

#[derive(Parser)]
#[command(name = "cashdesk-server")]
#[command(about = "Daily cash ledger service")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); environment variables override it
    #[arg(long, default_value = "config/config.toml")]
    config: String,

    /// Database connection URL (overrides configuration)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations, then serve the HTTP API
    Serve {
        /// Bind address (overrides `server.bind`)
        #[arg(long)]
        bind: Option<String>,

        /// Do not apply pending migrations at startup
        #[arg(long)]
        skip_migrations: bool,
    },

    /// Apply pending migrations
    Migrate {
        /// Only show applied and pending migrations
        #[arg(long)]
        status: bool,
    },

    /// Run the retention sweep once
    Sweep,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load_from(&cli.config).context("loading configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if config.database.url.is_empty() {
        bail!("no database URL: set DATABASE_URL, --database-url or CASHDESK__DATABASE__URL");
    }

    may::config().set_workers(config.server.workers.max(1));
    let services = Services::from_config(&config).context("creating connection pool")?;

    match cli.command {
        Commands::Serve {
            bind,
            skip_migrations,
        } => {
            if !skip_migrations {
                apply_migrations(&services)?;
            }
            serve(services, &config, bind)
        }
        Commands::Migrate { status } => {
            if status {
                let migrator = migrations::migrator()?;
                let conn = services.pool.acquire()?;
                print_status(&migrator.status(&conn)?);
                Ok(())
            } else {
                apply_migrations(&services)
            }
        }
        Commands::Sweep => {
            let report = services.maintenance.run_once(chrono::Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn apply_migrations(services: &Services) -> anyhow::Result<()> {
    let applied = migrations::migrator()?
        .up(&services.pool)
        .context("applying migrations")?;
    if applied == 0 {
        log::info!("schema is up to date");
    } else {
        log::info!("applied {} migration(s)", applied);
    }
    Ok(())
}

fn serve(services: Services, config: &AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(admin) = &config.auth.bootstrap_admin {
        if let Some(profile) = services.users.ensure_bootstrap_admin(admin)? {
            log::info!("created bootstrap administrator '{}'", profile.username);
        }
    }

    let _sweeper = services.maintenance.clone().spawn_periodic();

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    CashdeskService::new(Router::new(services), config.server.max_body_bytes)
        .serve(&addr)
        .with_context(|| format!("serving on {addr}"))
}

fn print_status(status: &MigrationStatus) {
    println!("Applied migrations ({}):", status.applied.len());
    for record in &status.applied {
        let time = record
            .execution_time_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "  m{}_{} ({}, {})",
            record.version,
            record.name,
            record.applied_at.format("%Y-%m-%d %H:%M:%S"),
            time
        );
    }
    println!("Pending migrations ({}):", status.pending.len());
    for pending in &status.pending {
        println!("  m{}_{}", pending.version, pending.name);
    }
}
