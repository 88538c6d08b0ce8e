use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tdt::auth::{sign_token, SessionClaims};
use tdt::config;
use tdt::exec::SystemRunner;
use tdt::taxonomy::{Lifecycle, TaxonomyVolume};

#[derive(Parser)]
#[command(name = "tdt-api")]
#[command(about = "TDT cloud service API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config, and the taxonomies volume.
    Init {
        /// Config file path (default: TDT_CONFIG_PATH or ~/.tdt/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the HTTP gateway.
    Serve {
        /// Config file path (default: TDT_CONFIG_PATH or ~/.tdt/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Upgrade taxonomies to a TDT version without going through the HTTP API.
    Update {
        /// Config file path (default: TDT_CONFIG_PATH or ~/.tdt/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// JSON file mapping repository URL to branch
        #[arg(long, short, value_name = "FILE")]
        repositories: PathBuf,

        /// TDT image version to pin in each run.sh
        #[arg(long = "version", value_name = "VERSION")]
        tdt_version: String,
    },

    /// Issue a session token signed with the configured token secret (TOKEN_SECRET).
    Token {
        /// Config file path (default: TDT_CONFIG_PATH or ~/.tdt/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// GitHub user name
        #[arg(long)]
        name: String,

        /// Organization owning the taxonomy repositories
        #[arg(long)]
        org: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Lifetime in hours; 0 issues a token without expiry
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("tdt-api {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Update {
            config,
            repositories,
            tdt_version,
        }) => {
            if let Err(e) = run_update(config, repositories, tdt_version).await {
                log::error!("update failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Token {
            config,
            name,
            org,
            email,
            hours,
        }) => {
            if let Err(e) = run_token(config, name, org, email, hours) {
                log::error!("token failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let volume = tdt::init::init_config_dir(&path)?;
    println!(
        "initialized configuration at {} (taxonomies volume {})",
        config::config_dir(&path).display(),
        volume.display()
    );
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    tdt::gateway::run_gateway(config, path).await
}

async fn run_update(
    config_path: Option<PathBuf>,
    repositories: PathBuf,
    tdt_version: String,
) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let volume_dir = tdt::init::require_initialized(&path, &config)?;
    let text = std::fs::read_to_string(&repositories)
        .with_context(|| format!("reading {}", repositories.display()))?;
    let repositories: BTreeMap<String, String> = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", repositories.display()))?;

    let lifecycle = Lifecycle::new(
        TaxonomyVolume::open(&volume_dir)?,
        Arc::new(SystemRunner),
        config.taxonomies.database_marker(),
    );
    lifecycle
        .update_taxonomies(&repositories, &tdt_version)
        .await?;
    println!(
        "updated {} taxonomies to TDT version {}",
        repositories.len(),
        tdt_version
    );
    Ok(())
}

fn run_token(
    config_path: Option<PathBuf>,
    name: String,
    org: Option<String>,
    email: Option<String>,
    hours: i64,
) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let secret = config::resolve_token_secret(&config)
        .context("no token secret configured (set TOKEN_SECRET or auth.tokenSecret)")?;
    let claims = SessionClaims {
        name: Some(name),
        email,
        repo_org: org,
        exp: token_expiry(hours, chrono::Utc::now().timestamp())?,
        ..Default::default()
    };
    let token = sign_token(&claims, &secret)?;
    println!("{}", token);
    Ok(())
}

/// Expiry `hours` after `now`; zero or negative hours mean no expiry.
fn token_expiry(hours: i64, now: i64) -> anyhow::Result<Option<i64>> {
    if hours <= 0 {
        return Ok(None);
    }
    hours
        .checked_mul(3600)
        .and_then(|secs| now.checked_add(secs))
        .map(Some)
        .with_context(|| format!("token lifetime of {} hours is out of range", hours))
}
