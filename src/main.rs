use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use gator::commands::{self, Command};
use gator::config::Config;
use gator::storage::Database;

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Command-line RSS aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;

    let db_path = config.db_path_in(&config_dir);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
            set_private_dir_permissions(parent);
        }
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database '{}'", db_path.display()))?;

    let mut ctx = commands::Context::new(db, config, config_path);
    let mut stdout = std::io::stdout().lock();
    commands::run(&mut ctx, args.command, &mut stdout).await
}

/// Restrict a freshly created directory to the current user (Unix only).
fn set_private_dir_permissions(dir: &std::path::Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set directory permissions to 0700"
            );
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
