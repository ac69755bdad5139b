//! CLI subcommands.
//!
//! Every command writes its user-facing output to the `out` writer it is
//! given; diagnostics go through `tracing` to stderr.

mod agg;
mod browse;
mod feeds;
mod follows;
mod users;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Subcommand;
use thiserror::Error;

use crate::config::Config;
use crate::duration::parse_interval;
use crate::storage::{Database, User};
use crate::util::UrlValidationError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("not logged in: run `gator register <name>` or `gator login <name>` first")]
    NotLoggedIn,

    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// Delete every user, feed, follow and post
    Reset,
    /// List users
    Users,
    /// Poll feeds until interrupted, one feed per interval (e.g. 30s, 5m, 1h)
    Agg {
        #[arg(value_parser = parse_interval)]
        interval: Duration,
    },
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow a feed by URL, adding it first if it is new
    Follow { url: String },
    /// List the feeds you follow
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the latest posts from the feeds you follow
    Browse {
        /// Number of posts to show
        #[arg(default_value_t = browse::DEFAULT_LIMIT)]
        limit: u32,
    },
}

/// State shared by all commands.
pub struct Context {
    pub db: Database,
    pub config: Config,
    /// Where `config` is saved when the current user changes
    pub config_path: PathBuf,
}

impl Context {
    pub fn new(db: Database, config: Config, config_path: PathBuf) -> Self {
        Self {
            db,
            config,
            config_path,
        }
    }

    /// The logged-in user, resolved against the database.
    pub async fn current_user(&self) -> anyhow::Result<User> {
        let name = self
            .config
            .current_user_name
            .as_deref()
            .ok_or(CommandError::NotLoggedIn)?;

        let user = self
            .db
            .get_user_by_name(name)
            .await
            .context("Failed to look up current user")?
            .ok_or_else(|| CommandError::NotFound {
                what: "user",
                name: name.to_string(),
            })?;
        Ok(user)
    }

    fn set_current_user(&mut self, name: &str) -> anyhow::Result<()> {
        self.config.current_user_name = Some(name.to_string());
        self.config.save(&self.config_path).with_context(|| {
            format!("Failed to save config to '{}'", self.config_path.display())
        })
    }
}

/// Run one command to completion.
pub async fn run(ctx: &mut Context, command: Command, out: &mut dyn Write) -> anyhow::Result<()> {
    tracing::debug!(?command, "Running command");
    match command {
        Command::Register { name } => users::register(ctx, &name, out).await,
        Command::Login { name } => users::login(ctx, &name, out).await,
        Command::Reset => users::reset(ctx, out).await,
        Command::Users => users::list(ctx, out).await,
        Command::Agg { interval } => agg::agg(ctx, interval, out).await,
        Command::Addfeed { name, url } => feeds::add_feed(ctx, &name, &url, out).await,
        Command::Feeds => feeds::list(ctx, out).await,
        Command::Follow { url } => follows::follow(ctx, &url, out).await,
        Command::Following => follows::following(ctx, out).await,
        Command::Unfollow { url } => follows::unfollow(ctx, &url, out).await,
        Command::Browse { limit } => browse::browse(ctx, limit, out).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(subcommand)]
        command: Command,
    }

    #[test]
    fn test_agg_interval_parsed_by_clap() {
        let cli = Cli::try_parse_from(["gator", "agg", "1m30s"]);
        // Only one unit is allowed
        assert!(cli.is_err());

        let cli = Cli::try_parse_from(["gator", "agg", "90s"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Agg {
                interval: Duration::from_secs(90)
            }
        );
    }

    #[test]
    fn test_agg_rejects_bad_interval() {
        for bad in ["", "10", "5d", "abc", "-5s"] {
            let err = Cli::try_parse_from(["gator", "agg", bad]).unwrap_err();
            assert_ne!(err.kind(), clap::error::ErrorKind::DisplayHelp, "{bad}");
        }
        let err = Cli::try_parse_from(["gator", "agg"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_browse_limit_defaults_to_two() {
        let cli = Cli::try_parse_from(["gator", "browse"]).unwrap();
        assert_eq!(cli.command, Command::Browse { limit: 2 });

        assert!(Cli::try_parse_from(["gator", "browse", "ten"]).is_err());
    }
}
