use std::io::Write;

use anyhow::Context as _;

use super::{CommandError, Context};
use crate::storage::InsertError;
use crate::util::validate_url;

pub(super) async fn add_feed(
    ctx: &mut Context,
    name: &str,
    url: &str,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let user = ctx.current_user().await?;

    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::Usage("addfeed <name> <url>".to_string()).into());
    }
    let url = validate_url(url).map_err(CommandError::from)?;

    let feed = match ctx.db.create_feed(name, url.as_str(), user.id).await {
        Ok(feed) => feed,
        Err(InsertError::DuplicateKey { .. }) => {
            return Err(CommandError::AlreadyExists(format!("feed '{name}' or URL {url}")).into())
        }
        Err(e) => return Err(e).context("Failed to create feed"),
    };

    let follow = ctx
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("Failed to follow new feed")?;

    tracing::info!(feed = %follow.feed_name, user = %follow.user_name, "Added feed");
    writeln!(out, "Feed created and followed:")?;
    writeln!(out, "  Feed: {}", follow.feed_name)?;
    writeln!(out, "  URL:  {}", follow.feed_url)?;
    writeln!(out, "  User: {}", follow.user_name)?;
    Ok(())
}

pub(super) async fn list(ctx: &mut Context, out: &mut dyn Write) -> anyhow::Result<()> {
    let feeds = ctx.db.list_feeds().await.context("Failed to list feeds")?;

    if feeds.is_empty() {
        writeln!(out, "No feeds yet. Add one with `gator addfeed <name> <url>`")?;
        return Ok(());
    }

    for entry in feeds {
        let fetched = entry
            .feed
            .last_fetched_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        writeln!(out, "* {}", entry.feed.name)?;
        writeln!(out, "  URL:     {}", entry.feed.url)?;
        writeln!(out, "  Added by {}", entry.owner_name)?;
        writeln!(out, "  Fetched: {fetched}")?;
    }
    Ok(())
}
