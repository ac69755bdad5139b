use std::io::Write;

use anyhow::Context as _;

use super::{CommandError, Context};
use crate::storage::InsertError;
use crate::util::{feed_name_from_url, validate_url};

/// Follow a feed by URL. Unknown URLs are added as feeds named after their host.
pub(super) async fn follow(ctx: &mut Context, url: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    let user = ctx.current_user().await?;
    let url = validate_url(url).map_err(CommandError::from)?;

    let existing = ctx
        .db
        .get_feed_by_url(url.as_str())
        .await
        .context("Failed to look up feed")?;

    let feed = match existing {
        Some(feed) => feed,
        None => {
            let name = feed_name_from_url(&url);
            match ctx.db.create_feed(&name, url.as_str(), user.id).await {
                Ok(feed) => feed,
                Err(InsertError::DuplicateKey { .. }) => {
                    return Err(CommandError::AlreadyExists(format!("a feed named '{name}'")).into())
                }
                Err(e) => return Err(e).context("Failed to create feed"),
            }
        }
    };

    let follow = match ctx.db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => follow,
        Err(InsertError::DuplicateKey { .. }) => {
            return Err(CommandError::AlreadyExists(format!("{}'s follow of {}", user.name, feed.url)).into())
        }
        Err(e) => return Err(e).context("Failed to follow feed"),
    };

    tracing::info!(feed = %follow.feed_name, user = %follow.user_name, "Followed feed");
    writeln!(out, "{} now follows {}", follow.user_name, follow.feed_name)?;
    Ok(())
}

pub(super) async fn following(ctx: &mut Context, out: &mut dyn Write) -> anyhow::Result<()> {
    let user = ctx.current_user().await?;
    let follows = ctx
        .db
        .feed_follows_for_user(user.id)
        .await
        .context("Failed to list followed feeds")?;

    if follows.is_empty() {
        writeln!(out, "{} is not following any feeds", user.name)?;
        return Ok(());
    }

    writeln!(out, "Feeds followed by {}:", user.name)?;
    for follow in follows {
        writeln!(out, "* {} ({})", follow.feed_name, follow.feed_url)?;
    }
    Ok(())
}

pub(super) async fn unfollow(ctx: &mut Context, url: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    let user = ctx.current_user().await?;
    let url = validate_url(url).map_err(CommandError::from)?;

    let removed = ctx
        .db
        .delete_feed_follow(user.id, url.as_str())
        .await
        .context("Failed to unfollow feed")?;

    if !removed {
        return Err(CommandError::NotFound {
            what: "follow",
            name: url.to_string(),
        }
        .into());
    }

    tracing::info!(feed = %url, user = %user.name, "Unfollowed feed");
    writeln!(out, "Unfollowed {url}")?;
    Ok(())
}
