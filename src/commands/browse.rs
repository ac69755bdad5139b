use std::io::Write;

use anyhow::Context as _;

use super::{CommandError, Context};
use crate::storage::MAX_POSTS;
use crate::util::{preview, strip_control_chars};

pub(super) const DEFAULT_LIMIT: u32 = 2;

const DESCRIPTION_WIDTH: usize = 120;

pub(super) async fn browse(ctx: &mut Context, limit: u32, out: &mut dyn Write) -> anyhow::Result<()> {
    if limit == 0 {
        return Err(CommandError::Usage("browse [limit] - limit must be a positive number".to_string()).into());
    }
    if limit > MAX_POSTS {
        return Err(CommandError::Usage(format!("browse [limit] - limit must be at most {MAX_POSTS}")).into());
    }

    let user = ctx.current_user().await?;
    let posts = ctx
        .db
        .posts_for_user(user.id, i64::from(limit))
        .await
        .context("Failed to load posts")?;

    if posts.is_empty() {
        writeln!(out, "No posts found. Follow some feeds and run `gator agg` first")?;
        return Ok(());
    }

    for entry in posts {
        let post = entry.post;
        let date = post
            .published_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Unknown date".to_string());

        writeln!(out, "{date} from {}", strip_control_chars(&entry.feed_name))?;
        writeln!(out, "--- {} ---", strip_control_chars(&post.title))?;
        if let Some(description) = post.description.as_deref().filter(|d| !d.trim().is_empty()) {
            writeln!(out, "    {}", preview(description, DESCRIPTION_WIDTH))?;
        }
        writeln!(out, "Link: {}", strip_control_chars(&post.url))?;
        writeln!(out)?;
    }
    Ok(())
}
