use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use super::Context;
use crate::feed::FeedFetcher;
use crate::ingest::Ingester;
use crate::scheduler::{listen_for_termination, Scheduler};

/// Poll feeds every `interval` until SIGINT or SIGTERM.
pub(super) async fn agg(ctx: &mut Context, interval: Duration, out: &mut dyn Write) -> anyhow::Result<()> {
    let fetcher = FeedFetcher::new(
        &ctx.config.user_agent,
        ctx.config.request_timeout(),
        ctx.config.max_feed_bytes,
    )
    .context("Failed to build HTTP client")?;

    let ingester = Ingester::new(Arc::new(ctx.db.clone()), Arc::new(fetcher));

    writeln!(out, "Collecting feeds every {interval:?}")?;
    out.flush()?;

    let handle = Scheduler::new(Arc::new(ingester), interval).spawn();
    let listener = listen_for_termination(handle.shutdown_signal())
        .context("Failed to install signal handlers")?;

    let report = handle.wait().await.context("Scheduler stopped unexpectedly")?;
    listener.abort();

    writeln!(
        out,
        "Stopped after {} cycles ({} succeeded, {} failed, {} ticks skipped)",
        report.cycles_started, report.cycles_succeeded, report.cycles_failed, report.ticks_skipped
    )?;
    Ok(())
}
