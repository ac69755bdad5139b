//! gator: a command-line RSS aggregator.
//!
//! Feeds are polled one at a time by a single-flight [`scheduler`]; each
//! cycle runs the [`ingest`] pipeline, which fetches the most overdue feed
//! and stores posts it has not seen before.

pub mod commands;
pub mod config;
pub mod duration;
pub mod feed;
pub mod ingest;
pub mod scheduler;
pub mod storage;
pub mod util;
