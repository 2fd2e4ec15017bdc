//! Sequential batch execution with count limits

use crate::batch::ManifestItem;
use crate::core::{detect_handler, Dispatch, HandlerOptions, InstagramAuth, Source};
use crate::Result;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::path::Path;
use tracing::{debug, error, info};

/// Why an item was not dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unsupported,
    GlobalLimit,
    PerSourceLimit,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::Unsupported => "unsupported",
            SkipReason::GlobalLimit => "global-limit",
            SkipReason::PerSourceLimit => "per-source-limit",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Maximum items attempted overall
    pub limit: Option<usize>,
    /// Maximum items attempted per source
    pub per_source_limit: Option<usize>,
    /// Count items without dispatching them
    pub dry_run: bool,
    /// Space dispatches to at most this many per minute
    pub rate_per_minute: Option<u32>,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub attempted: usize,
    pub completed: Vec<(Source, String)>,
    pub skipped: Vec<(String, String, SkipReason)>,
    pub errors: Vec<(Source, String, String)>,
}

impl BatchReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// One-line summary of the run
    pub fn summary(&self) -> String {
        format!(
            "Attempted: {}, completed: {}, skipped: {}, errors: {}",
            self.attempted,
            self.completed.len(),
            self.skipped.len(),
            self.errors.len()
        )
    }
}

/// Handler options used for a batch item of `source`
pub fn batch_options_for(source: Source, verbose: bool) -> HandlerOptions {
    let options = HandlerOptions::default().with_verbose(verbose);
    match source {
        Source::Instagram => options.with_instagram_auth(InstagramAuth::Auto),
        Source::GoogleDrive => options,
        // yt-dlp sources reuse session cookies when available
        _ => options.with_use_session(true),
    }
}

fn rate_limiter(rate_per_minute: Option<u32>) -> Option<DefaultDirectRateLimiter> {
    let rate = NonZeroU32::new(rate_per_minute?)?;
    Some(RateLimiter::direct(Quota::per_minute(rate)))
}

/// Run every item through `dispatcher` in manifest order
pub async fn execute_batch<I>(
    items: I,
    out_dir: &Path,
    options: &BatchOptions,
    dispatcher: &dyn Dispatch,
) -> Result<BatchReport>
where
    I: IntoIterator<Item = ManifestItem>,
{
    tokio::fs::create_dir_all(out_dir).await?;

    let limiter = rate_limiter(options.rate_per_minute);
    let mut counts: HashMap<Source, usize> = HashMap::new();
    let mut report = BatchReport::default();

    for item in items {
        let Some(source) = detect_handler(&item.source_hint, &item.url) else {
            debug!("No handler for {} ({})", item.url, item.source_hint);
            report.skipped.push((item.source_hint, item.url, SkipReason::Unsupported));
            continue;
        };

        if options.limit.is_some_and(|limit| report.attempted >= limit) {
            report.skipped.push((item.source_hint, item.url, SkipReason::GlobalLimit));
            continue;
        }

        let used = counts.entry(source).or_insert(0);
        if options.per_source_limit.is_some_and(|limit| *used >= limit) {
            report.skipped.push((item.source_hint, item.url, SkipReason::PerSourceLimit));
            continue;
        }

        *used += 1;
        report.attempted += 1;

        info!("Processing {} via {}", item.url, source);
        if options.dry_run {
            report.completed.push((source, item.url));
            continue;
        }

        if let Some(limiter) = &limiter {
            limiter.until_ready().await;
        }

        let handler_options = batch_options_for(source, options.verbose);
        match dispatcher.dispatch(source, &item.url, out_dir, &handler_options).await {
            Ok(_) => report.completed.push((source, item.url)),
            Err(e) => {
                error!("Download failed for {} ({}): {}", item.url, source, e);
                report.errors.push((source, item.url, e.to_string()));
            }
        }
    }

    info!("{}", report.summary());
    Ok(report)
}
