//! Background jobs
//!
//! - the RSS pipeline (fetch, pre-moderate, analyze) on a fixed interval
//! - periodic cleanup of the in-memory rate limiters

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::services::news::{NewsService, NewsServiceError, PipelineReport};
use crate::services::rate_limiter::SlidingWindowLimiter;

/// How often expired limiter entries are dropped
pub const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Runs the RSS pipeline on an interval.
///
/// Overlap with any other run is prevented by the news service's fetch lock.
#[derive(Clone)]
pub struct PipelineScheduler {
    news: Arc<NewsService>,
    batch_size: i64,
    interval: Duration,
}

impl PipelineScheduler {
    pub fn new(news: Arc<NewsService>, interval: Duration, batch_size: i64) -> Self {
        Self {
            news,
            batch_size,
            interval,
        }
    }

    /// Run the pipeline now.
    ///
    /// Returns `None` when a run is already in progress or the run failed.
    pub async fn run_once(&self) -> Option<PipelineReport> {
        match self.news.process_rss_news(self.batch_size).await {
            Ok(report) => {
                info!(
                    sources = report.fetch.sources,
                    inserted = report.fetch.inserted,
                    processed = report.process.processed,
                    approved = report.process.approved,
                    rejected = report.process.rejected,
                    "Scheduled pipeline run finished"
                );
                Some(report)
            }
            Err(NewsServiceError::PipelineBusy) => {
                debug!("Pipeline run already in progress, skipping");
                None
            }
            Err(e) => {
                error!(error = %e, "Scheduled pipeline run failed");
                None
            }
        }
    }

    /// Start the interval loop. The first run happens one interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            interval.tick().await;
            info!(interval_secs = self.interval.as_secs(), "Pipeline scheduler started");
            loop {
                interval.tick().await;
                let this = self.clone();
                // spawned so a slow run does not delay the next tick check
                tokio::spawn(async move {
                    this.run_once().await;
                });
            }
        })
    }
}

/// Periodically drop expired entries from every limiter
pub fn spawn_limiter_cleanup(limiters: Vec<Arc<SlidingWindowLimiter>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            for limiter in &limiters {
                limiter.cleanup().await;
            }
        }
    })
}
