//! Reference notification dispatcher.
//!
//! Each tick selects due items from every [`DueSource`], claims each one with
//! `mark_notified` and hands only the claims it won to the [`Notifier`]. Running
//! several dispatchers against one database is safe; the claim decides who delivers.
//! A delivery that fails after a won claim is logged and not retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::NotificationConfig;
use crate::db::call_blocking;
use crate::due::{DueNotification, DueSource};
use crate::error::Result;
use crate::metrics::MetricsCollector;

/// Delivers a claimed notification to the user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: &DueNotification) -> Result<()>;
}

/// Notifier that only writes a log line
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &DueNotification) -> Result<()> {
        info!(
            kind = notification.kind,
            item_id = notification.item_id,
            user_id = notification.user_id,
            trigger_at = %notification.trigger_at,
            title = %notification.title,
            "Due notification"
        );
        Ok(())
    }
}

/// Counts from one poll
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Items returned by the selectors
    pub selected: usize,
    /// Claims this dispatcher won
    pub claimed: usize,
    /// Claims lost to another dispatcher
    pub lost: usize,
    /// Won claims delivered successfully
    pub delivered: usize,
    /// Won claims whose delivery failed
    pub failed: usize,
}

/// Polls due sources on a fixed interval and delivers what it claims
pub struct NotificationDispatcher {
    sources: Vec<Arc<dyn DueSource>>,
    notifier: Arc<dyn Notifier>,
    batch_limit: i64,
    poll_interval: Duration,
    metrics: MetricsCollector,
}

impl NotificationDispatcher {
    /// Create a dispatcher over the given sources
    pub fn new(
        sources: Vec<Arc<dyn DueSource>>,
        notifier: Arc<dyn Notifier>,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            sources,
            notifier,
            batch_limit: i64::try_from(config.batch_limit).unwrap_or(i64::MAX),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            metrics: MetricsCollector::default(),
        }
    }

    /// Run one selection and delivery pass at `now`.
    ///
    /// Storage errors abort the pass; the next tick starts over.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollSummary> {
        let started = Instant::now();
        let mut summary = PollSummary::default();

        for source in &self.sources {
            let limit = self.batch_limit;
            let due = call_blocking(Arc::clone(source), move |s| s.select_due(now, limit)).await?;
            summary.selected += due.len();

            for notification in due {
                let item_id = notification.item_id;
                let won =
                    call_blocking(Arc::clone(source), move |s| s.mark_notified(item_id, now)).await?;

                if !won {
                    summary.lost += 1;
                    debug!(kind = notification.kind, item_id, "Claim lost to another dispatcher");
                    continue;
                }
                summary.claimed += 1;

                match self.notifier.notify(&notification).await {
                    Ok(()) => {
                        summary.delivered += 1;
                        self.metrics.record_delivery(notification.kind, true);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        self.metrics.record_delivery(notification.kind, false);
                        warn!(
                            kind = notification.kind,
                            item_id,
                            user_id = notification.user_id,
                            error = %e,
                            "Notification claimed but not delivered"
                        );
                    }
                }
            }
        }

        self.metrics.record_poll(started.elapsed());
        if summary.selected > 0 {
            info!(
                selected = summary.selected,
                delivered = summary.delivered,
                lost = summary.lost,
                failed = summary.failed,
                "Poll finished"
            );
        }
        Ok(summary)
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.poll_interval.as_secs(),
            sources = self.sources.len(),
            "Notification dispatcher started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once(Utc::now()).await {
                        error!(error = %e, retryable = e.is_retryable(), "Poll failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Notification dispatcher stopped");
    }
}
