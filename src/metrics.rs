use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names and recording helpers.
///
/// Recording is a no-op until a recorder is installed by the host process.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    // Item lifecycle metrics
    pub items_created_total: &'static str,
    pub status_transitions_total: &'static str,
    pub guarded_updates_skipped_total: &'static str,

    // Due-notification metrics
    pub due_selected_total: &'static str,
    pub notifications_claimed_total: &'static str,
    pub notifications_lost_race_total: &'static str,
    pub notifications_delivered_total: &'static str,
    pub notifications_failed_total: &'static str,
    pub poll_duration: &'static str,

    // Message history metrics
    pub history_appended_total: &'static str,
    pub history_pruned_total: &'static str,

    // Database metrics
    pub db_connection_pool_size: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            items_created_total: "event_inbox_items_created_total",
            status_transitions_total: "event_inbox_status_transitions_total",
            guarded_updates_skipped_total: "event_inbox_guarded_updates_skipped_total",

            due_selected_total: "event_inbox_due_selected_total",
            notifications_claimed_total: "event_inbox_notifications_claimed_total",
            notifications_lost_race_total: "event_inbox_notifications_lost_race_total",
            notifications_delivered_total: "event_inbox_notifications_delivered_total",
            notifications_failed_total: "event_inbox_notifications_failed_total",
            poll_duration: "event_inbox_poll_duration_seconds",

            history_appended_total: "event_inbox_history_appended_total",
            history_pruned_total: "event_inbox_history_pruned_total",

            db_connection_pool_size: "event_inbox_db_connection_pool_size",
        }
    }
}

impl MetricsCollector {
    /// Record a newly created item
    pub fn record_item_created(&self, kind: &'static str) {
        counter!(self.items_created_total, "kind" => kind).increment(1);
    }

    /// Record a status write
    pub fn record_transition(&self, kind: &'static str, status: &'static str) {
        counter!(self.status_transitions_total, "kind" => kind, "status" => status).increment(1);
    }

    /// Record a guarded update whose guard did not match
    pub fn record_guard_skipped(&self, kind: &'static str, operation: &'static str) {
        counter!(self.guarded_updates_skipped_total, "kind" => kind, "operation" => operation)
            .increment(1);
    }

    /// Record how many items a due selection returned
    pub fn record_due_selected(&self, kind: &'static str, count: usize) {
        counter!(self.due_selected_total, "kind" => kind).increment(count as u64);
    }

    /// Record the result of a notification claim
    pub fn record_claim(&self, kind: &'static str, won: bool) {
        if won {
            counter!(self.notifications_claimed_total, "kind" => kind).increment(1);
        } else {
            counter!(self.notifications_lost_race_total, "kind" => kind).increment(1);
        }
    }

    /// Record the result of handing a claimed notification to the notifier
    pub fn record_delivery(&self, kind: &'static str, success: bool) {
        if success {
            counter!(self.notifications_delivered_total, "kind" => kind).increment(1);
        } else {
            counter!(self.notifications_failed_total, "kind" => kind).increment(1);
        }
    }

    /// Record one dispatcher poll
    pub fn record_poll(&self, duration: Duration) {
        histogram!(self.poll_duration).record(duration.as_secs_f64());
    }

    /// Record appended history messages
    pub fn record_history_appended(&self, count: usize) {
        counter!(self.history_appended_total).increment(count as u64);
    }

    /// Record rows removed by retention pruning
    pub fn record_history_pruned(&self, count: usize) {
        counter!(self.history_pruned_total).increment(count as u64);
    }

    /// Update connection pool size
    pub fn update_connection_pool_size(&self, size: u32) {
        gauge!(self.db_connection_pool_size).set(f64::from(size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::default();
        assert_eq!(collector.items_created_total, "event_inbox_items_created_total");
        assert!(collector.poll_duration.ends_with("_seconds"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let collector = MetricsCollector::default();
        collector.record_item_created("reminder");
        collector.record_claim("event", false);
        collector.record_poll(Duration::from_millis(5));
        collector.update_connection_pool_size(3);
    }
}
