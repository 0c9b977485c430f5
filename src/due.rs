//! Due-notification selection and the notification claim.
//!
//! Selection is a pure read. The claim ([`ItemStore::mark_notified`]) is one
//! conditional `UPDATE`, so concurrent dispatchers racing on the same item see
//! exactly one winner.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::item::{select_columns, Item};
use crate::models::ItemStatus;
use crate::repository::ItemStore;
use crate::schema::items;

/// Result cap used when the caller passes a non-positive limit
pub const DEFAULT_DUE_LIMIT: i64 = 50;

/// A due item as seen by the notification dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueNotification {
    /// Item kind ("reminder" or "event")
    pub kind: &'static str,
    /// Item id within its kind
    pub item_id: i64,
    /// Owning user
    pub user_id: i64,
    /// Channel the item came from
    pub channel_id: i64,
    /// Title to show in the notification
    pub title: String,
    /// Trigger time that made the item due
    pub trigger_at: DateTime<Utc>,
}

impl DueNotification {
    /// Build from an item; `None` when the item has no trigger time
    pub fn from_item<T: Item>(item: &T) -> Option<Self> {
        Some(Self {
            kind: T::KIND,
            item_id: item.id(),
            user_id: item.user_id(),
            channel_id: item.channel_id(),
            title: item.title().to_string(),
            trigger_at: item.trigger_time()?,
        })
    }
}

/// The only surface the notification dispatcher may use.
#[cfg_attr(test, mockall::automock)]
pub trait DueSource: Send + Sync {
    /// Item kind served by this source
    fn kind(&self) -> &'static str;

    /// Items due at `now`, oldest trigger first
    fn select_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<DueNotification>>;

    /// Claim an item's notification; true only for the call that set the marker
    fn mark_notified(&self, item_id: i64, sent_at: DateTime<Utc>) -> Result<bool>;
}

impl<T: Item> ItemStore<T> {
    /// Items whose trigger time has passed and whose notification is unclaimed.
    ///
    /// Only `confirmed` and `synced` items qualify. Results are ordered by trigger
    /// time, then id. A non-positive `limit` means [`DEFAULT_DUE_LIMIT`].
    pub fn select_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<T>> {
        let limit = if limit <= 0 { DEFAULT_DUE_LIMIT } else { limit };
        let statuses = ItemStatus::NOTIFIABLE
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.database().get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {columns} FROM {table}
             WHERE {status} IN ({statuses})
               AND ({trigger}) IS NOT NULL
               AND ({trigger}) <= ?1
               AND {notified} IS NULL
             ORDER BY ({trigger}) ASC, {id} ASC
             LIMIT ?2",
            columns = select_columns::<T>(),
            table = T::TABLE,
            status = items::STATUS,
            trigger = T::TRIGGER_EXPR,
            notified = items::NOTIFIED_AT,
            id = items::ID,
        ))?;

        let due = stmt
            .query_map(params![now, limit], |row| T::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        self.metrics().record_due_selected(T::KIND, due.len());
        debug!(kind = T::KIND, count = due.len(), %now, "Selected due items");
        Ok(due)
    }

    /// Set the notification marker if it is still unset.
    ///
    /// Returns whether this call set it. A missing id returns false.
    pub fn mark_notified(&self, id: i64, sent_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.database().get_connection()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1 WHERE {} = ?2 AND {} IS NULL",
                T::TABLE,
                items::NOTIFIED_AT,
                items::ID,
                items::NOTIFIED_AT
            ),
            params![sent_at, id],
        )?;

        let won = changed == 1;
        self.metrics().record_claim(T::KIND, won);
        debug!(kind = T::KIND, item_id = id, won, "Notification claim");
        Ok(won)
    }
}

impl<T: Item> DueSource for ItemStore<T> {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn select_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<DueNotification>> {
        Ok(Self::select_due(self, now, limit)?
            .iter()
            .filter_map(DueNotification::from_item)
            .collect())
    }

    fn mark_notified(&self, item_id: i64, sent_at: DateTime<Utc>) -> Result<bool> {
        Self::mark_notified(self, item_id, sent_at)
    }
}
