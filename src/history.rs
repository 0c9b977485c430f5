//! Message History Store: append-only inbound message log used as classifier context.
//!
//! Bridges may replay history, so the table can hold byte-identical duplicates.
//! Reads deduplicate; writes never do.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row, Transaction};
use tracing::{debug, info};

use crate::config::HistoryConfig;
use crate::db::Database;
use crate::error::{LifecycleError, Result};
use crate::metrics::MetricsCollector;
use crate::models::{HistoryMessage, NewHistoryMessage, SourceType};
use crate::schema::{channels, message_history as mh};

/// Store for inbound message history
#[derive(Debug, Clone)]
pub struct MessageHistoryStore {
    db: Database,
    settings: HistoryConfig,
    metrics: MetricsCollector,
}

impl MessageHistoryStore {
    /// Create a store with default fetch sizing
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self::with_config(db, HistoryConfig::default())
    }

    /// Create a store with explicit fetch sizing
    #[must_use]
    pub fn with_config(db: Database, settings: HistoryConfig) -> Self {
        Self {
            db,
            settings,
            metrics: MetricsCollector::default(),
        }
    }

    /// Append one message.
    ///
    /// The owning user and source type are copied from the channel. Fails with
    /// [`LifecycleError::ChannelNotFound`] when the channel does not exist.
    pub fn append(&self, message: &NewHistoryMessage) -> Result<HistoryMessage> {
        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction()?;
        let id = insert_message(&tx, message)?;
        touch_channel_stats(&tx, message.channel_id, 1, message.timestamp)?;
        let stored = tx.query_row(
            &format!("SELECT {} FROM {} WHERE {} = ?1", COLUMNS, mh::TABLE, mh::ID),
            params![id],
            message_from_row,
        )?;
        tx.commit()?;

        self.metrics.record_history_appended(1);
        debug!(channel_id = message.channel_id, message_id = id, "Message appended");
        Ok(stored)
    }

    /// Append a batch for one or more channels in a single transaction.
    ///
    /// Either every message is stored or none is.
    pub fn append_batch(&self, messages: &[NewHistoryMessage]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction()?;
        for message in messages {
            insert_message(&tx, message)?;
            touch_channel_stats(&tx, message.channel_id, 1, message.timestamp)?;
        }
        tx.commit()?;

        self.metrics.record_history_appended(messages.len());
        info!(count = messages.len(), "Message batch appended");
        Ok(messages.len())
    }

    /// The newest `limit` distinct messages of a channel, oldest first.
    ///
    /// Reads a bounded superset newest-first, drops duplicates, keeps the first
    /// `limit` survivors and returns them in chronological order. Neither the
    /// read nor the result exceeds `fetch_ceiling` rows.
    pub fn get_recent(&self, channel_id: i64, limit: usize) -> Result<Vec<HistoryMessage>> {
        let limit = limit.min(self.settings.fetch_ceiling);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let fetch = fetch_size(limit, self.settings.fetch_multiplier, self.settings.fetch_ceiling);
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} DESC, {} DESC LIMIT ?2",
            COLUMNS,
            mh::TABLE,
            mh::CHANNEL_ID,
            mh::TIMESTAMP,
            mh::ID
        ))?;
        let newest_first = stmt
            .query_map(params![channel_id, sql_limit(fetch)], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let fetched = newest_first.len();
        let recent = dedup_recent(newest_first, limit);
        debug!(channel_id, fetched, returned = recent.len(), "Loaded recent history");
        Ok(recent)
    }

    /// Delete all but the `keep_count` newest messages of a channel.
    ///
    /// The channel's `message_count` is reduced by the number of rows removed.
    pub fn prune(&self, channel_id: i64, keep_count: usize) -> Result<usize> {
        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            &format!(
                "DELETE FROM {table} WHERE {channel} = ?1 AND {id} NOT IN (
                     SELECT {id} FROM {table} WHERE {channel} = ?1
                     ORDER BY {ts} DESC, {id} DESC LIMIT ?2
                 )",
                table = mh::TABLE,
                channel = mh::CHANNEL_ID,
                id = mh::ID,
                ts = mh::TIMESTAMP
            ),
            params![channel_id, sql_limit(keep_count)],
        )?;
        discount_channel_stats(&tx, channel_id, removed)?;
        tx.commit()?;

        self.record_pruned(channel_id, removed);
        Ok(removed)
    }

    /// Delete a channel's messages sent before `cutoff`.
    pub fn prune_older_than(&self, channel_id: i64, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND {} < ?2",
                mh::TABLE,
                mh::CHANNEL_ID,
                mh::TIMESTAMP
            ),
            params![channel_id, cutoff],
        )?;
        discount_channel_stats(&tx, channel_id, removed)?;
        tx.commit()?;

        self.record_pruned(channel_id, removed);
        Ok(removed)
    }

    /// Stored row count for a channel, duplicates included
    pub fn count(&self, channel_id: i64) -> Result<i64> {
        let conn = self.db.get_connection()?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", mh::TABLE, mh::CHANNEL_ID),
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn record_pruned(&self, channel_id: i64, removed: usize) {
        self.metrics.record_history_pruned(removed);
        if removed > 0 {
            info!(channel_id, removed, "Pruned message history");
        }
    }
}

const COLUMNS: &str =
    "id, channel_id, user_id, source_type, sender_id, sender_name, body, subject, timestamp, created_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryMessage> {
    Ok(HistoryMessage {
        id: row.get(mh::ID)?,
        channel_id: row.get(mh::CHANNEL_ID)?,
        user_id: row.get(mh::USER_ID)?,
        source_type: row.get(mh::SOURCE_TYPE)?,
        sender_id: row.get(mh::SENDER_ID)?,
        sender_name: row.get(mh::SENDER_NAME)?,
        body: row.get(mh::BODY)?,
        subject: row.get(mh::SUBJECT)?,
        timestamp: row.get(mh::TIMESTAMP)?,
        created_at: row.get(mh::CREATED_AT)?,
    })
}

fn insert_message(tx: &Transaction<'_>, message: &NewHistoryMessage) -> Result<i64> {
    let inserted = tx.execute(
        &format!(
            "INSERT INTO {mh} ({mh_channel}, {mh_user}, {mh_source}, sender_id, sender_name, body, subject, timestamp, created_at)
             SELECT {c_id}, {c_user}, {c_source}, ?2, ?3, ?4, ?5, ?6, ?7 FROM {c} WHERE {c_id} = ?1",
            mh = mh::TABLE,
            mh_channel = mh::CHANNEL_ID,
            mh_user = mh::USER_ID,
            mh_source = mh::SOURCE_TYPE,
            c = channels::TABLE,
            c_id = channels::ID,
            c_user = channels::USER_ID,
            c_source = channels::SOURCE_TYPE,
        ),
        params![
            message.channel_id,
            message.sender_id,
            message.sender_name,
            message.body,
            message.subject,
            message.timestamp,
            Utc::now()
        ],
    )?;

    if inserted == 0 {
        return Err(LifecycleError::ChannelNotFound(message.channel_id));
    }
    Ok(tx.last_insert_rowid())
}

fn touch_channel_stats(
    tx: &Transaction<'_>,
    channel_id: i64,
    added: i64,
    latest: DateTime<Utc>,
) -> Result<()> {
    tx.execute(
        &format!(
            "UPDATE {t} SET {count} = {count} + ?2,
                 {last} = CASE WHEN {last} IS NULL OR {last} < ?3 THEN ?3 ELSE {last} END,
                 {updated} = ?4
             WHERE {id} = ?1",
            t = channels::TABLE,
            count = channels::MESSAGE_COUNT,
            last = channels::LAST_MESSAGE_AT,
            updated = channels::UPDATED_AT,
            id = channels::ID
        ),
        params![channel_id, added, latest, Utc::now()],
    )?;
    Ok(())
}

fn discount_channel_stats(tx: &Transaction<'_>, channel_id: i64, removed: usize) -> Result<()> {
    if removed == 0 {
        return Ok(());
    }
    tx.execute(
        &format!(
            "UPDATE {t} SET {count} = MAX({count} - ?2, 0), {updated} = ?3 WHERE {id} = ?1",
            t = channels::TABLE,
            count = channels::MESSAGE_COUNT,
            updated = channels::UPDATED_AT,
            id = channels::ID
        ),
        params![channel_id, sql_limit(removed), Utc::now()],
    )?;
    Ok(())
}

/// How many rows to read for a request of `limit` distinct messages, never above `ceiling`
pub(crate) fn fetch_size(limit: usize, multiplier: usize, ceiling: usize) -> usize {
    limit.min(ceiling).saturating_mul(multiplier).min(ceiling)
}

/// A row count as an SQL integer. `usize` values past `i64::MAX` would wrap to a
/// negative `LIMIT`, which SQLite reads as unbounded.
fn sql_limit(rows: usize) -> i64 {
    i64::try_from(rows).unwrap_or(i64::MAX)
}

/// Identity of a logical message, independent of its row id
#[derive(Debug, PartialEq, Eq, Hash)]
struct DedupKey<'a> {
    source_type: SourceType,
    channel_id: i64,
    sender_id: &'a str,
    subject: Option<&'a str>,
    body: &'a str,
    timestamp: DateTime<Utc>,
}

impl<'a> DedupKey<'a> {
    fn of(message: &'a HistoryMessage) -> Self {
        Self {
            source_type: message.source_type,
            channel_id: message.channel_id,
            sender_id: &message.sender_id,
            subject: message.subject.as_deref(),
            body: &message.body,
            timestamp: message.timestamp,
        }
    }
}

/// Deduplicate a newest-first sequence, keep `limit` entries, return oldest first.
pub(crate) fn dedup_recent(newest_first: Vec<HistoryMessage>, limit: usize) -> Vec<HistoryMessage> {
    let mut keep = Vec::with_capacity(limit.min(newest_first.len()));
    {
        let mut seen = HashSet::new();
        for (index, message) in newest_first.iter().enumerate() {
            if keep.len() == limit {
                break;
            }
            if seen.insert(DedupKey::of(message)) {
                keep.push(index);
            }
        }
    }

    let mut rows: Vec<Option<HistoryMessage>> = newest_first.into_iter().map(Some).collect();
    keep.iter()
        .rev()
        .filter_map(|&index| rows.get_mut(index).and_then(Option::take))
        .collect()
}
