//! Item Store: persistence and lifecycle operations for reminders and calendar events.
//!
//! Every load or mutation of an item is scoped by the owning user. Guarded writes
//! are single conditional `UPDATE` statements; nothing here holds a lock across
//! statements.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{is_foreign_key_violation, LifecycleError, Result};
use crate::item::{select_columns, Item};
use crate::metrics::MetricsCollector;
use crate::models::{CalendarEvent, ItemStatus, NewItem, Reminder, UpdateOutcome};
use crate::schema::items;
use crate::validation::InputValidator;

/// Store for one item kind.
pub struct ItemStore<T: Item> {
    db: Database,
    metrics: MetricsCollector,
    _kind: PhantomData<fn() -> T>,
}

/// Store for reminders
pub type ReminderStore = ItemStore<Reminder>;
/// Store for calendar events
pub type EventStore = ItemStore<CalendarEvent>;

impl<T: Item> Clone for ItemStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            metrics: self.metrics,
            _kind: PhantomData,
        }
    }
}

impl<T: Item> std::fmt::Debug for ItemStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStore").field("kind", &T::KIND).finish_non_exhaustive()
    }
}

/// The mutation surface the calendar sync collaborator is allowed to use.
pub trait SyncTarget<T: Item>: Send + Sync {
    /// Live items of a channel in schedule order
    fn get_active_for_channel(&self, user_id: i64, channel_id: i64) -> Result<Vec<T>>;

    /// Record the external calendar id and mark the item synced
    fn set_external_id(&self, user_id: i64, id: i64, external_id: &str) -> Result<UpdateOutcome>;

    /// Apply content from the authoritative external calendar
    fn update_synced_content_from_external(
        &self,
        user_id: i64,
        id: i64,
        content: &T::Content,
    ) -> Result<UpdateOutcome>;
}

fn status_list(statuses: &[ItemStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn schedule_order_clause<T: Item>() -> String {
    format!(
        "ORDER BY {col} IS NULL, {col} ASC, {id} ASC",
        col = T::SCHEDULE_COLUMN,
        id = items::ID
    )
}

impl<T: Item> ItemStore<T> {
    /// Create a store over an open database
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            metrics: MetricsCollector::default(),
            _kind: PhantomData,
        }
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) const fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Persist a classifier proposal as a `pending` item.
    ///
    /// Status and timestamps are always set here. Fails with
    /// [`LifecycleError::ChannelNotFound`] when the channel does not exist for the user.
    pub fn create(&self, new_item: &NewItem<T::Content>) -> Result<T> {
        T::validate_content(&new_item.content)?;
        InputValidator::validate_classification(&new_item.classification)?;

        let conn = self.db.get_connection()?;
        let now = Utc::now();
        let flags = serde_json::to_string(&new_item.classification.quality_flags)?;
        let classification = &new_item.classification;

        let mut columns = vec![items::USER_ID, items::CHANNEL_ID, items::CALENDAR_ID];
        columns.extend_from_slice(T::CONTENT_COLUMNS);
        columns.extend_from_slice(&[
            items::STATUS,
            items::ACTION_TYPE,
            items::SOURCE_MESSAGE_ID,
            items::REASONING,
            items::CONFIDENCE,
            items::QUALITY_FLAGS,
            items::CREATED_AT,
            items::UPDATED_AT,
        ]);

        let pending = ItemStatus::Pending;
        let mut values: Vec<&dyn ToSql> = vec![
            &new_item.user_id as &dyn ToSql,
            &new_item.channel_id as &dyn ToSql,
            &new_item.calendar_id as &dyn ToSql,
        ];
        values.extend(T::content_params(&new_item.content));
        values.extend_from_slice(&[
            &pending as &dyn ToSql,
            &classification.action_type,
            &classification.source_message_id,
            &classification.reasoning,
            &classification.confidence,
            &flags,
            &now,
            &now,
        ]);

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::TABLE,
            columns.join(", "),
            placeholders
        );

        match conn.execute(&sql, params_from_iter(values)) {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                warn!(
                    kind = T::KIND,
                    user_id = new_item.user_id,
                    channel_id = new_item.channel_id,
                    "Item references a missing channel"
                );
                return Err(LifecycleError::ChannelNotFound(new_item.channel_id));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        self.metrics.record_item_created(T::KIND);
        info!(kind = T::KIND, item_id = id, user_id = new_item.user_id, "Item created");

        fetch_one::<T>(&conn, new_item.user_id, id)?
            .ok_or_else(|| LifecycleError::Other(format!("{} {id} vanished after insert", T::KIND)))
    }

    /// Replace the content of a `pending` item.
    ///
    /// Any other status leaves the row untouched and is reported as
    /// [`UpdateOutcome::WrongStatus`], never as an error.
    pub fn update_pending_content(
        &self,
        user_id: i64,
        id: i64,
        content: &T::Content,
    ) -> Result<UpdateOutcome> {
        T::validate_content(content)?;
        self.guarded_content_update(user_id, id, content, &[ItemStatus::Pending], "update_pending")
    }

    /// Replace the content of a `confirmed` or `synced` item from the external calendar.
    ///
    /// Status is left as is; other statuses are a no-op.
    pub fn update_synced_content_from_external(
        &self,
        user_id: i64,
        id: i64,
        content: &T::Content,
    ) -> Result<UpdateOutcome> {
        T::validate_content(content)?;
        self.guarded_content_update(
            user_id,
            id,
            content,
            &ItemStatus::NOTIFIABLE,
            "update_from_external",
        )
    }

    fn guarded_content_update(
        &self,
        user_id: i64,
        id: i64,
        content: &T::Content,
        allowed: &[ItemStatus],
        operation: &'static str,
    ) -> Result<UpdateOutcome> {
        let conn = self.db.get_connection()?;
        let now = Utc::now();

        let assignments = T::CONTENT_COLUMNS
            .iter()
            .map(|col| format!("{col} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {}, {} = ? WHERE {} = ? AND {} = ? AND {} IN ({})",
            T::TABLE,
            assignments,
            items::UPDATED_AT,
            items::ID,
            items::USER_ID,
            items::STATUS,
            status_list(allowed)
        );

        let mut values = T::content_params(content);
        values.extend_from_slice(&[&now as &dyn ToSql, &id, &user_id]);

        let changed = conn.execute(&sql, params_from_iter(values))?;
        let outcome = classify::<T>(&conn, user_id, id, changed)?;
        if !outcome.is_updated() {
            self.metrics.record_guard_skipped(T::KIND, operation);
            debug!(kind = T::KIND, item_id = id, user_id, ?outcome, operation, "Guarded update skipped");
        }
        Ok(outcome)
    }

    /// Write a new status unconditionally.
    ///
    /// The state machine is not enforced here; see
    /// [`ItemStore::transition_status_checked`] for the guarded variant. Statuses the
    /// item kind does not use are rejected as invalid input.
    pub fn transition_status(
        &self,
        user_id: i64,
        id: i64,
        status: ItemStatus,
    ) -> Result<UpdateOutcome> {
        ensure_kind_status::<T>(status)?;
        let conn = self.db.get_connection()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1, {} = ?2 WHERE {} = ?3 AND {} = ?4",
                T::TABLE,
                items::STATUS,
                items::UPDATED_AT,
                items::ID,
                items::USER_ID
            ),
            params![status, Utc::now(), id, user_id],
        )?;

        if changed == 0 {
            return Ok(UpdateOutcome::NotFound);
        }
        self.metrics.record_transition(T::KIND, status.as_str());
        info!(kind = T::KIND, item_id = id, user_id, status = %status, "Status written");
        Ok(UpdateOutcome::Updated)
    }

    /// Move to `status` only if the state machine allows it from the current status.
    pub fn transition_status_checked(
        &self,
        user_id: i64,
        id: i64,
        status: ItemStatus,
    ) -> Result<UpdateOutcome> {
        ensure_kind_status::<T>(status)?;
        let predecessors: Vec<ItemStatus> = T::STATUSES
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(status))
            .collect();

        let conn = self.db.get_connection()?;
        let changed = if predecessors.is_empty() {
            0
        } else {
            conn.execute(
                &format!(
                    "UPDATE {} SET {} = ?1, {} = ?2 WHERE {} = ?3 AND {} = ?4 AND {} IN ({})",
                    T::TABLE,
                    items::STATUS,
                    items::UPDATED_AT,
                    items::ID,
                    items::USER_ID,
                    items::STATUS,
                    status_list(&predecessors)
                ),
                params![status, Utc::now(), id, user_id],
            )?
        };

        let outcome = classify::<T>(&conn, user_id, id, changed)?;
        if outcome.is_updated() {
            self.metrics.record_transition(T::KIND, status.as_str());
            info!(kind = T::KIND, item_id = id, user_id, status = %status, "Status transitioned");
        } else {
            self.metrics.record_guard_skipped(T::KIND, "transition");
            debug!(kind = T::KIND, item_id = id, user_id, ?outcome, to = %status, "Transition refused");
        }
        Ok(outcome)
    }

    /// Record the external calendar id and move the item to `synced` in one write.
    ///
    /// Terminal items are never resurrected; they report `WrongStatus`.
    pub fn set_external_id(&self, user_id: i64, id: i64, external_id: &str) -> Result<UpdateOutcome> {
        if external_id.trim().is_empty() {
            return Err(LifecycleError::InvalidInput("External id cannot be empty".to_string()));
        }

        let conn = self.db.get_connection()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1, {} = ?2, {} = ?3 WHERE {} = ?4 AND {} = ?5 AND {} IN ({})",
                T::TABLE,
                items::EXTERNAL_ID,
                items::STATUS,
                items::UPDATED_AT,
                items::ID,
                items::USER_ID,
                items::STATUS,
                status_list(&ItemStatus::ACTIVE)
            ),
            params![external_id, ItemStatus::Synced, Utc::now(), id, user_id],
        )?;

        let outcome = classify::<T>(&conn, user_id, id, changed)?;
        if outcome.is_updated() {
            self.metrics.record_transition(T::KIND, ItemStatus::Synced.as_str());
            info!(kind = T::KIND, item_id = id, user_id, external_id, "Item synced");
        }
        Ok(outcome)
    }

    /// Hard delete. Returns whether a row was removed; a missing id is not an error.
    pub fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        let conn = self.db.get_connection()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE {} = ?1 AND {} = ?2", T::TABLE, items::ID, items::USER_ID),
            params![id, user_id],
        )?;
        if removed > 0 {
            info!(kind = T::KIND, item_id = id, user_id, "Item deleted");
        }
        Ok(removed > 0)
    }

    /// Load an item owned by `user_id`; `Ok(None)` when absent
    pub fn get_by_id(&self, user_id: i64, id: i64) -> Result<Option<T>> {
        let conn = self.db.get_connection()?;
        fetch_one::<T>(&conn, user_id, id)
    }

    /// Look up by external calendar id across all users; `Ok(None)` when absent.
    ///
    /// For sync bookkeeping only. User-facing paths use
    /// [`ItemStore::get_by_external_id_for_user`].
    pub fn get_by_external_id(&self, external_id: &str) -> Result<Option<T>> {
        let conn = self.db.get_connection()?;
        let item = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} ASC LIMIT 1",
                    select_columns::<T>(),
                    T::TABLE,
                    items::EXTERNAL_ID,
                    items::ID
                ),
                params![external_id],
                |row| T::from_row(row),
            )
            .optional()?;
        Ok(item)
    }

    /// Look up by external calendar id within one user's items; `Ok(None)` when absent
    pub fn get_by_external_id_for_user(&self, user_id: i64, external_id: &str) -> Result<Option<T>> {
        let conn = self.db.get_connection()?;
        let item = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?1 AND {} = ?2 ORDER BY {} ASC LIMIT 1",
                    select_columns::<T>(),
                    T::TABLE,
                    items::USER_ID,
                    items::EXTERNAL_ID,
                    items::ID
                ),
                params![user_id, external_id],
                |row| T::from_row(row),
            )
            .optional()?;
        Ok(item)
    }

    /// List a user's items, optionally filtered by status and channel, in schedule order
    pub fn list(
        &self,
        user_id: i64,
        status: Option<ItemStatus>,
        channel_id: Option<i64>,
    ) -> Result<Vec<T>> {
        let conn = self.db.get_connection()?;

        // Build query
        let mut query = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            select_columns::<T>(),
            T::TABLE,
            items::USER_ID
        );
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(user_id)];

        if let Some(status) = status {
            query.push_str(&format!(" AND {} = ?", items::STATUS));
            params.push(Box::new(status));
        }

        if let Some(channel_id) = channel_id {
            query.push_str(&format!(" AND {} = ?", items::CHANNEL_ID));
            params.push(Box::new(channel_id));
        }

        query.push(' ');
        query.push_str(&schedule_order_clause::<T>());

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| T::from_row(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Live (`pending`, `confirmed`, `synced`) items of a channel in schedule order
    pub fn get_active_for_channel(&self, user_id: i64, channel_id: i64) -> Result<Vec<T>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE {} = ?1 AND {} = ?2 AND {} IN ({}) {}",
            select_columns::<T>(),
            T::TABLE,
            items::USER_ID,
            items::CHANNEL_ID,
            items::STATUS,
            status_list(&ItemStatus::ACTIVE),
            schedule_order_clause::<T>()
        ))?;
        let rows = stmt.query_map(params![user_id, channel_id], |row| T::from_row(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of `pending` items the user has not acted on
    pub fn count_pending(&self, user_id: i64) -> Result<i64> {
        let conn = self.db.get_connection()?;
        let count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND {} = ?2",
                T::TABLE,
                items::USER_ID,
                items::STATUS
            ),
            params![user_id, ItemStatus::Pending],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Items updated after `since`, for incremental UI refresh
    pub fn list_updated_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<Vec<T>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE {} = ?1 AND {} > ?2 ORDER BY {} ASC, {} ASC",
            select_columns::<T>(),
            T::TABLE,
            items::USER_ID,
            items::UPDATED_AT,
            items::UPDATED_AT,
            items::ID
        ))?;
        let rows = stmt.query_map(params![user_id, since], |row| T::from_row(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl<T: Item> SyncTarget<T> for ItemStore<T> {
    fn get_active_for_channel(&self, user_id: i64, channel_id: i64) -> Result<Vec<T>> {
        Self::get_active_for_channel(self, user_id, channel_id)
    }

    fn set_external_id(&self, user_id: i64, id: i64, external_id: &str) -> Result<UpdateOutcome> {
        Self::set_external_id(self, user_id, id, external_id)
    }

    fn update_synced_content_from_external(
        &self,
        user_id: i64,
        id: i64,
        content: &T::Content,
    ) -> Result<UpdateOutcome> {
        Self::update_synced_content_from_external(self, user_id, id, content)
    }
}

fn ensure_kind_status<T: Item>(status: ItemStatus) -> Result<()> {
    if T::STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidInput(format!(
            "status {status} is not used by {} items",
            T::KIND
        )))
    }
}

fn fetch_one<T: Item>(conn: &Connection, user_id: i64, id: i64) -> Result<Option<T>> {
    let item = conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE {} = ?1 AND {} = ?2",
                select_columns::<T>(),
                T::TABLE,
                items::ID,
                items::USER_ID
            ),
            params![id, user_id],
            |row| T::from_row(row),
        )
        .optional()?;
    Ok(item)
}

/// Turn a guarded write's row count into an outcome.
///
/// The follow-up read only labels the miss; the write itself was already decided
/// atomically by its `WHERE` clause.
fn classify<T: Item>(conn: &Connection, user_id: i64, id: i64, changed: usize) -> Result<UpdateOutcome> {
    if changed > 0 {
        return Ok(UpdateOutcome::Updated);
    }

    let status: Option<ItemStatus> = conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE {} = ?1 AND {} = ?2",
                items::STATUS,
                T::TABLE,
                items::ID,
                items::USER_ID
            ),
            params![id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(status.map_or(UpdateOutcome::NotFound, UpdateOutcome::WrongStatus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelRegistry;
    use crate::models::{Classification, EventContent, NewChannel, Priority, ReminderContent, SourceType};
    use chrono::Duration;

    fn setup() -> (Database, i64) {
        let db = Database::in_memory().unwrap();
        let registry = ChannelRegistry::new(db.clone());
        let channel = registry
            .create_channel(&NewChannel {
                user_id: 1,
                source_type: SourceType::Telegram,
                identifier: "@alice".to_string(),
                display_name: Some("Alice".to_string()),
                backfill_status: None,
            })
            .unwrap();
        (db, channel.id)
    }

    fn content(title: &str, due: Option<DateTime<Utc>>) -> ReminderContent {
        ReminderContent {
            title: title.to_string(),
            description: None,
            location: None,
            due_date: due,
            reminder_time: None,
            priority: Priority::Normal,
        }
    }

    fn new_reminder(channel_id: i64, title: &str, due: Option<DateTime<Utc>>) -> NewItem<ReminderContent> {
        NewItem {
            user_id: 1,
            channel_id,
            calendar_id: None,
            content: content(title, due),
            classification: Classification {
                confidence: Some(0.8),
                quality_flags: vec!["explicit_time".to_string(), "first_person".to_string()],
                ..Classification::default()
            },
        }
    }

    #[test]
    fn test_create_forces_pending_and_round_trips_classification() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let created = store.create(&new_reminder(channel_id, "Pay rent", None)).unwrap();

        assert_eq!(created.status, ItemStatus::Pending);
        assert_eq!(created.classification.quality_flags, vec!["explicit_time", "first_person"]);
        assert_eq!(created.classification.confidence, Some(0.8));
        assert!(created.notified_at.is_none());
    }

    #[test]
    fn test_create_rejects_missing_channel() {
        let (db, _) = setup();
        let store = ReminderStore::new(db);
        let err = store.create(&new_reminder(999, "Ghost", None)).unwrap_err();
        assert!(matches!(err, LifecycleError::ChannelNotFound(999)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_create_rejects_channel_of_other_user() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let mut draft = new_reminder(channel_id, "Not yours", None);
        draft.user_id = 2;
        assert!(matches!(store.create(&draft), Err(LifecycleError::ChannelNotFound(_))));
    }

    #[test]
    fn test_pending_edit_is_silent_noop_once_confirmed() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let created = store.create(&new_reminder(channel_id, "Original", None)).unwrap();

        let outcome = store
            .update_pending_content(1, created.id, &content("Edited", None))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        store.transition_status(1, created.id, ItemStatus::Confirmed).unwrap();
        let outcome = store
            .update_pending_content(1, created.id, &content("Too late", None))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::WrongStatus(ItemStatus::Confirmed));

        let stored = store.get_by_id(1, created.id).unwrap().unwrap();
        assert_eq!(stored.title, "Edited");
        assert_eq!(
            store.update_pending_content(1, 4242, &content("x", None)).unwrap(),
            UpdateOutcome::NotFound
        );
    }

    #[test]
    fn test_external_update_keeps_status() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let created = store.create(&new_reminder(channel_id, "Sync me", None)).unwrap();

        assert_eq!(
            store
                .update_synced_content_from_external(1, created.id, &content("From calendar", None))
                .unwrap(),
            UpdateOutcome::WrongStatus(ItemStatus::Pending)
        );

        store.transition_status(1, created.id, ItemStatus::Confirmed).unwrap();
        store.set_external_id(1, created.id, "gcal-1").unwrap();
        assert_eq!(
            store
                .update_synced_content_from_external(1, created.id, &content("From calendar", None))
                .unwrap(),
            UpdateOutcome::Updated
        );

        let stored = store.get_by_id(1, created.id).unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Synced);
        assert_eq!(stored.title, "From calendar");
        assert_eq!(stored.external_id.as_deref(), Some("gcal-1"));
    }

    #[test]
    fn test_checked_transition_refuses_regression() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let created = store.create(&new_reminder(channel_id, "Forward only", None)).unwrap();

        assert_eq!(
            store.transition_status_checked(1, created.id, ItemStatus::Synced).unwrap(),
            UpdateOutcome::WrongStatus(ItemStatus::Pending)
        );
        assert!(store
            .transition_status_checked(1, created.id, ItemStatus::Confirmed)
            .unwrap()
            .is_updated());
        assert!(store
            .transition_status_checked(1, created.id, ItemStatus::Synced)
            .unwrap()
            .is_updated());
        assert_eq!(
            store.transition_status_checked(1, created.id, ItemStatus::Pending).unwrap(),
            UpdateOutcome::WrongStatus(ItemStatus::Synced)
        );
    }

    #[test]
    fn test_status_not_used_by_kind_is_invalid() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let created = store.create(&new_reminder(channel_id, "Kinds", None)).unwrap();
        let err = store.transition_status(1, created.id, ItemStatus::Rejected).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidInput(_)));
    }

    #[test]
    fn test_set_external_id_does_not_resurrect_terminal() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let created = store.create(&new_reminder(channel_id, "Done", None)).unwrap();
        store.transition_status(1, created.id, ItemStatus::Completed).unwrap();
        assert_eq!(
            store.set_external_id(1, created.id, "gcal-2").unwrap(),
            UpdateOutcome::WrongStatus(ItemStatus::Completed)
        );
    }

    #[test]
    fn test_delete_missing_is_not_an_error() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let created = store.create(&new_reminder(channel_id, "Bye", None)).unwrap();
        assert!(store.delete(1, created.id).unwrap());
        assert!(!store.delete(1, created.id).unwrap());
        assert!(store.get_by_id(1, created.id).unwrap().is_none());
    }

    #[test]
    fn test_list_filters_and_counts() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let now = Utc::now();
        let a = store.create(&new_reminder(channel_id, "a", Some(now))).unwrap();
        store.create(&new_reminder(channel_id, "b", None)).unwrap();
        store.transition_status(1, a.id, ItemStatus::Confirmed).unwrap();

        assert_eq!(store.list(1, None, None).unwrap().len(), 2);
        assert_eq!(store.list(1, Some(ItemStatus::Pending), None).unwrap().len(), 1);
        assert_eq!(store.list(1, None, Some(channel_id + 1)).unwrap().len(), 0);
        assert_eq!(store.list(2, None, None).unwrap().len(), 0);
        assert_eq!(store.count_pending(1).unwrap(), 1);
    }

    #[test]
    fn test_list_updated_since() {
        let (db, channel_id) = setup();
        let store = ReminderStore::new(db);
        let before = Utc::now() - Duration::seconds(1);
        store.create(&new_reminder(channel_id, "recent", None)).unwrap();
        assert_eq!(store.list_updated_since(1, before).unwrap().len(), 1);
        assert!(store.list_updated_since(1, Utc::now() + Duration::hours(1)).unwrap().is_empty());
    }

    #[test]
    fn test_event_store_validates_range() {
        let (db, channel_id) = setup();
        let store = EventStore::new(db);
        let now = Utc::now();
        let draft = NewItem {
            user_id: 1,
            channel_id,
            calendar_id: Some("primary".to_string()),
            content: EventContent {
                title: "Backwards".to_string(),
                description: None,
                location: None,
                start_time: Some(now),
                end_time: Some(now - Duration::hours(1)),
            },
            classification: Classification::default(),
        };
        assert!(matches!(store.create(&draft), Err(LifecycleError::InvalidInput(_))));
    }
}
