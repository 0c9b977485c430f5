//! The capability interface shared by reminders and calendar events.
//!
//! Both entities run the same state machine, ordering rule and due-notification
//! logic. [`Item`] supplies the per-entity table layout and field accessors so the
//! store in [`crate::repository`] and the selector in [`crate::due`] are written once.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::Row;

use crate::error::Result;
use crate::models::{
    CalendarEvent, Classification, EventContent, ItemStatus, Reminder, ReminderContent,
};
use crate::schema::{calendar_events, items, reminders};
use crate::validation::InputValidator;

/// A reminder-like record governed by the item lifecycle.
pub trait Item: Sized + Send + 'static {
    /// Fields editable while pending, or from the external calendar once synced
    type Content: Send + Sync;

    /// Table holding the records
    const TABLE: &'static str;
    /// Short name used in logs and metrics labels
    const KIND: &'static str;
    /// Column ordering lists ("schedule time")
    const SCHEDULE_COLUMN: &'static str;
    /// SQL expression yielding the trigger time of a row
    const TRIGGER_EXPR: &'static str;
    /// Content columns, in the order [`Item::content_params`] binds them
    const CONTENT_COLUMNS: &'static [&'static str];
    /// Statuses the table accepts
    const STATUSES: &'static [ItemStatus];

    /// Map a full row to a record
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Bind values for [`Item::CONTENT_COLUMNS`]
    fn content_params(content: &Self::Content) -> Vec<&dyn ToSql>;

    /// Reject malformed content before it reaches storage
    fn validate_content(content: &Self::Content) -> Result<()>;

    /// Database primary key
    fn id(&self) -> i64;
    /// Owning user
    fn user_id(&self) -> i64;
    /// Owning channel
    fn channel_id(&self) -> i64;
    /// Title shown to the user
    fn title(&self) -> &str;
    /// Lifecycle status
    fn status(&self) -> ItemStatus;
    /// Primary schedule timestamp
    fn schedule_time(&self) -> Option<DateTime<Utc>>;
    /// Timestamp that governs due notification
    fn trigger_time(&self) -> Option<DateTime<Utc>>;
    /// When the due notification was claimed
    fn notified_at(&self) -> Option<DateTime<Utc>>;
}

/// Ordering used by every schedule-ordered list.
///
/// Items with a schedule come first in ascending order, unscheduled items last;
/// ties fall back to insertion order.
pub fn schedule_order<T: Item>(a: &T, b: &T) -> Ordering {
    nulls_last(a.schedule_time(), b.schedule_time()).then_with(|| a.id().cmp(&b.id()))
}

/// Ordering of due items: trigger time ascending, then insertion order.
pub fn trigger_order<T: Item>(a: &T, b: &T) -> Ordering {
    nulls_last(a.trigger_time(), b.trigger_time()).then_with(|| a.id().cmp(&b.id()))
}

pub(crate) fn nulls_last(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// The full column list selected for either table
pub(crate) fn select_columns<T: Item>() -> String {
    let shared = [
        items::ID,
        items::USER_ID,
        items::CHANNEL_ID,
        items::EXTERNAL_ID,
        items::CALENDAR_ID,
        items::STATUS,
        items::ACTION_TYPE,
        items::SOURCE_MESSAGE_ID,
        items::REASONING,
        items::CONFIDENCE,
        items::QUALITY_FLAGS,
        items::NOTIFIED_AT,
        items::CREATED_AT,
        items::UPDATED_AT,
    ];
    shared
        .iter()
        .chain(T::CONTENT_COLUMNS.iter())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn classification_from_row(row: &Row<'_>) -> rusqlite::Result<Classification> {
    let flags: String = row.get(items::QUALITY_FLAGS)?;
    let quality_flags = serde_json::from_str(&flags).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Classification {
        action_type: row.get(items::ACTION_TYPE)?,
        source_message_id: row.get(items::SOURCE_MESSAGE_ID)?,
        reasoning: row.get(items::REASONING)?,
        confidence: row.get(items::CONFIDENCE)?,
        quality_flags,
    })
}

impl Item for Reminder {
    type Content = ReminderContent;

    const TABLE: &'static str = reminders::TABLE;
    const KIND: &'static str = "reminder";
    const SCHEDULE_COLUMN: &'static str = reminders::DUE_DATE;
    const TRIGGER_EXPR: &'static str = "COALESCE(reminder_time, due_date)";
    const CONTENT_COLUMNS: &'static [&'static str] = &[
        items::TITLE,
        items::DESCRIPTION,
        items::LOCATION,
        reminders::DUE_DATE,
        reminders::REMINDER_TIME,
        reminders::PRIORITY,
    ];
    const STATUSES: &'static [ItemStatus] = &[
        ItemStatus::Pending,
        ItemStatus::Confirmed,
        ItemStatus::Synced,
        ItemStatus::Completed,
        ItemStatus::Dismissed,
    ];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(items::ID)?,
            user_id: row.get(items::USER_ID)?,
            channel_id: row.get(items::CHANNEL_ID)?,
            external_id: row.get(items::EXTERNAL_ID)?,
            calendar_id: row.get(items::CALENDAR_ID)?,
            title: row.get(items::TITLE)?,
            description: row.get(items::DESCRIPTION)?,
            location: row.get(items::LOCATION)?,
            due_date: row.get(reminders::DUE_DATE)?,
            reminder_time: row.get(reminders::REMINDER_TIME)?,
            priority: row.get(reminders::PRIORITY)?,
            status: row.get(items::STATUS)?,
            classification: classification_from_row(row)?,
            notified_at: row.get(items::NOTIFIED_AT)?,
            created_at: row.get(items::CREATED_AT)?,
            updated_at: row.get(items::UPDATED_AT)?,
        })
    }

    fn content_params(content: &ReminderContent) -> Vec<&dyn ToSql> {
        vec![
            &content.title as &dyn ToSql,
            &content.description as &dyn ToSql,
            &content.location as &dyn ToSql,
            &content.due_date as &dyn ToSql,
            &content.reminder_time as &dyn ToSql,
            &content.priority as &dyn ToSql,
        ]
    }

    fn validate_content(content: &ReminderContent) -> Result<()> {
        InputValidator::validate_reminder(content)
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn user_id(&self) -> i64 {
        self.user_id
    }

    fn channel_id(&self) -> i64 {
        self.channel_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn status(&self) -> ItemStatus {
        self.status
    }

    fn schedule_time(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    fn trigger_time(&self) -> Option<DateTime<Utc>> {
        self.reminder_time.or(self.due_date)
    }

    fn notified_at(&self) -> Option<DateTime<Utc>> {
        self.notified_at
    }
}

impl Item for CalendarEvent {
    type Content = EventContent;

    const TABLE: &'static str = calendar_events::TABLE;
    const KIND: &'static str = "event";
    const SCHEDULE_COLUMN: &'static str = calendar_events::START_TIME;
    const TRIGGER_EXPR: &'static str = "start_time";
    const CONTENT_COLUMNS: &'static [&'static str] = &[
        items::TITLE,
        items::DESCRIPTION,
        items::LOCATION,
        calendar_events::START_TIME,
        calendar_events::END_TIME,
    ];
    const STATUSES: &'static [ItemStatus] = &[
        ItemStatus::Pending,
        ItemStatus::Confirmed,
        ItemStatus::Synced,
        ItemStatus::Rejected,
        ItemStatus::Deleted,
    ];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(items::ID)?,
            user_id: row.get(items::USER_ID)?,
            channel_id: row.get(items::CHANNEL_ID)?,
            external_id: row.get(items::EXTERNAL_ID)?,
            calendar_id: row.get(items::CALENDAR_ID)?,
            title: row.get(items::TITLE)?,
            description: row.get(items::DESCRIPTION)?,
            location: row.get(items::LOCATION)?,
            start_time: row.get(calendar_events::START_TIME)?,
            end_time: row.get(calendar_events::END_TIME)?,
            status: row.get(items::STATUS)?,
            classification: classification_from_row(row)?,
            notified_at: row.get(items::NOTIFIED_AT)?,
            created_at: row.get(items::CREATED_AT)?,
            updated_at: row.get(items::UPDATED_AT)?,
        })
    }

    fn content_params(content: &EventContent) -> Vec<&dyn ToSql> {
        vec![
            &content.title as &dyn ToSql,
            &content.description as &dyn ToSql,
            &content.location as &dyn ToSql,
            &content.start_time as &dyn ToSql,
            &content.end_time as &dyn ToSql,
        ]
    }

    fn validate_content(content: &EventContent) -> Result<()> {
        InputValidator::validate_event(content)
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn user_id(&self) -> i64 {
        self.user_id
    }

    fn channel_id(&self) -> i64 {
        self.channel_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn status(&self) -> ItemStatus {
        self.status
    }

    fn schedule_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn trigger_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    fn notified_at(&self) -> Option<DateTime<Utc>> {
        self.notified_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use chrono::Duration;

    fn reminder(id: i64, due: Option<DateTime<Utc>>, remind: Option<DateTime<Utc>>) -> Reminder {
        let now = Utc::now();
        Reminder {
            id,
            user_id: 1,
            channel_id: 1,
            external_id: None,
            calendar_id: None,
            title: format!("r{id}"),
            description: None,
            location: None,
            due_date: due,
            reminder_time: remind,
            priority: Priority::Normal,
            status: ItemStatus::Pending,
            classification: Classification::default(),
            notified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_schedule_order_nulls_last_then_id() {
        let base = Utc::now();
        let mut list = vec![
            reminder(4, None, None),
            reminder(3, Some(base + Duration::hours(1)), None),
            reminder(1, None, None),
            reminder(5, Some(base), None),
            reminder(2, Some(base + Duration::hours(1)), None),
        ];
        list.sort_by(schedule_order);
        let ids: Vec<i64> = list.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 2, 3, 1, 4]);
    }

    #[test]
    fn test_trigger_prefers_reminder_time() {
        let base = Utc::now();
        let r = reminder(1, Some(base), Some(base - Duration::minutes(10)));
        assert_eq!(r.trigger_time(), Some(base - Duration::minutes(10)));
        let r = reminder(2, Some(base), None);
        assert_eq!(r.trigger_time(), Some(base));
    }

    #[test]
    fn test_select_columns_cover_content() {
        let columns = select_columns::<Reminder>();
        assert!(columns.contains("reminder_time"));
        assert!(columns.contains("due_notification_sent_at"));
        let columns = select_columns::<CalendarEvent>();
        assert!(columns.contains("end_time"));
        assert!(!columns.contains("priority"));
    }
}
