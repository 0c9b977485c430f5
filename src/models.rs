//! Data models for channels, reminders, calendar events and message history
//!
//! This module contains the records persisted by the lifecycle engine together with
//! the enumerations stored as constrained text columns.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Declares an enum persisted as one of a fixed set of lowercase strings.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The stored text form
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} value: {other}", stringify!($name))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum! {
    /// Source system a channel belongs to
    SourceType {
        /// WhatsApp bridge
        WhatsApp => "whatsapp",
        /// Telegram bridge
        Telegram => "telegram",
        /// Gmail bridge
        Gmail => "gmail",
        /// User-authored items with no ingestion source
        Manual => "manual",
    }
}

text_enum! {
    /// Kind of conversation endpoint a channel tracks
    ChannelKind {
        /// A single sender (contact)
        Sender => "sender",
    }
}

text_enum! {
    /// Progress of a channel's initial history import
    BackfillStatus {
        /// Import running
        InProgress => "in_progress",
        /// Import finished
        Completed => "completed",
        /// Import gave up
        Failed => "failed",
        /// Import was not attempted
        Skipped => "skipped",
    }
}

impl BackfillStatus {
    /// Whether no further backfill status change is accepted
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

text_enum! {
    /// Reminder priority
    Priority {
        /// Low priority
        Low => "low",
        /// Default priority
        Normal => "normal",
        /// High priority
        High => "high",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

text_enum! {
    /// Lifecycle status shared by reminders and calendar events
    ItemStatus {
        /// Proposed by the classifier, awaiting the user
        Pending => "pending",
        /// Accepted by the user, not yet in the external calendar
        Confirmed => "confirmed",
        /// Present in the external calendar
        Synced => "synced",
        /// Reminder done
        Completed => "completed",
        /// Reminder dismissed
        Dismissed => "dismissed",
        /// Event proposal rejected
        Rejected => "rejected",
        /// Event removed
        Deleted => "deleted",
    }
}

impl ItemStatus {
    /// Statuses an item may rest in while still live.
    pub const ACTIVE: [Self; 3] = [Self::Pending, Self::Confirmed, Self::Synced];

    /// Statuses eligible for due notification.
    pub const NOTIFIABLE: [Self; 2] = [Self::Confirmed, Self::Synced];

    /// Whether the status is final
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Dismissed | Self::Rejected | Self::Deleted)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `pending -> confirmed -> synced` moves forward only; any live status may be
    /// closed by a terminal status. Terminal statuses never move again.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Confirmed) | (Self::Confirmed, Self::Synced) => true,
            (Self::Pending | Self::Confirmed | Self::Synced, n) => n.is_terminal(),
            _ => false,
        }
    }
}

text_enum! {
    /// What the classifier intended against an existing external item
    ActionType {
        /// New item
        Create => "create",
        /// Change an existing external item
        Update => "update",
        /// Remove an existing external item
        Delete => "delete",
    }
}

impl Default for ActionType {
    fn default() -> Self {
        Self::Create
    }
}

/// A tracked conversation endpoint within a source system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Database primary key
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Source system
    pub source_type: SourceType,
    /// Endpoint kind
    pub channel_kind: ChannelKind,
    /// External identifier, unique per user and source
    pub identifier: String,
    /// Display name
    pub display_name: Option<String>,
    /// Whether ingestion should track this channel
    pub enabled: bool,
    /// Number of history messages currently stored. Appends add to it and pruning
    /// subtracts what it removed.
    pub message_count: i64,
    /// Timestamp of the newest appended message
    pub last_message_at: Option<DateTime<Utc>>,
    /// Backfill progress, if a backfill was ever started
    pub backfill_status: Option<BackfillStatus>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a new channel
#[derive(Debug, Clone)]
pub struct NewChannel {
    /// Owning user
    pub user_id: i64,
    /// Source system
    pub source_type: SourceType,
    /// External identifier
    pub identifier: String,
    /// Display name
    pub display_name: Option<String>,
    /// Initial backfill status
    pub backfill_status: Option<BackfillStatus>,
}

/// Result of a tracking lookup for an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingStatus {
    /// True only when the channel exists and is enabled
    pub tracked: bool,
    /// Matching channel, enabled or not
    pub channel_id: Option<i64>,
    /// Kind of the matching channel
    pub channel_kind: Option<ChannelKind>,
}

impl TrackingStatus {
    /// No matching channel
    #[must_use]
    pub const fn untracked() -> Self {
        Self {
            tracked: false,
            channel_id: None,
            channel_kind: None,
        }
    }
}

/// Classifier output attached to every proposed item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Intended action against the external calendar
    pub action_type: ActionType,
    /// Originating message reference
    pub source_message_id: Option<String>,
    /// Free-form reasoning text
    pub reasoning: Option<String>,
    /// Confidence between 0.0 and 1.0
    pub confidence: Option<f64>,
    /// Ordered quality tags
    pub quality_flags: Vec<String>,
}

/// A detected reminder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Database primary key
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Channel the reminder was detected in
    pub channel_id: i64,
    /// External calendar identifier, set once synced
    pub external_id: Option<String>,
    /// Calendar target
    pub calendar_id: Option<String>,
    /// Title
    pub title: String,
    /// Description
    pub description: Option<String>,
    /// Location
    pub location: Option<String>,
    /// Primary schedule
    pub due_date: Option<DateTime<Utc>>,
    /// Notification time, overrides `due_date` for notification purposes
    pub reminder_time: Option<DateTime<Utc>>,
    /// Priority
    pub priority: Priority,
    /// Lifecycle status
    pub status: ItemStatus,
    /// Classifier output
    pub classification: Classification,
    /// When the due notification was claimed, if ever
    pub notified_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a new item of either kind
#[derive(Debug, Clone)]
pub struct NewItem<C> {
    /// Owning user
    pub user_id: i64,
    /// Channel the item was detected in
    pub channel_id: i64,
    /// Calendar target
    pub calendar_id: Option<String>,
    /// Editable content
    pub content: C,
    /// Classifier output
    pub classification: Classification,
}

/// Data for creating a new reminder
pub type NewReminder = NewItem<ReminderContent>;

/// Editable reminder fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderContent {
    /// Title
    pub title: String,
    /// Description
    pub description: Option<String>,
    /// Location
    pub location: Option<String>,
    /// Primary schedule
    pub due_date: Option<DateTime<Utc>>,
    /// Notification time
    pub reminder_time: Option<DateTime<Utc>>,
    /// Priority
    pub priority: Priority,
}

/// A detected calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Database primary key
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Channel the event was detected in
    pub channel_id: i64,
    /// External calendar identifier, set once synced
    pub external_id: Option<String>,
    /// Calendar target
    pub calendar_id: Option<String>,
    /// Title
    pub title: String,
    /// Description
    pub description: Option<String>,
    /// Location
    pub location: Option<String>,
    /// Start of the event
    pub start_time: Option<DateTime<Utc>>,
    /// End of the event
    pub end_time: Option<DateTime<Utc>>,
    /// Lifecycle status
    pub status: ItemStatus,
    /// Classifier output
    pub classification: Classification,
    /// When the due notification was claimed, if ever
    pub notified_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a new calendar event
pub type NewCalendarEvent = NewItem<EventContent>;

/// Editable calendar event fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContent {
    /// Title
    pub title: String,
    /// Description
    pub description: Option<String>,
    /// Location
    pub location: Option<String>,
    /// Start of the event
    pub start_time: Option<DateTime<Utc>>,
    /// End of the event
    pub end_time: Option<DateTime<Utc>>,
}

/// Result of a status-guarded write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateOutcome {
    /// The guard matched and the row was written
    Updated,
    /// No item with that id exists for the user
    NotFound,
    /// The item exists but its status did not satisfy the guard
    WrongStatus(ItemStatus),
}

impl UpdateOutcome {
    /// Whether the row was written
    #[must_use]
    pub const fn is_updated(self) -> bool {
        matches!(self, Self::Updated)
    }
}

/// One stored inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Database primary key
    pub id: i64,
    /// Channel the message arrived on
    pub channel_id: i64,
    /// Owning user
    pub user_id: i64,
    /// Source system
    pub source_type: SourceType,
    /// Sender identifier
    pub sender_id: String,
    /// Sender display name
    pub sender_name: Option<String>,
    /// Message body
    pub body: String,
    /// Email subject
    pub subject: Option<String>,
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
    /// When the row was inserted
    pub created_at: DateTime<Utc>,
}

/// Data for appending an inbound message
#[derive(Debug, Clone)]
pub struct NewHistoryMessage {
    /// Channel the message arrived on
    pub channel_id: i64,
    /// Sender identifier
    pub sender_id: String,
    /// Sender display name
    pub sender_name: Option<String>,
    /// Message body
    pub body: String,
    /// Email subject
    pub subject: Option<String>,
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
}

/// A cached frequently-contacted endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopContact {
    /// Contact identifier within the source
    pub identifier: String,
    /// Display name
    pub display_name: Option<String>,
    /// Messages exchanged
    pub message_count: i64,
}

/// Per-user configuration aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Owning user
    pub user_id: i64,
    /// User preference for due notifications. Stored for delivery channels to
    /// consult; the dispatcher itself delivers every claimed item.
    pub notifications_enabled: bool,
    /// Whether confirmed items are pushed to the external calendar
    pub calendar_sync_enabled: bool,
    /// Calendar new items are synced to
    pub default_calendar_id: Option<String>,
    /// Minutes before an event that its reminder fires
    pub reminder_lead_minutes: i64,
    /// Named feature switches
    pub feature_flags: BTreeMap<String, bool>,
}

impl UserSettings {
    /// Defaults applied the first time a user's settings are read
    #[must_use]
    pub const fn defaults_for(user_id: i64) -> Self {
        Self {
            user_id,
            notifications_enabled: true,
            calendar_sync_enabled: false,
            default_calendar_id: None,
            reminder_lead_minutes: 15,
            feature_flags: BTreeMap::new(),
        }
    }

    /// Whether a feature flag is set
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.feature_flags.get(name).copied().unwrap_or(false)
    }
}
