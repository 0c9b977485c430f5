//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.
//! The DDL itself lives in `migrations/`.

/// Channels table schema
pub mod channels {
    /// Table name
    pub const TABLE: &str = "channels";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning user column
    pub const USER_ID: &str = "user_id";
    /// Source system column (whatsapp, telegram, gmail, manual)
    pub const SOURCE_TYPE: &str = "source_type";
    /// Channel kind column
    pub const CHANNEL_KIND: &str = "channel_kind";
    /// External identifier (phone number, chat id, email address)
    pub const IDENTIFIER: &str = "identifier";
    /// Display name column
    pub const DISPLAY_NAME: &str = "display_name";
    /// Enabled flag column
    pub const ENABLED: &str = "enabled";
    /// Number of history messages appended
    pub const MESSAGE_COUNT: &str = "message_count";
    /// Timestamp of the newest appended message
    pub const LAST_MESSAGE_AT: &str = "last_message_at";
    /// Backfill status column
    pub const BACKFILL_STATUS: &str = "backfill_status";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Last update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Columns shared by the reminders and calendar events tables
pub mod items {
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning user column
    pub const USER_ID: &str = "user_id";
    /// Foreign key to channels
    pub const CHANNEL_ID: &str = "channel_id";
    /// External calendar identifier, set once synced
    pub const EXTERNAL_ID: &str = "external_id";
    /// Calendar target column
    pub const CALENDAR_ID: &str = "calendar_id";
    /// Title column
    pub const TITLE: &str = "title";
    /// Description column
    pub const DESCRIPTION: &str = "description";
    /// Location column
    pub const LOCATION: &str = "location";
    /// Lifecycle status column
    pub const STATUS: &str = "status";
    /// Classifier intent column (create, update, delete)
    pub const ACTION_TYPE: &str = "action_type";
    /// Originating message reference column
    pub const SOURCE_MESSAGE_ID: &str = "source_message_id";
    /// Classifier reasoning column
    pub const REASONING: &str = "reasoning";
    /// Classifier confidence column
    pub const CONFIDENCE: &str = "confidence";
    /// JSON-encoded quality flags column
    pub const QUALITY_FLAGS: &str = "quality_flags";
    /// Due-notification sent marker, NULL until notified
    pub const NOTIFIED_AT: &str = "due_notification_sent_at";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Last update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Reminders table schema
pub mod reminders {
    /// Table name
    pub const TABLE: &str = "reminders";
    /// Primary schedule column
    pub const DUE_DATE: &str = "due_date";
    /// Secondary schedule column governing notification timing
    pub const REMINDER_TIME: &str = "reminder_time";
    /// Priority column
    pub const PRIORITY: &str = "priority";
}

/// Calendar events table schema
pub mod calendar_events {
    /// Table name
    pub const TABLE: &str = "calendar_events";
    /// Primary schedule column
    pub const START_TIME: &str = "start_time";
    /// End time column
    pub const END_TIME: &str = "end_time";
}

/// Message history table schema
pub mod message_history {
    /// Table name
    pub const TABLE: &str = "message_history";
    /// Primary key column
    pub const ID: &str = "id";
    /// Foreign key to channels
    pub const CHANNEL_ID: &str = "channel_id";
    /// Owning user, copied from the channel at write time
    pub const USER_ID: &str = "user_id";
    /// Source system column
    pub const SOURCE_TYPE: &str = "source_type";
    /// Sender identifier column
    pub const SENDER_ID: &str = "sender_id";
    /// Sender display name column
    pub const SENDER_NAME: &str = "sender_name";
    /// Message body column
    pub const BODY: &str = "body";
    /// Email subject column
    pub const SUBJECT: &str = "subject";
    /// Message timestamp column
    pub const TIMESTAMP: &str = "timestamp";
    /// Insert timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Top contacts cache schema
pub mod top_contacts {
    /// Table name
    pub const TABLE: &str = "top_contacts";
    /// Owning user column
    pub const USER_ID: &str = "user_id";
    /// Source system column
    pub const SOURCE_TYPE: &str = "source_type";
    /// Contact identifier column
    pub const IDENTIFIER: &str = "identifier";
    /// Display name column
    pub const DISPLAY_NAME: &str = "display_name";
    /// Message count column
    pub const MESSAGE_COUNT: &str = "message_count";
    /// Rank column, 0 is the most active contact
    pub const RANK: &str = "rank";
    /// Refresh timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Per-user settings schema
pub mod user_settings {
    /// Table name
    pub const TABLE: &str = "user_settings";
    /// Primary key column
    pub const USER_ID: &str = "user_id";
    /// Due notifications switch
    pub const NOTIFICATIONS_ENABLED: &str = "notifications_enabled";
    /// Calendar sync switch
    pub const CALENDAR_SYNC_ENABLED: &str = "calendar_sync_enabled";
    /// Default calendar target
    pub const DEFAULT_CALENDAR_ID: &str = "default_calendar_id";
    /// Minutes before an event that its reminder fires
    pub const REMINDER_LEAD_MINUTES: &str = "reminder_lead_minutes";
    /// JSON-encoded feature flags
    pub const FEATURE_FLAGS: &str = "feature_flags";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Last update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}
