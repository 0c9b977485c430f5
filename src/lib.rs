//! Event Inbox - Reminder and Calendar Event Lifecycle Engine
//!
//! A Rust library that stores reminders and calendar events proposed from inbound
//! messages and carries them from `pending` through confirmation and external
//! calendar sync to a terminal status.
//!
//! # Features
//!
//! - Status state machine shared by reminders and events ([`item::Item`])
//! - Idempotent due-notification selection and claiming ([`due`])
//! - Deduplicated, retention-pruned message history ([`history`])
//! - Channel registry with tracking and backfill status ([`channels`])
//! - Per-user settings with lazily created defaults ([`settings`])
//! - A polling notification dispatcher ([`service`])

/// Channel registry and top-contacts cache
pub mod channels;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Due-notification selection and claiming
pub mod due;
/// Error types
pub mod error;
/// Message history storage
pub mod history;
/// Shared item capability interface
pub mod item;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Item store for reminders and calendar events
pub mod repository;
/// Database schema definitions
pub mod schema;
/// Notification dispatcher
pub mod service;
/// Per-user settings
pub mod settings;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use channels::ChannelRegistry;
pub use db::Database;
pub use error::{LifecycleError, Result};
pub use history::MessageHistoryStore;
pub use models::{CalendarEvent, Channel, ItemStatus, Reminder, UpdateOutcome};
pub use repository::{EventStore, ItemStore, ReminderStore, SyncTarget};
pub use settings::SettingsStore;
