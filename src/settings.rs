//! User settings, created with defaults on first read.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::db::Database;
use crate::error::{LifecycleError, Result};
use crate::models::UserSettings;
use crate::schema::user_settings as us;

/// Per-user settings with lazily created defaults
#[derive(Debug, Clone)]
pub struct SettingsStore {
    db: Database,
}

impl SettingsStore {
    /// Create a store over an open database
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the user's settings, inserting the defaults on first access.
    ///
    /// Safe under concurrent first access: the insert is `OR IGNORE` and the row
    /// is read back afterwards.
    pub fn get_or_create_default(&self, user_id: i64) -> Result<UserSettings> {
        let conn = self.db.get_connection()?;
        if let Some(settings) = load(&conn, user_id)? {
            return Ok(settings);
        }

        let defaults = UserSettings::defaults_for(user_id);
        let now = Utc::now();
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} ({}, {}, {}, {}, {}, {}, {}, {})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                us::TABLE,
                us::USER_ID,
                us::NOTIFICATIONS_ENABLED,
                us::CALENDAR_SYNC_ENABLED,
                us::DEFAULT_CALENDAR_ID,
                us::REMINDER_LEAD_MINUTES,
                us::FEATURE_FLAGS,
                us::CREATED_AT,
                us::UPDATED_AT
            ),
            params![
                defaults.user_id,
                defaults.notifications_enabled,
                defaults.calendar_sync_enabled,
                defaults.default_calendar_id,
                defaults.reminder_lead_minutes,
                serde_json::to_string(&defaults.feature_flags)?,
                now
            ],
        )?;
        if inserted > 0 {
            info!(user_id, "Default settings created");
        }

        load(&conn, user_id)?
            .ok_or_else(|| LifecycleError::Other(format!("settings for user {user_id} missing after insert")))
    }

    /// Persist a full settings value, creating the row if needed
    pub fn update_settings(&self, settings: &UserSettings) -> Result<UserSettings> {
        if settings.reminder_lead_minutes < 0 {
            return Err(LifecycleError::InvalidInput(
                "reminder_lead_minutes cannot be negative".to_string(),
            ));
        }

        let conn = self.db.get_connection()?;
        let now = Utc::now();
        conn.execute(
            &format!(
                "INSERT INTO {t} ({user}, {notify}, {sync}, {cal}, {lead}, {flags}, {created}, {updated})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT ({user}) DO UPDATE SET
                     {notify} = excluded.{notify},
                     {sync} = excluded.{sync},
                     {cal} = excluded.{cal},
                     {lead} = excluded.{lead},
                     {flags} = excluded.{flags},
                     {updated} = excluded.{updated}",
                t = us::TABLE,
                user = us::USER_ID,
                notify = us::NOTIFICATIONS_ENABLED,
                sync = us::CALENDAR_SYNC_ENABLED,
                cal = us::DEFAULT_CALENDAR_ID,
                lead = us::REMINDER_LEAD_MINUTES,
                flags = us::FEATURE_FLAGS,
                created = us::CREATED_AT,
                updated = us::UPDATED_AT
            ),
            params![
                settings.user_id,
                settings.notifications_enabled,
                settings.calendar_sync_enabled,
                settings.default_calendar_id,
                settings.reminder_lead_minutes,
                serde_json::to_string(&settings.feature_flags)?,
                now
            ],
        )?;

        info!(user_id = settings.user_id, "Settings updated");
        load(&conn, settings.user_id)?.ok_or_else(|| {
            LifecycleError::Other(format!("settings for user {} missing after update", settings.user_id))
        })
    }
}

fn load(conn: &Connection, user_id: i64) -> Result<Option<UserSettings>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {}, {}, {}, {}, {} FROM {} WHERE {} = ?1",
                us::NOTIFICATIONS_ENABLED,
                us::CALENDAR_SYNC_ENABLED,
                us::DEFAULT_CALENDAR_ID,
                us::REMINDER_LEAD_MINUTES,
                us::FEATURE_FLAGS,
                us::TABLE,
                us::USER_ID
            ),
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((notifications_enabled, calendar_sync_enabled, default_calendar_id, lead, flags)) = row
    else {
        return Ok(None);
    };

    let feature_flags: BTreeMap<String, bool> = serde_json::from_str(&flags)?;
    Ok(Some(UserSettings {
        user_id,
        notifications_enabled,
        calendar_sync_enabled,
        default_calendar_id,
        reminder_lead_minutes: lead,
        feature_flags,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_created_once() {
        let store = SettingsStore::new(Database::in_memory().unwrap());
        let first = store.get_or_create_default(5).unwrap();
        assert_eq!(first, UserSettings::defaults_for(5));

        let mut changed = first.clone();
        changed.calendar_sync_enabled = true;
        changed.default_calendar_id = Some("primary".to_string());
        changed.feature_flags.insert("smart_titles".to_string(), true);
        store.update_settings(&changed).unwrap();

        let again = store.get_or_create_default(5).unwrap();
        assert_eq!(again, changed);
        assert!(again.flag("smart_titles"));
    }

    #[test]
    fn test_settings_are_per_user() {
        let store = SettingsStore::new(Database::in_memory().unwrap());
        let mut settings = UserSettings::defaults_for(1);
        settings.notifications_enabled = false;
        store.update_settings(&settings).unwrap();

        assert!(!store.get_or_create_default(1).unwrap().notifications_enabled);
        assert!(store.get_or_create_default(2).unwrap().notifications_enabled);
    }

    #[test]
    fn test_negative_lead_rejected() {
        let store = SettingsStore::new(Database::in_memory().unwrap());
        let mut settings = UserSettings::defaults_for(1);
        settings.reminder_lead_minutes = -5;
        assert!(matches!(store.update_settings(&settings), Err(LifecycleError::InvalidInput(_))));
    }
}
