//! Channel Registry: maps (user, source, identifier) to channels and owns the
//! top-contacts cache.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{is_unique_violation, LifecycleError, Result};
use crate::models::{
    BackfillStatus, Channel, ChannelKind, NewChannel, SourceType, TopContact, TrackingStatus,
};
use crate::schema::{channels, top_contacts};
use crate::validation::InputValidator;

/// Identifier of the synthetic channel holding user-authored items
pub const MANUAL_IDENTIFIER: &str = "manual";

const COLUMNS: &str = "id, user_id, source_type, channel_kind, identifier, display_name, enabled, \
                       message_count, last_message_at, backfill_status, created_at, updated_at";

/// Registry of tracked channels
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    db: Database,
}

impl ChannelRegistry {
    /// Create a registry over an open database
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new channel.
    ///
    /// Fails with [`LifecycleError::InvalidInput`] if the user already has a channel
    /// with the same source and identifier.
    pub fn create_channel(&self, new_channel: &NewChannel) -> Result<Channel> {
        InputValidator::validate_channel(new_channel)?;
        let conn = self.db.get_connection()?;
        match insert_channel(&conn, new_channel) {
            Err(LifecycleError::Database(e)) if is_unique_violation(&e) => {
                Err(LifecycleError::InvalidInput(format!(
                    "channel {}:{} already exists for user {}",
                    new_channel.source_type, new_channel.identifier, new_channel.user_id
                )))
            }
            other => other,
        }
    }

    /// Return the matching channel, creating it on first sight.
    ///
    /// Two callers racing on the same key both get the winner's row.
    pub fn get_or_create_channel(&self, new_channel: &NewChannel) -> Result<Channel> {
        InputValidator::validate_channel(new_channel)?;
        let conn = self.db.get_connection()?;

        if let Some(existing) = find(&conn, new_channel.user_id, new_channel.source_type, &new_channel.identifier)? {
            return Ok(existing);
        }

        match insert_channel(&conn, new_channel) {
            Ok(channel) => Ok(channel),
            Err(LifecycleError::Database(e)) if is_unique_violation(&e) => {
                debug!(
                    user_id = new_channel.user_id,
                    identifier = %new_channel.identifier,
                    "Lost channel creation race, re-reading"
                );
                find(&conn, new_channel.user_id, new_channel.source_type, &new_channel.identifier)?
                    .ok_or_else(|| {
                        LifecycleError::Other(format!(
                            "channel {} vanished after uniqueness conflict",
                            new_channel.identifier
                        ))
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// The user's synthetic channel for hand-entered items, created on first use
    pub fn ensure_manual_channel(&self, user_id: i64) -> Result<Channel> {
        self.get_or_create_channel(&NewChannel {
            user_id,
            source_type: SourceType::Manual,
            identifier: MANUAL_IDENTIFIER.to_string(),
            display_name: Some("Manual".to_string()),
            backfill_status: Some(BackfillStatus::Skipped),
        })
    }

    /// Load a channel owned by `user_id`; `Ok(None)` when absent
    pub fn get_channel(&self, user_id: i64, channel_id: i64) -> Result<Option<Channel>> {
        let conn = self.db.get_connection()?;
        let channel = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM {} WHERE {} = ?1 AND {} = ?2",
                    channels::TABLE,
                    channels::ID,
                    channels::USER_ID
                ),
                params![channel_id, user_id],
                channel_from_row,
            )
            .optional()?;
        Ok(channel)
    }

    /// Look up by natural key; `Ok(None)` when absent
    pub fn find_channel(
        &self,
        user_id: i64,
        source_type: SourceType,
        identifier: &str,
    ) -> Result<Option<Channel>> {
        let conn = self.db.get_connection()?;
        find(&conn, user_id, source_type, identifier)
    }

    /// All of a user's channels in creation order
    pub fn list_channels(&self, user_id: i64) -> Result<Vec<Channel>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM {} WHERE {} = ?1 ORDER BY {} ASC",
            channels::TABLE,
            channels::USER_ID,
            channels::ID
        ))?;
        let rows = stmt.query_map(params![user_id], channel_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Whether an inbound message from this endpoint should be processed.
    ///
    /// `tracked` requires an enabled channel; the channel id and kind are reported
    /// for disabled channels too.
    pub fn is_tracked(
        &self,
        user_id: i64,
        source_type: SourceType,
        identifier: &str,
    ) -> Result<TrackingStatus> {
        Ok(self
            .find_channel(user_id, source_type, identifier)?
            .map_or_else(TrackingStatus::untracked, |channel| TrackingStatus {
                tracked: channel.enabled,
                channel_id: Some(channel.id),
                channel_kind: Some(channel.channel_kind),
            }))
    }

    /// Enable or disable tracking. Returns false when the channel does not exist.
    pub fn set_enabled(&self, user_id: i64, channel_id: i64, enabled: bool) -> Result<bool> {
        let conn = self.db.get_connection()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1, {} = ?2 WHERE {} = ?3 AND {} = ?4",
                channels::TABLE,
                channels::ENABLED,
                channels::UPDATED_AT,
                channels::ID,
                channels::USER_ID
            ),
            params![enabled, Utc::now(), channel_id, user_id],
        )?;
        if changed > 0 {
            info!(user_id, channel_id, enabled, "Channel tracking changed");
        }
        Ok(changed > 0)
    }

    /// Record backfill progress.
    ///
    /// Once the status is terminal it no longer changes; returns whether the write applied.
    pub fn set_backfill_status(
        &self,
        user_id: i64,
        channel_id: i64,
        status: BackfillStatus,
    ) -> Result<bool> {
        let conn = self.db.get_connection()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {t} SET {b} = ?1, {u} = ?2
                 WHERE {id} = ?3 AND {user} = ?4 AND ({b} IS NULL OR {b} = ?5)",
                t = channels::TABLE,
                b = channels::BACKFILL_STATUS,
                u = channels::UPDATED_AT,
                id = channels::ID,
                user = channels::USER_ID
            ),
            params![status, Utc::now(), channel_id, user_id, BackfillStatus::InProgress],
        )?;
        if changed == 0 {
            debug!(user_id, channel_id, %status, "Backfill status unchanged");
        }
        Ok(changed > 0)
    }

    /// Delete a channel together with its items and history.
    pub fn delete_channel(&self, user_id: i64, channel_id: i64) -> Result<bool> {
        let conn = self.db.get_connection()?;
        let removed = conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
                channels::TABLE,
                channels::ID,
                channels::USER_ID
            ),
            params![channel_id, user_id],
        )?;
        if removed > 0 {
            warn!(user_id, channel_id, "Channel deleted with its items and history");
        }
        Ok(removed > 0)
    }

    /// Replace a user's cached top contacts for one source.
    ///
    /// Delete and insert run in one transaction; on any error nothing changes.
    /// Contacts are ranked in slice order.
    pub fn replace_top_contacts(
        &self,
        user_id: i64,
        source_type: SourceType,
        contacts: &[TopContact],
    ) -> Result<usize> {
        for contact in contacts {
            InputValidator::validate_identifier(&contact.identifier)?;
            InputValidator::validate_display_name(contact.display_name.as_deref())?;
        }

        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
                top_contacts::TABLE,
                top_contacts::USER_ID,
                top_contacts::SOURCE_TYPE
            ),
            params![user_id, source_type],
        )?;

        let now = Utc::now();
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                top_contacts::TABLE,
                top_contacts::USER_ID,
                top_contacts::SOURCE_TYPE,
                top_contacts::IDENTIFIER,
                top_contacts::DISPLAY_NAME,
                top_contacts::MESSAGE_COUNT,
                top_contacts::RANK,
                top_contacts::UPDATED_AT
            ))?;
            for (rank, contact) in contacts.iter().enumerate() {
                insert.execute(params![
                    user_id,
                    source_type,
                    contact.identifier,
                    contact.display_name,
                    contact.message_count,
                    rank as i64,
                    now
                ])?;
            }
        }
        tx.commit()?;

        info!(user_id, source = %source_type, count = contacts.len(), "Top contacts replaced");
        Ok(contacts.len())
    }

    /// Cached top contacts for one source, most active first
    pub fn list_top_contacts(&self, user_id: i64, source_type: SourceType) -> Result<Vec<TopContact>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {} FROM {} WHERE {} = ?1 AND {} = ?2 ORDER BY {} ASC",
            top_contacts::IDENTIFIER,
            top_contacts::DISPLAY_NAME,
            top_contacts::MESSAGE_COUNT,
            top_contacts::TABLE,
            top_contacts::USER_ID,
            top_contacts::SOURCE_TYPE,
            top_contacts::RANK
        ))?;
        let rows = stmt.query_map(params![user_id, source_type], |row| {
            Ok(TopContact {
                identifier: row.get(0)?,
                display_name: row.get(1)?,
                message_count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(channels::ID)?,
        user_id: row.get(channels::USER_ID)?,
        source_type: row.get(channels::SOURCE_TYPE)?,
        channel_kind: row.get(channels::CHANNEL_KIND)?,
        identifier: row.get(channels::IDENTIFIER)?,
        display_name: row.get(channels::DISPLAY_NAME)?,
        enabled: row.get(channels::ENABLED)?,
        message_count: row.get(channels::MESSAGE_COUNT)?,
        last_message_at: row.get(channels::LAST_MESSAGE_AT)?,
        backfill_status: row.get(channels::BACKFILL_STATUS)?,
        created_at: row.get(channels::CREATED_AT)?,
        updated_at: row.get(channels::UPDATED_AT)?,
    })
}

fn find(
    conn: &Connection,
    user_id: i64,
    source_type: SourceType,
    identifier: &str,
) -> Result<Option<Channel>> {
    let channel = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM {} WHERE {} = ?1 AND {} = ?2 AND {} = ?3",
                channels::TABLE,
                channels::USER_ID,
                channels::SOURCE_TYPE,
                channels::IDENTIFIER
            ),
            params![user_id, source_type, identifier],
            channel_from_row,
        )
        .optional()?;
    Ok(channel)
}

fn insert_channel(conn: &Connection, new_channel: &NewChannel) -> Result<Channel> {
    let now = Utc::now();
    conn.execute(
        &format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            channels::TABLE,
            channels::USER_ID,
            channels::SOURCE_TYPE,
            channels::CHANNEL_KIND,
            channels::IDENTIFIER,
            channels::DISPLAY_NAME,
            channels::BACKFILL_STATUS,
            channels::CREATED_AT,
            channels::UPDATED_AT
        ),
        params![
            new_channel.user_id,
            new_channel.source_type,
            ChannelKind::Sender,
            new_channel.identifier,
            new_channel.display_name,
            new_channel.backfill_status,
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();
    info!(
        user_id = new_channel.user_id,
        channel_id = id,
        source = %new_channel.source_type,
        "Channel created"
    );

    conn.query_row(
        &format!("SELECT {COLUMNS} FROM {} WHERE {} = ?1", channels::TABLE, channels::ID),
        params![id],
        channel_from_row,
    )
    .map_err(LifecycleError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(Database::in_memory().unwrap())
    }

    fn whatsapp(user_id: i64, identifier: &str) -> NewChannel {
        NewChannel {
            user_id,
            source_type: SourceType::WhatsApp,
            identifier: identifier.to_string(),
            display_name: Some("Pat".to_string()),
            backfill_status: Some(BackfillStatus::InProgress),
        }
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let registry = registry();
        registry.create_channel(&whatsapp(1, "+15551234")).unwrap();
        let err = registry.create_channel(&whatsapp(1, "+15551234")).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidInput(_)));

        // Same identifier, other user: allowed.
        registry.create_channel(&whatsapp(2, "+15551234")).unwrap();
    }

    #[test]
    fn test_manual_channel_is_stable() {
        let registry = registry();
        let first = registry.ensure_manual_channel(3).unwrap();
        let second = registry.ensure_manual_channel(3).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.source_type, SourceType::Manual);
        assert_eq!(registry.list_channels(3).unwrap().len(), 1);
    }

    #[test]
    fn test_is_tracked_requires_enabled() {
        let registry = registry();
        let channel = registry.create_channel(&whatsapp(1, "+15550000")).unwrap();

        let status = registry.is_tracked(1, SourceType::WhatsApp, "+15550000").unwrap();
        assert!(status.tracked);
        assert_eq!(status.channel_id, Some(channel.id));
        assert_eq!(status.channel_kind, Some(ChannelKind::Sender));

        assert!(registry.set_enabled(1, channel.id, false).unwrap());
        let status = registry.is_tracked(1, SourceType::WhatsApp, "+15550000").unwrap();
        assert!(!status.tracked);
        assert_eq!(status.channel_id, Some(channel.id));

        assert_eq!(
            registry.is_tracked(2, SourceType::WhatsApp, "+15550000").unwrap(),
            TrackingStatus::untracked()
        );
    }

    #[test]
    fn test_backfill_status_terminal() {
        let registry = registry();
        let channel = registry.create_channel(&whatsapp(1, "+15559999")).unwrap();
        assert!(registry.set_backfill_status(1, channel.id, BackfillStatus::InProgress).unwrap());
        assert!(registry.set_backfill_status(1, channel.id, BackfillStatus::Completed).unwrap());
        assert!(!registry.set_backfill_status(1, channel.id, BackfillStatus::Failed).unwrap());
        assert!(!registry.set_backfill_status(1, channel.id, BackfillStatus::InProgress).unwrap());

        let stored = registry.get_channel(1, channel.id).unwrap().unwrap();
        assert_eq!(stored.backfill_status, Some(BackfillStatus::Completed));
    }

    #[test]
    fn test_get_channel_is_user_scoped() {
        let registry = registry();
        let channel = registry.create_channel(&whatsapp(1, "+15551111")).unwrap();
        assert!(registry.get_channel(1, channel.id).unwrap().is_some());
        assert!(registry.get_channel(2, channel.id).unwrap().is_none());
        assert!(!registry.delete_channel(2, channel.id).unwrap());
        assert!(registry.delete_channel(1, channel.id).unwrap());
    }

    #[test]
    fn test_top_contacts_ranked_and_replaced() {
        let registry = registry();
        let contacts = vec![
            TopContact {
                identifier: "+1555000A".to_string(),
                display_name: Some("Ana".to_string()),
                message_count: 90,
            },
            TopContact {
                identifier: "+1555000B".to_string(),
                display_name: None,
                message_count: 40,
            },
        ];
        assert_eq!(registry.replace_top_contacts(1, SourceType::WhatsApp, &contacts).unwrap(), 2);
        assert_eq!(registry.list_top_contacts(1, SourceType::WhatsApp).unwrap(), contacts);

        registry
            .replace_top_contacts(1, SourceType::WhatsApp, &contacts[1..])
            .unwrap();
        let listed = registry.list_top_contacts(1, SourceType::WhatsApp).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].identifier, "+1555000B");
        assert!(registry.list_top_contacts(1, SourceType::Telegram).unwrap().is_empty());
    }

    #[test]
    fn test_top_contacts_rollback_on_duplicate() {
        let registry = registry();
        let original = vec![TopContact {
            identifier: "keep@example.com".to_string(),
            display_name: None,
            message_count: 5,
        }];
        registry.replace_top_contacts(1, SourceType::Gmail, &original).unwrap();

        let duplicated = vec![
            TopContact {
                identifier: "dup@example.com".to_string(),
                display_name: None,
                message_count: 3,
            },
            TopContact {
                identifier: "dup@example.com".to_string(),
                display_name: None,
                message_count: 2,
            },
        ];
        assert!(registry.replace_top_contacts(1, SourceType::Gmail, &duplicated).is_err());
        assert_eq!(registry.list_top_contacts(1, SourceType::Gmail).unwrap(), original);
    }
}
