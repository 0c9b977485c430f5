//! End-to-end lifecycle tests against a file database

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tempfile::TempDir;

use event_inbox::item::schedule_order;
use event_inbox::models::{
    Classification, EventContent, ItemStatus, NewChannel, NewItem, Priority, Reminder,
    ReminderContent, SourceType, UpdateOutcome,
};
use event_inbox::{
    ChannelRegistry, Database, EventStore, LifecycleError, MessageHistoryStore, ReminderStore,
    SyncTarget,
};

fn open_db(dir: &TempDir) -> Database {
    let path = dir.path().join("inbox.db");
    Database::open(&format!("sqlite://{}", path.display())).expect("Failed to open database")
}

fn channel(registry: &ChannelRegistry, user_id: i64, identifier: &str) -> i64 {
    registry
        .create_channel(&NewChannel {
            user_id,
            source_type: SourceType::Gmail,
            identifier: identifier.to_string(),
            display_name: None,
            backfill_status: None,
        })
        .expect("Failed to create channel")
        .id
}

fn reminder(user_id: i64, channel_id: i64, title: &str, due: Option<DateTime<Utc>>) -> NewItem<ReminderContent> {
    NewItem {
        user_id,
        channel_id,
        calendar_id: None,
        content: ReminderContent {
            title: title.to_string(),
            description: Some("from email".to_string()),
            location: None,
            due_date: due,
            reminder_time: None,
            priority: Priority::Normal,
        },
        classification: Classification {
            reasoning: Some("explicit deadline".to_string()),
            confidence: Some(0.92),
            quality_flags: vec!["has_date".to_string()],
            ..Classification::default()
        },
    }
}

#[test]
fn test_due_scenario() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = open_db(&dir);
    let registry = ChannelRegistry::new(db.clone());
    let store = ReminderStore::new(db);
    let channel_id = channel(&registry, 1, "boss@example.com");
    let now = Utc::now();

    let overdue = store
        .create(&reminder(1, channel_id, "Send report", Some(now - Duration::minutes(30))))
        .expect("Failed to create reminder");
    assert_eq!(
        store.transition_status(1, overdue.id, ItemStatus::Confirmed).unwrap(),
        UpdateOutcome::Updated
    );

    let due: Vec<i64> = store.select_due(now, 10).unwrap().iter().map(|r| r.id).collect();
    assert_eq!(due, vec![overdue.id]);

    assert!(store.mark_notified(overdue.id, now).unwrap());
    assert!(!store.mark_notified(overdue.id, now).unwrap());
    assert!(store.select_due(now, 10).unwrap().is_empty());

    let later = store
        .create(&reminder(1, channel_id, "Book flights", Some(now + Duration::hours(2))))
        .unwrap();
    store.transition_status(1, later.id, ItemStatus::Confirmed).unwrap();
    assert!(store.select_due(now, 10).unwrap().is_empty());
}

#[test]
fn test_synced_item_is_never_editable_as_pending() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let registry = ChannelRegistry::new(db.clone());
    let store = ReminderStore::new(db);
    let channel_id = channel(&registry, 1, "team@example.com");

    let item = store.create(&reminder(1, channel_id, "Quarterly review", None)).unwrap();
    store.transition_status_checked(1, item.id, ItemStatus::Confirmed).unwrap();
    assert!(store.set_external_id(1, item.id, "evt-123").unwrap().is_updated());

    let edit = ReminderContent {
        title: "Hijacked".to_string(),
        description: None,
        location: None,
        due_date: None,
        reminder_time: None,
        priority: Priority::Low,
    };
    assert_eq!(
        store.update_pending_content(1, item.id, &edit).unwrap(),
        UpdateOutcome::WrongStatus(ItemStatus::Synced)
    );

    let stored = store.get_by_id(1, item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Synced);
    assert_eq!(stored.title, "Quarterly review");
    assert_eq!(
        store.get_by_external_id("evt-123").unwrap().map(|r| r.id),
        Some(item.id)
    );
}

#[test]
fn test_tenant_isolation_with_colliding_identifiers() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let registry = ChannelRegistry::new(db.clone());
    let reminders = ReminderStore::new(db.clone());
    let history = MessageHistoryStore::new(db);

    let alice_channel = channel(&registry, 1, "shared@example.com");
    let bob_channel = channel(&registry, 2, "shared@example.com");
    assert_ne!(alice_channel, bob_channel);

    let alice_item = reminders.create(&reminder(1, alice_channel, "Alice only", None)).unwrap();
    reminders.transition_status(1, alice_item.id, ItemStatus::Confirmed).unwrap();
    reminders.set_external_id(1, alice_item.id, "ext-shared").unwrap();

    // Bob sees nothing of Alice's.
    assert!(reminders.get_by_id(2, alice_item.id).unwrap().is_none());
    assert!(reminders.list(2, None, None).unwrap().is_empty());
    assert!(reminders.get_active_for_channel(2, alice_channel).unwrap().is_empty());
    assert!(reminders.get_by_external_id_for_user(2, "ext-shared").unwrap().is_none());
    assert_eq!(reminders.count_pending(2).unwrap(), 0);
    assert!(registry.get_channel(2, alice_channel).unwrap().is_none());

    // Bob cannot mutate it either.
    assert_eq!(
        reminders.transition_status(2, alice_item.id, ItemStatus::Dismissed).unwrap(),
        UpdateOutcome::NotFound
    );
    assert!(!reminders.delete(2, alice_item.id).unwrap());

    // Nor attach items to Alice's channel.
    let err = reminders.create(&reminder(2, alice_channel, "Intruder", None)).unwrap_err();
    assert!(matches!(err, LifecycleError::ChannelNotFound(id) if id == alice_channel));

    // History carries the owner from the channel.
    let stored = history
        .append(&event_inbox::models::NewHistoryMessage {
            channel_id: bob_channel,
            sender_id: "shared@example.com".to_string(),
            sender_name: None,
            body: "hello bob".to_string(),
            subject: None,
            timestamp: Utc::now(),
        })
        .unwrap();
    assert_eq!(stored.user_id, 2);
    assert!(history.get_recent(alice_channel, 10).unwrap().is_empty());
}

#[test]
fn test_active_for_channel_ordering_and_filter() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let registry = ChannelRegistry::new(db.clone());
    let store = ReminderStore::new(db);
    let channel_id = channel(&registry, 1, "ops@example.com");
    let base = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();

    let unscheduled = store.create(&reminder(1, channel_id, "someday", None)).unwrap();
    let late = store.create(&reminder(1, channel_id, "late", Some(base + Duration::days(2)))).unwrap();
    let early = store.create(&reminder(1, channel_id, "early", Some(base))).unwrap();
    let tie = store.create(&reminder(1, channel_id, "tie", Some(base))).unwrap();
    let done = store.create(&reminder(1, channel_id, "done", Some(base))).unwrap();
    store.transition_status(1, done.id, ItemStatus::Completed).unwrap();
    store.transition_status(1, late.id, ItemStatus::Confirmed).unwrap();

    let ids: Vec<i64> = SyncTarget::get_active_for_channel(&store, 1, channel_id)
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![early.id, tie.id, late.id, unscheduled.id]);
}

#[test]
fn test_channel_delete_cascades() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let registry = ChannelRegistry::new(db.clone());
    let reminders = ReminderStore::new(db.clone());
    let events = EventStore::new(db.clone());
    let history = MessageHistoryStore::new(db);
    let channel_id = channel(&registry, 1, "gone@example.com");

    let item = reminders.create(&reminder(1, channel_id, "Orphan?", None)).unwrap();
    let event = events
        .create(&NewItem {
            user_id: 1,
            channel_id,
            calendar_id: None,
            content: EventContent {
                title: "Lunch".to_string(),
                description: None,
                location: None,
                start_time: Some(Utc::now()),
                end_time: None,
            },
            classification: Classification::default(),
        })
        .unwrap();
    history
        .append(&event_inbox::models::NewHistoryMessage {
            channel_id,
            sender_id: "gone@example.com".to_string(),
            sender_name: None,
            body: "lunch?".to_string(),
            subject: None,
            timestamp: Utc::now(),
        })
        .unwrap();

    assert!(registry.delete_channel(1, channel_id).unwrap());
    assert!(reminders.get_by_id(1, item.id).unwrap().is_none());
    assert!(events.get_by_id(1, event.id).unwrap().is_none());
    assert_eq!(history.count(channel_id).unwrap(), 0);
}

#[test]
fn test_state_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let db = open_db(&dir);
        let registry = ChannelRegistry::new(db.clone());
        let channel_id = channel(&registry, 1, "persist@example.com");
        ReminderStore::new(db).create(&reminder(1, channel_id, "Survive", None)).unwrap().id
    };

    let store = ReminderStore::new(open_db(&dir));
    let stored = store.get_by_id(1, id).unwrap().expect("reminder should persist");
    assert_eq!(stored.classification.quality_flags, vec!["has_date"]);
    assert_eq!(stored.classification.reasoning.as_deref(), Some("explicit deadline"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sql_order_matches_comparator(offsets in prop::collection::vec(prop::option::of(0i64..6), 1..12)) {
        let db = Database::in_memory().unwrap();
        let channel_id = ChannelRegistry::new(db.clone()).ensure_manual_channel(1).unwrap().id;
        let store = ReminderStore::new(db);
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let mut created: Vec<Reminder> = offsets
            .iter()
            .map(|offset| {
                let due = offset.map(|h| base + Duration::hours(h));
                store.create(&reminder(1, channel_id, "p", due)).unwrap()
            })
            .collect();
        created.sort_by(schedule_order);

        let expected: Vec<i64> = created.iter().map(|r| r.id).collect();
        let actual: Vec<i64> = store
            .get_active_for_channel(1, channel_id)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        prop_assert_eq!(actual, expected);
    }
}
