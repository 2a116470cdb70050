//! Integration tests for suggested topics.

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use discourse_topic_query::config::ListSettings;
use discourse_topic_query::db::{
    create_category_definition, format_timestamp, get_topic, get_user, insert_category,
    insert_topic, insert_user, set_category_notification_level, upsert_topic_user, Database,
    NewCategory, NewTopic, NewUser, NotificationLevel, Topic, TopicUserState, User,
};
use discourse_topic_query::query::{ListFilter, SuggestionTier, Suggestions, TierOutcome};
use discourse_topic_query::{Guardian, QueryOptions, TopicQuery};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn hours_ago(hours: i64) -> String {
    format_timestamp(now() - Duration::hours(hours))
}

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

async fn create_user(db: &Database, username: &str) -> User {
    let id = insert_user(
        db.pool(),
        &NewUser {
            username: username.to_string(),
            trust_level: 1,
            created_at: Some(hours_ago(24 * 365)),
            ..NewUser::default()
        },
    )
    .await
    .expect("Failed to insert user");
    get_user(db.pool(), id)
        .await
        .expect("Failed to get user")
        .expect("User not found")
}

async fn create_category(db: &Database, name: &str) -> i64 {
    insert_category(
        db.pool(),
        &NewCategory {
            name: name.to_string(),
            slug: name.to_lowercase(),
            ..NewCategory::default()
        },
    )
    .await
    .expect("Failed to insert category")
}

async fn save(db: &Database, topic: &NewTopic) -> i64 {
    insert_topic(db.pool(), topic)
        .await
        .expect("Failed to insert topic")
}

async fn create_topic(db: &Database, title: &str, category_id: Option<i64>, age_hours: i64) -> i64 {
    let mut topic = NewTopic::new(title, &hours_ago(age_hours));
    topic.category_id = category_id;
    save(db, &topic).await
}

/// A topic the viewer tracks and has one post left to read in.
async fn create_unread(db: &Database, viewer: &User, title: &str, age_hours: i64) -> i64 {
    let mut topic = NewTopic::new(title, &hours_ago(age_hours));
    topic.highest_post_number = 2;
    let id = save(db, &topic).await;
    upsert_topic_user(
        db.pool(),
        id,
        viewer.id,
        &TopicUserState {
            last_read_post_number: Some(1),
            notification_level: Some(NotificationLevel::Tracking),
            ..TopicUserState::default()
        },
    )
    .await
    .expect("Failed to upsert topic user");
    id
}

async fn load_topic(db: &Database, id: i64) -> Topic {
    get_topic(db.pool(), id)
        .await
        .expect("Failed to get topic")
        .expect("Topic not found")
}

async fn suggest(
    db: &Database,
    viewer: Option<&User>,
    settings: ListSettings,
    source: &Topic,
) -> Suggestions {
    let guardian = Guardian::load(db.pool(), viewer.cloned())
        .await
        .expect("Failed to load guardian");
    TopicQuery::new(db.pool(), &guardian, settings, QueryOptions::default())
        .at(now())
        .suggested_for(source)
        .await
        .expect("Failed to build suggestions")
}

fn assert_well_formed(suggestions: &Suggestions, source: &Topic, budget: usize) {
    let ids = suggestions.list.topic_ids();
    assert!(!ids.contains(&source.id), "source topic suggested");
    assert!(ids.len() <= budget, "over budget: {ids:?}");
    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len(), "duplicate suggestions: {ids:?}");
}

#[tokio::test]
async fn test_full_unread_tier_skips_later_tiers() {
    let (db, _temp_dir) = setup_db().await;
    let viewer = create_user(&db, "viewer").await;
    let source = load_topic(&db, create_topic(&db, "Source", None, 30).await).await;

    let mut unread = Vec::new();
    for i in 0..6 {
        unread.push(create_unread(&db, &viewer, &format!("Unread {i}"), 10 + i).await);
    }
    // Would qualify for the new tier if it ran
    create_topic(&db, "Brand new", None, 1).await;

    let suggestions = suggest(&db, Some(&viewer), ListSettings::default(), &source).await;

    assert_well_formed(&suggestions, &source, 5);
    assert_eq!(
        suggestions.tiers,
        vec![TierOutcome {
            tier: SuggestionTier::Unread,
            merged: 5
        }]
    );
    assert_eq!(suggestions.list.topic_ids(), unread[..5].to_vec());
}

#[tokio::test]
async fn test_tiers_fill_in_priority_order() {
    let (db, _temp_dir) = setup_db().await;
    let viewer = create_user(&db, "viewer").await;
    let source = load_topic(&db, create_topic(&db, "Source", None, 2).await).await;

    let unread = create_unread(&db, &viewer, "Unread", 500).await;
    let newer = create_topic(&db, "Newer", None, 3).await;
    let new = create_topic(&db, "New", None, 5).await;
    let mut old = HashSet::new();
    for i in 0..4 {
        old.insert(create_topic(&db, &format!("Old {i}"), None, 24 * 30 + i).await);
    }
    let mut closed = NewTopic::new("Closed", &hours_ago(24 * 40));
    closed.closed = true;
    let closed = save(&db, &closed).await;

    let suggestions = suggest(&db, Some(&viewer), ListSettings::default(), &source).await;
    assert_well_formed(&suggestions, &source, 5);

    let ids = suggestions.list.topic_ids();
    assert_eq!(ids.len(), 5);
    assert_eq!(ids[..3], [unread, newer, new]);
    assert!(ids[3..].iter().all(|id| old.contains(id)));
    assert!(!ids.contains(&closed));
    assert_eq!(
        suggestions.tiers,
        vec![
            TierOutcome {
                tier: SuggestionTier::Unread,
                merged: 1
            },
            TierOutcome {
                tier: SuggestionTier::New,
                merged: 2
            },
            TierOutcome {
                tier: SuggestionTier::Random,
                merged: 2
            },
        ]
    );
}

#[tokio::test]
async fn test_new_tier_respects_category_budget() {
    let (db, _temp_dir) = setup_db().await;
    let viewer = create_user(&db, "viewer").await;
    let source = load_topic(&db, create_topic(&db, "Source", None, 200).await).await;
    for i in 0..3 {
        create_topic(&db, &format!("New {i}"), None, 1 + i).await;
    }

    let settings = ListSettings {
        suggested_topics: 4,
        suggested_category_topics: 1,
        ..ListSettings::default()
    };
    let suggestions = suggest(&db, Some(&viewer), settings, &source).await;

    assert_well_formed(&suggestions, &source, 4);
    assert_eq!(suggestions.list.len(), 3);
    assert_eq!(
        suggestions.tiers,
        vec![
            TierOutcome {
                tier: SuggestionTier::Unread,
                merged: 0
            },
            TierOutcome {
                tier: SuggestionTier::New,
                merged: 1
            },
            TierOutcome {
                tier: SuggestionTier::Random,
                merged: 2
            },
        ]
    );
}

#[tokio::test]
async fn test_anonymous_gets_random_tier_preferring_same_category() {
    let (db, _temp_dir) = setup_db().await;
    let home = create_category(&db, "Home").await;
    let away = create_category(&db, "Away").await;
    let source = load_topic(&db, create_topic(&db, "Source", Some(home), 5).await).await;

    let mut same = HashSet::new();
    for i in 0..2 {
        same.insert(create_topic(&db, &format!("Home {i}"), Some(home), 10 + i).await);
    }
    for i in 0..6 {
        create_topic(&db, &format!("Away {i}"), Some(away), 10 + i).await;
    }

    let suggestions = suggest(&db, None, ListSettings::default(), &source).await;
    assert_well_formed(&suggestions, &source, 5);

    let ids = suggestions.list.topic_ids();
    assert_eq!(ids.len(), 5);
    let first_two: HashSet<i64> = ids[..2].iter().copied().collect();
    assert_eq!(first_two, same);
    assert_eq!(
        suggestions.tiers,
        vec![TierOutcome {
            tier: SuggestionTier::Random,
            merged: 5
        }]
    );
}

#[tokio::test]
async fn test_only_open_listed_regular_topics_are_suggested() {
    let (db, _temp_dir) = setup_db().await;
    let category = create_category(&db, "Ideas").await;
    create_category_definition(db.pool(), category, &hours_ago(900))
        .await
        .unwrap();
    let source = load_topic(&db, create_topic(&db, "Source", Some(category), 5).await).await;
    let open = create_topic(&db, "Open", Some(category), 6).await;

    for (title, tweak) in [
        ("Closed", 0),
        ("Archived", 1),
        ("Unlisted", 2),
        ("Deleted", 3),
    ] {
        let mut topic = NewTopic::new(title, &hours_ago(7));
        topic.category_id = Some(category);
        match tweak {
            0 => topic.closed = true,
            1 => topic.archived = true,
            2 => topic.visible = false,
            _ => topic.deleted_at = Some(hours_ago(1)),
        }
        save(&db, &topic).await;
    }

    let suggestions = suggest(&db, None, ListSettings::default(), &source).await;
    assert_eq!(suggestions.list.topic_ids(), vec![open]);
}

#[tokio::test]
async fn test_unread_tier_keeps_closed_and_archived_topics() {
    let (db, _temp_dir) = setup_db().await;
    let viewer = create_user(&db, "viewer").await;
    let source = load_topic(&db, create_topic(&db, "Source", None, 30).await).await;

    let mut tracked = Vec::new();
    for (title, age_hours) in [("Closed", 40), ("Archived", 50)] {
        let mut topic = NewTopic::new(title, &hours_ago(age_hours));
        topic.highest_post_number = 3;
        topic.closed = title == "Closed";
        topic.archived = title == "Archived";
        let id = save(&db, &topic).await;
        upsert_topic_user(
            db.pool(),
            id,
            viewer.id,
            &TopicUserState {
                last_read_post_number: Some(1),
                notification_level: Some(NotificationLevel::Tracking),
                ..TopicUserState::default()
            },
        )
        .await
        .expect("Failed to upsert topic user");
        tracked.push(id);
    }

    let suggestions = suggest(&db, Some(&viewer), ListSettings::default(), &source).await;

    assert_well_formed(&suggestions, &source, 5);
    assert_eq!(suggestions.list.topic_ids(), tracked);
    assert_eq!(
        suggestions.tiers[0],
        TierOutcome {
            tier: SuggestionTier::Unread,
            merged: 2
        }
    );
}

#[tokio::test]
async fn test_new_tier_shows_unlisted_topics_to_staff() {
    let (db, _temp_dir) = setup_db().await;
    let moderator_id = insert_user(
        db.pool(),
        &NewUser {
            username: "moderator".to_string(),
            moderator: true,
            trust_level: 1,
            created_at: Some(hours_ago(24 * 365)),
            ..NewUser::default()
        },
    )
    .await
    .expect("Failed to insert user");
    let moderator = get_user(db.pool(), moderator_id)
        .await
        .expect("Failed to get user")
        .expect("User not found");
    let regular = create_user(&db, "regular").await;
    let source = load_topic(&db, create_topic(&db, "Source", None, 500).await).await;

    let mut unlisted = NewTopic::new("Unlisted", &hours_ago(2));
    unlisted.visible = false;
    let unlisted = save(&db, &unlisted).await;

    let suggestions = suggest(&db, Some(&moderator), ListSettings::default(), &source).await;
    assert_eq!(suggestions.list.topic_ids(), vec![unlisted]);
    assert_eq!(
        suggestions.tiers[1],
        TierOutcome {
            tier: SuggestionTier::New,
            merged: 1
        }
    );

    let suggestions = suggest(&db, Some(&regular), ListSettings::default(), &source).await;
    assert!(suggestions.list.is_empty());
}

#[tokio::test]
async fn test_muted_categories_are_not_suggested() {
    let (db, _temp_dir) = setup_db().await;
    let viewer = create_user(&db, "viewer").await;
    let muted = create_category(&db, "Muted").await;
    let source = load_topic(&db, create_topic(&db, "Source", None, 500).await).await;
    let visible = create_topic(&db, "Visible", None, 600).await;
    create_topic(&db, "Hidden new", Some(muted), 1).await;
    create_topic(&db, "Hidden old", Some(muted), 700).await;
    set_category_notification_level(db.pool(), muted, viewer.id, NotificationLevel::Muted)
        .await
        .unwrap();

    let suggestions = suggest(&db, Some(&viewer), ListSettings::default(), &source).await;
    assert_eq!(suggestions.list.topic_ids(), vec![visible]);
}

#[tokio::test]
async fn test_list_suggested_for_packages_topic_list() {
    let (db, _temp_dir) = setup_db().await;
    let source = load_topic(&db, create_topic(&db, "Source", None, 5).await).await;
    let other = create_topic(&db, "Other", None, 6).await;

    let guardian = Guardian::load(db.pool(), None).await.unwrap();
    let list = TopicQuery::new(db.pool(), &guardian, ListSettings::default(), QueryOptions::default())
        .at(now())
        .list_suggested_for(&source)
        .await
        .unwrap();

    assert_eq!(list.filter, ListFilter::Suggested);
    assert_eq!(list.per_page, 5);
    assert_eq!(list.topic_ids(), vec![other]);
}
