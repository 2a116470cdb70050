use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discourse_topic_query::config::Config;
use discourse_topic_query::db::{
    self, format_timestamp, Database, NewCategory, NewPost, NewTopic, NewUser, NotificationLevel,
    TopScores, TopicUserState,
};
use discourse_topic_query::query::{CategoryRef, TopPeriod};
use discourse_topic_query::{Guardian, QueryOptions, TopicQuery};

/// Print topic lists from a forum database as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Username to list topics as; anonymous when omitted.
    #[arg(long)]
    user: Option<String>,

    /// Query option as key=value, e.g. `--option order=views`. Repeatable.
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Latest,
    New,
    Unread,
    Read,
    Posted,
    Bookmarks,
    /// Topics in a category, by id or slug.
    Category { category: String },
    /// Top topics for all, yearly, monthly, weekly or daily.
    Top { period: String },
    /// Private messages of the `--user` viewer.
    Messages,
    /// Suggested topics to read after a topic.
    Suggested { topic_id: i64 },
    /// Fill the database with a small demo forum.
    SeedDemo,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    init_tracing()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let pool = db.pool();

    let user = match &args.user {
        Some(username) => Some(
            db::get_user_by_username(pool, username)
                .await?
                .with_context(|| format!("Unknown user: {username}"))?,
        ),
        None => None,
    };
    let guardian = Guardian::load(pool, user.clone())
        .await
        .context("Failed to load category permissions")?;

    let pairs = args
        .options
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .with_context(|| format!("Expected KEY=VALUE, got {pair}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let options = QueryOptions::from_pairs(pairs)?;
    let query = TopicQuery::new(pool, &guardian, config.list, options);

    let output = match args.command {
        Command::SeedDemo => {
            seed_demo(&db).await?;
            info!(path = %config.database_path.display(), "Demo forum seeded");
            return Ok(());
        }
        Command::Latest => serde_json::to_value(query.list_latest().await?)?,
        Command::New => serde_json::to_value(query.list_new().await?)?,
        Command::Unread => serde_json::to_value(query.list_unread().await?)?,
        Command::Read => serde_json::to_value(query.list_read().await?)?,
        Command::Posted => serde_json::to_value(query.list_posted().await?)?,
        Command::Bookmarks => serde_json::to_value(query.list_bookmarks().await?)?,
        Command::Category { category } => {
            serde_json::to_value(query.list_category(CategoryRef::parse(&category)).await?)?
        }
        Command::Top { period } => {
            let period = TopPeriod::from_str(&period)
                .with_context(|| format!("Unknown top period: {period}"))?;
            serde_json::to_value(query.list_top(period).await?)?
        }
        Command::Messages => {
            let user = user.context("Listing messages needs --user")?;
            serde_json::to_value(query.list_private_messages(&user).await?)?
        }
        Command::Suggested { topic_id } => {
            let topic = db::get_topic(pool, topic_id)
                .await?
                .with_context(|| format!("Topic {topic_id} not found"))?;
            serde_json::to_value(query.suggested_for(&topic).await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discourse_topic_query=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    // Logs go to stderr; stdout carries the JSON result
    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

/// A handful of users, categories and topics to try the list commands on.
async fn seed_demo(db: &Database) -> Result<()> {
    let pool = db.pool();
    let now = Utc::now();
    let ago = |hours: i64| format_timestamp(now - Duration::hours(hours));

    let admin = db::insert_user(
        pool,
        &NewUser {
            username: "admin".to_string(),
            admin: true,
            trust_level: 4,
            created_at: Some(ago(24 * 365)),
            ..NewUser::default()
        },
    )
    .await?;
    let reader = db::insert_user(
        pool,
        &NewUser {
            username: "reader".to_string(),
            trust_level: 1,
            created_at: Some(ago(24 * 30)),
            ..NewUser::default()
        },
    )
    .await?;

    let general = db::insert_category(
        pool,
        &NewCategory {
            name: "General".to_string(),
            slug: "general".to_string(),
            ..NewCategory::default()
        },
    )
    .await?;
    db::create_category_definition(pool, general, &ago(24 * 300)).await?;
    let staff = db::insert_category(
        pool,
        &NewCategory {
            name: "Staff".to_string(),
            slug: "staff".to_string(),
            read_restricted: true,
            ..NewCategory::default()
        },
    )
    .await?;
    let staff_group = db::insert_group(pool, "staff").await?;
    db::add_group_user(pool, staff_group, admin).await?;
    db::grant_category_group(pool, staff, staff_group).await?;

    let titles = [
        ("Welcome to the forum", Some(general), 200),
        ("Favourite keyboard layouts", Some(general), 30),
        ("Show us your desk", Some(general), 5),
        ("Moderation notes", Some(staff), 12),
        ("Uncategorized musings", None, 2),
    ];
    for (rank, (title, category_id, hours)) in (1_u32..).zip(titles) {
        let mut topic = NewTopic::new(title, &ago(hours));
        topic.category_id = category_id;
        topic.user_id = Some(admin);
        topic.views = i64::from(rank) * 10;
        if rank == 1 {
            topic.pinned_at = Some(ago(hours));
            topic.pinned_globally = true;
        }
        let topic_id = db::insert_topic(pool, &topic).await?;
        db::insert_post(
            pool,
            &NewPost {
                topic_id,
                user_id: Some(admin),
                post_number: 1,
                raw: format!("{title}. Say hello below."),
                like_count: i64::from(rank - 1),
            },
        )
        .await?;
        db::upsert_top_scores(
            pool,
            topic_id,
            &TopScores {
                all_score: f64::from(rank) * 2.0,
                yearly_score: f64::from(rank),
                ..TopScores::default()
            },
        )
        .await?;
        if rank == 2 {
            db::upsert_topic_user(
                pool,
                topic_id,
                reader,
                &TopicUserState {
                    last_read_post_number: Some(0),
                    notification_level: Some(NotificationLevel::Tracking),
                    last_visited_at: Some(ago(1)),
                    ..TopicUserState::default()
                },
            )
            .await?;
        }
    }

    Ok(())
}
