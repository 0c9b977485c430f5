use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use event_inbox::config::AppConfig;
use event_inbox::due::DueSource;
use event_inbox::logging::{init_logging, OperationTimer};
use event_inbox::metrics::MetricsCollector;
use event_inbox::models::{ItemStatus, NewChannel, SourceType};
use event_inbox::service::{LogNotifier, NotificationDispatcher};
use event_inbox::{
    ChannelRegistry, Database, EventStore, MessageHistoryStore, ReminderStore, SettingsStore,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/default and config/local)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, overrides the configured one
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply the schema
    Init,
    /// Manage tracked channels
    Channels {
        #[command(subcommand)]
        action: ChannelAction,
    },
    /// List a user's reminders or events
    Items {
        /// Owning user
        #[arg(short, long)]
        user: i64,

        /// Item kind
        #[arg(short, long, value_enum, default_value = "reminder")]
        kind: ItemKind,

        /// Only items in this status
        #[arg(short, long)]
        status: Option<ItemStatus>,

        /// Only items from this channel
        #[arg(long)]
        channel: Option<i64>,
    },
    /// Show items due for notification, without claiming them
    Due {
        /// Evaluate at this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Maximum items per kind
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Claim an item's due notification
    MarkNotified {
        /// Item kind
        #[arg(short, long, value_enum)]
        kind: ItemKind,

        /// Item id
        #[arg(short, long)]
        id: i64,
    },
    /// Show recent deduplicated history of a channel
    History {
        /// Channel id
        #[arg(short, long)]
        channel: i64,

        /// Number of messages
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Apply history retention to a channel
    Prune {
        /// Channel id
        #[arg(short, long)]
        channel: i64,

        /// Messages to keep (defaults to history.keep_count)
        #[arg(short, long)]
        keep: Option<usize>,

        /// Also drop messages older than this many days
        #[arg(long)]
        older_than_days: Option<i64>,
    },
    /// Show a user's settings, creating defaults if needed
    Settings {
        /// Owning user
        #[arg(short, long)]
        user: i64,
    },
    /// Run the notification dispatcher with a log-only notifier
    Poll {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum ChannelAction {
    /// List a user's channels
    List {
        /// Owning user
        #[arg(short, long)]
        user: i64,
    },
    /// Track a new endpoint
    Add {
        /// Owning user
        #[arg(short, long)]
        user: i64,

        /// Source system (whatsapp, telegram, gmail, manual)
        #[arg(short, long)]
        source: SourceType,

        /// External identifier
        #[arg(short, long)]
        identifier: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Enable or disable tracking
    SetEnabled {
        /// Owning user
        #[arg(short, long)]
        user: i64,

        /// Channel id
        #[arg(short, long)]
        channel: i64,

        /// New state
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Delete a channel with its items and history
    Delete {
        /// Owning user
        #[arg(short, long)]
        user: i64,

        /// Channel id
        #[arg(short, long)]
        channel: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ItemKind {
    Reminder,
    Event,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(url) = &cli.database {
        config.database.url.clone_from(url);
    }

    // Initialize logging
    let log_file = config.logging.file_path.as_ref().map(PathBuf::from);
    let _guard = init_logging(&config.get_log_level(), &config.logging.format, log_file.as_deref())?;

    info!("Starting event-inbox");

    // Initialize database with configuration
    let db = Database::with_config(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    MetricsCollector::default().update_connection_pool_size(db.pool_size());

    match cli.command {
        Commands::Init => {
            let timer = OperationTimer::new("init");
            info!(url = %config.database.url, "Database ready");
            timer.finish();
        }
        Commands::Channels { action } => run_channel_action(&db, action)?,
        Commands::Items {
            user,
            kind,
            status,
            channel,
        } => match kind {
            ItemKind::Reminder => print_json(&ReminderStore::new(db).list(user, status, channel)?)?,
            ItemKind::Event => print_json(&EventStore::new(db).list(user, status, channel)?)?,
        },
        Commands::Due { at, limit } => {
            let now = at.unwrap_or_else(Utc::now);
            let mut due = DueSource::select_due(&ReminderStore::new(db.clone()), now, limit)?;
            due.extend(DueSource::select_due(&EventStore::new(db), now, limit)?);
            due.sort_by(|a, b| a.trigger_at.cmp(&b.trigger_at));
            print_json(&due)?;
        }
        Commands::MarkNotified { kind, id } => {
            let now = Utc::now();
            let won = match kind {
                ItemKind::Reminder => ReminderStore::new(db).mark_notified(id, now)?,
                ItemKind::Event => EventStore::new(db).mark_notified(id, now)?,
            };
            print_json(&serde_json::json!({ "id": id, "claimed": won }))?;
        }
        Commands::History { channel, limit } => {
            let store = MessageHistoryStore::with_config(db, config.history.clone());
            print_json(&store.get_recent(channel, limit)?)?;
        }
        Commands::Prune {
            channel,
            keep,
            older_than_days,
        } => {
            let timer = OperationTimer::new("prune");
            let store = MessageHistoryStore::with_config(db, config.history.clone());
            let mut removed = store.prune(channel, keep.unwrap_or(config.history.keep_count))?;
            if let Some(days) = older_than_days {
                removed += store.prune_older_than(channel, Utc::now() - Duration::days(days))?;
            }
            timer.finish();
            print_json(&serde_json::json!({ "channel_id": channel, "removed": removed }))?;
        }
        Commands::Settings { user } => {
            print_json(&SettingsStore::new(db).get_or_create_default(user)?)?;
        }
        Commands::Poll { once } => run_dispatcher(&config, db, once).await?,
    }

    Ok(())
}

fn run_channel_action(db: &Database, action: ChannelAction) -> Result<()> {
    let registry = ChannelRegistry::new(db.clone());
    match action {
        ChannelAction::List { user } => print_json(&registry.list_channels(user)?),
        ChannelAction::Add {
            user,
            source,
            identifier,
            name,
        } => {
            let channel = registry.get_or_create_channel(&NewChannel {
                user_id: user,
                source_type: source,
                identifier,
                display_name: name,
                backfill_status: None,
            })?;
            print_json(&channel)
        }
        ChannelAction::SetEnabled {
            user,
            channel,
            enabled,
        } => {
            if !registry.set_enabled(user, channel, enabled)? {
                warn!(user, channel, "No such channel");
            }
            Ok(())
        }
        ChannelAction::Delete { user, channel } => {
            let removed = registry.delete_channel(user, channel)?;
            print_json(&serde_json::json!({ "channel_id": channel, "deleted": removed }))
        }
    }
}

async fn run_dispatcher(config: &AppConfig, db: Database, once: bool) -> Result<()> {
    if !config.notifications.enabled {
        warn!("Notifications are disabled in configuration");
        return Ok(());
    }

    let sources: Vec<Arc<dyn DueSource>> = vec![
        Arc::new(ReminderStore::new(db.clone())),
        Arc::new(EventStore::new(db)),
    ];
    let dispatcher = NotificationDispatcher::new(sources, Arc::new(LogNotifier), &config.notifications);

    if once {
        let summary = dispatcher.poll_once(Utc::now()).await?;
        info!(?summary, "Single poll finished");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    dispatcher.run(shutdown_rx).await;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
