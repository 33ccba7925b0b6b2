mod commands;
mod config;
mod gemini;
mod kvstore;
mod logging;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    DashboardOptions, ExportFormat, TypeArgs, cmd_dashboard, cmd_delete, cmd_export, cmd_history,
    cmd_insights, cmd_log, cmd_name, cmd_sync_key_generate, cmd_sync_key_set, cmd_sync_key_show,
    cmd_sync_now, cmd_sync_pull, cmd_sync_push, cmd_types_add, cmd_types_list, cmd_types_remove,
    print_palettes,
};
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::kvstore::HttpKvStore;
use crate::logging::{Verbosity, init_logging};
use tinysteps_core::dashboard::TimeFilter;
use tinysteps_core::db::Database;
use tinysteps_core::service::TrackerService;

#[derive(Parser)]
#[command(
    name = "tinysteps",
    version,
    about = "A simple, local-first baby activity tracker",
    long_about = "Log feeds, diapers, sleep and growth from the terminal, \
                  share the log between devices with a sync key, \
                  and get gentle AI summaries of recent patterns."
)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Path to config.toml (default: platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log one or more activities at the same time
    Log {
        /// Activities as TYPE or TYPE=VALUE (e.g. "pee" "cup_feed=120")
        #[arg(required = true)]
        activities: Vec<String>,
        /// Note for one activity as TYPE=TEXT (repeatable)
        #[arg(short, long)]
        note: Vec<String>,
        /// When it happened: HH:MM, "yesterday HH:MM", YYYY-MM-DD HH:MM or RFC 3339 (default: now)
        #[arg(long)]
        at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a logged entry by ID
    Delete {
        /// Entry ID to delete
        entry_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show logged entries grouped by day, newest first
    History {
        /// Only show the last N days
        #[arg(short, long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show quick stats, the 7-day chart and recent activity
    Dashboard {
        /// Time window: today, last_24h, last_7d
        #[arg(short, long, default_value = "today")]
        filter: TimeFilter,
        /// Restrict stats and chart to these activity types (repeatable)
        #[arg(short = 't', long = "type")]
        types: Vec<String>,
        /// Do not request an AI insight
        #[arg(long)]
        no_insights: bool,
        /// Refresh every minute until interrupted
        #[arg(short, long)]
        watch: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the AI for a summary of recent activity
    Insights {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage activity types
    Types {
        #[command(subcommand)]
        command: TypesCommands,
    },
    /// Show or set the baby's name
    Name {
        /// New name (omit to show the current one)
        name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Share the log between devices through a key-value store
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Export all entries
    Export {
        /// Output format: csv or json
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Host a key-value store for syncing devices on your network
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum TypesCommands {
    /// List activity types
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a custom activity type
    Add {
        /// Display name
        name: String,
        /// Category: feeding, diaper, sleep, growth, other
        #[arg(short, long, default_value = "other")]
        category: String,
        /// Icon from the palette (see `types palette`)
        #[arg(long)]
        icon: Option<String>,
        /// Color from the palette (see `types palette`)
        #[arg(long)]
        color: Option<String>,
        /// Unit for values, e.g. ml, min, kg
        #[arg(short, long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a custom activity type (by ID or name)
    Remove {
        /// Type ID or name
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the available icons and colors
    Palette,
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Pull, merge, then push the merged log
    Now {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload the local log, overwriting the remote copy
    Push {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download and merge the remote log without uploading
    Pull {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show, set or generate the sync key
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Show the current key and last sync time
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Use an existing key from another device
    Set {
        /// Sync key
        key: String,
    },
    /// Create a new random key
    Generate {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(Verbosity::from_flags(cli.quiet, cli.verbose));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from(cli.config)?;

    if let Commands::Serve {
        port,
        bind,
        no_auth,
    } = cli.command
    {
        let (api_key, new_api_key) = if no_auth {
            (None, false)
        } else {
            let (key, new) = config.load_or_create_api_key()?;
            (Some(key), new)
        };
        let db = Database::open(&config.server_db_path()?)?;
        return server::start_server(db, port, &bind, api_key, new_api_key).await;
    }

    let mut tracker = TrackerService::open(&config.db_path()?)?;

    match cli.command {
        Commands::Log {
            activities,
            note,
            at,
            json,
        } => cmd_log(&mut tracker, &activities, &note, at.as_deref(), json),
        Commands::Delete { entry_id, json } => cmd_delete(&mut tracker, &entry_id, json),
        Commands::History { days, json } => cmd_history(&tracker, days, json),
        Commands::Dashboard {
            filter,
            types,
            no_insights,
            watch,
            json,
        } => {
            let selection = types
                .iter()
                .map(|t| tracker.resolve_type(t).map(|t| t.id.clone()))
                .collect::<Result<Vec<_>>>()?;
            let client = GeminiClient::from_config(&config.insights)?;
            let options = DashboardOptions {
                filter,
                selection,
                insights: !no_insights,
                watch,
                json,
            };
            cmd_dashboard(&mut tracker, client.as_ref(), &options).await
        }
        Commands::Insights { json } => {
            let client = GeminiClient::from_config(&config.insights)?;
            cmd_insights(&tracker, client.as_ref(), json).await
        }
        Commands::Types { command } => match command {
            TypesCommands::List { json } => cmd_types_list(&tracker, json),
            TypesCommands::Add {
                name,
                category,
                icon,
                color,
                unit,
                json,
            } => cmd_types_add(
                &mut tracker,
                TypeArgs {
                    name,
                    category,
                    icon,
                    color,
                    unit,
                },
                json,
            ),
            TypesCommands::Remove { id, json } => cmd_types_remove(&mut tracker, &id, json),
            TypesCommands::Palette => {
                print_palettes();
                Ok(())
            }
        },
        Commands::Name { name, json } => cmd_name(&mut tracker, name.as_deref(), json),
        Commands::Sync { command } => match command {
            SyncCommands::Key { command } => match command {
                KeyCommands::Show { json } => cmd_sync_key_show(&tracker, json),
                KeyCommands::Set { key } => cmd_sync_key_set(&tracker, &key),
                KeyCommands::Generate { json } => cmd_sync_key_generate(&tracker, json),
            },
            SyncCommands::Now { json } => {
                let transport = HttpKvStore::new(&config.sync)?;
                cmd_sync_now(&mut tracker, &transport, json).await
            }
            SyncCommands::Push { json } => {
                let transport = HttpKvStore::new(&config.sync)?;
                cmd_sync_push(&tracker, &transport, json).await
            }
            SyncCommands::Pull { yes, json } => {
                let transport = HttpKvStore::new(&config.sync)?;
                cmd_sync_pull(&mut tracker, &transport, yes, json).await
            }
        },
        Commands::Export { format, output } => cmd_export(&tracker, format, output.as_deref()),
        Commands::Serve { .. } => unreachable!("handled above"),
    }
}
