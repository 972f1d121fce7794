//! bastu - command-line admin console for the sauna club.
//!
//! Lists and categorizes members, reviews door access, sends SMS to member
//! groups, shows the badges leaderboard and talks to the AI assistant.
//! Member data is cached encrypted so the list also works offline.

mod app;
mod commands;
mod output;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bastu_core::display::SortKey;
use bastu_core::models::{AccessSource, Category, VisitPeriod};
use bastu_core::Config;

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "bastu", version, about = "Admin console for the sauna club")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write a daily rolling log file in the cache directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in with a one-time code sent by SMS or email
    Login {
        #[arg(long, conflicts_with = "email", required_unless_present = "email")]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Forget the saved session
    Logout,
    /// List members by category
    Members(MembersArgs),
    /// Review door access events
    Events(EventsArgs),
    /// List SMS groups, or show who a group would reach
    Groups {
        #[command(subcommand)]
        command: Option<GroupsCommand>,
    },
    /// Send and read SMS
    Sms {
        #[command(subcommand)]
        command: SmsCommand,
    },
    /// Badge leaderboard
    Badges(BadgesArgs),
    /// Chat with the AI assistant
    Chat,
    /// Inspect or clear the offline cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Args)]
pub struct MembersArgs {
    /// Only show these categories (repeatable)
    #[arg(short, long = "category", value_parser = parse_category)]
    pub categories: Vec<Category>,

    #[arg(short, long, value_enum)]
    pub sort: Option<SortArg>,

    #[arg(long, conflicts_with = "asc")]
    pub desc: bool,

    #[arg(long)]
    pub asc: bool,

    /// Visit count column to show and sort by
    #[arg(short, long, value_enum)]
    pub period: Option<PeriodArg>,

    /// Match name, email, phone or customer number
    #[arg(long)]
    pub search: Option<String>,

    /// Use cached data only
    #[arg(long)]
    pub offline: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct EventsArgs {
    #[arg(short, long, default_value_t = 7)]
    pub days: i64,

    #[arg(short, long, value_enum)]
    pub source: Option<SourceArg>,

    /// Only denied attempts
    #[arg(long)]
    pub denied: bool,

    #[arg(long, default_value_t = 200)]
    pub limit: usize,

    /// Keep watching for new events
    #[arg(short, long)]
    pub follow: bool,
}

#[derive(Debug, Subcommand)]
pub enum GroupsCommand {
    /// Resolve a group to phone numbers without sending anything
    Recipients { id: String },
}

#[derive(Debug, Subcommand)]
pub enum SmsCommand {
    /// Send a message to every member of a group
    Send {
        #[arg(short, long)]
        group: String,
        #[arg(short, long)]
        message: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the message log, grouped into broadcasts and conversations
    Inbox {
        /// Keep watching for incoming messages
        #[arg(short, long)]
        follow: bool,
    },
}

#[derive(Debug, Args)]
pub struct BadgesArgs {
    #[arg(short, long, value_enum, default_value_t = PeriodArg::Month)]
    pub period: PeriodArg,

    #[arg(short, long, default_value_t = 25)]
    pub limit: usize,

    /// Also list each member's badges
    #[arg(long)]
    pub details: bool,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    Status,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    CustomerNumber,
    Name,
    Visits,
    Age,
    Tenure,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::CustomerNumber => SortKey::CustomerNumber,
            SortArg::Name => SortKey::Name,
            SortArg::Visits => SortKey::Visits,
            SortArg::Age => SortKey::Age,
            SortArg::Tenure => SortKey::Tenure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PeriodArg {
    Week,
    Month,
    Quarter,
}

impl From<PeriodArg> for VisitPeriod {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Week => VisitPeriod::Week,
            PeriodArg::Month => VisitPeriod::Month,
            PeriodArg::Quarter => VisitPeriod::Quarter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Aptus,
    Parakey,
}

impl From<SourceArg> for AccessSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Aptus => AccessSource::Aptus,
            SourceArg::Parakey => AccessSource::Parakey,
        }
    }
}

fn parse_category(s: &str) -> Result<Category, String> {
    s.parse()
}

// ============================================================================
// Logging
// ============================================================================

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` wins when set. The returned guard must be held until exit so
/// buffered file output is flushed.
fn init_tracing(verbose: bool, log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let default_level = if verbose {
        "warn,bastu_core=debug,bastu=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "bastu.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = Config::load();
    let log_dir = if cli.log_file {
        config.as_ref().ok().and_then(|c| c.cache_dir().ok())
    } else {
        None
    };
    let _guard = init_tracing(cli.verbose, log_dir);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    debug!(base_url = ?config.base_url, "Config loaded");

    if let Err(e) = commands::run(cli.command, config).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
