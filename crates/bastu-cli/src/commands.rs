//! Command implementations.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use bastu_core::access::{review_events, AccessEventQuery, AccessSummary};
use bastu_core::chat::ChatConsole;
use bastu_core::display::{
    resolve_display_list, DisplayOptions, MemberFilter, SortDirection, SortKey,
};
use bastu_core::models::{AccessEvent, CategoryCounts, LeaderboardRequest, SmsMessage};
use bastu_core::realtime::{ChangeFeed, SubscriptionRequest};
use bastu_core::sms::{conversations, group_broadcasts, normalize_phone, resolve_recipients, segment_count};
use bastu_core::utils::cmp_ignore_case;
use bastu_core::{categorize, ApiClient, Config, Contact, RankingService};

use crate::app::{App, DataSource};
use crate::output;
use crate::{
    BadgesArgs, CacheCommand, Command, EventsArgs, GroupsCommand, MembersArgs, SmsCommand,
};

/// Maximum concurrent per-member requests
const MAX_CONCURRENT_REQUESTS: usize = 4;

pub async fn run(command: Command, config: Config) -> Result<()> {
    let mut app = App::new(config)?;

    match command {
        Command::Login { phone, email } => {
            let contact = match (phone, email) {
                (Some(phone), _) => Contact::Phone(normalize_phone(&phone).unwrap_or(phone)),
                (None, Some(email)) => Contact::Email(email.trim().to_string()),
                (None, None) => bail!("Give --phone or --email"),
            };
            let session = app.login(contact).await?;
            println!(
                "Logged in. Session valid for {} minutes.",
                session.minutes_until_expiry(Utc::now())
            );
            Ok(())
        }
        Command::Logout => {
            app.logout()?;
            println!("Logged out.");
            Ok(())
        }
        Command::Members(args) => members(&app, args).await,
        Command::Events(args) => events(&app, args).await,
        Command::Groups { command } => groups(&app, command).await,
        Command::Sms { command } => sms(&app, command).await,
        Command::Badges(args) => badges(&app, args).await,
        Command::Chat => chat(&app).await,
        Command::Cache { command } => cache(&app, command),
    }
}

// ============================================================================
// Members
// ============================================================================

async fn members(app: &App, args: MembersArgs) -> Result<()> {
    let directory = app.load_directory(args.offline).await?;
    let now = Utc::now();

    let filter = MemberFilter {
        categories: args.categories.iter().copied().collect::<BTreeSet<_>>(),
        search: args.search.filter(|s| !s.trim().is_empty()),
    };
    let sort_key: SortKey = args.sort.map(Into::into).unwrap_or_default();
    let direction = if args.desc {
        SortDirection::Descending
    } else if args.asc {
        SortDirection::Ascending
    } else {
        sort_key.default_direction()
    };
    let period = args.period.map(Into::into).unwrap_or(app.config.default_period);
    let options = DisplayOptions::for_filter(&filter, sort_key, direction, period);

    let categorized = categorize(directory.members, now);
    let counts = CategoryCounts::from_categories(
        bastu_core::display::deduplicate(categorized.clone())
            .iter()
            .map(|m| m.category),
    );
    let rows = resolve_display_list(filter.apply(categorized), &options, now);
    debug!(shown = rows.len(), ?options, "Member list resolved");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{}", output::title_line(app.config.organization(), &options));
    println!("{}", output::member_header(&options));
    for (i, row) in rows.iter().enumerate() {
        println!("{}", output::member_line(row, i + 1, &options, now));
    }
    println!();
    println!("{}", output::counts_line(&counts));
    if let DataSource::Cache(age) = &directory.source {
        println!("(från cache, uppdaterad {})", age);
    }
    Ok(())
}

// ============================================================================
// Access events
// ============================================================================

async fn events(app: &App, args: EventsArgs) -> Result<()> {
    let api = app.api().await?;
    let mut query = AccessEventQuery::last_days(args.days, Utc::now());
    query.source = args.source.map(Into::into);
    query.denied_only = args.denied;
    query.limit = args.limit;

    let (events, directory) = tokio::join!(api.fetch_access_events(&query), app.load_directory(false));
    let events = events?;
    let members = match directory {
        Ok(directory) => directory.members,
        Err(e) => {
            warn!(error = %e, "Member names unavailable");
            Vec::new()
        }
    };

    match app.cache() {
        Ok(cache) => {
            if let Err(e) = cache.save_access_events(&events) {
                warn!(error = %e, "Failed to cache access events");
            }
        }
        Err(e) => debug!(error = %e, "Access events not cached"),
    }

    let summary = AccessSummary::from_events(&events);
    for row in review_events(events, &members) {
        println!("{}", output::event_line(&row));
    }
    println!();
    println!("{}", output::summary_line(&summary));

    if args.follow {
        let mut request = SubscriptionRequest::new("access_events", "occurred_at");
        if let Some(source) = query.source {
            request = request.filter("source", format!("eq.{}", source));
        }
        if query.denied_only {
            request = request.filter("granted", "eq.false");
        }
        let mut subscription = ChangeFeed::new(api).subscribe::<AccessEvent>(request);
        println!("Väntar på nya händelser (Ctrl-C avslutar)...");
        while let Some(change) = subscription.recv().await {
            for row in review_events(vec![change.row], &members) {
                println!("{}", output::event_line(&row));
            }
        }
    }
    Ok(())
}

// ============================================================================
// SMS groups and messages
// ============================================================================

async fn groups(app: &App, command: Option<GroupsCommand>) -> Result<()> {
    let api = app.api().await?;
    let groups = app.load_groups(&api).await?;

    match command {
        None => {
            for group in &groups {
                println!("{}", output::group_line(group));
            }
        }
        Some(GroupsCommand::Recipients { id }) => {
            let resolution = recipients(app, &api, &groups, &id).await?;
            for line in output::recipients_report(&resolution) {
                println!("{}", line);
            }
            for phone in &resolution.phones {
                println!("  {}", phone);
            }
        }
    }
    Ok(())
}

async fn recipients(
    app: &App,
    api: &ApiClient,
    groups: &[bastu_core::models::SmsGroup],
    id: &str,
) -> Result<bastu_core::sms::RecipientResolution> {
    let group = groups
        .iter()
        .find(|g| g.id == id || cmp_ignore_case(&g.name, id) == Ordering::Equal)
        .with_context(|| format!("No SMS group {}", id))?;
    let directory = app.load_directory(false).await?;
    resolve_recipients(group, &directory.members, api).await
}

async fn sms(app: &App, command: SmsCommand) -> Result<()> {
    let api = app.api().await?;

    match command {
        SmsCommand::Send { group, message, yes } => {
            let message = message.trim();
            if message.is_empty() {
                bail!("Message is empty");
            }
            let groups = app.load_groups(&api).await?;
            let resolution = recipients(app, &api, &groups, &group).await?;
            for line in output::recipients_report(&resolution) {
                println!("{}", line);
            }
            if resolution.phones.is_empty() {
                bail!("Nobody to send to");
            }

            let segments = segment_count(message);
            if segments > 1 {
                println!("Meddelandet blir {} SMS per mottagare.", segments);
            }
            if !yes && !confirm(&format!("Skicka till {} mottagare?", resolution.phones.len()))? {
                println!("Avbrutet.");
                return Ok(());
            }

            let report = api.send_sms(&resolution.phones, message).await?;
            println!("Skickade {} SMS.", report.sent);
            if !report.failed.is_empty() {
                println!("Misslyckades: {}", report.failed.join(", "));
            }
            Ok(())
        }
        SmsCommand::Inbox { follow } => {
            let messages = api.fetch_sms_messages(None).await?;
            for entry in group_broadcasts(&messages) {
                println!("{}", output::inbox_line(&entry));
            }

            let threads = conversations(&messages);
            let unanswered: Vec<_> = threads.iter().filter(|t| t.unanswered()).collect();
            if !unanswered.is_empty() {
                println!();
                println!("Obesvarade konversationer:");
                for thread in unanswered {
                    println!("  {}", output::conversation_line(thread));
                }
            }

            if follow {
                let request = SubscriptionRequest::new("sms_messages", "created_at")
                    .filter("direction", "eq.inbound");
                let request = match messages.last() {
                    Some(last) => request.start_after(last.created_at.clone()),
                    None => request,
                };
                let mut subscription = ChangeFeed::new(api).subscribe::<SmsMessage>(request);
                println!("Väntar på inkommande SMS (Ctrl-C avslutar)...");
                while let Some(change) = subscription.recv().await {
                    println!("{}", output::message_line(&change.row));
                }
            }
            Ok(())
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [j/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "j" | "ja" | "y" | "yes"))
}

// ============================================================================
// Badges
// ============================================================================

async fn badges(app: &App, args: BadgesArgs) -> Result<()> {
    let api = app.api().await?;
    let request = LeaderboardRequest {
        period: args.period.into(),
        limit: args.limit,
    };
    let entries = api.leaderboard(&request).await?;

    if !args.details {
        for entry in &entries {
            println!("{}", output::leaderboard_line(entry));
        }
        return Ok(());
    }

    // Keep leaderboard order while fetching a few members at a time
    let badges: Vec<_> = stream::iter(&entries)
        .map(|entry| api.member_badges(&entry.member_id))
        .buffered(MAX_CONCURRENT_REQUESTS)
        .collect()
        .await;

    for (entry, result) in entries.iter().zip(badges) {
        println!("{}", output::leaderboard_line(entry));
        match result {
            Ok(badges) => {
                for badge in &badges {
                    println!("{}", output::badge_line(badge));
                }
            }
            Err(e) => warn!(member = %entry.member_id, error = %e, "Badges unavailable"),
        }
    }
    Ok(())
}

// ============================================================================
// Chat
// ============================================================================

async fn chat(app: &App) -> Result<()> {
    let mut console = ChatConsole::new(app.api().await?);
    println!("AI-assistenten. /reset börjar om, /quit avslutar.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                console.reset();
                println!("(ny konversation)");
            }
            text => match console.send(text).await {
                Ok(reply) => println!("{}\n", reply.trim()),
                Err(e) => eprintln!("Fel: {:#}", e),
            },
        }
    }
    Ok(())
}

// ============================================================================
// Cache
// ============================================================================

fn cache(app: &App, command: CacheCommand) -> Result<()> {
    let cache = app.cache()?;
    match command {
        CacheCommand::Status => {
            for line in output::cache_lines(&cache.get_cache_ages()) {
                println!("{}", line);
            }
            println!("{:<14} {}", "directory", cache.cache_dir().display());
        }
        CacheCommand::Clear => {
            let removed = cache.clear()?;
            println!("Removed {} cached datasets.", removed);
        }
    }
    Ok(())
}
