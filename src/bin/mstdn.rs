//! mstdn - Mastodon command-line client
//!
//! Streams a timeline from the configured server and prints each event as
//! it arrives, reconnecting transparently when the connection drops.

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mstdn::{
    ClientSettings, Credential, DomainEvent, HttpProvider, Notification, Status, StreamConfig,
    StreamSession, Timeline,
};
use scraper::{ElementRef, Html};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "mstdn")]
#[command(about = "Mastodon command-line client")]
#[command(version)]
struct Cli {
    /// Path to settings.json (defaults to the platform config directory)
    #[arg(long, global = true, env = "MSTDN_CONFIG")]
    config: Option<PathBuf>,

    /// Server URL, overriding the stored one
    #[arg(long, global = true, env = "MSTDN_SERVER")]
    server: Option<String>,

    /// Access token, overriding the stored one
    #[arg(long, global = true, env = "MSTDN_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Store the effective server and access token in the settings file
    #[arg(long, global = true)]
    save: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream statuses
    Stream(StreamArgs),
}

#[derive(Args)]
struct StreamArgs {
    /// Output JSON
    #[arg(long, conflicts_with = "simplejson")]
    json: bool,

    /// Output simple JSON
    #[arg(long)]
    simplejson: bool,

    /// Timeline to follow
    #[arg(long, value_enum, default_value_t = TimelineArg::User)]
    timeline: TimelineArg,

    /// Hashtag to follow (with --timeline hashtag)
    #[arg(long, required_if_eq("timeline", "hashtag"))]
    tag: Option<String>,

    /// List id to follow (with --timeline list)
    #[arg(long, required_if_eq("timeline", "list"))]
    list: Option<String>,

    /// First reconnect delay in seconds
    #[arg(long, default_value_t = 1)]
    base_backoff: u64,

    /// Reconnect delay cap in seconds
    #[arg(long, default_value_t = 60)]
    max_backoff: u64,

    /// Seconds of silence before the connection is replaced
    #[arg(long, default_value_t = 45)]
    liveness: u64,

    /// Events buffered before the oldest are dropped
    #[arg(long, default_value_t = 256)]
    queue: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum TimelineArg {
    User,
    Public,
    Local,
    Hashtag,
    List,
}

#[derive(Clone, Copy)]
enum Output {
    Text,
    Json,
    SimpleJson,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("mstdn=info"))?)
        .init();

    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => ClientSettings::default_path().context("no config directory on this platform")?,
    };
    let mut settings = ClientSettings::load(&path)?;
    if let Some(server) = cli.server {
        settings.server = server;
    }
    if let Some(token) = cli.access_token {
        settings.access_token = token;
    }
    if cli.save {
        settings.save(&path)?;
        info!(path = %path.display(), "Settings saved");
    }

    match cli.command {
        Commands::Stream(args) => stream(settings, args).await,
    }
}

async fn stream(settings: ClientSettings, args: StreamArgs) -> anyhow::Result<()> {
    if !settings.has_token() {
        bail!("no access token; pass --access-token or set MSTDN_ACCESS_TOKEN");
    }

    let timeline = match args.timeline {
        TimelineArg::User => Timeline::User,
        TimelineArg::Public => Timeline::Public,
        TimelineArg::Local => Timeline::Local,
        TimelineArg::Hashtag => Timeline::Hashtag(args.tag.unwrap_or_default()),
        TimelineArg::List => Timeline::List(args.list.unwrap_or_default()),
    };
    let output = if args.json {
        Output::Json
    } else if args.simplejson {
        Output::SimpleJson
    } else {
        Output::Text
    };

    let endpoint = timeline.endpoint(&settings.server)?;
    let config = StreamConfig::builder(endpoint, Credential::new(settings.access_token))
        .base_backoff(Duration::from_secs(args.base_backoff))
        .max_backoff(Duration::from_secs(args.max_backoff))
        .liveness_window(Duration::from_secs(args.liveness))
        .queue_capacity(args.queue)
        .build()?;

    let mut session = StreamSession::new(config, HttpProvider::new()?);
    let mut events = session.subscribe();
    session.start()?;

    let mut stdout = std::io::stdout().lock();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = events.next() => {
                let Some(event) = event else { break };
                render(&mut stdout, &event, output)?;
            }
        }
    }

    if events.dropped_count() > 0 {
        warn!(dropped = events.dropped_count(), "Output fell behind; events were dropped");
    }
    session.stop();
    session.join().await;

    match session.last_error() {
        Some(error) if !error.is_retryable() => {
            for suggestion in error.recovery_suggestions() {
                eprintln!("  - {suggestion}");
            }
            bail!("stream closed: {error}")
        }
        _ => Ok(()),
    }
}

fn render(out: &mut impl Write, event: &DomainEvent, output: Output) -> anyhow::Result<()> {
    match output {
        Output::Json => writeln!(out, "{}", serde_json::to_string(event)?)?,
        Output::SimpleJson => writeln!(out, "{}", simple_json(event))?,
        Output::Text => match event {
            DomainEvent::StatusUpdate { status } => write_status(out, status)?,
            DomainEvent::Notification { notification } => write_notification(out, notification)?,
            DomainEvent::Deletion { status_id } => writeln!(out, "deleted: {status_id}")?,
            DomainEvent::Unknown { raw_type, .. } => writeln!(out, "({raw_type})")?,
            DomainEvent::Heartbeat => {}
        },
    }
    out.flush()?;
    Ok(())
}

fn write_status(out: &mut impl Write, status: &Status) -> std::io::Result<()> {
    if let Some(original) = status.reblog.as_deref() {
        writeln!(out, "@{} reblogged @{}", status.account.acct, original.account.acct)?;
    } else {
        writeln!(out, "@{}", status.account.acct)?;
    }
    writeln!(out, "{}", text_content(&status.original().content))
}

fn write_notification(out: &mut impl Write, notification: &Notification) -> std::io::Result<()> {
    let kind = serde_json::to_value(&notification.kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    writeln!(out, "{kind}: @{}", notification.account.acct)?;
    if let Some(status) = &notification.status {
        writeln!(out, "{}", text_content(&status.content))?;
    }
    Ok(())
}

/// One flat object per event: the fields a shell pipeline usually wants
fn simple_json(event: &DomainEvent) -> serde_json::Value {
    match event {
        DomainEvent::StatusUpdate { status } => {
            let original = status.original();
            json!({
                "event": "update",
                "id": status.id,
                "acct": original.account.acct,
                "display_name": original.account.display_name,
                "content": text_content(&original.content),
                "reblogged_by": status.reblog.as_ref().map(|_| status.account.acct.clone()),
            })
        }
        DomainEvent::Notification { notification } => json!({
            "event": "notification",
            "id": notification.id,
            "type": notification.kind,
            "acct": notification.account.acct,
            "content": notification.status.as_ref().map(|status| text_content(&status.content)),
        }),
        DomainEvent::Deletion { status_id } => json!({ "event": "delete", "id": status_id }),
        DomainEvent::Unknown { raw_type, .. } => json!({ "event": raw_type }),
        DomainEvent::Heartbeat => json!({ "event": "heartbeat" }),
    }
}

/// Plain text of a status body; paragraphs and line breaks become newlines
fn text_content(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    collect_text(fragment.root_element(), &mut text);
    text.trim_end().to_string()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            match child.value().name() {
                "br" => out.push('\n'),
                "p" => {
                    collect_text(child, out);
                    out.push('\n');
                }
                _ => collect_text(child, out),
            }
        }
    }
}
