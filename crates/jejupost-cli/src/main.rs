use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use jejupost_client::{ApiClient, TokenStore};
use jejupost_store::PostcardStore;
use jejupost_stream::{CloseReason, StatusWatcher};
use jejupost_types::api::{PhotoUpload, UpdatePostcard};
use jejupost_types::models::{LifecycleStatus, Postcard};

#[derive(Parser)]
#[command(name = "jejupost", about = "Client for the postcard service", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and persist the bearer token
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// List your postcards
    List {
        /// Filter by lifecycle status (writing, pending, processing, sent, failed, cancelled)
        #[arg(long)]
        status: Option<LifecycleStatus>,
    },
    /// Create a blank postcard
    Create,
    /// Edit a writing/pending postcard
    Edit {
        id: String,
        /// Message text; the server translates it into dialect
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        recipient_email: Option<String>,
        #[arg(long)]
        recipient_name: Option<String>,
        #[arg(long)]
        sender_name: Option<String>,
        /// Delivery time, RFC 3339 (omit for immediate delivery)
        #[arg(long)]
        schedule: Option<DateTime<Utc>>,
        /// JPEG or PNG photo to place on the postcard
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Send a postcard (immediately or at its scheduled time)
    Send {
        id: String,
        /// Do not follow the live pipeline status after sending
        #[arg(long)]
        no_watch: bool,
    },
    /// Follow the live send-pipeline status of a postcard
    Watch { id: String },
    /// Delete a postcard
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jejupost=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let base_url =
        std::env::var("JEJUPOST_API_URL").unwrap_or_else(|_| "http://localhost:8000".into());
    let token_path = std::env::var("JEJUPOST_TOKEN_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        format!("{home}/.config/jejupost/token")
    });

    let client = ApiClient::new(base_url, TokenStore::new(token_path));
    let cli = Cli::parse();

    match cli.command {
        Command::Login { email, password } => {
            client.login(&email, &password).await?;
            println!("signed in as {email}");
        }
        Command::List { status } => {
            let store = PostcardStore::new(Arc::new(client));
            store.fetch(status).await?;
            let snapshot = store.snapshot().await;
            if snapshot.postcards.is_empty() {
                println!("no postcards");
            }
            for postcard in &snapshot.postcards {
                print_postcard(postcard);
            }
        }
        Command::Create => {
            let store = PostcardStore::new(Arc::new(client));
            let postcard = store.create().await?;
            println!("created postcard {}", postcard.id);
        }
        Command::Edit {
            id,
            text,
            recipient_email,
            recipient_name,
            sender_name,
            schedule,
            photo,
        } => {
            let update = UpdatePostcard {
                text,
                recipient_email,
                recipient_name,
                sender_name,
                scheduled_at: schedule,
                photo: photo.map(load_photo).transpose()?,
            };
            if update.is_empty() {
                bail!("nothing to update — pass at least one field");
            }
            let postcard = client.update(&id, update).await?;
            print_postcard(&postcard);
        }
        Command::Send { id, no_watch } => {
            let postcard = client.send(&id).await?;
            info!(id = %postcard.id, status = %postcard.status, "send accepted");
            if postcard.is_processing() && !no_watch {
                watch(client, &id).await?;
            } else {
                print_postcard(&postcard);
            }
        }
        Command::Watch { id } => watch(client, &id).await?,
        Command::Delete { id } => {
            let store = PostcardStore::new(Arc::new(client));
            store.delete(&id).await?;
            println!("deleted {id}");
        }
    }

    Ok(())
}

/// Follow the status stream until it closes, printing each caption once.
async fn watch(client: ApiClient, id: &str) -> anyhow::Result<()> {
    let mut watcher = StatusWatcher::spawn(Arc::new(client), id);
    let mut rx = watcher.watch();

    let mut last = None;
    let reason = loop {
        {
            let snapshot = rx.borrow_and_update();
            if snapshot.status != last {
                if let Some(status) = snapshot.status {
                    println!("{}", status.caption());
                }
                last = snapshot.status;
            }
            if let Some(reason) = snapshot.closed {
                break reason;
            }
        }
        if rx.changed().await.is_err() {
            break CloseReason::Eof;
        }
    };
    watcher.join().await;

    let snapshot = watcher.snapshot();
    match reason {
        CloseReason::Terminal => {
            if let Some(error) = snapshot.error {
                bail!("pipeline failed: {error}");
            }
        }
        CloseReason::Eof => println!("stream closed by server"),
        CloseReason::Cancelled => {}
        CloseReason::Error => {
            bail!(
                "status stream error: {}",
                snapshot.error.unwrap_or_else(|| "unknown".into())
            );
        }
    }
    Ok(())
}

fn load_photo(path: PathBuf) -> anyhow::Result<PhotoUpload> {
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        other => bail!("unsupported photo type {other:?} — use JPEG or PNG"),
    };
    let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("photo.jpg")
        .to_string();
    Ok(PhotoUpload {
        file_name,
        content_type: content_type.to_string(),
        bytes,
    })
}

fn print_postcard(postcard: &Postcard) {
    let recipient = postcard.recipient_email.as_deref().unwrap_or("-");
    let when = match (&postcard.sent_at, &postcard.scheduled_at) {
        (Some(sent), _) => format!("sent {}", sent.format("%Y-%m-%d %H:%M")),
        (None, Some(at)) => format!("scheduled {}", at.format("%Y-%m-%d %H:%M")),
        (None, None) => "draft".into(),
    };
    println!(
        "{}  [{}]  to: {}  {}",
        postcard.id, postcard.status, recipient, when
    );
    if let Some(text) = &postcard.text {
        println!("    {text}");
    }
    if let Some(error) = &postcard.error_message {
        println!("    error: {error}");
    }
}
