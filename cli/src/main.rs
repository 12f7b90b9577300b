use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use flume::Receiver;
use murmur_core::{
    AppAction, AppState, AppUpdate, Message, MessageBackend, MessageId, MurmurApp, MurmurConfig,
    SubscriptionState, UpdateListener, UserId, load_config,
};
use murmur_remote::HttpBackend;
use serde_json::json;

const STEP_TIMEOUT: Duration = Duration::from_secs(20);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "murmur")]
#[command(about = "Direct-message client for scripting and debugging")]
struct Cli {
    /// State directory (config file and optional log live here)
    #[arg(long, default_value = ".murmur")]
    state_dir: PathBuf,

    /// Identity to act as
    #[arg(long, env = "MURMUR_USER")]
    user: String,

    /// REST API base URL (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Realtime websocket URL (overrides config)
    #[arg(long)]
    realtime_url: Option<String>,

    /// Realtime API key (overrides config)
    #[arg(long)]
    realtime_api_key: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream live activity as JSON lines (runs until interrupted or --timeout)
    Watch {
        /// Open the conversation with this peer and print its messages
        #[arg(long)]
        peer: Option<String>,

        /// Timeout in seconds (0 = run forever)
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },

    /// Send a direct message
    Send {
        /// Receiver identity
        #[arg(long)]
        to: String,

        /// Message content
        #[arg(long)]
        content: String,
    },

    /// Print the unread count
    Unread,

    /// List conversations, newest activity first
    Conversations,

    /// Print the history with a peer
    History {
        /// Peer identity
        #[arg(long)]
        peer: String,
    },

    /// List users you can message
    Contacts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.state_dir)
        .with_context(|| format!("create state dir {}", cli.state_dir.display()))?;

    match &cli.cmd {
        Command::Watch { peer, timeout } => cmd_watch(&cli, peer.as_deref(), *timeout).await,
        Command::Send { to, content } => cmd_send(&cli, to, content).await,
        Command::Unread => cmd_unread(&cli).await,
        Command::Conversations => cmd_conversations(&cli).await,
        Command::History { peer } => cmd_history(&cli, peer).await,
        Command::Contacts => cmd_contacts(&cli).await,
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn state_dir(cli: &Cli) -> anyhow::Result<&str> {
    cli.state_dir
        .to_str()
        .ok_or_else(|| anyhow!("state dir is not valid UTF-8"))
}

fn config(cli: &Cli) -> anyhow::Result<MurmurConfig> {
    let mut config = load_config(state_dir(cli)?);
    if let Some(url) = &cli.api_url {
        config.api_base_url = Some(url.clone());
    }
    if let Some(url) = &cli.realtime_url {
        config.realtime_url = Some(url.clone());
    }
    if let Some(key) = &cli.realtime_api_key {
        config.realtime_api_key = Some(key.clone());
    }
    Ok(config)
}

fn me(cli: &Cli) -> anyhow::Result<UserId> {
    let user = cli.user.trim();
    if user.is_empty() {
        bail!("--user must not be empty");
    }
    Ok(UserId::new(user))
}

fn backend(cli: &Cli) -> anyhow::Result<HttpBackend> {
    let config = config(cli)?;
    HttpBackend::new(config.api_base_url(), config.http_timeout())
}

struct ChannelListener(flume::Sender<AppUpdate>);

impl UpdateListener for ChannelListener {
    fn on_update(&self, update: AppUpdate) {
        let _ = self.0.send(update);
    }
}

/// Start the engine and sign in, waiting for live delivery.
async fn start(cli: &Cli) -> anyhow::Result<(Arc<MurmurApp>, Receiver<AppUpdate>)> {
    let app = MurmurApp::from_config(state_dir(cli)?, config(cli)?)?;
    let (tx, rx) = flume::unbounded();
    app.listen_for_updates(Box::new(ChannelListener(tx)));

    let user = me(cli)?;
    app.dispatch(AppAction::SignIn { user: user.clone() });
    let state = wait_for(&app, &rx, "subscription", STEP_TIMEOUT, |s| {
        s.signed_in_user() == Some(&user)
            && (s.subscription.is_live() || s.subscription.is_terminal())
    })
    .await?;
    if let SubscriptionState::Error { reason } = &state.subscription {
        bail!("subscription failed: {reason}");
    }
    tracing::info!(user = %user, "signed in");
    Ok((app, rx))
}

async fn wait_for(
    app: &MurmurApp,
    updates: &Receiver<AppUpdate>,
    what: &str,
    timeout: Duration,
    f: impl Fn(&AppState) -> bool,
) -> anyhow::Result<AppState> {
    let state = app.state();
    if f(&state) {
        return Ok(state);
    }
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, updates.recv_async()).await {
            Ok(Ok(AppUpdate::FullState(state))) => {
                if f(&state) {
                    return Ok(state);
                }
            }
            Ok(Err(_)) => bail!("engine stopped while waiting for {what}"),
            Err(_) => bail!("timed out waiting for {what}"),
        }
    }
}

async fn open_conversation(
    app: &MurmurApp,
    updates: &Receiver<AppUpdate>,
    peer: &UserId,
) -> anyhow::Result<AppState> {
    app.dispatch(AppAction::OpenConversation { peer: peer.clone() });
    wait_for(app, updates, "history", STEP_TIMEOUT, |s| {
        s.open_peer() == Some(peer) && !s.busy.loading_history
    })
    .await
}

fn message_json(m: &Message) -> serde_json::Value {
    json!({
        "id": m.id.as_str(),
        "from": m.sender.as_str(),
        "to": m.receiver.as_str(),
        "content": m.content,
        "read": m.read,
        "created_at": m.created_at.to_rfc3339(),
        "sender_name": m.sender_name,
    })
}

fn print(v: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&v).context("json encode")?);
    Ok(())
}

fn print_line(v: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&v).context("json encode")?);
    Ok(())
}

// ── Commands ────────────────────────────────────────────────────────────────

async fn cmd_watch(cli: &Cli, peer: Option<&str>, timeout: u64) -> anyhow::Result<()> {
    let (app, updates) = start(cli).await?;
    let mut seen: HashSet<MessageId> = HashSet::new();

    if let Some(peer) = peer {
        let state = open_conversation(&app, &updates, &UserId::new(peer.trim())).await?;
        // History is printed by the `history` command; only stream what's new.
        if let Some(conv) = &state.current_conversation {
            seen.extend(conv.messages.iter().map(|m| m.id.clone()));
        }
    }

    let initial = app.state();
    let mut unread = initial.unread_count;
    let mut subscription = initial.subscription.clone();
    let mut last_activity = initial.directory.first().map(|s| s.last_activity_at);
    print_line(json!({"type": "ready", "unread": unread}))?;

    let deadline = (timeout > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_secs(timeout));

    loop {
        let next = match deadline {
            Some(d) => match tokio::time::timeout_at(d, updates.recv_async()).await {
                Ok(r) => r,
                Err(_) => break,
            },
            None => updates.recv_async().await,
        };
        let Ok(AppUpdate::FullState(state)) = next else {
            break;
        };

        if let Some(conv) = &state.current_conversation {
            for m in &conv.messages {
                if seen.insert(m.id.clone()) {
                    print_line(json!({"type": "message", "message": message_json(m)}))?;
                }
            }
        }

        if state.unread_count != unread {
            unread = state.unread_count;
            print_line(json!({"type": "unread", "count": unread}))?;
        }

        let newest = state.directory.first();
        if newest.map(|s| s.last_activity_at) > last_activity {
            if let Some(s) = newest {
                print_line(json!({
                    "type": "activity",
                    "peer": s.peer.as_str(),
                    "at": s.last_activity_at.to_rfc3339(),
                }))?;
                last_activity = Some(s.last_activity_at);
            }
        }

        if state.subscription != subscription {
            subscription = state.subscription.clone();
            print_line(json!({"type": "subscription", "state": format!("{subscription:?}")}))?;
            if subscription.is_terminal() {
                tracing::warn!(state = ?subscription, delay = ?RECONNECT_DELAY, "live channel down, reconnecting");
                tokio::time::sleep(RECONNECT_DELAY).await;
                app.dispatch(AppAction::Reconnect);
            }
        }

        if let Some(toast) = &state.toast {
            print_line(json!({"type": "toast", "message": toast}))?;
            app.dispatch(AppAction::ClearToast);
        }
    }

    app.dispatch(AppAction::SignOut);
    Ok(())
}

async fn cmd_send(cli: &Cli, to: &str, content: &str) -> anyhow::Result<()> {
    let (app, updates) = start(cli).await?;
    let receiver = UserId::new(to.trim());
    let before = open_conversation(&app, &updates, &receiver).await?;
    let known: HashSet<MessageId> = before
        .current_conversation
        .iter()
        .flat_map(|c| c.messages.iter().map(|m| m.id.clone()))
        .collect();

    app.dispatch(AppAction::SendMessage {
        receiver: receiver.clone(),
        content: content.to_string(),
    });
    let state = wait_for(&app, &updates, "send", STEP_TIMEOUT, |s| {
        s.composer.sending || s.composer.error.is_some()
    })
    .await?;
    let state = if state.composer.sending {
        wait_for(&app, &updates, "send result", STEP_TIMEOUT, |s| {
            !s.composer.sending
        })
        .await?
    } else {
        state
    };
    app.dispatch(AppAction::SignOut);

    if let Some(err) = &state.composer.error {
        bail!("send failed: {err}");
    }
    let sent = state
        .current_conversation
        .iter()
        .flat_map(|c| c.messages.iter())
        .find(|m| !known.contains(&m.id))
        .ok_or_else(|| anyhow!("sent message not found in conversation"))?;
    print(message_json(sent))
}

async fn cmd_unread(cli: &Cli) -> anyhow::Result<()> {
    let count = backend(cli)?
        .unread_count(&me(cli)?)
        .await
        .context("fetch unread count")?;
    print(json!({ "unread_count": count }))
}

async fn cmd_conversations(cli: &Cli) -> anyhow::Result<()> {
    let entries = backend(cli)?
        .fetch_directory(&me(cli)?)
        .await
        .context("fetch conversations")?;
    let out: Vec<serde_json::Value> = entries
        .iter()
        .map(|s| {
            json!({
                "peer": s.peer.as_str(),
                "name": s.peer_name,
                "last_message_at": s.last_activity_at.to_rfc3339(),
            })
        })
        .collect();
    print(json!({ "conversations": out }))
}

async fn cmd_history(cli: &Cli, peer: &str) -> anyhow::Result<()> {
    let messages = backend(cli)?
        .fetch_conversation(&me(cli)?, &UserId::new(peer.trim()))
        .await
        .context("fetch history")?;
    let out: Vec<serde_json::Value> = messages.iter().map(message_json).collect();
    print(json!({ "messages": out }))
}

async fn cmd_contacts(cli: &Cli) -> anyhow::Result<()> {
    let me = me(cli)?;
    let users = backend(cli)?.list_users().await.context("list users")?;
    let out: Vec<serde_json::Value> = users
        .iter()
        .filter(|c| c.user != me)
        .map(|c| json!({ "user": c.user.as_str(), "name": c.username }))
        .collect();
    print(json!({ "contacts": out }))
}
