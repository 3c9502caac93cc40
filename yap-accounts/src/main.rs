//! yap-accounts - manage per-platform OAuth sessions
//!
//! Connect walks the platform's login flow in the terminal: it prints the
//! authorization URL to open in a browser and reads the redirect back from
//! stdin. Sessions land in the shared store that yap-post reads.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;

use libyapcast::auth::{
    BlueskyAuth, CallbackParams, JsonSessionVault, MastodonAuth, ThreadsAuth,
};
use libyapcast::platforms::standard_registry;
use libyapcast::{Config, EventBus, Orchestrator, Platform, SessionStore};

#[derive(Parser)]
#[command(name = "yap-accounts")]
#[command(about = "Manage Yapcast platform sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect a platform account
    Connect {
        #[command(subcommand)]
        platform: ConnectTarget,
    },

    /// List connected accounts
    List,

    /// Probe each connected account with a lightweight authenticated call
    Verify,

    /// Disconnect a platform account
    Disconnect {
        /// Platform name (mastodon, threads, bluesky)
        platform: String,
    },
}

#[derive(Subcommand)]
enum ConnectTarget {
    /// Connect a Mastodon account on a specific instance
    Mastodon {
        /// Instance domain, e.g. mastodon.social
        #[arg(long)]
        instance: String,
    },
    /// Connect a Threads account
    Threads,
    /// Connect a Bluesky account
    Bluesky {
        /// Bluesky handle, e.g. user.bsky.social
        #[arg(long)]
        handle: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run_command(cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run_command(command: Commands) -> Result<()> {
    let config = Config::load()?;
    let mut store = SessionStore::load(config.sessions_path()?)?;
    let event_bus = EventBus::new(100);

    match command {
        Commands::Connect { platform } => match platform {
            ConnectTarget::Mastodon { instance } => {
                connect_mastodon(&config, &mut store, &event_bus, &instance).await
            }
            ConnectTarget::Threads => connect_threads(&config, &mut store, &event_bus).await,
            ConnectTarget::Bluesky { handle } => {
                connect_bluesky(&config, &mut store, &event_bus, &handle).await
            }
        },
        Commands::List => list_accounts(&store),
        Commands::Verify => verify_accounts(&config, &store).await,
        Commands::Disconnect { platform } => {
            disconnect(&config, &mut store, &event_bus, &platform).await
        }
    }
}

async fn connect_mastodon(
    config: &Config,
    store: &mut SessionStore,
    event_bus: &EventBus,
    instance: &str,
) -> Result<()> {
    let auth = MastodonAuth::new(config.mastodon.clone());

    println!("Registering with {}...", instance);
    let app = auth.register_app(instance).await?;

    let url = auth.authorize_url(instance, &app.client_id);
    println!("\nOpen this URL in your browser and authorize Yapcast:\n\n  {}\n", url);

    let code = prompt("Paste the authorization code: ")?;
    let session = auth
        .complete_login(store, event_bus, instance, &app, &code)
        .await?;

    println!("✓ Connected Mastodon as @{}", session.username);
    Ok(())
}

async fn connect_threads(
    config: &Config,
    store: &mut SessionStore,
    event_bus: &EventBus,
) -> Result<()> {
    let auth = ThreadsAuth::new(config.threads.clone());
    let url = auth.authorize_url()?;

    println!("\nOpen this URL in your browser and authorize Yapcast:\n\n  {}\n", url);

    let redirect = prompt("Paste the full redirect URL: ")?;
    let code = query_param(&redirect, "code")
        .ok_or_else(|| anyhow!("No 'code' parameter in redirect URL"))?;
    let state = query_param(&redirect, "state")
        .ok_or_else(|| anyhow!("No 'state' parameter in redirect URL"))?;

    let session = auth
        .complete_login(store, event_bus, &code, &state)
        .await?;

    println!("✓ Connected Threads as @{}", session.user.username);
    Ok(())
}

async fn connect_bluesky(
    config: &Config,
    store: &mut SessionStore,
    event_bus: &EventBus,
    handle: &str,
) -> Result<()> {
    let vault = Arc::new(JsonSessionVault::load(
        config.vault_path()?,
        config.bluesky.clone(),
    ));
    let auth = BlueskyAuth::new(vault, config.bluesky.clone());

    let url = auth.begin_login(handle).await?;
    println!("\nOpen this URL in your browser and authorize Yapcast:\n\n  {}\n", url);

    let redirect = prompt("Paste the full redirect URL: ")?;
    let params = CallbackParams {
        code: query_param(&redirect, "code")
            .ok_or_else(|| anyhow!("No 'code' parameter in redirect URL"))?,
        state: query_param(&redirect, "state")
            .ok_or_else(|| anyhow!("No 'state' parameter in redirect URL"))?,
    };

    let session = auth.complete_login(store, event_bus, &params).await?;
    println!("✓ Connected Bluesky as @{} ({})", session.handle, session.did);
    Ok(())
}

fn list_accounts(store: &SessionStore) -> Result<()> {
    let connected = store.connected_platforms();
    if connected.is_empty() {
        println!("No accounts connected.");
        return Ok(());
    }

    for platform in Platform::ALL {
        match store.get(platform) {
            Some(session) => {
                let validity = if store.is_valid(platform) {
                    "valid"
                } else {
                    "invalid"
                };
                println!(
                    "{:<10} @{} ({})",
                    platform.to_string(),
                    session.account_label(),
                    validity
                );
            }
            None => println!("{:<10} not connected", platform.to_string()),
        }
    }
    Ok(())
}

async fn verify_accounts(config: &Config, store: &SessionStore) -> Result<()> {
    let connected = store.connected_platforms();
    if connected.is_empty() {
        println!("No accounts connected.");
        return Ok(());
    }

    let vault = Arc::new(JsonSessionVault::load(
        config.vault_path()?,
        config.bluesky.clone(),
    ));
    let orchestrator = Orchestrator::new(standard_registry(config, vault), EventBus::new(100));

    let statuses = orchestrator
        .verify_connections(&connected, &store.snapshot())
        .await;
    for (platform, ok) in statuses {
        if ok {
            println!("✓ {} connection ok", platform);
        } else {
            println!("✗ {} connection failed", platform);
        }
    }
    Ok(())
}

async fn disconnect(
    config: &Config,
    store: &mut SessionStore,
    event_bus: &EventBus,
    platform: &str,
) -> Result<()> {
    let platform: Platform = platform.parse().map_err(|e: String| anyhow!(e))?;

    match platform {
        Platform::Mastodon => {
            MastodonAuth::new(config.mastodon.clone())
                .logout(store, event_bus)
                .await?;
        }
        Platform::Threads => {
            ThreadsAuth::new(config.threads.clone()).logout(store, event_bus)?;
        }
        Platform::Bluesky => {
            let vault = Arc::new(JsonSessionVault::load(
                config.vault_path()?,
                config.bluesky.clone(),
            ));
            BlueskyAuth::new(vault, config.bluesky.clone())
                .logout(store, event_bus)
                .await?;
        }
    }

    println!("✓ Disconnected {}", platform);
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;

    let value = line.trim().to_string();
    if value.is_empty() {
        return Err(anyhow!("No input provided"));
    }
    Ok(value)
}

/// Pull one query parameter out of a pasted redirect URL.
fn query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or(url);
    let query = query.split('#').next().unwrap_or(query);

    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return Some(percent_decode(v));
            }
        }
    }
    None
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_from_full_url() {
        let url = "http://127.0.0.1:8787/auth/threads/callback?code=abc123&state=xyz";
        assert_eq!(query_param(url, "code").as_deref(), Some("abc123"));
        assert_eq!(query_param(url, "state").as_deref(), Some("xyz"));
        assert_eq!(query_param(url, "missing"), None);
    }

    #[test]
    fn test_query_param_from_bare_query() {
        assert_eq!(
            query_param("code=abc&state=s1", "code").as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_query_param_ignores_fragment() {
        let url = "http://localhost/cb?code=abc#fragment";
        assert_eq!(query_param(url, "code").as_deref(), Some("abc"));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("plain"), "plain");
        assert_eq!(percent_decode("a%2Fb%3D"), "a/b=");
        assert_eq!(percent_decode("a+b"), "a b");
    }
}
