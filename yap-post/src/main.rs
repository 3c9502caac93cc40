//! yap-post - post one composition to every connected platform

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use clap::Parser;

use libyapcast::auth::{JsonSessionVault, ThreadsAuth};
use libyapcast::events::Event;
use libyapcast::platforms::standard_registry;
use libyapcast::types::{
    effective_character_limit, AttemptStatus, ImageData, ImageMimeType, OutcomeKind,
};
use libyapcast::validation::{self, ValidationRequest};
use libyapcast::{
    Config, EventBus, Orchestrator, Platform, PostContent, Result, SessionStore, YapcastError,
};

#[derive(Parser, Debug)]
#[command(name = "yap-post")]
#[command(about = "Post one composition to every connected platform", long_about = None)]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// Target specific platform(s), comma-separated (default: all connected)
    #[arg(short, long)]
    platform: Option<String>,

    /// Attach image file(s), up to 4
    #[arg(short, long)]
    image: Vec<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let store = SessionStore::load(config.sessions_path()?)?;
    let store = Arc::new(RwLock::new(store));
    let event_bus = EventBus::new(100);

    // Opportunistic Threads token refresh; never blocks the post
    ThreadsAuth::new(config.threads.clone())
        .spawn_refresh_if_stale(store.clone(), event_bus.clone());

    let text = match cli.content {
        Some(content) => content,
        None => std::io::read_to_string(std::io::stdin())
            .map_err(|e| YapcastError::InvalidInput(format!("Failed to read stdin: {}", e)))?
            .trim_end()
            .to_string(),
    };

    let platforms = match cli.platform.as_deref() {
        Some(list) => parse_platforms(list)?,
        None => store.read().unwrap().connected_platforms(),
    };
    if platforms.is_empty() {
        return Err(YapcastError::InvalidInput(
            "No platforms selected and none connected. Run 'yap-accounts connect' first."
                .to_string(),
        ));
    }

    let images = load_images(&cli.image)?;

    let validation = validation::validate(&ValidationRequest {
        content: text.clone(),
        platforms: platforms.clone(),
        image_count: images.len(),
    });
    for result in &validation.results {
        for warning in &result.warnings {
            eprintln!("warning: {}", warning);
        }
    }
    if !validation.valid {
        let errors: Vec<String> = validation
            .results
            .iter()
            .flat_map(|r| r.errors.iter().cloned())
            .collect();
        return Err(YapcastError::InvalidInput(errors.join("; ")));
    }

    let vault = Arc::new(JsonSessionVault::load(
        config.vault_path()?,
        config.bluesky.clone(),
    ));
    let registry = standard_registry(&config, vault);
    let orchestrator = Orchestrator::new(registry, event_bus.clone());

    let text_output = cli.format != "json";
    let progress = if text_output {
        let mut receiver = event_bus.subscribe();
        Some(tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                match event {
                    Event::PostingProgress { platform, result } => match result.status {
                        AttemptStatus::Posting => eprintln!("… posting to {}", platform),
                        AttemptStatus::Completed => eprintln!("✓ {} done", platform),
                        AttemptStatus::Failed => eprintln!("✗ {} failed", platform),
                        AttemptStatus::Pending => {}
                    },
                    Event::PostingCompleted { .. } => break,
                    _ => {}
                }
            }
        }))
    } else {
        None
    };

    if let Some(limit) = effective_character_limit(&platforms) {
        tracing::debug!("Effective character limit for this selection: {}", limit);
    }

    let content = PostContent {
        text,
        platforms,
        images,
    };
    let snapshot = store.read().unwrap().snapshot();
    let outcome = orchestrator.post_all(&content, &snapshot).await;

    if let Some(progress) = progress {
        let _ = progress.await;
    }

    if cli.format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        );
    } else {
        println!("{}", outcome.summary());
        for result in &outcome.results {
            if result.success {
                let reference = result
                    .post_url
                    .as_deref()
                    .or(result.post_id.as_deref())
                    .unwrap_or("posted");
                println!("  {}: {}", result.platform, reference);
            } else {
                println!(
                    "  {}: {}",
                    result.platform,
                    result.error.as_deref().unwrap_or("failed")
                );
            }
        }
    }

    if !outcome.results.is_empty() && matches!(outcome.kind(), OutcomeKind::AllFailed) {
        std::process::exit(1);
    }

    Ok(())
}

fn parse_platforms(list: &str) -> Result<Vec<Platform>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Platform>()
                .map_err(YapcastError::InvalidInput)
        })
        .collect()
}

fn load_images(paths: &[PathBuf]) -> Result<Vec<ImageData>> {
    if paths.len() > 4 {
        return Err(YapcastError::InvalidInput(format!(
            "At most 4 images per post (got {})",
            paths.len()
        )));
    }

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let mime = ImageMimeType::from_extension(extension).ok_or_else(|| {
            YapcastError::InvalidInput(format!(
                "Unsupported image type '{}' for {}",
                extension,
                path.display()
            ))
        })?;

        let bytes = std::fs::read(path).map_err(|e| {
            YapcastError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        images.push(ImageData {
            bytes,
            mime,
            file_name,
        });
    }
    Ok(images)
}
