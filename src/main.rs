//! # Claude Resume
//!
//! A local web viewer for Claude Code chat history.
//!
//! Reads transcripts from ~/.claude/projects/, serves them as JSON, and
//! renders a browser UI with search, project filters, and a one-click
//! "resume command" copy (`cd "<cwd>" && claude --resume <id>`).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────────┐
//! │  Frontend   │────▶│  Axum HTTP   │────▶│  ~/.claude/     │
//! │ (index.html)│     │  Server      │     │  projects/      │
//! └─────────────┘     └──────────────┘     │  (JSONL files)  │
//!                            │             └─────────────────┘
//!                            ▼
//!                     ┌──────────────┐
//!                     │ sessions.rs  │  full re-scan per request,
//!                     │ transcript.rs│  no cache, read-only
//!                     └──────────────┘
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /` - Embedded HTML interface
//! - `GET /health` - Server health check
//! - `GET /api/chats` - All chat sessions matching the current directory

mod sessions;
mod transcript;

use axum::{
    extract::State,
    response::{Html, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How many ports to probe after the requested one turns out busy.
const PORT_SCAN_RANGE: u16 = 100;

// ============================================================================
// Configuration
// ============================================================================

/// Runtime configuration, resolved once at startup.
///
/// Everything flows in from the environment here and nowhere else; the
/// ingestion code below takes explicit paths so it stays testable.
#[derive(Debug, Clone)]
struct Config {
    /// Transcript root, normally ~/.claude/projects/
    projects_dir: PathBuf,
    /// The caller's working directory, used to scope which sessions show
    current_dir: PathBuf,
    host: String,
    port: u16,
    open_browser: bool,
}

impl Config {
    fn from_env() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/home/user".to_string());
        let projects_dir = std::env::var("CLAUDE_RESUME_PROJECTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(&home).join(".claude").join("projects"));
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let host = std::env::var("CLAUDE_RESUME_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("CLAUDE_RESUME_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8888);
        let open_browser = std::env::var("CLAUDE_RESUME_NO_BROWSER").map_or(true, |v| v != "1");

        Self {
            projects_dir,
            current_dir,
            host,
            port,
            open_browser,
        }
    }
}

// ============================================================================
// App State
// ============================================================================

/// Shared across all HTTP handlers. Holds no session data: every request
/// recomputes from the source files.
struct AppState {
    start_time: Instant,
    config: Config,
}

// ============================================================================
// Endpoints
// ============================================================================

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    version: &'static str,
    chat_files: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        chat_files: count_transcripts(&state.config.projects_dir),
    })
}

/// Serve every chat session matching the current directory context.
/// One synchronous walk of the projects tree per request.
async fn list_chats(State(state): State<Arc<AppState>>) -> Json<sessions::ChatIndex> {
    let chat_index = sessions::scan_chats(&state.config.projects_dir, &state.config.current_dir);
    tracing::debug!(
        "Scanned {} chats across {} projects",
        chat_index.chats.len(),
        chat_index.projects.len()
    );
    Json(chat_index)
}

// ============================================================================
// Startup helpers
// ============================================================================

/// Count transcript files under the projects directory (for startup logs
/// and the health endpoint).
fn count_transcripts(projects_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(projects_dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .flat_map(|entry| fs::read_dir(entry.path()).into_iter().flatten().flatten())
        .filter(|file| file.path().extension().is_some_and(|ext| ext == "jsonl"))
        .count()
}

/// Find a free port starting at `start`, probing up to `max_tries` ports.
fn find_free_port(host: &str, start: u16, max_tries: u16) -> Option<u16> {
    (start..=start.saturating_add(max_tries.saturating_sub(1)))
        .find(|&port| std::net::TcpListener::bind((host, port)).is_ok())
}

/// Open the system browser at `url`. Best effort, failure is logged only.
fn open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("open").arg(url).spawn();
    #[cfg(target_os = "windows")]
    let result = std::process::Command::new("cmd").args(["/C", "start", url]).spawn();
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let result = std::process::Command::new("xdg-open").arg(url).spawn();

    if let Err(e) = result {
        tracing::warn!("Could not open browser: {}", e);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("claude_resume=info".parse().unwrap()),
        )
        .init();

    let config = Config::from_env();

    if !config.projects_dir.exists() {
        tracing::error!(
            "Claude projects directory not found at {}",
            config.projects_dir.display()
        );
        tracing::error!("Ensure Claude Code is installed and has recorded at least one session.");
        std::process::exit(1);
    }

    tracing::info!(
        "Found {} chat files in {}",
        count_transcripts(&config.projects_dir),
        config.projects_dir.display()
    );

    // Try the requested port exactly, then probe upward
    let port = match find_free_port(&config.host, config.port, 1) {
        Some(port) => port,
        None => {
            let Some(port) = find_free_port(&config.host, config.port.saturating_add(1), PORT_SCAN_RANGE)
            else {
                tracing::error!(
                    "No free port in range {}-{}",
                    config.port,
                    config.port.saturating_add(PORT_SCAN_RANGE)
                );
                std::process::exit(1);
            };
            tracing::info!("Port {} is busy, using port {} instead", config.port, port);
            port
        }
    };

    let url = format!("http://{}:{}", config.host, port);
    let should_open = config.open_browser;

    let state = Arc::new(AppState {
        start_time: Instant::now(),
        config: config.clone(),
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/chats", get(list_chats))
        .with_state(state);

    let addr = format!("{}:{}", config.host, port);
    tracing::info!(
        "Claude Resume v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        url
    );

    if should_open {
        let browser_url = url.clone();
        tokio::spawn(async move {
            // Give the server a moment to start accepting connections
            tokio::time::sleep(Duration::from_secs(1)).await;
            open_browser(&browser_url);
        });
    }

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port_skips_bound_port() {
        let taken = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let busy = taken.local_addr().unwrap().port();
        // Exact-match probe fails on the bound port
        assert_eq!(find_free_port("127.0.0.1", busy, 1), None);
        // A wider probe lands on a neighbor
        let found = find_free_port("127.0.0.1", busy, 10);
        assert!(found.is_some());
        assert_ne!(found, Some(busy));
    }

    #[test]
    fn test_count_transcripts_missing_dir() {
        assert_eq!(count_transcripts(Path::new("/nonexistent/projects")), 0);
    }
}
