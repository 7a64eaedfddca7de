//! Whipper: batch prompts through a browser-authenticated chat session.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod routes;
mod state;

use state::AppState;
use whipper_browser::{BrowserManager, DrivenBrowser};

fn resolve_data_dir() -> PathBuf {
    std::env::var("WHIPPER_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_usage() {
    println!("Whipper: batch prompts through a logged-in chat session");
    println!();
    println!("Usage: whipper <command>");
    println!();
    println!("Commands:");
    println!("  auth    Open a visible browser to log in to the chat site");
    println!("  ui      Start the dashboard API");
    println!("  help    Show this help message");
}

/// Resolves once the user enters `Q` on stdin or presses Ctrl-C.
async fn wait_for_quit() {
    println!("Enter Q to quit");
    let stdin = async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("q") => return,
                Ok(Some(_)) => continue,
                // No terminal attached: leave it to Ctrl-C.
                Ok(None) | Err(_) => std::future::pending::<()>().await,
            }
        }
    };

    tokio::select! {
        _ = stdin => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        }
    }
}

async fn run_auth(data_dir: PathBuf) -> anyhow::Result<()> {
    let config = whipper_core::WhipperConfig::from_env(&data_dir)?;
    let browser = BrowserManager::new(&config.data_paths.browser);

    browser.launch_visible().await?;
    println!("Log in to the chat site in the opened browser window.");
    wait_for_quit().await;

    browser.close().await?;
    Ok(())
}

async fn run_ui(data_dir: PathBuf) -> anyhow::Result<()> {
    let config = whipper_core::WhipperConfig::from_env(&data_dir)?;
    let state = Arc::new(AppState::new(config));
    let port = state.config.port;

    let app = routes::build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Whipper dashboard API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_quit())
        .await?;

    state.shutdown().await?;
    info!("Shut down");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let data_dir = resolve_data_dir();

    match args.get(1).map(String::as_str) {
        Some("auth") => {
            info!("Data directory: {}", data_dir.display());
            run_auth(data_dir).await
        }
        Some("ui") => {
            info!("Data directory: {}", data_dir.display());
            run_ui(data_dir).await
        }
        Some("--help" | "-h" | "help") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}. Use 'whipper help' for usage.", other);
            std::process::exit(1);
        }
        None => {
            print_usage();
            std::process::exit(1);
        }
    }
}
