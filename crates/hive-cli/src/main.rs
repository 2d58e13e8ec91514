//! Hive - terminal chat front-end for multi-agent agencies
//!
//! Loads a declarative agency chart, wires it to an assistants-style
//! HTTP backend, and runs a line-based chat loop over the streamed
//! completion events.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hive_core::{
    Agency, AgencyConfig, DispatchMode, HttpBackend, HttpBackendConfig, JsonSettingsStore,
    JsonThreadStore,
};

mod chart_file;
mod chat;

/// Hive - multi-agent agency chat
#[derive(Parser)]
#[command(name = "hive")]
#[command(about = "Chat with a multi-agent agency", long_about = None)]
struct Cli {
    /// Path to the agency chart file
    #[arg(long, default_value = "agency.toml")]
    chart: PathBuf,

    /// Backend base URL (defaults to $HIVE_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Backend API key (defaults to $HIVE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Asynchronous agent-to-agent dispatch (send_message returns
    /// immediately, responses are polled with get_response)
    #[arg(long)]
    r#async: bool,

    /// Persist conversation ids across restarts
    #[arg(long)]
    persist_threads: bool,
}

fn required(flag: Option<String>, env_var: &str, what: &str) -> Result<String> {
    flag.or_else(|| std::env::var(env_var).ok())
        .with_context(|| format!("{what} missing: pass the flag or set ${env_var}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let backend = Arc::new(HttpBackend::new(HttpBackendConfig {
        base_url: required(cli.base_url, "HIVE_BASE_URL", "backend base URL")?,
        api_key: required(cli.api_key, "HIVE_API_KEY", "backend API key")?,
    }));

    let (chart, shared_instructions) = chart_file::load(&cli.chart)?;

    let config = AgencyConfig {
        shared_instructions,
        dispatch: if cli.r#async {
            DispatchMode::Asynchronous
        } else {
            DispatchMode::Synchronous
        },
        settings_store: Some(Arc::new(JsonSettingsStore::new(
            hive_core::paths::settings_path(),
        ))),
        thread_store: cli.persist_threads.then(|| {
            Arc::new(JsonThreadStore::new(
                hive_core::paths::config_dir().join("threads.json"),
            )) as Arc<dyn hive_core::ThreadStore>
        }),
        ..AgencyConfig::default()
    };

    tracing::info!(chart = %cli.chart.display(), "initializing agency");
    let agency = Agency::new(chart, backend, config)
        .await
        .context("failed to initialize the agency")?;

    chat::run(agency).await
}
