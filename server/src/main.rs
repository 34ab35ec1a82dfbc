use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};
use tutor_core::prompt::DEFAULT_CONTEXT_BUDGET;
use tutor_core::{CorpusSource, JsonCorpusSource};
use tutor_server::completion::{CompletionService, OllamaCompletion};
use tutor_server::{build_app, ServerConfig};

#[derive(Parser)]
struct Args {
    /// Index directory path (built with `tutor-indexer build`)
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Corpus file or directory used by POST /admin/refresh
    #[arg(long)]
    corpus: Option<String>,
    /// Base URL of an Ollama-compatible completion server; /ask only builds prompts without it
    #[arg(long)]
    completion_url: Option<String>,
    /// Model name sent to the completion server
    #[arg(long, default_value = "llama2")]
    completion_model: String,
    /// Maximum tokens the model may generate per answer
    #[arg(long, default_value_t = 200)]
    max_tokens: u32,
    /// Seconds to wait for the completion server before failing the request
    #[arg(long, default_value_t = 60)]
    completion_timeout_secs: u64,
    /// Maximum course-material tokens placed in a prompt
    #[arg(long, default_value_t = DEFAULT_CONTEXT_BUDGET)]
    context_budget: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = ServerConfig::new(&args.index);
    config.context_budget = args.context_budget;
    config.admin_token = std::env::var("ADMIN_TOKEN").ok();
    config.corpus = args
        .corpus
        .as_ref()
        .map(|p| Arc::new(JsonCorpusSource::new(p)) as Arc<dyn CorpusSource>);
    if let Some(url) = &args.completion_url {
        let timeout = Duration::from_secs(args.completion_timeout_secs);
        let client = OllamaCompletion::new(url, args.completion_model.clone(), args.max_tokens, timeout)?;
        config.completion = Some(Arc::new(client) as Arc<dyn CompletionService>);
    }
    if config.completion.is_none() {
        tracing::warn!("no --completion-url given, /ask will return prompts without answers");
    }

    let app: Router = build_app(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
