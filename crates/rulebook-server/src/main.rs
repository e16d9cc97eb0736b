mod api;
mod compose;
mod config;
mod corpus;
mod error;
mod history;
mod http;
mod model;
mod search;
mod server;
mod session;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use compose::{DeterministicComposer, LlmComposer, ResponseComposer};
use config::{Config, Transport};
use corpus::RuleCorpus;
use history::{HistoryStore, MemoryHistory, RedisHistory};
use http::HttpState;
use rulebook_common::openai::{OpenAiClient, OpenAiClientConfig};
use rulebook_common::redis::RedisStore;
use search::RuleMatcher;
use server::RulebookServer;
use session::ConversationSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr: stdout carries JSON-RPC in stdio mode
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting rulebook server");

    // 1. Load config from environment
    let config = Config::from_env()?;
    info!(
        transport = ?config.transport,
        corpus = ?config.corpus_path,
        redis = config.redis_url.is_some(),
        llm = config.llm_model.is_some(),
        "configuration loaded"
    );

    // 2. Load and validate the corpus; any defect aborts startup
    let corpus = match &config.corpus_path {
        Some(path) => RuleCorpus::from_path(path)?,
        None => RuleCorpus::embedded()?,
    };
    info!(
        rules = corpus.len(),
        categories = corpus.list_categories().len(),
        "rule corpus loaded"
    );

    // 3. History store: Redis when reachable, otherwise in memory
    let history = history_store(&config).await;
    info!(backend = history.backend(), "history store ready");

    // 4. Composer: LLM-phrased answers when a model is configured
    let composer = composer(&config)?;
    info!(kind = composer.kind(), "response composer ready");

    let session = Arc::new(ConversationSession::new(
        Arc::new(corpus),
        RuleMatcher::new(config.search_limit, config.search_examples),
        composer,
        history,
        config.history_timeout,
    ));

    // 5. Serve
    match config.transport {
        Transport::Http => {
            let state = Arc::new(HttpState {
                session,
                history_limit: config.history_limit,
            });
            http::serve(state, config.bind_addr).await?;
        }
        Transport::Stdio => {
            info!("MCP server ready, serving on stdio");
            let service = RulebookServer::new(session)
                .serve(stdio())
                .await
                .inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
            service.waiting().await?;
            info!("MCP server shut down");
        }
    }
    Ok(())
}

async fn history_store(config: &Config) -> Arc<dyn HistoryStore> {
    if let Some(url) = config.redis_url.as_deref() {
        let redis = RedisStore::new(Some(url));
        if redis.is_available().await {
            info!("redis connected");
            return Arc::new(RedisHistory::new(redis, config.history_ttl_secs));
        }
        warn!("redis unavailable, keeping history in memory");
    }
    Arc::new(MemoryHistory::new(config.history_max_turns))
}

fn composer(config: &Config) -> anyhow::Result<Arc<dyn ResponseComposer>> {
    let deterministic =
        DeterministicComposer::new(config.fallback_message.clone(), config.citation_limit);

    let Some(model) = config.llm_model.as_deref() else {
        return Ok(Arc::new(deterministic));
    };

    let openai_config = OpenAiClientConfig::from_env();
    info!(
        base_url = %openai_config.base_url,
        model,
        timeout_ms = config.llm_timeout.as_millis(),
        max_retries = openai_config.retry.max_retries,
        "openai client configured"
    );
    let client = Arc::new(OpenAiClient::new(openai_config)?);
    Ok(Arc::new(LlmComposer::new(
        client,
        model,
        deterministic,
        config.llm_timeout,
    )))
}
