use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::compose::{DEFAULT_CITATION_LIMIT, DEFAULT_FALLBACK_MESSAGE};
use crate::error::AppError;
use crate::history::DEFAULT_HISTORY_TTL_SECS;
use crate::search::DEFAULT_SEARCH_LIMIT;
use crate::session::DEFAULT_HISTORY_TIMEOUT;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_LLM_TIMEOUT_MS: u64 = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// REST API over axum.
    Http,
    /// MCP tools over stdin/stdout.
    Stdio,
}

impl FromStr for Transport {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "stdio" | "mcp" => Ok(Self::Stdio),
            other => Err(AppError::Config(format!(
                "RULEBOOK_TRANSPORT must be 'http' or 'stdio', got '{other}'"
            ))),
        }
    }
}

/// Application configuration loaded explicitly from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub transport: Transport,
    pub bind_addr: SocketAddr,
    /// JSON rule file. `None` uses the dataset compiled into the binary.
    pub corpus_path: Option<PathBuf>,
    pub search_limit: usize,
    pub citation_limit: usize,
    pub search_examples: bool,
    pub fallback_message: String,
    /// Default page size for history reads.
    pub history_limit: usize,
    pub history_timeout: Duration,
    /// Redis connection URL (e.g. "redis://127.0.0.1:6379"). `None` keeps history in memory.
    pub redis_url: Option<String>,
    pub history_ttl_secs: u64,
    pub history_max_turns: Option<usize>,
    /// Model id for the LLM composer. `None` answers deterministically.
    pub llm_model: Option<String>,
    pub llm_timeout: Duration,
}

impl Config {
    /// Every variable is optional; malformed values are a `Config` error rather than a
    /// silent default.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let transport = match var("RULEBOOK_TRANSPORT") {
            Some(v) => v.parse()?,
            None => Transport::Http,
        };

        let bind_addr = var("RULEBOOK_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.trim().parse::<SocketAddr>().map_err(|e| {
            AppError::Config(format!("RULEBOOK_BIND_ADDR '{bind_addr}' is not a socket address: {e}"))
        })?;

        let search_limit = parse_or(&var, "RULEBOOK_SEARCH_LIMIT", DEFAULT_SEARCH_LIMIT)?;
        let citation_limit = parse_or(&var, "RULEBOOK_CITATION_LIMIT", DEFAULT_CITATION_LIMIT)?;
        if search_limit == 0 || citation_limit == 0 {
            return Err(AppError::Config(
                "RULEBOOK_SEARCH_LIMIT and RULEBOOK_CITATION_LIMIT must be positive".to_string(),
            ));
        }

        let history_max_turns = match var("RULEBOOK_HISTORY_MAX_TURNS") {
            Some(_) => match parse_or(&var, "RULEBOOK_HISTORY_MAX_TURNS", 0usize)? {
                0 => {
                    return Err(AppError::Config(
                        "RULEBOOK_HISTORY_MAX_TURNS must be positive".to_string(),
                    ));
                }
                n => Some(n),
            },
            None => None,
        };

        Ok(Self {
            transport,
            bind_addr,
            corpus_path: var("RULEBOOK_CORPUS_PATH").map(PathBuf::from),
            search_limit,
            citation_limit,
            search_examples: parse_or(&var, "RULEBOOK_SEARCH_EXAMPLES", false)?,
            fallback_message: var("RULEBOOK_FALLBACK_MESSAGE")
                .unwrap_or_else(|| DEFAULT_FALLBACK_MESSAGE.to_string()),
            history_limit: parse_or(&var, "RULEBOOK_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
            history_timeout: Duration::from_millis(parse_or(
                &var,
                "RULEBOOK_HISTORY_TIMEOUT_MS",
                DEFAULT_HISTORY_TIMEOUT.as_millis() as u64,
            )?),
            redis_url: var("REDIS_URL"),
            history_ttl_secs: parse_or(&var, "RULEBOOK_HISTORY_TTL_SECS", DEFAULT_HISTORY_TTL_SECS)?,
            history_max_turns,
            llm_model: var("RULEBOOK_LLM_MODEL").map(|m| m.trim().to_string()),
            llm_timeout: Duration::from_millis(parse_or(
                &var,
                "RULEBOOK_LLM_TIMEOUT_MS",
                DEFAULT_LLM_TIMEOUT_MS,
            )?),
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} has invalid value '{raw}': {e}"))),
        None => Ok(default),
    }
}
