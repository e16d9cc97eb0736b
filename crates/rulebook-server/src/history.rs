/// Per-session conversation history.
///
/// Key schema for the Redis store:
/// - `rulebook:v1:history:{session}`: list of JSON-serialized `Message`, oldest first,
///   expiring `ttl_secs` after the last append
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::model::Message;
use rulebook_common::error::CommonError;
use rulebook_common::redis::RedisStore;

const KEY_PREFIX: &str = "rulebook:v1:history:";

pub const DEFAULT_HISTORY_TTL_SECS: u64 = 86_400;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, session_id: &str, message: &Message) -> Result<(), CommonError>;

    /// The most recent `limit` turns of a session, in chronological order.
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, CommonError>;

    /// Remove every turn of a session. Clearing an unknown session succeeds.
    async fn clear(&self, session_id: &str) -> Result<(), CommonError>;

    fn backend(&self) -> &'static str;
}

/// In-process store. Each session has its own lock, so appends to different sessions
/// never wait on each other.
#[derive(Default)]
pub struct MemoryHistory {
    sessions: RwLock<HashMap<String, Arc<Mutex<Vec<Message>>>>>,
    /// Oldest turns are dropped once a session holds this many.
    max_turns: Option<usize>,
}

impl MemoryHistory {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    async fn session(&self, session_id: &str) -> Arc<Mutex<Vec<Message>>> {
        if let Some(turns) = self.sessions.read().await.get(session_id) {
            return Arc::clone(turns);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id.to_string()).or_default())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, session_id: &str, message: &Message) -> Result<(), CommonError> {
        let session = self.session(session_id).await;
        let mut turns = session.lock().await;
        turns.push(message.clone());
        if let Some(max) = self.max_turns {
            if turns.len() > max {
                let excess = turns.len() - max;
                turns.drain(..excess);
            }
        }
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, CommonError> {
        let Some(session) = self.sessions.read().await.get(session_id).cloned() else {
            return Ok(Vec::new());
        };
        let turns = session.lock().await;
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }

    async fn clear(&self, session_id: &str) -> Result<(), CommonError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Redis-backed store. RPUSH is atomic, so concurrent appends to one session are
/// serialized by Redis itself.
pub struct RedisHistory {
    redis: RedisStore,
    ttl_secs: u64,
}

impl RedisHistory {
    pub fn new(redis: RedisStore, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }
}

#[async_trait]
impl HistoryStore for RedisHistory {
    async fn append(&self, session_id: &str, message: &Message) -> Result<(), CommonError> {
        let json = serde_json::to_string(message)?;
        self.redis
            .list_push(&history_key(session_id), &json, self.ttl_secs)
            .await
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, CommonError> {
        let raw = self.redis.list_tail(&history_key(session_id), limit).await?;
        raw.iter()
            .map(|json| serde_json::from_str::<Message>(json).map_err(CommonError::from))
            .collect()
    }

    async fn clear(&self, session_id: &str) -> Result<(), CommonError> {
        self.redis.delete(&history_key(session_id)).await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

fn history_key(session_id: &str) -> String {
    format!("{KEY_PREFIX}{session_id}")
}
