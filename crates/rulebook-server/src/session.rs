/// One request/response cycle: validate, record the user turn, match, compose, record the
/// bot turn, answer.
///
/// History writes are side-channel: each is bounded by `history_timeout`, and a failed or
/// slow write is logged and reported next to the response instead of replacing it.
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::compose::ResponseComposer;
use crate::corpus::RuleCorpus;
use crate::error::AppError;
use crate::history::HistoryStore;
use crate::model::{ChatResponse, Message};
use crate::search::RuleMatcher;

pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_millis(500);

/// Session key used when a caller does not identify itself.
pub const DEFAULT_SESSION_ID: &str = "anonymous";

/// Result of `handle_message`. The response is always present.
#[derive(Debug)]
pub struct HandledMessage {
    pub response: ChatResponse,
    /// `HistoryUnavailable` when either turn failed to persist.
    pub history_error: Option<AppError>,
}

pub struct ConversationSession {
    corpus: Arc<RuleCorpus>,
    matcher: RuleMatcher,
    composer: Arc<dyn ResponseComposer>,
    history: Arc<dyn HistoryStore>,
    history_timeout: Duration,
}

impl ConversationSession {
    pub fn new(
        corpus: Arc<RuleCorpus>,
        matcher: RuleMatcher,
        composer: Arc<dyn ResponseComposer>,
        history: Arc<dyn HistoryStore>,
        history_timeout: Duration,
    ) -> Self {
        Self {
            corpus,
            matcher,
            composer,
            history,
            history_timeout,
        }
    }

    pub fn corpus(&self) -> &RuleCorpus {
        &self.corpus
    }

    pub fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }

    pub async fn handle_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<HandledMessage, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidArgument(
                "message content must not be empty".to_string(),
            ));
        }

        let user_turn = self.persist(session_id, Message::user(text)).await.err();

        let matches = self.matcher.search(text, &self.corpus);
        let composed = self.composer.respond(text, &matches).await;
        let response = ChatResponse {
            id: rulebook_common::id::new_id(),
            message: composed.answer,
            citations: composed.citations,
        };
        info!(
            session_id,
            matches = matches.len(),
            citations = response.citations.len(),
            "message answered"
        );

        let bot_turn = self
            .persist(
                session_id,
                Message::bot(&response.id, &response.message, response.citations.clone()),
            )
            .await
            .err();

        Ok(HandledMessage {
            response,
            history_error: user_turn.or(bot_turn),
        })
    }

    pub async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, AppError> {
        match tokio::time::timeout(self.history_timeout, self.history.recent(session_id, limit)).await {
            Ok(Ok(messages)) => Ok(messages),
            Ok(Err(e)) => Err(self.unavailable(session_id, "read", e.to_string())),
            Err(_) => Err(self.unavailable(session_id, "read", self.timed_out())),
        }
    }

    pub async fn clear_history(&self, session_id: &str) -> Result<(), AppError> {
        match tokio::time::timeout(self.history_timeout, self.history.clear(session_id)).await {
            Ok(Ok(())) => {
                info!(session_id, "history cleared");
                Ok(())
            }
            Ok(Err(e)) => Err(self.unavailable(session_id, "clear", e.to_string())),
            Err(_) => Err(self.unavailable(session_id, "clear", self.timed_out())),
        }
    }

    async fn persist(&self, session_id: &str, message: Message) -> Result<(), AppError> {
        match tokio::time::timeout(self.history_timeout, self.history.append(session_id, &message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.unavailable(session_id, "append", e.to_string())),
            Err(_) => Err(self.unavailable(session_id, "append", self.timed_out())),
        }
    }

    fn unavailable(&self, session_id: &str, op: &str, reason: String) -> AppError {
        warn!(
            session_id,
            op,
            backend = self.history.backend(),
            error = %reason,
            "history store failed"
        );
        AppError::HistoryUnavailable(format!("{op} failed: {reason}"))
    }

    fn timed_out(&self) -> String {
        format!("timed out after {}ms", self.history_timeout.as_millis())
    }
}
