/// Request and response bodies shared by the HTTP routes and the MCP tools.
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::{Message, Rule};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchRulesParams {
    /// Free-text question or keywords, e.g. "what is goaltending".
    pub query: String,
    /// Maximum number of rules to return (default and max: the server's search limit).
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetRuleParams {
    /// Rule id such as "rule-001".
    pub rule_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListCategoryParams {
    /// Category name such as "Violations". Matching ignores case.
    pub category: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AskRulebookParams {
    /// The question, in plain language.
    pub question: String,
    /// Conversation key. Turns are recorded under "anonymous" when omitted.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ClearHistoryParams {
    /// Conversation key. Defaults to "anonymous".
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchRulesResponse {
    pub results: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategoryRulesResponse {
    pub category: String,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: String,
}

impl ClearHistoryResponse {
    pub fn cleared() -> Self {
        Self {
            success: true,
            message: "Chat history cleared".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub rules: usize,
}

/// Error body for every non-2xx HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}
