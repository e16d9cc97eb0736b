use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single rulebook entry (e.g., "Traveling", Rule 10, Section XIII).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Rule {
    /// Stable identifier, e.g. "rule-001"
    pub id: String,
    /// Short name, e.g. "Traveling"
    pub title: String,
    /// Grouping label shared by many rules, e.g. "Violations"
    pub category: String,
    /// Rulebook location, e.g. "Rule 10, Section XIII"
    pub section: String,
    /// Full rule text
    pub content: String,
    /// Worked examples, in rulebook order
    #[serde(default)]
    pub examples: Vec<String>,
}

impl Rule {
    /// The one citation format used everywhere: `"<section> - <category> - <title>"`.
    pub fn citation(&self) -> String {
        format!("{} - {} - {}", self.section, self.category, self.title)
    }
}

/// A rule field that can contribute to a match score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Content,
    Category,
    Section,
    Examples,
}

/// A scored association between one query and one rule.
#[derive(Debug, Clone)]
pub struct Match {
    pub rule: Arc<Rule>,
    pub score: f64,
    /// Fields with a nonzero contribution, in `Field` declaration order.
    pub matched_fields: Vec<Field>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// One conversation turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<String>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: rulebook_common::id::new_id(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            citations: None,
        }
    }

    /// Bot turn carrying the id of the response it records.
    pub fn bot(id: impl Into<String>, content: impl Into<String>, citations: Vec<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Bot,
            content: content.into(),
            timestamp: Utc::now(),
            citations: Some(citations),
        }
    }
}

/// What the chat transport hands back for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChatResponse {
    pub id: String,
    pub message: String,
    pub citations: Vec<String>,
}
