/// Turns ranked matches into the answer text and citation list sent back to the user.
///
/// `DeterministicComposer` is always available and is pure: identical match lists give
/// byte-identical output. `LlmComposer` wraps it, asks an OpenAI-compatible model to phrase
/// the answer, and drops back to the deterministic answer on any failure.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::{Match, Rule};
use rulebook_common::openai::{ChatCompletionRequest, Message, OpenAiClient};

pub const DEFAULT_CITATION_LIMIT: usize = 3;

pub const DEFAULT_FALLBACK_MESSAGE: &str = "I'm sorry, I couldn't find specific information about that in the NBA rulebook. \
Please try rephrasing your question or ask about a different aspect of the rules.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedAnswer {
    pub answer: String,
    pub citations: Vec<String>,
}

/// Strategy seam between the conversation session and answer generation.
#[async_trait]
pub trait ResponseComposer: Send + Sync {
    async fn respond(&self, query: &str, matches: &[Match]) -> ComposedAnswer;

    /// Short label for startup logs.
    fn kind(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct DeterministicComposer {
    fallback_message: String,
    citation_limit: usize,
}

impl Default for DeterministicComposer {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_MESSAGE, DEFAULT_CITATION_LIMIT)
    }
}

impl DeterministicComposer {
    pub fn new(fallback_message: impl Into<String>, citation_limit: usize) -> Self {
        Self {
            fallback_message: fallback_message.into(),
            citation_limit,
        }
    }

    /// The primary match supplies the answer; the top `citation_limit` matches supply
    /// citations, one per distinct rule id.
    pub fn compose(&self, matches: &[Match]) -> ComposedAnswer {
        let Some(primary) = matches.first() else {
            return ComposedAnswer {
                answer: self.fallback_message.clone(),
                citations: Vec::new(),
            };
        };

        ComposedAnswer {
            answer: format_answer(&primary.rule),
            citations: self
                .cited_rules(matches)
                .into_iter()
                .map(Rule::citation)
                .collect(),
        }
    }

    fn cited_rules<'a>(&self, matches: &'a [Match]) -> Vec<&'a Rule> {
        let mut seen = HashSet::new();
        let mut cited = Vec::new();
        for m in matches.iter().take(self.citation_limit) {
            if seen.insert(m.rule.id.as_str()) {
                cited.push(m.rule.as_ref());
            }
        }
        cited
    }
}

#[async_trait]
impl ResponseComposer for DeterministicComposer {
    async fn respond(&self, _query: &str, matches: &[Match]) -> ComposedAnswer {
        self.compose(matches)
    }

    fn kind(&self) -> &'static str {
        "deterministic"
    }
}

/// `"<title>: <content>"`, followed by a bulleted `Examples:` block when the rule has any.
fn format_answer(rule: &Rule) -> String {
    let mut answer = format!("{}: {}", rule.title, rule.content);
    if !rule.examples.is_empty() {
        answer.push_str("\n\nExamples:");
        for example in &rule.examples {
            answer.push_str("\n- ");
            answer.push_str(example);
        }
    }
    answer
}

pub struct LlmComposer {
    client: Arc<OpenAiClient>,
    model: String,
    deterministic: DeterministicComposer,
    timeout: Duration,
}

impl LlmComposer {
    pub fn new(
        client: Arc<OpenAiClient>,
        model: impl Into<String>,
        deterministic: DeterministicComposer,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            deterministic,
            timeout,
        }
    }

    fn build_request(&self, query: &str, matches: &[Match]) -> ChatCompletionRequest {
        let context = self
            .deterministic
            .cited_rules(matches)
            .iter()
            .map(|r| format!("Rule {}: {}\n{}", r.id, r.title, r.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let system = format!(
            "You are RuleBook Bot and you answer questions about the NBA rulebook.\n\
             Use only the rules listed below. Explain them clearly and concisely in a \
             conversational tone. If the rules below do not answer the question, say so. \
             Never invent rules.\n\nRULES:\n{context}"
        );

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system), Message::user(query)],
            temperature: Some(0.3),
            max_tokens: Some(800),
        }
    }
}

#[async_trait]
impl ResponseComposer for LlmComposer {
    async fn respond(&self, query: &str, matches: &[Match]) -> ComposedAnswer {
        let baseline = self.deterministic.compose(matches);
        if matches.is_empty() {
            return baseline;
        }

        let request = self.build_request(query, matches);
        let call = self.client.chat_completions(&request, Some(self.timeout));
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => match response.text() {
                Some(text) => {
                    debug!(model = %self.model, "llm answer composed");
                    ComposedAnswer {
                        answer: text.to_string(),
                        citations: baseline.citations,
                    }
                }
                None => {
                    warn!(model = %self.model, "llm returned no content, using deterministic answer");
                    baseline
                }
            },
            Ok(Err(e)) => {
                warn!(error = %e, model = %self.model, "llm composition failed, using deterministic answer");
                baseline
            }
            Err(_) => {
                warn!(
                    model = %self.model,
                    timeout_ms = self.timeout.as_millis(),
                    "llm composition timed out, using deterministic answer"
                );
                baseline
            }
        }
    }

    fn kind(&self) -> &'static str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::corpus::fixtures::corpus;
    use crate::search::RuleMatcher;
    use rulebook_common::openai::{OpenAiClientConfig, RetryPolicy};

    fn matches_for(query: &str) -> Vec<Match> {
        RuleMatcher::default().search(query, &corpus())
    }

    #[test]
    fn empty_matches_give_fallback() {
        let composer = DeterministicComposer::new("nothing found", 3);
        let out = composer.compose(&[]);
        assert_eq!(out.answer, "nothing found");
        assert!(out.citations.is_empty());

        let out = DeterministicComposer::default().compose(&[]);
        assert_eq!(out.answer, DEFAULT_FALLBACK_MESSAGE);
    }

    #[test]
    fn primary_match_supplies_answer_and_examples() {
        let out = DeterministicComposer::default().compose(&matches_for("What is a traveling violation?"));
        assert!(out.answer.starts_with("Traveling: A player who receives the ball"));
        assert!(out.answer.ends_with(
            "\n\nExamples:\n- A player takes three steps after gathering the ball without dribbling.\n\
             - A player establishes a pivot foot, then lifts it and returns it to the floor before passing."
        ));
        assert_eq!(out.citations, ["Rule 10, Section XIII - Violations - Traveling"]);
    }

    #[test]
    fn rule_without_examples_has_no_examples_block() {
        let out = DeterministicComposer::default().compose(&matches_for("shot clock"));
        assert!(out.answer.starts_with("Shot Clock: The shot clock shall be"));
        assert!(!out.answer.contains("Examples:"));
    }

    #[test]
    fn citations_are_capped_and_deduplicated_by_rule_id() {
        let ranked = matches_for("basket");
        let doubled: Vec<Match> = vec![
            ranked[0].clone(),
            ranked[0].clone(),
            ranked[1].clone(),
        ];
        let out = DeterministicComposer::default().compose(&doubled);
        assert_eq!(out.citations.len(), 2);

        let out = DeterministicComposer::new("x", 1).compose(&ranked);
        assert_eq!(out.citations, ["Rule 11, Section I - Violations - Goaltending"]);
    }

    #[test]
    fn composition_is_deterministic() {
        let composer = DeterministicComposer::default();
        let matches = matches_for("personal foul");
        assert_eq!(composer.compose(&matches), composer.compose(&matches));
    }

    fn test_config(base_url: String, timeout: Duration) -> OpenAiClientConfig {
        OpenAiClientConfig {
            base_url,
            api_key: None,
            timeout,
            retry: RetryPolicy::none(),
            max_error_body_bytes: 1024,
        }
    }

    fn llm_composer(server: &MockServer, timeout: Duration) -> LlmComposer {
        let client = OpenAiClient::new(test_config(server.uri(), timeout)).unwrap();
        LlmComposer::new(Arc::new(client), "test-model", DeterministicComposer::default(), timeout)
    }

    #[tokio::test]
    async fn llm_answer_keeps_deterministic_citations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "You can't take three steps."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let matches = matches_for("traveling");
        let out = llm_composer(&server, Duration::from_secs(5))
            .respond("traveling", &matches)
            .await;
        assert_eq!(out.answer, "You can't take three steps.");
        assert_eq!(out.citations, DeterministicComposer::default().compose(&matches).citations);
    }

    #[tokio::test]
    async fn llm_failure_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let matches = matches_for("goaltending");
        let out = llm_composer(&server, Duration::from_secs(5))
            .respond("goaltending", &matches)
            .await;
        assert_eq!(out, DeterministicComposer::default().compose(&matches));
    }

    #[tokio::test]
    async fn llm_timeout_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let matches = matches_for("goaltending");
        let out = llm_composer(&server, Duration::from_millis(100))
            .respond("goaltending", &matches)
            .await;
        assert!(out.answer.starts_with("Goaltending: "));
    }

    #[tokio::test]
    async fn no_matches_never_call_the_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let out = llm_composer(&server, Duration::from_secs(5))
            .respond("xyzzy", &[])
            .await;
        assert_eq!(out.answer, DEFAULT_FALLBACK_MESSAGE);
        assert!(out.citations.is_empty());
    }

    #[test]
    fn llm_prompt_lists_cited_rules() {
        let client = OpenAiClient::new(test_config(
            "http://127.0.0.1:9".to_string(),
            Duration::from_secs(1),
        ))
        .unwrap();
        let composer = LlmComposer::new(
            Arc::new(client),
            "m",
            DeterministicComposer::default(),
            Duration::from_secs(1),
        );
        let request = composer.build_request("traveling?", &matches_for("traveling goaltending"));
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[0].content.contains("Rule 1: Traveling\n"));
        assert!(request.messages[0].content.contains("Rule 3: Goaltending\n"));
        assert_eq!(request.messages[1].content, "traveling?");
    }
}
