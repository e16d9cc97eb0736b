/// MCP server exposing the rulebook over stdio.
///
/// Exposes six tools:
/// - `search_rules`: ranked keyword search over the corpus
/// - `get_rule`: look up one rule by id
/// - `list_categories` / `list_category`: browse by category
/// - `ask_rulebook`: full question/answer turn with citations, recorded in history
/// - `clear_history`: forget a conversation
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::info;

use crate::api::{
    AskRulebookParams, CategoriesResponse, CategoryRulesResponse, ClearHistoryParams,
    ClearHistoryResponse, GetRuleParams, ListCategoryParams, SearchRulesParams,
    SearchRulesResponse,
};
use crate::model::{ChatResponse, Rule};
use crate::session::{ConversationSession, DEFAULT_SESSION_ID};

#[derive(Clone)]
pub struct RulebookServer {
    session: Arc<ConversationSession>,
    tool_router: ToolRouter<RulebookServer>,
}

impl RulebookServer {
    pub fn new(session: Arc<ConversationSession>) -> Self {
        Self {
            session,
            tool_router: Self::tool_router(),
        }
    }
}

fn session_key(session_id: Option<String>) -> String {
    session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
}

#[tool_router]
impl RulebookServer {
    #[tool(description = "Search NBA rules by keywords or a plain-language question. Returns rules best match first.")]
    async fn search_rules(
        &self,
        Parameters(params): Parameters<SearchRulesParams>,
    ) -> Result<Json<SearchRulesResponse>, String> {
        let matches = self
            .session
            .matcher()
            .search(&params.query, self.session.corpus());

        let limit = params
            .limit
            .map_or(matches.len(), |l| (l as usize).min(matches.len()));

        let results = matches
            .iter()
            .take(limit)
            .map(|m| m.rule.as_ref().clone())
            .collect();

        Ok(Json(SearchRulesResponse { results }))
    }

    #[tool(description = "Get an NBA rule by id (e.g. 'rule-001').")]
    async fn get_rule(
        &self,
        Parameters(params): Parameters<GetRuleParams>,
    ) -> Result<Json<Rule>, String> {
        let rule = self
            .session
            .corpus()
            .get_by_id(params.rule_id.trim())
            .map_err(|e| e.to_string())?;
        Ok(Json(rule.as_ref().clone()))
    }

    #[tool(description = "List the rule categories (e.g. 'Violations', 'Timing').")]
    async fn list_categories(&self) -> Result<Json<CategoriesResponse>, String> {
        Ok(Json(CategoriesResponse {
            categories: self.session.corpus().list_categories().to_vec(),
        }))
    }

    #[tool(description = "List every rule in a category. Category matching ignores case.")]
    async fn list_category(
        &self,
        Parameters(params): Parameters<ListCategoryParams>,
    ) -> Result<Json<CategoryRulesResponse>, String> {
        let category = params.category.trim().to_string();
        if category.is_empty() {
            return Err("category must not be empty".to_string());
        }

        let rules = self
            .session
            .corpus()
            .list_by_category(&category)
            .iter()
            .map(|r| r.as_ref().clone())
            .collect();

        Ok(Json(CategoryRulesResponse { category, rules }))
    }

    #[tool(description = "Ask a question about the NBA rulebook. Answers from the matching rule and cites the rules used.")]
    async fn ask_rulebook(
        &self,
        Parameters(params): Parameters<AskRulebookParams>,
    ) -> Result<Json<ChatResponse>, String> {
        let session_id = session_key(params.session_id);
        let handled = self
            .session
            .handle_message(&session_id, &params.question)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(handled.response))
    }

    #[tool(description = "Forget the conversation history of a session.")]
    async fn clear_history(
        &self,
        Parameters(params): Parameters<ClearHistoryParams>,
    ) -> Result<Json<ClearHistoryResponse>, String> {
        let session_id = session_key(params.session_id);
        info!(session_id = %session_id, "clear_history tool invoked");
        self.session
            .clear_history(&session_id)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Json(ClearHistoryResponse::cleared()))
    }
}

#[tool_handler]
impl ServerHandler for RulebookServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "rulebook".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "NBA rulebook MCP server. Use ask_rulebook for plain-language questions \
                 (answers carry rule citations), search_rules to see which rules match a query, \
                 get_rule for a specific id, and list_categories/list_category to browse."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::session::tests::session_with;

    fn server() -> RulebookServer {
        RulebookServer::new(Arc::new(session_with(Arc::new(MemoryHistory::default()))))
    }

    #[test]
    fn tools_publish_output_schemas() {
        let tools = RulebookServer::tool_router().list_all();
        for name in [
            "search_rules",
            "get_rule",
            "list_categories",
            "list_category",
            "ask_rulebook",
            "clear_history",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }

    #[tokio::test]
    async fn search_rules_honors_limit() {
        let server = server();
        let Json(all) = server
            .search_rules(Parameters(SearchRulesParams {
                query: "basket".to_string(),
                limit: None,
            }))
            .await
            .unwrap();
        assert_eq!(all.results.len(), 2);

        let Json(one) = server
            .search_rules(Parameters(SearchRulesParams {
                query: "basket".to_string(),
                limit: Some(1),
            }))
            .await
            .unwrap();
        assert_eq!(one.results.len(), 1);
        assert_eq!(one.results[0].id, all.results[0].id);
    }

    #[tokio::test]
    async fn get_rule_reports_missing_id() {
        let server = server();
        let Json(rule) = server
            .get_rule(Parameters(GetRuleParams {
                rule_id: " 2 ".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(rule.title, "Shot Clock");

        let err = server
            .get_rule(Parameters(GetRuleParams {
                rule_id: "99".to_string(),
            }))
            .await
            .err()
            .expect("unknown id should fail");
        assert!(err.contains("not found"));
    }

    #[tokio::test]
    async fn ask_then_clear_uses_one_session() {
        let server = server();
        let Json(answer) = server
            .ask_rulebook(Parameters(AskRulebookParams {
                question: "What is goaltending?".to_string(),
                session_id: Some("mcp".to_string()),
            }))
            .await
            .unwrap();
        assert!(answer.message.starts_with("Goaltending: "));
        assert_eq!(server.session.get_history("mcp", 10).await.unwrap().len(), 2);

        server
            .clear_history(Parameters(ClearHistoryParams {
                session_id: Some("mcp".to_string()),
            }))
            .await
            .unwrap();
        assert!(server.session.get_history("mcp", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ask_rejects_blank_question() {
        let err = server()
            .ask_rulebook(Parameters(AskRulebookParams {
                question: "  ".to_string(),
                session_id: None,
            }))
            .await
            .err()
            .expect("blank question should fail");
        assert!(err.contains("invalid argument"));
    }

    #[tokio::test]
    async fn category_tools() {
        let server = server();
        let Json(categories) = server.list_categories().await.unwrap();
        assert_eq!(categories.categories[0], "Violations");

        let Json(listed) = server
            .list_category(Parameters(ListCategoryParams {
                category: "TIMING".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(listed.rules.len(), 1);
        assert_eq!(listed.rules[0].id, "2");
    }
}
