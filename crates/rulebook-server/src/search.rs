/// Weighted keyword matcher over the rule corpus.
///
/// Every rule is scored field by field. A field whose lowercased text contains the whole
/// normalized query earns its full weight; otherwise it earns
/// `weight * (distinct query terms found in the field) / (distinct query terms)`.
/// Rules scoring zero are dropped, the rest are ranked by score with corpus order
/// breaking ties, and the top `limit` are returned.
///
/// Query terms are the normalized tokens minus a short stop-word list. Words like "what",
/// "is", "rule" or "violation" occur in a large share of entries (every section label
/// starts with "Rule", half the titles and categories name a violation), so counting them
/// would let the generic word outrank the topic of the question.
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::corpus::RuleCorpus;
use crate::model::{Field, Match, Rule};

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Normalized queries shorter than this return no matches.
const MIN_QUERY_CHARS: usize = 3;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’-][\p{L}\p{N}]+)*").expect("valid regex")
});

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "could", "did", "do",
    "does", "explain", "for", "from", "how", "i", "if", "in", "is", "it", "its", "me", "my",
    "nba", "of", "on", "or", "rule", "rules", "tell", "that", "the", "this", "to", "was",
    "violation", "violations", "what", "when", "where", "which", "who", "why", "will", "with",
    "would", "you", "your",
];

/// Per-field weights. Title outranks content, and both outrank category and section.
#[derive(Debug, Clone, Copy)]
pub struct FieldWeights {
    pub title: f64,
    pub content: f64,
    pub category: f64,
    pub section: f64,
    /// Only applied when example search is enabled.
    pub examples: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title: 10.0,
            content: 5.0,
            category: 3.0,
            section: 3.0,
            examples: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NormalizedQuery {
    /// All tokens joined by single spaces; used for whole-query containment.
    phrase: String,
    /// Distinct non-stop-word tokens in first-occurrence order.
    terms: Vec<String>,
}

impl NormalizedQuery {
    fn parse(query: &str) -> Option<Self> {
        let lowered = query.trim().to_lowercase();
        let tokens: Vec<&str> = TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
        let phrase = tokens.join(" ");
        if phrase.chars().count() < MIN_QUERY_CHARS {
            return None;
        }

        let mut terms: Vec<String> = Vec::new();
        for token in tokens {
            if STOP_WORDS.contains(&token) || terms.iter().any(|t| t == token) {
                continue;
            }
            terms.push(token.to_string());
        }
        Some(Self { phrase, terms })
    }

    fn field_score(&self, text: &str, weight: f64) -> f64 {
        let haystack = text.to_lowercase();
        if haystack.contains(&self.phrase) {
            return weight;
        }
        if self.terms.is_empty() {
            return 0.0;
        }
        let found = self
            .terms
            .iter()
            .filter(|t| haystack.contains(t.as_str()))
            .count();
        weight * found as f64 / self.terms.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct RuleMatcher {
    weights: FieldWeights,
    limit: usize,
    search_examples: bool,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_LIMIT, false)
    }
}

impl RuleMatcher {
    pub fn new(limit: usize, search_examples: bool) -> Self {
        Self {
            weights: FieldWeights::default(),
            limit,
            search_examples,
        }
    }

    /// Rank corpus entries against `query`, best first.
    ///
    /// Blank queries and queries under three characters after normalization return an
    /// empty list rather than an error.
    pub fn search(&self, query: &str, corpus: &RuleCorpus) -> Vec<Match> {
        let Some(query) = NormalizedQuery::parse(query) else {
            return Vec::new();
        };

        let mut matches: Vec<Match> = corpus
            .all()
            .iter()
            .filter_map(|rule| {
                let (score, matched_fields) = self.score_rule(&query, rule);
                (score > 0.0).then(|| Match {
                    rule: rule.clone(),
                    score,
                    matched_fields,
                })
            })
            .collect();

        // sort_by is stable, so equal scores keep corpus order.
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(self.limit);

        debug!(
            query = %query.phrase,
            terms = query.terms.len(),
            matches = matches.len(),
            top_fields = ?matches.first().map(|m| &m.matched_fields),
            "rule search complete"
        );
        matches
    }

    fn score_rule(&self, query: &NormalizedQuery, rule: &Rule) -> (f64, Vec<Field>) {
        let w = &self.weights;
        let mut contributions = vec![
            (Field::Title, query.field_score(&rule.title, w.title)),
            (Field::Content, query.field_score(&rule.content, w.content)),
            (Field::Category, query.field_score(&rule.category, w.category)),
            (Field::Section, query.field_score(&rule.section, w.section)),
        ];
        if self.search_examples && !rule.examples.is_empty() {
            let examples = rule.examples.join("\n");
            contributions.push((Field::Examples, query.field_score(&examples, w.examples)));
        }

        let score: f64 = contributions.iter().map(|(_, s)| s).sum();
        let fields = contributions
            .into_iter()
            .filter(|(_, s)| *s > 0.0)
            .map(|(f, _)| f)
            .collect();
        (score, fields)
    }
}
