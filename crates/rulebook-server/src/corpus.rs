/// The immutable, in-memory rule corpus.
///
/// Loaded once at startup from the embedded dataset or a JSON file, validated, and shared
/// read-only for the life of the process. Iteration order is load order; the matcher's
/// tie-break depends on it.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::error::AppError;
use crate::model::Rule;

const EMBEDDED_RULES: &str = include_str!("../data/rules.json");

#[derive(Debug)]
pub struct RuleCorpus {
    rules: Vec<Arc<Rule>>,
    by_id: HashMap<String, usize>,
    /// Distinct categories in order of first occurrence.
    categories: Vec<String>,
}

impl RuleCorpus {
    /// Validate and index `entries`.
    ///
    /// Fails with `Validation` on a duplicate id or an empty required field. Categories
    /// are deduplicated case-insensitively, keeping the first spelling seen.
    pub fn load(entries: Vec<Rule>) -> Result<Self, AppError> {
        let mut rules = Vec::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut categories = Vec::new();
        let mut seen_categories = HashSet::new();

        for (index, rule) in entries.into_iter().enumerate() {
            validate(index, &rule)?;

            if by_id.insert(rule.id.clone(), index).is_some() {
                return Err(AppError::Validation(format!("duplicate rule id '{}'", rule.id)));
            }
            if seen_categories.insert(rule.category.to_lowercase()) {
                categories.push(rule.category.clone());
            }
            rules.push(Arc::new(rule));
        }

        Ok(Self {
            rules,
            by_id,
            categories,
        })
    }

    /// Parse a JSON array of rules and load it.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let entries: Vec<Rule> = serde_json::from_str(json)
            .map_err(|e| AppError::Validation(format!("corpus is not a valid rule array: {e}")))?;
        Self::load(entries)
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::Validation(format!("cannot read corpus file {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// The dataset compiled into the binary.
    pub fn embedded() -> Result<Self, AppError> {
        Self::from_json(EMBEDDED_RULES)
    }

    pub fn get_by_id(&self, id: &str) -> Result<&Arc<Rule>, AppError> {
        self.by_id
            .get(id)
            .map(|&i| &self.rules[i])
            .ok_or_else(|| AppError::NotFound(format!("rule '{id}'")))
    }

    pub fn list_categories(&self) -> &[String] {
        &self.categories
    }

    /// Rules whose category equals `category`, ignoring case. No match is an empty list.
    pub fn list_by_category(&self, category: &str) -> Vec<Arc<Rule>> {
        let wanted = category.trim().to_lowercase();
        self.rules
            .iter()
            .filter(|r| r.category.to_lowercase() == wanted)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

fn validate(index: usize, rule: &Rule) -> Result<(), AppError> {
    let required = [
        ("id", &rule.id),
        ("title", &rule.title),
        ("category", &rule.category),
        ("section", &rule.section),
        ("content", &rule.content),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            let who = if rule.id.trim().is_empty() {
                format!("entry #{index}")
            } else {
                format!("rule '{}'", rule.id)
            };
            return Err(AppError::Validation(format!("{who} has an empty {name}")));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn rule(id: &str, title: &str, category: &str, section: &str, content: &str) -> Rule {
        Rule {
            id: id.to_string(),
            title: title.to_string(),
            category: category.to_string(),
            section: section.to_string(),
            content: content.to_string(),
            examples: vec![],
        }
    }

    /// Five-rule corpus used across the unit tests.
    pub fn corpus() -> RuleCorpus {
        let mut traveling = rule(
            "1",
            "Traveling",
            "Violations",
            "Rule 10, Section XIII",
            "A player who receives the ball while standing still may pivot, using either foot as the pivot foot. \
             A player who gathers the ball while progressing may take two steps in coming to a stop, passing or shooting the ball. \
             A player who receives the ball while he is progressing must release the ball to start his dribble before his second step.",
        );
        traveling.examples = vec![
            "A player takes three steps after gathering the ball without dribbling.".to_string(),
            "A player establishes a pivot foot, then lifts it and returns it to the floor before passing.".to_string(),
        ];

        let shot_clock = rule(
            "2",
            "Shot Clock",
            "Timing",
            "Rule 7, Section II",
            "The shot clock shall be 24 seconds in length with a 14-second reset when the ball hits the rim \
             and the offensive team retains possession. Teams must attempt a field goal before the shot clock expires.",
        );

        let goaltending = rule(
            "3",
            "Goaltending",
            "Violations",
            "Rule 11, Section I",
            "Goaltending occurs when a player touches the ball during a field goal attempt while it's on its downward flight, \
             entirely above the rim level, and has a chance to enter the basket. This results in the offensive team being \
             awarded the points for the attempted shot.",
        );

        let court = rule(
            "4",
            "Court Dimensions",
            "Court",
            "Rule 1, Section I",
            "The playing court shall be 94 feet in length by 50 feet in width. The three-point field goal line shall be \
             a distance of 23 feet 9 inches from the center of the basket except in the corners where it is 22 feet.",
        );

        let fouls = rule(
            "5",
            "Fouls",
            "Fouls and Penalties",
            "Rule 12, Section I",
            "A personal foul is illegal physical contact which occurs with an opponent after the ball has become live. \
             A player shall not hold, push, charge into, or impede the progress of an opponent.",
        );

        RuleCorpus::load(vec![traveling, shot_clock, goaltending, court, fouls])
            .expect("fixture corpus is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{corpus, rule};
    use super::*;

    #[test]
    fn embedded_dataset_loads() {
        let corpus = RuleCorpus::embedded().unwrap();
        assert_eq!(corpus.len(), 10);
        assert_eq!(corpus.get_by_id("rule-001").unwrap().title, "Traveling");
        assert_eq!(
            corpus.list_categories(),
            ["Violations", "Timing", "Equipment", "Fouls"]
        );
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let entries = vec![
            rule("a", "One", "Cat", "Rule 1", "text"),
            rule("a", "Two", "Cat", "Rule 2", "text"),
        ];
        let err = RuleCorpus::load(entries).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn empty_required_field_is_rejected() {
        for blank in ["id", "title", "category", "section", "content"] {
            let mut r = rule("a", "One", "Cat", "Rule 1", "text");
            match blank {
                "id" => r.id = "  ".to_string(),
                "title" => r.title.clear(),
                "category" => r.category.clear(),
                "section" => r.section = "\t".to_string(),
                _ => r.content.clear(),
            }
            let err = RuleCorpus::load(vec![r]).unwrap_err();
            assert!(
                matches!(err, AppError::Validation(ref m) if m.contains(blank)),
                "blank {blank} should fail validation, got {err}"
            );
        }
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(matches!(
            RuleCorpus::from_json("{\"not\": \"an array\"}"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            RuleCorpus::from_json("[{\"id\": \"x\"}]"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn examples_are_optional_in_json() {
        let corpus = RuleCorpus::from_json(
            r#"[{"id":"x","title":"T","category":"C","section":"S","content":"body"}]"#,
        )
        .unwrap();
        assert!(corpus.get_by_id("x").unwrap().examples.is_empty());
    }

    #[test]
    fn missing_id_is_not_found() {
        let corpus = RuleCorpus::embedded().unwrap();
        assert!(matches!(corpus.get_by_id("rule-999"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn category_listing_is_case_insensitive() {
        let corpus = corpus();
        let listed = corpus.list_by_category("violations");
        let ids: Vec<&str> = listed
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, ["1", "3"]);
        assert_eq!(corpus.list_by_category("VIOLATIONS").len(), 2);
        assert!(corpus.list_by_category("Scoring").is_empty());
    }

    #[test]
    fn categories_keep_first_occurrence_order() {
        let corpus = RuleCorpus::load(vec![
            rule("a", "A", "Timing", "S", "c"),
            rule("b", "B", "violations", "S", "c"),
            rule("c", "C", "Violations", "S", "c"),
            rule("d", "D", "Timing", "S", "c"),
        ])
        .unwrap();
        assert_eq!(corpus.list_categories(), ["Timing", "violations"]);
    }

    #[test]
    fn all_preserves_load_order() {
        let ids: Vec<String> = corpus().all().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn from_path_reads_file() {
        let path = std::env::temp_dir().join(format!("rulebook-corpus-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"id":"x","title":"T","category":"C","section":"S","content":"body","examples":["e"]}]"#,
        )
        .unwrap();
        let corpus = RuleCorpus::from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(corpus.len(), 1);

        let missing = std::env::temp_dir().join("rulebook-corpus-does-not-exist.json");
        assert!(matches!(RuleCorpus::from_path(&missing), Err(AppError::Validation(_))));
    }
}
