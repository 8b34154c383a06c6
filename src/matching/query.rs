use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;

use crate::model::TextUnit;
use crate::semantic::normalize_whitespace;

const MAX_FALLBACK_QUERY_CHARS: usize = 500;

const STOP_WORDS: &[&str] = &[
    "the", "and", "of", "to", "a", "in", "is", "on", "for", "with", "by", "as", "that", "this",
    "from", "an", "or", "at", "be", "are", "it", "we", "was", "were", "but", "about", "into",
    "over", "without", "iii", "ii", "iv", "i", "figure", "chapter", "introduction", "section",
    "subsection", "system", "systems",
];

/// Keyword query extraction for candidate retrieval.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    word_pattern: Regex,
    stop_words: HashSet<&'static str>,
    max_terms: usize,
}

impl QueryBuilder {
    pub fn new(max_terms: usize) -> Result<Self> {
        let word_pattern =
            Regex::new(r"[A-Za-z]+").context("failed to compile query word regex")?;

        Ok(Self {
            word_pattern,
            stop_words: STOP_WORDS.iter().copied().collect(),
            max_terms: max_terms.max(1),
        })
    }

    /// First `max_terms` distinct keywords of `text`, in order of appearance.
    pub fn build_query(&self, text: &str) -> String {
        let mut seen = HashSet::<String>::new();
        let mut terms = Vec::<&str>::new();

        for word in self.word_pattern.find_iter(text).map(|found| found.as_str()) {
            if word.len() <= 2 {
                continue;
            }
            let lowered = word.to_ascii_lowercase();
            if self.stop_words.contains(lowered.as_str()) {
                continue;
            }
            if seen.insert(lowered) {
                terms.push(word);
                if terms.len() >= self.max_terms {
                    break;
                }
            }
        }

        if terms.is_empty() {
            return normalize_whitespace(text)
                .chars()
                .take(MAX_FALLBACK_QUERY_CHARS)
                .collect();
        }

        terms.join(" ")
    }

    /// Queries used to retrieve a unit's candidate pool.
    pub fn queries_for(&self, unit: &TextUnit) -> Vec<String> {
        let explicit = unit
            .queries
            .iter()
            .map(|query| normalize_whitespace(query))
            .filter(|query| !query.is_empty())
            .collect::<Vec<String>>();

        if explicit.is_empty() {
            vec![self.build_query(&unit.content)]
        } else {
            explicit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_query_drops_stop_words_and_short_words() {
        let builder = QueryBuilder::new(6).expect("builder");
        let query = builder.build_query("The tumor is shown in Figure 3 of the pathology slide");
        assert_eq!(query, "tumor shown pathology slide");
    }

    #[test]
    fn build_query_deduplicates_case_insensitively_and_caps_terms() {
        let builder = QueryBuilder::new(3).expect("builder");
        let query = builder.build_query("Tumor tumor TUMOR cells divide rapidly near vessels");
        assert_eq!(query, "Tumor cells divide");
    }

    #[test]
    fn build_query_falls_back_to_normalized_text() {
        let builder = QueryBuilder::new(6).expect("builder");
        assert_eq!(builder.build_query("  of  the 42 "), "of the 42");
    }

    #[test]
    fn explicit_queries_take_precedence() {
        let builder = QueryBuilder::new(6).expect("builder");
        let mut unit = TextUnit::new("u1", "tumor microscopy slide");
        assert_eq!(builder.queries_for(&unit), vec!["tumor microscopy slide"]);

        unit.queries = vec!["  tumor   histology ".to_string(), " ".to_string()];
        assert_eq!(builder.queries_for(&unit), vec!["tumor histology"]);
    }
}
