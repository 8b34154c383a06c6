use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::semantic::{descriptor_text, normalize_whitespace};

/// Opaque pass-through fields carried from a candidate onto its assignments.
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    pub unit_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specificity: Option<i64>,
}

#[cfg(test)]
impl TextUnit {
    pub fn new(unit_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            content: content.into(),
            queries: Vec::new(),
            specificity: None,
        }
    }
}

impl TextUnit {
    /// Explicit specificity, or the nesting depth of the unit id (`14.2.1` is 3).
    pub fn resolved_specificity(&self) -> i64 {
        self.specificity.unwrap_or_else(|| {
            self.unit_id
                .split(['.', '_', ':', '/', '-'])
                .filter(|segment| !segment.trim().is_empty())
                .count() as i64
        })
    }
}

/// Candidate record as produced by a retrieval collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandidate {
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub credit: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub urls: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub candidate_id: String,
    pub descriptor_text: String,
    pub metadata: Metadata,
    pub embedding: Option<Vec<f32>>,
}

impl Candidate {
    pub fn new(candidate_id: impl Into<String>, descriptor_text: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            descriptor_text: descriptor_text.into(),
            metadata: Metadata::new(),
            embedding: None,
        }
    }
}

impl From<RawCandidate> for Candidate {
    fn from(raw: RawCandidate) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in [
            ("title", &raw.title),
            ("description", &raw.description),
            ("credit", &raw.credit),
            ("license", &raw.license),
        ] {
            let value = normalize_whitespace(value);
            if !value.is_empty() {
                metadata.insert(key.to_string(), value);
            }
        }
        for (key, url) in raw.urls {
            metadata.insert(key, url);
        }
        for (key, value) in raw.extra {
            let value = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            metadata.entry(key).or_insert(value);
        }

        let mut candidate = Self::new(
            raw.identifier.trim(),
            descriptor_text(&raw.title, &raw.description, &raw.credit),
        );
        candidate.metadata = metadata;
        candidate.embedding = raw.embedding;
        candidate
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub source_unit_id: String,
}

impl ScoredCandidate {
    pub fn candidate_id(&self) -> &str {
        &self.candidate.candidate_id
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Matched,
    NoMatch,
    Failed,
}

impl AssignmentOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::NoMatch => "no_match",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub unit_id: String,
    pub outcome: AssignmentOutcome,
    pub candidate_id: Option<String>,
    pub rank: Option<usize>,
    pub score: Option<f64>,
    #[serde(default)]
    pub specificity: i64,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub candidate_count: usize,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Assignment {
    pub fn matched(
        unit: &TextUnit,
        scored: &ScoredCandidate,
        rank: usize,
        query: &str,
        candidate_count: usize,
    ) -> Self {
        Self {
            unit_id: unit.unit_id.clone(),
            outcome: AssignmentOutcome::Matched,
            candidate_id: Some(scored.candidate.candidate_id.clone()),
            rank: Some(rank),
            score: Some(scored.score),
            specificity: unit.resolved_specificity(),
            query: query.to_string(),
            candidate_count,
            metadata: scored.candidate.metadata.clone(),
        }
    }

    /// Placeholder row for a unit without an accepted candidate.
    pub fn sentinel(
        unit: &TextUnit,
        outcome: AssignmentOutcome,
        query: &str,
        candidate_count: usize,
    ) -> Self {
        Self {
            unit_id: unit.unit_id.clone(),
            outcome,
            candidate_id: None,
            rank: None,
            score: None,
            specificity: unit.resolved_specificity(),
            query: query.to_string(),
            candidate_count,
            metadata: Metadata::new(),
        }
    }

    /// `no_match` row standing in for a unit whose rows were all filtered out.
    pub fn emptied(removed: &Assignment) -> Self {
        Self {
            unit_id: removed.unit_id.clone(),
            outcome: AssignmentOutcome::NoMatch,
            candidate_id: None,
            rank: None,
            score: None,
            specificity: removed.specificity,
            query: removed.query.clone(),
            candidate_count: removed.candidate_count,
            metadata: Metadata::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.candidate_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_candidate_flattens_metadata_and_builds_descriptor() {
        let raw = r#"
        {
          "identifier": " 2471 ",
          "title": "Tumor histology",
          "description": "Stained   micrograph",
          "credit": "NCI",
          "license": "Public Domain",
          "urls": {"detail_url": "https://example.org/2471"},
          "creator": "Unknown",
          "width": 640,
          "source": null
        }
        "#;

        let raw: RawCandidate = serde_json::from_str(raw).expect("raw candidate should parse");
        let candidate = Candidate::from(raw);

        assert_eq!(candidate.candidate_id, "2471");
        assert_eq!(
            candidate.descriptor_text,
            "Tumor histology Stained micrograph NCI"
        );
        assert_eq!(candidate.metadata["license"], "Public Domain");
        assert_eq!(candidate.metadata["detail_url"], "https://example.org/2471");
        assert_eq!(candidate.metadata["creator"], "Unknown");
        assert_eq!(candidate.metadata["width"], "640");
        assert!(!candidate.metadata.contains_key("source"));
        assert!(candidate.embedding.is_none());
    }

    #[test]
    fn specificity_defaults_to_unit_id_depth() {
        assert_eq!(TextUnit::new("14.2.1", "text").resolved_specificity(), 3);
        assert_eq!(TextUnit::new("14_2", "text").resolved_specificity(), 2);

        let mut unit = TextUnit::new("14", "text");
        unit.specificity = Some(7);
        assert_eq!(unit.resolved_specificity(), 7);
    }

    #[test]
    fn sentinel_rows_have_no_candidate_rank_or_score() {
        let unit = TextUnit::new("u1", "text");
        let row = Assignment::sentinel(&unit, AssignmentOutcome::NoMatch, "tumor", 4);
        assert!(row.is_sentinel());
        assert_eq!(row.rank, None);
        assert_eq!(row.score, None);
        assert_eq!(row.outcome.as_str(), "no_match");
    }
}
