use std::collections::HashMap;

use crate::model::ScoredCandidate;

/// Admissible candidates of one unit, best first, one entry per candidate id.
///
/// Entries below `min_score` are dropped. Repeated candidate ids keep their
/// highest-scoring occurrence. Ties on score order by candidate id ascending.
pub fn rank_admissible(scored: Vec<ScoredCandidate>, min_score: f64) -> Vec<ScoredCandidate> {
    let mut best = HashMap::<String, ScoredCandidate>::new();

    for entry in scored {
        if !entry.score.is_finite() || entry.score < min_score {
            continue;
        }

        match best.get_mut(entry.candidate_id()) {
            Some(existing) if entry.score > existing.score => *existing = entry,
            Some(_) => {}
            None => {
                best.insert(entry.candidate_id().to_string(), entry);
            }
        }
    }

    let mut ranked = best.into_values().collect::<Vec<ScoredCandidate>>();
    sort_ranked(&mut ranked);
    ranked
}

/// Shortlist of at most `top_k` admissible candidates.
pub fn select(scored: Vec<ScoredCandidate>, min_score: f64, top_k: usize) -> Vec<ScoredCandidate> {
    let mut ranked = rank_admissible(scored, min_score);
    ranked.truncate(top_k);
    ranked
}

fn sort_ranked(entries: &mut [ScoredCandidate]) {
    entries.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then_with(|| left.candidate_id().cmp(right.candidate_id()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Candidate;

    fn scored(candidate_id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate::new(candidate_id, format!("descriptor {candidate_id}")),
            score,
            source_unit_id: "u1".to_string(),
        }
    }

    fn ids(entries: &[ScoredCandidate]) -> Vec<&str> {
        entries.iter().map(ScoredCandidate::candidate_id).collect()
    }

    #[test]
    fn select_filters_sorts_and_truncates() {
        let result = select(
            vec![
                scored("c1", 0.45),
                scored("c2", 0.91),
                scored("c3", 0.20),
                scored("c4", 0.60),
                scored("c5", 0.70),
            ],
            0.5,
            2,
        );
        assert_eq!(ids(&result), vec!["c2", "c5"]);
    }

    #[test]
    fn ties_break_by_candidate_id_ascending() {
        let result = select(
            vec![scored("c9", 0.8), scored("c1", 0.8), scored("c5", 0.8)],
            0.0,
            3,
        );
        assert_eq!(ids(&result), vec!["c1", "c5", "c9"]);
    }

    #[test]
    fn repeated_candidates_collapse_to_highest_score() {
        let result = select(
            vec![scored("c1", 0.55), scored("c2", 0.6), scored("c1", 0.9)],
            0.5,
            5,
        );
        assert_eq!(ids(&result), vec!["c1", "c2"]);
        assert_eq!(result[0].score, 0.9);
    }

    #[test]
    fn score_equal_to_min_score_is_admitted() {
        let result = select(vec![scored("c1", 0.5)], 0.5, 1);
        assert_eq!(ids(&result), vec!["c1"]);
    }

    #[test]
    fn nothing_above_threshold_yields_empty_shortlist() {
        assert!(select(vec![scored("c1", 0.3)], 0.5, 3).is_empty());
        assert!(select(Vec::new(), 0.5, 3).is_empty());
    }

    #[test]
    fn rank_admissible_keeps_the_full_tail() {
        let ranked = rank_admissible(
            vec![scored("c1", 0.9), scored("c2", 0.8), scored("c3", 0.7)],
            0.5,
        );
        assert_eq!(ids(&ranked), vec!["c1", "c2", "c3"]);
    }
}
