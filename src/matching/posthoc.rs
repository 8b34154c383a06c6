use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use super::config::PosthocConfig;
use crate::model::Assignment;

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub candidate_id: String,
    pub kept_unit_id: String,
    pub kept_score: Option<f64>,
    pub removed_unit_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PosthocReport {
    pub rank_threshold: usize,
    pub dedup_applied: bool,
    pub rows_in: usize,
    pub removed_by_rank: usize,
    pub removed_by_dedup: usize,
    pub rows_out: usize,
    pub retention_rate: f64,
    pub duplicate_groups: Vec<DuplicateGroup>,
    /// Units that had at least one real assignment before filtering and none after.
    pub emptied_units: Vec<String>,
    pub rank_distribution_before: BTreeMap<usize, usize>,
    pub rank_distribution_after: BTreeMap<usize, usize>,
}

#[derive(Debug, Clone)]
pub struct PosthocOutcome {
    pub rows: Vec<Assignment>,
    /// Rows dropped by the rank filter, in table order.
    pub low_rank: Vec<Assignment>,
    pub report: PosthocReport,
}

/// Rank filter, then one row per candidate, using each row's own specificity.
pub fn apply_posthoc_filter(rows: Vec<Assignment>, config: &PosthocConfig) -> PosthocOutcome {
    apply_posthoc_filter_with(rows, config, |row| row.specificity)
}

/// Rank filter first so low-rank rows cannot win a dedup tie, then per-candidate
/// dedup by `(score desc, specificity desc, table order)`. Sentinel rows pass
/// through untouched and surviving rows keep their original order and ranks.
/// A unit whose last real row is removed gets a `no_match` row in its place.
pub fn apply_posthoc_filter_with<F>(
    rows: Vec<Assignment>,
    config: &PosthocConfig,
    specificity: F,
) -> PosthocOutcome
where
    F: Fn(&Assignment) -> i64,
{
    let rows_in = rows.len();
    let units_before = units_with_matches(rows.iter());
    let rank_distribution_before = rank_distribution(&rows);

    let threshold = config.rank_threshold;
    let within_rank = rows
        .iter()
        .map(|row| row.is_sentinel() || row.rank.is_none_or(|rank| rank <= threshold))
        .collect::<Vec<bool>>();
    let removed_by_rank = within_rank.iter().filter(|kept| !**kept).count();

    let mut keep = within_rank.clone();
    let duplicate_groups = if config.dedup {
        keep_best_per_candidate(&rows, &mut keep, &specificity)
    } else {
        Vec::new()
    };
    let removed_by_dedup = keep.iter().filter(|kept| !**kept).count() - removed_by_rank;

    let units_after = units_with_matches(
        rows.iter()
            .zip(&keep)
            .filter(|(_, kept)| **kept)
            .map(|(row, _)| row),
    );
    let emptied = units_before
        .difference(&units_after)
        .cloned()
        .collect::<BTreeSet<String>>();
    for unit_id in &emptied {
        warn!(unit_id = %unit_id, "unit lost all assignments after filtering");
    }

    let mut kept_rows = Vec::<Assignment>::with_capacity(rows_in);
    let mut low_rank = Vec::<Assignment>::new();
    let mut placed = HashSet::<String>::new();
    for ((row, kept), in_rank) in rows.into_iter().zip(keep).zip(within_rank) {
        if kept {
            kept_rows.push(row);
            continue;
        }
        if emptied.contains(&row.unit_id) && placed.insert(row.unit_id.clone()) {
            kept_rows.push(Assignment::emptied(&row));
        }
        if !in_rank {
            low_rank.push(row);
        }
    }

    let rows_out = kept_rows.len();
    let retention_rate = if rows_in == 0 {
        1.0
    } else {
        rows_out as f64 / rows_in as f64
    };

    info!(
        rows_in,
        removed_by_rank,
        removed_by_dedup,
        rows_out,
        emptied_units = emptied.len(),
        "post-hoc filter completed"
    );

    let report = PosthocReport {
        rank_threshold: threshold,
        dedup_applied: config.dedup,
        rows_in,
        removed_by_rank,
        removed_by_dedup,
        rows_out,
        retention_rate,
        duplicate_groups,
        emptied_units: emptied.into_iter().collect(),
        rank_distribution_before,
        rank_distribution_after: rank_distribution(&kept_rows),
    };

    PosthocOutcome {
        rows: kept_rows,
        low_rank,
        report,
    }
}

/// Candidates assigned to more than one distinct unit, with those units in table order.
pub fn cross_unit_duplicates(rows: &[Assignment]) -> BTreeMap<String, Vec<String>> {
    let mut owners = BTreeMap::<String, Vec<String>>::new();
    for row in rows {
        if let Some(candidate_id) = row.candidate_id.as_deref() {
            let units = owners.entry(candidate_id.to_string()).or_default();
            if !units.contains(&row.unit_id) {
                units.push(row.unit_id.clone());
            }
        }
    }
    owners.retain(|_, units| units.len() > 1);
    owners
}

/// Clears `keep` for every row that loses its candidate to a better row.
fn keep_best_per_candidate<F>(
    rows: &[Assignment],
    keep: &mut [bool],
    specificity: &F,
) -> Vec<DuplicateGroup>
where
    F: Fn(&Assignment) -> i64,
{
    let mut groups = HashMap::<&str, Vec<usize>>::new();
    let mut group_order = Vec::<&str>::new();
    for (index, row) in rows.iter().enumerate() {
        if !keep[index] {
            continue;
        }
        if let Some(candidate_id) = row.candidate_id.as_deref() {
            let members = groups.entry(candidate_id).or_default();
            if members.is_empty() {
                group_order.push(candidate_id);
            }
            members.push(index);
        }
    }

    let mut duplicate_groups = Vec::<DuplicateGroup>::new();
    for candidate_id in group_order {
        let members = &groups[candidate_id];
        if members.len() < 2 {
            continue;
        }

        let mut ordered = members.clone();
        ordered.sort_by(|left, right| {
            compare_rows(&rows[*left], &rows[*right], specificity).then(left.cmp(right))
        });

        let winner = &rows[ordered[0]];
        duplicate_groups.push(DuplicateGroup {
            candidate_id: candidate_id.to_string(),
            kept_unit_id: winner.unit_id.clone(),
            kept_score: winner.score,
            removed_unit_ids: ordered[1..]
                .iter()
                .map(|index| rows[*index].unit_id.clone())
                .collect(),
        });
        for index in &ordered[1..] {
            keep[*index] = false;
        }
    }

    duplicate_groups
}

fn compare_rows<F>(left: &Assignment, right: &Assignment, specificity: &F) -> Ordering
where
    F: Fn(&Assignment) -> i64,
{
    let left_score = left.score.unwrap_or(f64::NEG_INFINITY);
    let right_score = right.score.unwrap_or(f64::NEG_INFINITY);
    right_score
        .total_cmp(&left_score)
        .then_with(|| specificity(right).cmp(&specificity(left)))
}

fn units_with_matches<'a>(rows: impl Iterator<Item = &'a Assignment>) -> BTreeSet<String> {
    rows.filter(|row| !row.is_sentinel())
        .map(|row| row.unit_id.clone())
        .collect()
}

fn rank_distribution(rows: &[Assignment]) -> BTreeMap<usize, usize> {
    let mut distribution = BTreeMap::<usize, usize>::new();
    for rank in rows.iter().filter_map(|row| row.rank) {
        *distribution.entry(rank).or_default() += 1;
    }
    distribution
}
