//! Thresholding scores and removing contaminant features from a table.

use crate::config::Threshold;
use crate::data::{CountMatrix, ScoreTable};
use crate::error::{DecontamError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Classification of one scored feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDecision {
    pub feature_id: String,
    pub p: f64,
    /// `p <= threshold`.
    pub contaminant: bool,
}

/// Classify every entry of a score table.
pub fn classify(scores: &ScoreTable, threshold: Threshold) -> Vec<ThresholdDecision> {
    scores
        .iter()
        .map(|entry| ThresholdDecision {
            feature_id: entry.feature_id.clone(),
            p: entry.p,
            contaminant: threshold.is_contaminant(entry.p),
        })
        .collect()
}

/// Classify features and build the table without contaminants.
///
/// Score-table features not in `counts` are skipped with a warning; table
/// features without a score are kept. Fails with
/// [`DecontamError::EmptyResult`] if nothing is left.
pub fn apply_threshold(
    scores: &ScoreTable,
    counts: &CountMatrix,
    threshold: Threshold,
) -> Result<(Vec<ThresholdDecision>, CountMatrix)> {
    let decisions = classify(scores, threshold);
    let table_ids = feature_id_set(counts);

    let mut contaminants = HashSet::new();
    for decision in decisions.iter().filter(|d| d.contaminant) {
        if !table_ids.contains(decision.feature_id.as_str()) {
            warn!(
                "Scored feature '{}' is not in the feature table; skipped",
                decision.feature_id
            );
            continue;
        }
        contaminants.insert(decision.feature_id.as_str());
    }

    let keep: Vec<usize> = counts
        .feature_ids()
        .iter()
        .enumerate()
        .filter(|(_, id)| !contaminants.contains(id.as_str()))
        .map(|(i, _)| i)
        .collect();

    if keep.is_empty() {
        return Err(DecontamError::EmptyResult(format!(
            "all {} features are contaminants at threshold {}; nothing would remain",
            counts.n_features(),
            threshold
        )));
    }

    let cleaned = counts.subset_features(&keep)?;
    Ok((decisions, cleaned))
}

fn feature_id_set(counts: &CountMatrix) -> HashSet<&str> {
    counts.feature_ids().iter().map(String::as_str).collect()
}

/// Summary of a removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalSummary {
    pub threshold: f64,
    /// Features in the input table.
    pub n_before: usize,
    /// Features in the cleaned table.
    pub n_after: usize,
    /// IDs of removed features, in table order.
    pub removed_features: Vec<String>,
    /// Contaminant IDs from the score table not found in the feature table.
    pub unmatched_features: Vec<String>,
    /// Proportion of total reads kept.
    pub reads_retained: f64,
}

impl RemovalSummary {
    /// Number of features removed.
    pub fn n_removed(&self) -> usize {
        self.n_before - self.n_after
    }
}

impl std::fmt::Display for RemovalSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Contaminant Removal (threshold {})", self.threshold)?;
        writeln!(f, "  Features before:  {}", self.n_before)?;
        writeln!(f, "  Features after:   {}", self.n_after)?;
        writeln!(f, "  Features removed: {}", self.n_removed())?;
        if !self.removed_features.is_empty() {
            writeln!(f, "  Removed: {:?}", self.removed_features)?;
        }
        if !self.unmatched_features.is_empty() {
            writeln!(f, "  Not in table: {:?}", self.unmatched_features)?;
        }
        writeln!(f, "  Reads retained:   {:.1}%", self.reads_retained * 100.0)?;
        Ok(())
    }
}

/// Remove contaminants from `counts`, with statistics about what was removed.
pub fn remove(
    scores: &ScoreTable,
    counts: &CountMatrix,
    threshold: Threshold,
) -> Result<(CountMatrix, RemovalSummary)> {
    let (decisions, cleaned) = apply_threshold(scores, counts, threshold)?;

    let table_ids = feature_id_set(counts);
    let kept = feature_id_set(&cleaned);
    let removed_features: Vec<String> = counts
        .feature_ids()
        .iter()
        .filter(|id| !kept.contains(id.as_str()))
        .cloned()
        .collect();
    let unmatched_features: Vec<String> = decisions
        .iter()
        .filter(|d| d.contaminant && !table_ids.contains(d.feature_id.as_str()))
        .map(|d| d.feature_id.clone())
        .collect();

    let reads_before: f64 = counts.col_sums().iter().sum();
    let reads_after: f64 = cleaned.col_sums().iter().sum();
    let reads_retained = if reads_before > 0.0 {
        reads_after / reads_before
    } else {
        1.0
    };

    let summary = RemovalSummary {
        threshold: threshold.value(),
        n_before: counts.n_features(),
        n_after: cleaned.n_features(),
        removed_features,
        unmatched_features,
        reads_retained,
    };
    info!(
        "Removed {} of {} features at threshold {}",
        summary.n_removed(),
        summary.n_before,
        threshold
    );
    Ok((cleaned, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeconMethod;
    use crate::data::ScoreEntry;
    use approx::assert_relative_eq;

    fn create_test_counts() -> CountMatrix {
        CountMatrix::from_rows(
            &[
                vec![10.0, 0.0, 5.0],
                vec![20.0, 30.0, 25.0],
                vec![0.0, 15.0, 10.0],
                vec![5.0, 5.0, 5.0],
            ],
            vec!["asv1".into(), "asv2".into(), "asv3".into(), "asv4".into()],
            vec!["S1".into(), "S2".into(), "S3".into()],
        )
        .unwrap()
    }

    fn scores(values: &[(&str, f64)]) -> ScoreTable {
        ScoreTable::new(
            DeconMethod::Prevalence,
            values
                .iter()
                .map(|(id, p)| ScoreEntry {
                    feature_id: id.to_string(),
                    freq: None,
                    prev: Some(1),
                    p_freq: None,
                    p_prev: Some(*p),
                    p: *p,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let table = scores(&[("asv1", 0.1), ("asv2", 0.100001), ("asv3", 0.05)]);
        let decisions = classify(&table, Threshold::new(0.1).unwrap());
        let flags: Vec<bool> = decisions.iter().map(|d| d.contaminant).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_remove_contaminants() {
        let table = scores(&[("asv1", 0.01), ("asv2", 0.9), ("asv3", 0.5)]);
        let (cleaned, summary) =
            remove(&table, &create_test_counts(), Threshold::default()).unwrap();

        assert_eq!(cleaned.feature_ids(), &["asv2", "asv3", "asv4"]);
        assert_eq!(cleaned.sample_ids(), &["S1", "S2", "S3"]);
        assert_eq!(summary.n_removed(), 1);
        assert_eq!(summary.removed_features, vec!["asv1"]);
        assert_relative_eq!(summary.reads_retained, 115.0 / 130.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unscored_features_are_kept() {
        let table = scores(&[("asv1", 0.5)]);
        let (cleaned, _) = remove(&table, &create_test_counts(), Threshold::default()).unwrap();
        assert_eq!(cleaned.n_features(), 4);
    }

    #[test]
    fn test_unknown_scored_feature_skipped() {
        let table = scores(&[("ghost", 0.01), ("asv2", 0.01)]);
        let (cleaned, summary) =
            remove(&table, &create_test_counts(), Threshold::default()).unwrap();
        assert_eq!(cleaned.n_features(), 3);
        assert_eq!(summary.unmatched_features, vec!["ghost"]);
        assert_eq!(summary.removed_features, vec!["asv2"]);
    }

    #[test]
    fn test_everything_removed() {
        let table = scores(&[
            ("asv1", 0.01),
            ("asv2", 0.02),
            ("asv3", 0.03),
            ("asv4", 0.04),
        ]);
        let err = remove(&table, &create_test_counts(), Threshold::default()).unwrap_err();
        assert!(matches!(err, DecontamError::EmptyResult(_)));
    }

    #[test]
    fn test_remove_scales_to_large_tables() {
        let n = 50_000;
        let ids: Vec<String> = (0..n).map(|i| format!("asv{}", i)).collect();
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![1.0 + (i % 7) as f64, 2.0]).collect();
        let counts = CountMatrix::from_rows(&rows, ids.clone(), vec!["S1".into(), "S2".into()])
            .unwrap();
        let table = ScoreTable::new(
            DeconMethod::Prevalence,
            ids.iter()
                .enumerate()
                .map(|(i, id)| {
                    let p = if i == n - 1 { 0.9 } else { 0.01 };
                    ScoreEntry {
                        feature_id: id.clone(),
                        freq: None,
                        prev: Some(2),
                        p_freq: None,
                        p_prev: Some(p),
                        p,
                    }
                })
                .collect(),
        )
        .unwrap();

        let start = std::time::Instant::now();
        let (cleaned, summary) = remove(&table, &counts, Threshold::default()).unwrap();
        assert!(start.elapsed().as_secs() < 10);

        assert_eq!(cleaned.feature_ids(), &[format!("asv{}", n - 1)]);
        assert_eq!(summary.n_removed(), n - 1);
        assert!(summary.unmatched_features.is_empty());
    }

    #[test]
    fn test_summary_display() {
        let table = scores(&[("asv1", 0.01)]);
        let (_, summary) = remove(&table, &create_test_counts(), Threshold::default()).unwrap();
        let text = summary.to_string();
        assert!(text.contains("Features removed: 1"));
        assert!(text.contains("asv1"));
    }
}
