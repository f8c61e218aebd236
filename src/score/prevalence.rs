//! Prevalence-based contaminant scoring.
//!
//! Contaminants are present in negative controls more often than in
//! experimental samples. For each feature the 2×2 presence table
//! (control/experimental × present/absent) is tested one-sided for higher
//! presence in controls; a small score means the feature looks like a
//! contaminant.

use crate::config::PrevalenceTest;
use crate::data::CountMatrix;
use crate::error::{DecontamError, Result};
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::factorial::ln_binomial;

/// Prevalence score for a single feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrevalenceScore {
    /// Feature identifier.
    pub feature_id: String,
    /// Number of table samples in which the feature is present.
    pub prev: u64,
    /// Score in [0, 1].
    pub p_prev: f64,
    /// Control samples in which the feature is present.
    pub n_control_present: usize,
    /// Experimental samples in which the feature is present.
    pub n_experimental_present: usize,
}

/// Prevalence scores for all features, in table order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrevalenceScores {
    pub scores: Vec<PrevalenceScore>,
    /// Number of control samples.
    pub n_controls: usize,
    /// Number of experimental samples.
    pub n_experimental: usize,
}

impl PrevalenceScores {
    /// Number of features.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Get the score for a specific feature.
    pub fn get_feature(&self, feature_id: &str) -> Option<&PrevalenceScore> {
        self.scores.iter().find(|s| s.feature_id == feature_id)
    }
}

/// Presence counts of one feature split by sample class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTable {
    /// Controls where the feature is present.
    pub control_present: usize,
    /// Total controls.
    pub n_controls: usize,
    /// Experimental samples where the feature is present.
    pub experimental_present: usize,
    /// Total experimental samples.
    pub n_experimental: usize,
}

impl PresenceTable {
    fn total(&self) -> usize {
        self.n_controls + self.n_experimental
    }

    fn total_present(&self) -> usize {
        self.control_present + self.experimental_present
    }

    /// Score this table with the given test.
    ///
    /// Features absent from every labelled sample, or present in all of them,
    /// carry no evidence either way and score 1.
    pub fn score(&self, test: PrevalenceTest) -> f64 {
        let present = self.total_present();
        if present == 0 || present == self.total() {
            return 1.0;
        }
        match test {
            PrevalenceTest::Fisher => self.fisher_mid_p(),
            PrevalenceTest::ChiSquared => self.chi_squared(),
        }
    }

    /// One-sided mid-p Fisher exact test: `P(X > a) + P(X = a) / 2` where
    /// `X` is the hypergeometric count of present samples among controls.
    fn fisher_mid_p(&self) -> f64 {
        let n = self.total() as u64;
        let k = self.total_present() as u64;
        let draws = self.n_controls as u64;
        let observed = self.control_present as u64;

        let ln_total = ln_binomial(n, draws);
        let pmf = |x: u64| (ln_binomial(k, x) + ln_binomial(n - k, draws - x) - ln_total).exp();

        let lo = draws.saturating_sub(n - k);
        let hi = k.min(draws);
        let upper: f64 = (lo..=hi).filter(|&x| x > observed).map(pmf).sum();
        (upper + 0.5 * pmf(observed)).clamp(0.0, 1.0)
    }

    /// One-sided Pearson chi-squared test (1 df, no continuity correction).
    fn chi_squared(&self) -> f64 {
        let a = self.control_present as f64;
        let b = (self.n_controls - self.control_present) as f64;
        let c = self.experimental_present as f64;
        let d = (self.n_experimental - self.experimental_present) as f64;
        let n = a + b + c + d;

        let denom = (a + b) * (c + d) * (a + c) * (b + d);
        let stat = n * (a * d - b * c).powi(2) / denom;
        let sf = match ChiSquared::new(1.0) {
            Ok(dist) => dist.sf(stat),
            Err(_) => return f64::NAN,
        };

        let control_rate = a / (a + b);
        let experimental_rate = c / (c + d);
        if control_rate > experimental_rate {
            sf / 2.0
        } else {
            1.0 - sf / 2.0
        }
    }
}

/// Score every feature by presence in controls vs. experimental samples.
///
/// # Arguments
/// * `counts` - Feature table (features × samples)
/// * `controls` - Per sample: `Some(true)` for controls, `Some(false)` for
///   experimental samples, `None` for unlabelled samples
/// * `test` - Test applied to each feature's presence table
///
/// Unlabelled samples are left out of the test but still count towards `prev`.
pub fn score_prevalence(
    counts: &CountMatrix,
    controls: &[Option<bool>],
    test: PrevalenceTest,
) -> Result<PrevalenceScores> {
    if controls.len() != counts.n_samples() {
        return Err(DecontamError::DimensionMismatch {
            expected: counts.n_samples(),
            actual: controls.len(),
        });
    }

    let n_controls = controls.iter().filter(|c| **c == Some(true)).count();
    let n_experimental = controls.iter().filter(|c| **c == Some(false)).count();
    if n_controls == 0 {
        return Err(DecontamError::MissingControlLabel(
            "prevalence scoring needs at least one control sample".to_string(),
        ));
    }
    if n_experimental == 0 {
        return Err(DecontamError::InvalidControlSpec(
            "prevalence scoring needs at least one experimental sample".to_string(),
        ));
    }

    let scores: Vec<PrevalenceScore> = (0..counts.n_features())
        .into_par_iter()
        .map(|i| {
            let row = counts.row_dense(i);
            let mut prev = 0u64;
            let mut control_present = 0;
            let mut experimental_present = 0;
            for (value, label) in row.iter().zip(controls) {
                if *value <= 0.0 {
                    continue;
                }
                prev += 1;
                match label {
                    Some(true) => control_present += 1,
                    Some(false) => experimental_present += 1,
                    None => {}
                }
            }

            let table = PresenceTable {
                control_present,
                n_controls,
                experimental_present,
                n_experimental,
            };
            PrevalenceScore {
                feature_id: counts.feature_ids()[i].clone(),
                prev,
                p_prev: table.score(test),
                n_control_present: control_present,
                n_experimental_present: experimental_present,
            }
        })
        .collect();

    info!(
        "Prevalence scoring ({:?}): {} features, {} controls, {} experimental samples",
        test,
        scores.len(),
        n_controls,
        n_experimental
    );

    Ok(PrevalenceScores {
        scores,
        n_controls,
        n_experimental,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 10 samples, the first 3 are controls.
    fn create_control_counts() -> (CountMatrix, Vec<Option<bool>>) {
        let counts = CountMatrix::from_rows(
            &[
                // contam: all controls, no experimental samples
                vec![5.0, 8.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                // common: everywhere
                vec![10.0, 12.0, 9.0, 40.0, 50.0, 45.0, 38.0, 41.0, 60.0, 52.0],
                // absent
                vec![0.0; 10],
                // sample-only: 0/3 controls, 5/7 experimental
                vec![0.0, 0.0, 0.0, 20.0, 25.0, 0.0, 30.0, 22.0, 0.0, 18.0],
                // mixed: 2/3 controls, 2/7 experimental
                vec![4.0, 0.0, 6.0, 0.0, 0.0, 7.0, 0.0, 0.0, 3.0, 0.0],
            ],
            vec![
                "contam".into(),
                "common".into(),
                "absent".into(),
                "sample_only".into(),
                "mixed".into(),
            ],
            (1..=10).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();
        let controls = (0..10).map(|j| Some(j < 3)).collect();
        (counts, controls)
    }

    #[test]
    fn test_control_only_feature() {
        let (counts, controls) = create_control_counts();
        let scores = score_prevalence(&counts, &controls, PrevalenceTest::Fisher).unwrap();

        let contam = scores.get_feature("contam").unwrap();
        assert_relative_eq!(contam.p_prev, 1.0 / 240.0, epsilon = 1e-10);
        assert!(contam.p_prev < 0.1);
        assert_eq!(contam.prev, 3);
        assert_eq!(contam.n_control_present, 3);
    }

    #[test]
    fn test_uninformative_features_score_one() {
        let (counts, controls) = create_control_counts();
        let scores = score_prevalence(&counts, &controls, PrevalenceTest::Fisher).unwrap();

        assert_eq!(scores.get_feature("common").unwrap().p_prev, 1.0);
        let absent = scores.get_feature("absent").unwrap();
        assert_eq!(absent.p_prev, 1.0);
        assert_eq!(absent.prev, 0);
    }

    #[test]
    fn test_mid_p_values() {
        let (counts, controls) = create_control_counts();
        let scores = score_prevalence(&counts, &controls, PrevalenceTest::Fisher).unwrap();

        assert_relative_eq!(
            scores.get_feature("sample_only").unwrap().p_prev,
            115.0 / 120.0,
            epsilon = 1e-10
        );
        assert_relative_eq!(
            scores.get_feature("mixed").unwrap().p_prev,
            22.0 / 120.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_chi_squared_direction() {
        let (counts, controls) = create_control_counts();
        let scores = score_prevalence(&counts, &controls, PrevalenceTest::ChiSquared).unwrap();

        let contam = scores.get_feature("contam").unwrap().p_prev;
        let sample_only = scores.get_feature("sample_only").unwrap().p_prev;
        assert!(contam < 0.01, "p.prev = {}", contam);
        assert!(sample_only > 0.5, "p.prev = {}", sample_only);
        assert_eq!(scores.get_feature("common").unwrap().p_prev, 1.0);
    }

    #[test]
    fn test_unlabelled_samples_count_towards_prev() {
        let (counts, mut controls) = create_control_counts();
        controls[3] = None;
        let scores = score_prevalence(&counts, &controls, PrevalenceTest::Fisher).unwrap();

        assert_eq!(scores.n_experimental, 6);
        let sample_only = scores.get_feature("sample_only").unwrap();
        assert_eq!(sample_only.prev, 5);
        assert_eq!(sample_only.n_experimental_present, 4);
    }

    #[test]
    fn test_no_controls() {
        let (counts, _) = create_control_counts();
        let controls = vec![Some(false); 10];
        assert!(matches!(
            score_prevalence(&counts, &controls, PrevalenceTest::Fisher),
            Err(DecontamError::MissingControlLabel(_))
        ));
    }

    #[test]
    fn test_only_controls() {
        let (counts, _) = create_control_counts();
        let controls = vec![Some(true); 10];
        assert!(matches!(
            score_prevalence(&counts, &controls, PrevalenceTest::Fisher),
            Err(DecontamError::InvalidControlSpec(_))
        ));
    }

    #[test]
    fn test_presence_table_bounds() {
        let table = PresenceTable {
            control_present: 1,
            n_controls: 1,
            experimental_present: 0,
            n_experimental: 1,
        };
        let p = table.score(PrevalenceTest::Fisher);
        assert_relative_eq!(p, 0.25, epsilon = 1e-12);
    }
}
