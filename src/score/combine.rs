//! Merging frequency and prevalence scores.

use super::{FrequencyScores, PrevalenceScores};
use crate::config::{CombineRule, DeconMethod};
use crate::data::{ScoreEntry, ScoreTable};
use crate::error::{DecontamError, Result};
use log::debug;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Combine two scores into one. NaN when either input is undefined.
pub fn combine_p(p_freq: f64, p_prev: f64, rule: CombineRule) -> f64 {
    if p_freq.is_nan() || p_prev.is_nan() {
        return f64::NAN;
    }
    match rule {
        CombineRule::Minimum => p_freq.min(p_prev),
        CombineRule::Fisher => {
            let product = p_freq * p_prev;
            if product <= 0.0 {
                return 0.0;
            }
            match ChiSquared::new(4.0) {
                Ok(dist) => dist.sf(-2.0 * product.ln()).clamp(0.0, 1.0),
                Err(_) => f64::NAN,
            }
        }
    }
}

/// Build a combined score table.
///
/// Features missing either subscore are dropped.
pub fn combine(
    frequency: &FrequencyScores,
    prevalence: &PrevalenceScores,
    rule: CombineRule,
) -> Result<ScoreTable> {
    if frequency.len() != prevalence.len() {
        return Err(DecontamError::DimensionMismatch {
            expected: frequency.len(),
            actual: prevalence.len(),
        });
    }

    let mut entries = Vec::with_capacity(frequency.len());
    for (f, p) in frequency.scores.iter().zip(&prevalence.scores) {
        if f.feature_id != p.feature_id {
            return Err(DecontamError::Numerical(format!(
                "score order mismatch: '{}' vs '{}'",
                f.feature_id, p.feature_id
            )));
        }
        let combined = combine_p(f.p_freq, p.p_prev, rule);
        if combined.is_nan() {
            debug!("Dropping '{}' from combined scores", f.feature_id);
            continue;
        }
        entries.push(ScoreEntry {
            feature_id: f.feature_id.clone(),
            freq: Some(f.freq),
            prev: Some(p.prev),
            p_freq: Some(f.p_freq),
            p_prev: Some(p.p_prev),
            p: combined,
        });
    }

    ScoreTable::new(DeconMethod::Combined, entries)
}
