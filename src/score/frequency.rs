//! Frequency-based contaminant scoring.
//!
//! Contaminant DNA is added at a roughly constant amount per sample, so its
//! relative abundance falls as total DNA concentration rises:
//! `f ∝ 1 / c`. Sequences from the sampled community have relative
//! abundances that do not depend on concentration.
//!
//! For each feature two models are fitted on the log scale, over samples in
//! which the feature is present:
//!
//! - contaminant: `log f = a - log c` (slope fixed at -1)
//! - non-contaminant: `log f = b`
//!
//! The score is the F-distribution CDF of the ratio of their residual sums of
//! squares, with `n - 1` degrees of freedom on both sides. A ratio near zero
//! (the contaminant model fits far better) gives a score near zero.

use crate::data::CountMatrix;
use crate::error::{DecontamError, Result};
use crate::normalize::norm_tss;
use log::{debug, info};
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// Residual sums of squares at or below this are treated as exact fits.
const EXACT_FIT_TOL: f64 = 1e-12;

/// Frequency score for a single feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyScore {
    /// Feature identifier.
    pub feature_id: String,
    /// Mean relative abundance over the samples used.
    pub freq: f64,
    /// Score in [0, 1]; NaN when undefined.
    pub p_freq: f64,
    /// Number of samples in which the feature was present and scored.
    pub n_present: usize,
}

impl FrequencyScore {
    /// Whether the score could be computed.
    pub fn is_defined(&self) -> bool {
        !self.p_freq.is_nan()
    }
}

/// Frequency scores for all features, in table order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyScores {
    pub scores: Vec<FrequencyScore>,
    /// Number of samples with both a library and a concentration.
    pub n_samples_used: usize,
}

impl FrequencyScores {
    /// Number of features.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Number of features with a defined score.
    pub fn n_defined(&self) -> usize {
        self.scores.iter().filter(|s| s.is_defined()).count()
    }

    /// Get the score for a specific feature.
    pub fn get_feature(&self, feature_id: &str) -> Option<&FrequencyScore> {
        self.scores.iter().find(|s| s.feature_id == feature_id)
    }
}

/// Residual sums of squares of the two frequency models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyFit {
    /// Contaminant model (slope -1).
    pub ss_contaminant: f64,
    /// Non-contaminant model (constant).
    pub ss_null: f64,
    /// Number of observations.
    pub n: usize,
}

impl FrequencyFit {
    /// Fit both models to relative abundances `freq` and concentrations `conc`
    /// (all strictly positive, same length).
    pub fn fit(freq: &[f64], conc: &[f64]) -> Self {
        let log_f = DVector::from_iterator(freq.len(), freq.iter().map(|f| f.ln()));
        let log_c = DVector::from_iterator(conc.len(), conc.iter().map(|c| c.ln()));

        // Contaminant model: log f + log c = a
        let shifted = &log_f + &log_c;
        let ss_contaminant = shifted.add_scalar(-shifted.mean()).norm_squared();
        let ss_null = log_f.add_scalar(-log_f.mean()).norm_squared();

        Self {
            ss_contaminant,
            ss_null,
            n: freq.len(),
        }
    }

    /// Score in [0, 1], or NaN when undefined.
    pub fn score(&self) -> f64 {
        if self.n < 2 {
            return f64::NAN;
        }
        if self.ss_null <= EXACT_FIT_TOL {
            // Flat abundance: no evidence of concentration dependence.
            return if self.ss_contaminant > EXACT_FIT_TOL { 1.0 } else { f64::NAN };
        }
        let ratio = self.ss_contaminant / self.ss_null;
        if !ratio.is_finite() {
            return f64::NAN;
        }
        let dof = (self.n - 1) as f64;
        match FisherSnedecor::new(dof, dof) {
            Ok(dist) => dist.cdf(ratio).clamp(0.0, 1.0),
            Err(_) => f64::NAN,
        }
    }
}

/// Score every feature against per-sample DNA concentrations.
///
/// # Arguments
/// * `counts` - Feature table (features × samples)
/// * `concentrations` - Concentration per sample, `None` where missing
///
/// Samples with zero total counts or without a concentration are excluded.
/// Features present in fewer than two of the remaining samples get a NaN score.
pub fn score_frequency(counts: &CountMatrix, concentrations: &[Option<f64>]) -> Result<FrequencyScores> {
    if concentrations.len() != counts.n_samples() {
        return Err(DecontamError::DimensionMismatch {
            expected: counts.n_samples(),
            actual: concentrations.len(),
        });
    }
    if let Some(bad) = concentrations.iter().flatten().find(|c| !(c.is_finite() && **c > 0.0)) {
        return Err(DecontamError::invalid_parameter(
            "freq_concentration_column",
            format!("concentrations must be positive and finite, found {}", bad),
        ));
    }

    let tss = norm_tss(counts)?;
    let usable: Vec<(usize, f64)> = concentrations
        .iter()
        .enumerate()
        .filter_map(|(j, c)| match *c {
            Some(c) if tss.has_library(j) => Some((j, c)),
            _ => None,
        })
        .collect();

    if usable.len() < 2 {
        return Err(DecontamError::Numerical(format!(
            "frequency scoring needs at least 2 samples with reads and a concentration, found {}",
            usable.len()
        )));
    }

    let scores: Vec<FrequencyScore> = (0..tss.n_features())
        .into_par_iter()
        .map(|i| {
            let mut freq = Vec::with_capacity(usable.len());
            let mut conc = Vec::with_capacity(usable.len());
            let mut total = 0.0;
            for &(j, c) in &usable {
                let f = tss.get(i, j);
                total += f;
                if f > 0.0 {
                    freq.push(f);
                    conc.push(c);
                }
            }

            let fit = FrequencyFit::fit(&freq, &conc);
            let p_freq = fit.score();
            if p_freq.is_nan() {
                debug!(
                    "Feature '{}' has no frequency score ({} samples present)",
                    tss.feature_ids[i], fit.n
                );
            }

            FrequencyScore {
                feature_id: tss.feature_ids[i].clone(),
                freq: total / usable.len() as f64,
                p_freq,
                n_present: fit.n,
            }
        })
        .collect();

    let result = FrequencyScores {
        scores,
        n_samples_used: usable.len(),
    };
    info!(
        "Frequency scoring: {} of {} features scored using {} samples",
        result.n_defined(),
        result.len(),
        result.n_samples_used
    );
    Ok(result)
}
