//! Contaminant scoring methods.
//!
//! Each scorer returns per-feature scores in table order; undefined scores
//! are NaN. The `*_table` builders turn them into a [`ScoreTable`], dropping
//! features whose final score is undefined.

mod combine;
mod frequency;
mod prevalence;

pub use combine::{combine, combine_p};
pub use frequency::{score_frequency, FrequencyFit, FrequencyScore, FrequencyScores};
pub use prevalence::{score_prevalence, PresenceTable, PrevalenceScore, PrevalenceScores};

use crate::config::{DeconMethod, MethodPlan};
use crate::data::{ScoreEntry, ScoreTable};
use crate::error::{DecontamError, Result};
use crate::prepare::PreparedInput;

/// Score table for the frequency method.
pub fn frequency_table(scores: &FrequencyScores) -> Result<ScoreTable> {
    let entries = scores
        .scores
        .iter()
        .filter(|s| s.is_defined())
        .map(|s| ScoreEntry {
            feature_id: s.feature_id.clone(),
            freq: Some(s.freq),
            prev: None,
            p_freq: Some(s.p_freq),
            p_prev: None,
            p: s.p_freq,
        })
        .collect();
    ScoreTable::new(DeconMethod::Frequency, entries)
}

/// Score table for the prevalence method.
pub fn prevalence_table(scores: &PrevalenceScores) -> Result<ScoreTable> {
    let entries = scores
        .scores
        .iter()
        .filter(|s| !s.p_prev.is_nan())
        .map(|s| ScoreEntry {
            feature_id: s.feature_id.clone(),
            freq: None,
            prev: Some(s.prev),
            p_freq: None,
            p_prev: Some(s.p_prev),
            p: s.p_prev,
        })
        .collect();
    ScoreTable::new(DeconMethod::Prevalence, entries)
}

/// Run the scorer(s) a plan calls for.
pub fn score_features(input: &PreparedInput, plan: &MethodPlan) -> Result<ScoreTable> {
    let concentrations = || {
        input.concentrations.as_deref().ok_or_else(|| {
            DecontamError::MissingCovariate(
                "freq_concentration_column values were not prepared".to_string(),
            )
        })
    };
    let controls = || {
        input.controls.as_deref().ok_or_else(|| {
            DecontamError::MissingControlLabel(
                "control labels were not prepared".to_string(),
            )
        })
    };

    match plan {
        MethodPlan::Frequency { .. } => {
            frequency_table(&score_frequency(&input.counts, concentrations()?)?)
        }
        MethodPlan::Prevalence { test, .. } => {
            prevalence_table(&score_prevalence(&input.counts, controls()?, *test)?)
        }
        MethodPlan::Combined { test, rule, .. } => {
            let frequency = score_frequency(&input.counts, concentrations()?)?;
            let prevalence = score_prevalence(&input.counts, controls()?, *test)?;
            combine(&frequency, &prevalence, *rule)
        }
    }
}
