//! Score distribution summaries for reporting.
//!
//! A summary counts contaminant and true features at a threshold and bins
//! the scores into a 10-bin histogram anchored at the threshold: bins below
//! the threshold hold contaminants, bins above hold true features.

use crate::config::Threshold;
use crate::data::ScoreTable;
use crate::error::{DecontamError, Result};
use serde::{Deserialize, Serialize};

/// Total number of histogram bins.
pub const N_BINS: usize = 10;

/// One histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// Bin lies at or below the threshold.
    pub contaminant: bool,
}

/// Counts and histogram of a score table at a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub threshold: f64,
    pub contaminant_count: usize,
    pub true_count: usize,
    /// Contaminants as a percentage of all scored features.
    pub percent_contaminant: f64,
    pub histogram: Vec<HistogramBin>,
}

impl ScoreSummary {
    /// Total scored features.
    pub fn total(&self) -> usize {
        self.contaminant_count + self.true_count
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(DecontamError::from)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DecontamError::from)
    }
}

impl std::fmt::Display for ScoreSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Score Summary (threshold {})", self.threshold)?;
        writeln!(f, "  Contaminant features: {}", self.contaminant_count)?;
        writeln!(f, "  True features:        {}", self.true_count)?;
        writeln!(f, "  Contaminant:          {:.1}%", self.percent_contaminant)?;
        writeln!(f)?;
        let max_count = self.histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
        for bin in &self.histogram {
            let bar_len = (bin.count * 40).div_ceil(max_count);
            writeln!(
                f,
                "  {} [{:.4}, {:.4}] {:>6} {}",
                if bin.contaminant { "C" } else { "T" },
                bin.lower,
                bin.upper,
                bin.count,
                "#".repeat(bar_len)
            )?;
        }
        Ok(())
    }
}

/// Summarize a score table at `threshold`.
///
/// Bins are split between the two sides of the threshold in proportion to
/// the number of scores on each side, with at least one bin per side. Each
/// side spans from the threshold to its most extreme score in equal-width
/// bins; a side without scores collapses to zero width at the threshold.
pub fn summarize(scores: &ScoreTable, threshold: Threshold) -> Result<ScoreSummary> {
    if scores.is_empty() {
        return Err(DecontamError::EmptyResult(
            "cannot summarize an empty score table".to_string(),
        ));
    }

    let t = threshold.value();
    let values = scores.p_values();
    let total = values.len();
    let contaminant_count = values.iter().filter(|&&p| threshold.is_contaminant(p)).count();
    let true_count = total - contaminant_count;

    let bins_above = ((N_BINS * true_count) as f64 / total as f64)
        .round()
        .clamp(1.0, (N_BINS - 1) as f64) as usize;
    let bins_below = N_BINS - bins_above;

    let lo = values.iter().copied().fold(t, f64::min);
    let hi = values.iter().copied().fold(t, f64::max);
    let width_below = (t - lo) / bins_below as f64;
    let width_above = (hi - t) / bins_above as f64;

    let mut histogram: Vec<HistogramBin> = (0..bins_below)
        .map(|k| HistogramBin {
            lower: lo + k as f64 * width_below,
            upper: if k + 1 == bins_below {
                t
            } else {
                lo + (k + 1) as f64 * width_below
            },
            count: 0,
            contaminant: true,
        })
        .chain((0..bins_above).map(|k| HistogramBin {
            lower: t + k as f64 * width_above,
            upper: if k + 1 == bins_above {
                hi
            } else {
                t + (k + 1) as f64 * width_above
            },
            count: 0,
            contaminant: false,
        }))
        .collect();

    for &p in &values {
        let idx = if threshold.is_contaminant(p) {
            if width_below > 0.0 {
                (((p - lo) / width_below).floor().max(0.0) as usize).min(bins_below - 1)
            } else {
                bins_below - 1
            }
        } else if width_above > 0.0 {
            let k = ((p - t) / width_above).ceil() as usize;
            bins_below + k.saturating_sub(1).min(bins_above - 1)
        } else {
            bins_below
        };
        histogram[idx].count += 1;
    }

    Ok(ScoreSummary {
        threshold: t,
        contaminant_count,
        true_count,
        percent_contaminant: 100.0 * contaminant_count as f64 / total as f64,
        histogram,
    })
}
