//! Total Sum Scaling (TSS) normalization for compositional data.
//!
//! TSS converts counts to relative abundances by dividing each count by the
//! total counts in that sample. The frequency scorer works on these
//! proportions rather than on raw read counts.

use crate::data::CountMatrix;
use crate::error::{DecontamError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;

/// Relative abundances (features × samples).
#[derive(Debug, Clone)]
pub struct TssMatrix {
    /// Proportions; columns of samples with zero total are all zero.
    pub data: DMatrix<f64>,
    /// Feature identifiers.
    pub feature_ids: Vec<String>,
    /// Sample identifiers.
    pub sample_ids: Vec<String>,
    /// Library sizes (total counts per sample before normalization).
    pub library_sizes: Vec<f64>,
}

impl TssMatrix {
    /// Get the normalized value for a feature and sample.
    pub fn get(&self, feature: usize, sample: usize) -> f64 {
        self.data[(feature, sample)]
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Whether a sample has a non-zero library and so defined proportions.
    pub fn has_library(&self, sample: usize) -> bool {
        self.library_sizes[sample] > 0.0
    }
}

/// Apply Total Sum Scaling normalization to a count matrix.
///
/// # Formula
/// For sample j: TSS(x_ij) = x_ij / sum(x_j)
///
/// Samples with zero total counts are kept as all-zero columns; callers check
/// [`TssMatrix::has_library`] before using them.
pub fn norm_tss(counts: &CountMatrix) -> Result<TssMatrix> {
    let n_features = counts.n_features();
    let n_samples = counts.n_samples();

    if n_features == 0 || n_samples == 0 {
        return Err(DecontamError::EmptyTable(
            "Cannot apply TSS to empty matrix".to_string(),
        ));
    }

    let library_sizes = counts.col_sums();

    let normalized_cols: Vec<Vec<f64>> = (0..n_samples)
        .into_par_iter()
        .map(|j| {
            let lib_size = library_sizes[j];
            if lib_size <= 0.0 {
                return vec![0.0; n_features];
            }
            (0..n_features)
                .map(|i| counts.get(i, j) / lib_size)
                .collect()
        })
        .collect();

    let mut data = DMatrix::zeros(n_features, n_samples);
    for (j, col) in normalized_cols.iter().enumerate() {
        for (i, &val) in col.iter().enumerate() {
            data[(i, j)] = val;
        }
    }

    Ok(TssMatrix {
        data,
        feature_ids: counts.feature_ids().to_vec(),
        sample_ids: counts.sample_ids().to_vec(),
        library_sizes,
    })
}
