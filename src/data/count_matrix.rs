//! Sparse feature table holding ASV/OTU abundances across samples.

use crate::error::{DecontamError, Result};
use crate::io::write_atomic;
use sprs::{CsMat, TriMat};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Header label written in the first cell of feature tables.
pub const FEATURE_ID_HEADER: &str = "#OTU ID";

/// A sparse abundance matrix storing feature counts across samples.
///
/// Rows represent features (ASVs/OTUs), columns represent samples.
/// Uses CSR (Compressed Sparse Row) format for efficient row-wise operations.
/// Counts are non-negative and finite; fractional values are allowed.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (features × samples)
    data: CsMat<f64>,
    /// Feature identifiers (row names)
    feature_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(data: CsMat<f64>, feature_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != feature_ids.len() {
            return Err(DecontamError::DimensionMismatch {
                expected: nrows,
                actual: feature_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(DecontamError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        check_unique("feature", &feature_ids)?;
        check_unique("sample", &sample_ids)?;

        for (row, row_vec) in data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                if !val.is_finite() || val < 0.0 {
                    return Err(DecontamError::InvalidCount {
                        value: val.to_string(),
                        row,
                        col,
                    });
                }
            }
        }

        Ok(Self {
            data,
            feature_ids,
            sample_ids,
        })
    }

    /// Build a matrix from dense rows (one `Vec` per feature).
    pub fn from_rows(rows: &[Vec<f64>], feature_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let n_samples = sample_ids.len();
        let mut tri_mat = TriMat::new((rows.len(), n_samples));
        for (row, values) in rows.iter().enumerate() {
            if values.len() != n_samples {
                return Err(DecontamError::DimensionMismatch {
                    expected: n_samples,
                    actual: values.len(),
                });
            }
            for (col, &val) in values.iter().enumerate() {
                if val != 0.0 {
                    tri_mat.add_triplet(row, col, val);
                }
            }
        }
        Self::new(tri_mat.to_csr(), feature_ids, sample_ids)
    }

    /// Load a feature table from a TSV file with features as rows.
    ///
    /// Expected format:
    /// - Optional leading `#` comment lines (e.g. `# Constructed from biom file`)
    /// - Header row: feature ID label followed by sample IDs
    /// - Subsequent rows: feature ID followed by counts
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load a feature table from a TSV file with samples as rows.
    ///
    /// The file is parsed as-is and then transposed.
    pub fn from_tsv_samples_as_rows<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let parsed = Self::from_reader_unchecked(BufReader::new(file))?;
        // Parsed rows are samples here, so the emptiness checks apply after transposing.
        let transposed = parsed.transpose();
        transposed.ensure_not_empty()?;
        Ok(transposed)
    }

    /// Parse a feature-as-rows TSV table from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mat = Self::from_reader_unchecked(reader)?;
        mat.ensure_not_empty()?;
        Ok(mat)
    }

    fn from_reader_unchecked<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        // Leading `#` lines without a tab are comments; the first other line is the header.
        let header_line = loop {
            let line = lines
                .next()
                .ok_or_else(|| DecontamError::EmptyTable("Empty TSV file".to_string()))??;
            if line.trim().is_empty() || (line.starts_with('#') && !line.contains('\t')) {
                continue;
            }
            break line;
        };

        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(DecontamError::EmptyTable(
                "TSV must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let n_samples = sample_ids.len();

        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
        let mut feature_ids: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let row_idx = feature_ids.len();
            feature_ids.push(fields[0].trim().to_string());

            if fields.len() - 1 != n_samples {
                return Err(DecontamError::DimensionMismatch {
                    expected: n_samples,
                    actual: fields.len() - 1,
                });
            }

            for (col_idx, value_str) in fields[1..].iter().enumerate() {
                let value = parse_count(value_str).ok_or_else(|| DecontamError::InvalidCount {
                    value: value_str.to_string(),
                    row: row_idx,
                    col: col_idx,
                })?;
                if value > 0.0 {
                    triplets.push((row_idx, col_idx, value));
                }
            }
        }

        let mut tri_mat = TriMat::new((feature_ids.len(), n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), feature_ids, sample_ids)
    }

    fn ensure_not_empty(&self) -> Result<()> {
        if self.n_features() == 0 {
            return Err(DecontamError::EmptyTable(
                "No features remain in the table; an upstream step may have removed them all"
                    .to_string(),
            ));
        }
        if self.n_samples() == 0 {
            return Err(DecontamError::EmptyTable("No samples in the table".to_string()));
        }
        Ok(())
    }

    /// Write the table to a TSV file, features as rows.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomic(path, |w| self.to_writer(w))
    }

    /// Write the table as TSV to any writer.
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        write!(writer, "{}", FEATURE_ID_HEADER)?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row_idx, feature_id) in self.feature_ids.iter().enumerate() {
            write!(writer, "{}", feature_id)?;
            for value in self.row_dense(row_idx) {
                if value.fract() == 0.0 {
                    write!(writer, "\t{:.0}", value)?;
                } else {
                    write!(writer, "\t{}", value)?;
                }
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    /// Number of features (rows).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Feature identifiers.
    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Index of a feature by ID.
    pub fn feature_index(&self, feature_id: &str) -> Option<usize> {
        self.feature_ids.iter().position(|f| f == feature_id)
    }

    /// Get a dense vector for a specific row (feature).
    pub fn row_dense(&self, row: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Compute column sums (library sizes per sample).
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Subset the matrix to include only specified features (by index).
    pub fn subset_features(&self, indices: &[usize]) -> Result<Self> {
        let n_features = indices.len();
        let n_samples = self.n_samples();

        let mut tri_mat = TriMat::new((n_features, n_samples));
        let mut new_feature_ids = Vec::with_capacity(n_features);

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_features() {
                return Err(DecontamError::invalid_parameter(
                    "feature index",
                    format!("{} out of bounds", old_row),
                ));
            }
            new_feature_ids.push(self.feature_ids[old_row].clone());

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_feature_ids, self.sample_ids.clone())
    }

    /// Swap rows and columns, turning a sample-by-feature view into
    /// feature-by-sample (or back).
    pub fn transpose(&self) -> Self {
        let mut tri_mat = TriMat::new((self.n_samples(), self.n_features()));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                tri_mat.add_triplet(col, row, val);
            }
        }
        Self {
            data: tri_mat.to_csr(),
            feature_ids: self.sample_ids.clone(),
            sample_ids: self.feature_ids.clone(),
        }
    }
}

fn parse_count(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

fn check_unique(kind: &'static str, ids: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(DecontamError::DuplicateId {
                kind,
                id: id.clone(),
            });
        }
    }
    Ok(())
}
