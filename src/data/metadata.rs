//! Sample metadata handling.

use crate::error::{DecontamError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A variable value that can be categorical or continuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Interpret the value as a boolean indicator.
    ///
    /// Accepts `true/false`, `t/f`, `yes/no` (any case) and `1/0`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variable::Categorical(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(true),
                "false" | "f" | "no" | "0" => Some(false),
                _ => None,
            },
            Variable::Continuous(v) if *v == 1.0 => Some(true),
            Variable::Continuous(v) if *v == 0.0 => Some(false),
            _ => None,
        }
    }

    /// Check whether this value equals a textual label.
    ///
    /// Continuous values compare numerically, so `"1"` matches `1.0`.
    pub fn matches_label(&self, label: &str) -> bool {
        match self {
            Variable::Categorical(s) => s == label,
            Variable::Continuous(v) => label.trim().parse::<f64>().map(|l| l == *v).unwrap_or(false),
            Variable::Missing => false,
        }
    }
}

/// Type of a metadata column, inferred at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

/// Reference to a metadata column, by name or by zero-based position.
///
/// Positions count the variable columns only; the sample ID column is not
/// addressable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl ColumnRef {
    /// Parse a CLI-style reference: `#3` addresses by position, anything else by name.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('#').and_then(|idx| idx.parse::<usize>().ok()) {
            Some(index) => ColumnRef::Index(index),
            None => ColumnRef::Name(raw.to_string()),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{}", i),
            ColumnRef::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

/// Sample metadata containing variables for each sample.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Sample IDs in order.
    sample_ids: Vec<String>,
    /// Column names.
    column_names: Vec<String>,
    /// Data stored as sample_id -> column_name -> Variable.
    data: HashMap<String, HashMap<String, Variable>>,
    /// Inferred type of each column.
    column_types: HashMap<String, VariableType>,
}

impl Metadata {
    /// Load metadata from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with column names (first column is sample ID)
    /// - Optional `#q2:types` directive row, which is skipped
    /// - Subsequent rows: sample ID followed by variable values
    ///
    /// Columns are inferred as continuous if all values parse as numbers,
    /// otherwise categorical.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse metadata from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| DecontamError::EmptyTable("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(DecontamError::EmptyTable(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let mut seen_columns = HashSet::with_capacity(column_names.len());
        for name in &column_names {
            if !seen_columns.insert(name.as_str()) {
                return Err(DecontamError::DuplicateId {
                    kind: "column",
                    id: name.clone(),
                });
            }
        }

        let mut raw_data: Vec<(String, Vec<String>)> = Vec::new();
        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() || line.starts_with("#q2:") {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            // Short rows leave trailing columns missing; long rows have no column to go to.
            if fields.len() > header.len() {
                return Err(DecontamError::DimensionMismatch {
                    expected: column_names.len(),
                    actual: fields.len() - 1,
                });
            }
            let sample_id = fields[0].trim().to_string();
            let values: Vec<String> = fields[1..].iter().map(|s| s.to_string()).collect();
            raw_data.push((sample_id, values));
        }

        if raw_data.is_empty() {
            return Err(DecontamError::EmptyTable("No samples in metadata".to_string()));
        }

        let mut column_types = HashMap::new();
        for (col_idx, col_name) in column_names.iter().enumerate() {
            let all_numeric = raw_data.iter().all(|(_, values)| {
                if col_idx >= values.len() {
                    return true;
                }
                let v = values[col_idx].trim();
                is_missing_token(v) || v.parse::<f64>().is_ok()
            });
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            column_types.insert(col_name.clone(), var_type);
        }

        let mut sample_ids = Vec::new();
        let mut data = HashMap::new();
        let mut seen = HashSet::new();

        for (sample_id, values) in raw_data {
            if !seen.insert(sample_id.clone()) {
                return Err(DecontamError::DuplicateId {
                    kind: "sample",
                    id: sample_id,
                });
            }
            sample_ids.push(sample_id.clone());
            let mut sample_data = HashMap::new();

            for (col_idx, col_name) in column_names.iter().enumerate() {
                let raw = values.get(col_idx).map(|v| v.trim()).unwrap_or("");
                let var = if is_missing_token(raw) {
                    Variable::Missing
                } else {
                    match column_types.get(col_name) {
                        Some(VariableType::Continuous) => raw
                            .parse::<f64>()
                            .map(Variable::Continuous)
                            .unwrap_or(Variable::Missing),
                        Some(VariableType::Categorical) | None => {
                            Variable::Categorical(raw.to_string())
                        }
                    }
                };
                sample_data.insert(col_name.clone(), var);
            }
            data.insert(sample_id, sample_data);
        }

        Ok(Self {
            sample_ids,
            column_names,
            data,
            column_types,
        })
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Get a variable value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// Resolve a column reference to the column name.
    pub fn resolve(&self, column: &ColumnRef) -> Result<&str> {
        match column {
            ColumnRef::Name(name) => self
                .column_names
                .iter()
                .find(|c| *c == name)
                .map(String::as_str)
                .ok_or_else(|| DecontamError::MissingColumn(name.clone())),
            ColumnRef::Index(idx) => self
                .column_names
                .get(*idx)
                .map(String::as_str)
                .ok_or_else(|| {
                    DecontamError::MissingColumn(format!(
                        "#{} (metadata has {} columns)",
                        idx,
                        self.column_names.len()
                    ))
                }),
        }
    }

    /// Get all values for a column, in sample order.
    pub fn column(&self, column: &str) -> Result<Vec<&Variable>> {
        if !self.has_column(column) {
            return Err(DecontamError::MissingColumn(column.to_string()));
        }
        Ok(self
            .sample_ids
            .iter()
            .map(|sid| {
                self.data
                    .get(sid)
                    .and_then(|m| m.get(column))
                    .unwrap_or(&Variable::Missing)
            })
            .collect())
    }

    /// Get the type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Get unique levels for a categorical column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let values = self.column(column)?;
        let mut levels: Vec<String> = values
            .iter()
            .filter_map(|v| match v {
                Variable::Categorical(s) => Some(s.clone()),
                Variable::Continuous(x) => Some(x.to_string()),
                Variable::Missing => None,
            })
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        levels.sort();
        Ok(levels)
    }

    /// Check if a sample exists.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || raw == "NA" || raw == "na" || raw == "NaN"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample-id\tSample_or_Control\tquant_reading\tis_neg").unwrap();
        writeln!(file, "#q2:types\tcategorical\tnumeric\tcategorical").unwrap();
        writeln!(file, "S1\tControl\t0.5\tTRUE").unwrap();
        writeln!(file, "S2\tSample\t12.5\tFALSE").unwrap();
        writeln!(file, "S3\tControl\t0.7\tTRUE").unwrap();
        writeln!(file, "S4\tSample\t30\tFALSE").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_metadata() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.n_samples(), 4);
        assert_eq!(meta.sample_ids(), &["S1", "S2", "S3", "S4"]);
        assert_eq!(meta.column_names(), &["Sample_or_Control", "quant_reading", "is_neg"]);
    }

    #[test]
    fn test_column_type_inference() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.column_type("Sample_or_Control"), Some(VariableType::Categorical));
        assert_eq!(meta.column_type("quant_reading"), Some(VariableType::Continuous));
        assert_eq!(meta.get("S4", "quant_reading"), Some(&Variable::Continuous(30.0)));
    }

    #[test]
    fn test_resolve_by_name_and_index() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.resolve(&ColumnRef::from("quant_reading")).unwrap(), "quant_reading");
        assert_eq!(meta.resolve(&ColumnRef::Index(0)).unwrap(), "Sample_or_Control");
        assert!(matches!(
            meta.resolve(&ColumnRef::Index(7)),
            Err(DecontamError::MissingColumn(_))
        ));
        assert!(matches!(
            meta.resolve(&ColumnRef::from("nope")),
            Err(DecontamError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_column_ref_parse() {
        assert_eq!(ColumnRef::parse("#2"), ColumnRef::Index(2));
        assert_eq!(ColumnRef::parse("quant"), ColumnRef::Name("quant".to_string()));
        assert_eq!(ColumnRef::parse("#abc"), ColumnRef::Name("#abc".to_string()));
    }

    #[test]
    fn test_boolean_and_label_matching() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.get("S1", "is_neg").unwrap().as_bool(), Some(true));
        assert_eq!(meta.get("S2", "is_neg").unwrap().as_bool(), Some(false));
        assert!(meta.get("S3", "Sample_or_Control").unwrap().matches_label("Control"));
        assert!(Variable::Continuous(1.0).matches_label("1"));
        assert_eq!(meta.levels("Sample_or_Control").unwrap(), vec!["Control", "Sample"]);
    }

    #[test]
    fn test_duplicate_sample_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample-id\tgroup").unwrap();
        writeln!(file, "S1\ta").unwrap();
        writeln!(file, "S1\tb").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            Metadata::from_tsv(file.path()),
            Err(DecontamError::DuplicateId { kind: "sample", .. })
        ));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample-id\tgroup\tgroup").unwrap();
        writeln!(file, "S1\ta\tb").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            Metadata::from_tsv(file.path()),
            Err(DecontamError::DuplicateId { kind: "column", .. })
        ));
    }

    #[test]
    fn test_row_longer_than_header_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample-id\tgroup\tconc").unwrap();
        writeln!(file, "S1\ta\t1.5").unwrap();
        writeln!(file, "S2\tb\t2.5\textra").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            Metadata::from_tsv(file.path()),
            Err(DecontamError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_short_row_leaves_trailing_columns_missing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample-id\tgroup\tconc").unwrap();
        writeln!(file, "S1\ta\t1.5").unwrap();
        writeln!(file, "S2\tb").unwrap();
        file.flush().unwrap();

        let meta = Metadata::from_tsv(file.path()).unwrap();
        assert!(meta.get("S2", "conc").unwrap().is_missing());
    }

    #[test]
    fn test_missing_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tgroup\tconc").unwrap();
        writeln!(file, "S1\tcontrol\t25").unwrap();
        writeln!(file, "S2\ttreatment\tNA").unwrap();
        writeln!(file, "S3\t\t30").unwrap();
        file.flush().unwrap();

        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert!(meta.get("S2", "conc").unwrap().is_missing());
        assert!(meta.get("S3", "group").unwrap().is_missing());
    }
}
