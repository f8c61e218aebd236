//! Per-feature contamination scores and their TSV form.

use crate::config::DeconMethod;
use crate::data::count_matrix::FEATURE_ID_HEADER;
use crate::error::{DecontamError, Result};
use crate::io::write_atomic;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// A score table column, in fixed output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreColumn {
    Freq,
    Prev,
    PFreq,
    PPrev,
    P,
}

impl ScoreColumn {
    /// Header label.
    pub fn header(&self) -> &'static str {
        match self {
            Self::Freq => "freq",
            Self::Prev => "prev",
            Self::PFreq => "p.freq",
            Self::PPrev => "p.prev",
            Self::P => "p",
        }
    }

    fn from_header(label: &str) -> Option<Self> {
        match label.trim() {
            "freq" => Some(Self::Freq),
            "prev" => Some(Self::Prev),
            "p.freq" => Some(Self::PFreq),
            "p.prev" => Some(Self::PPrev),
            "p" => Some(Self::P),
            _ => None,
        }
    }

    /// Columns written for a method.
    pub fn for_method(method: DeconMethod) -> &'static [ScoreColumn] {
        match method {
            DeconMethod::Frequency => &[Self::Freq, Self::PFreq, Self::P],
            DeconMethod::Prevalence => &[Self::Prev, Self::PPrev, Self::P],
            DeconMethod::Combined => &[Self::Freq, Self::Prev, Self::PFreq, Self::PPrev, Self::P],
        }
    }
}

/// Scores for a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Feature identifier.
    pub feature_id: String,
    /// Mean relative abundance across samples.
    pub freq: Option<f64>,
    /// Number of samples in which the feature is present.
    pub prev: Option<u64>,
    /// Frequency score.
    pub p_freq: Option<f64>,
    /// Prevalence score.
    pub p_prev: Option<f64>,
    /// Final score; lower is more contaminant-like.
    pub p: f64,
}

impl ScoreEntry {
    fn value(&self, column: ScoreColumn) -> Option<f64> {
        match column {
            ScoreColumn::Freq => self.freq,
            ScoreColumn::Prev => self.prev.map(|v| v as f64),
            ScoreColumn::PFreq => self.p_freq,
            ScoreColumn::PPrev => self.p_prev,
            ScoreColumn::P => Some(self.p),
        }
    }
}

/// Ordered collection of score entries, unique by feature ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    /// Method that produced the scores.
    pub method: DeconMethod,
    entries: Vec<ScoreEntry>,
}

impl ScoreTable {
    /// Create a score table, checking that every entry carries the columns
    /// the method exposes and that scores are probabilities.
    pub fn new(method: DeconMethod, entries: Vec<ScoreEntry>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.feature_id.as_str()) {
                return Err(DecontamError::DuplicateId {
                    kind: "feature",
                    id: entry.feature_id.clone(),
                });
            }
            for &column in ScoreColumn::for_method(method) {
                let value = entry.value(column).ok_or_else(|| {
                    DecontamError::MalformedScoreTable(format!(
                        "feature '{}' has no '{}' value",
                        entry.feature_id,
                        column.header()
                    ))
                })?;
                if !value.is_finite() {
                    return Err(DecontamError::MalformedScoreTable(format!(
                        "feature '{}' has non-finite '{}'",
                        entry.feature_id,
                        column.header()
                    )));
                }
            }
            if !(0.0..=1.0).contains(&entry.p) {
                return Err(DecontamError::MalformedScoreTable(format!(
                    "feature '{}' has score {} outside [0, 1]",
                    entry.feature_id, entry.p
                )));
            }
        }
        Ok(Self { method, entries })
    }

    /// Number of scored features.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = &ScoreEntry> {
        self.entries.iter()
    }

    /// All entries.
    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    /// Look up a feature.
    pub fn get(&self, feature_id: &str) -> Option<&ScoreEntry> {
        self.entries.iter().find(|e| e.feature_id == feature_id)
    }

    /// Final scores, in entry order.
    pub fn p_values(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.p).collect()
    }

    /// Columns written for this table.
    pub fn columns(&self) -> &'static [ScoreColumn] {
        ScoreColumn::for_method(self.method)
    }

    /// Write the table to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomic(path, |w| self.to_writer(w))
    }

    /// Write the table as TSV.
    ///
    /// Floats use the shortest representation that round-trips exactly.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);

        let mut header = vec![FEATURE_ID_HEADER.to_string()];
        header.extend(self.columns().iter().map(|c| c.header().to_string()));
        csv_writer.write_record(&header)?;

        for entry in &self.entries {
            let mut record = vec![entry.feature_id.clone()];
            for &column in self.columns() {
                let cell = match (column, entry.value(column)) {
                    (ScoreColumn::Prev, Some(v)) => format!("{}", v as u64),
                    (_, Some(v)) => format!("{}", v),
                    (_, None) => String::new(),
                };
                record.push(cell);
            }
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Load a table from a TSV file.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse a TSV score table. The method is inferred from the header.
    ///
    /// Rows with blank or `NA` cells in any required column are skipped with a
    /// warning, matching tables that carry undefined scores.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(DecontamError::MalformedScoreTable(
                "header must contain a feature ID column and at least one score column"
                    .to_string(),
            ));
        }

        let mut positions: HashMap<ScoreColumn, usize> = HashMap::new();
        for (idx, label) in headers.iter().enumerate().skip(1) {
            if let Some(column) = ScoreColumn::from_header(label) {
                positions.insert(column, idx);
            }
        }

        let method = match (
            positions.contains_key(&ScoreColumn::PFreq),
            positions.contains_key(&ScoreColumn::PPrev),
        ) {
            (true, true) => DeconMethod::Combined,
            (true, false) => DeconMethod::Frequency,
            (false, true) => DeconMethod::Prevalence,
            (false, false) => {
                return Err(DecontamError::MalformedScoreTable(
                    "header has neither 'p.freq' nor 'p.prev'".to_string(),
                ))
            }
        };
        for &column in ScoreColumn::for_method(method) {
            if !positions.contains_key(&column) {
                return Err(DecontamError::MalformedScoreTable(format!(
                    "{} table is missing the '{}' column",
                    method,
                    column.header()
                )));
            }
        }

        let mut entries = Vec::new();
        for (row_idx, record) in csv_reader.records().enumerate() {
            let record = record?;
            let feature_id = record.get(0).unwrap_or("").trim().to_string();

            let mut values: HashMap<ScoreColumn, f64> = HashMap::new();
            let mut undefined = false;
            for &column in ScoreColumn::for_method(method) {
                let raw = record.get(positions[&column]).unwrap_or("").trim();
                if raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan") {
                    undefined = true;
                    break;
                }
                let value: f64 = raw.parse().map_err(|_| {
                    DecontamError::MalformedScoreTable(format!(
                        "row {}: '{}' is not a number in column '{}'",
                        row_idx + 1,
                        raw,
                        column.header()
                    ))
                })?;
                values.insert(column, value);
            }
            if undefined {
                warn!("Skipping score row for '{}' with undefined values", feature_id);
                continue;
            }

            entries.push(ScoreEntry {
                feature_id,
                freq: values.get(&ScoreColumn::Freq).copied(),
                prev: values.get(&ScoreColumn::Prev).map(|v| v.round() as u64),
                p_freq: values.get(&ScoreColumn::PFreq).copied(),
                p_prev: values.get(&ScoreColumn::PPrev).copied(),
                p: values[&ScoreColumn::P],
            });
        }

        Self::new(method, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn combined_table() -> ScoreTable {
        ScoreTable::new(
            DeconMethod::Combined,
            vec![
                ScoreEntry {
                    feature_id: "asv1".to_string(),
                    freq: Some(0.123456789),
                    prev: Some(7),
                    p_freq: Some(0.0421),
                    p_prev: Some(0.5),
                    p: 0.0421,
                },
                ScoreEntry {
                    feature_id: "asv2".to_string(),
                    freq: Some(1.0 / 3.0),
                    prev: Some(10),
                    p_freq: Some(0.9),
                    p_prev: Some(0.75),
                    p: 0.75,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_header_order() {
        let table = combined_table();
        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "#OTU ID\tfreq\tprev\tp.freq\tp.prev\tp"
        );
    }

    #[test]
    fn test_frequency_columns_only() {
        let table = ScoreTable::new(
            DeconMethod::Frequency,
            vec![ScoreEntry {
                feature_id: "asv1".to_string(),
                freq: Some(0.2),
                prev: None,
                p_freq: Some(0.3),
                p_prev: None,
                p: 0.3,
            }],
        )
        .unwrap();
        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#OTU ID\tfreq\tp.freq\tp");
        assert_eq!(lines[1], "asv1\t0.2\t0.3\t0.3");
    }

    #[test]
    fn test_roundtrip_preserves_values() {
        let table = combined_table();
        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();

        let parsed = ScoreTable::from_reader(buf.as_slice()).unwrap();
        assert_eq!(parsed.method, DeconMethod::Combined);
        assert_eq!(parsed.len(), 2);
        for (a, b) in parsed.iter().zip(table.iter()) {
            assert_eq!(a.feature_id, b.feature_id);
            assert_eq!(a.prev, b.prev);
            assert_relative_eq!(a.freq.unwrap(), b.freq.unwrap(), epsilon = 1e-6);
            assert_relative_eq!(a.p, b.p, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let err = ScoreTable::new(
            DeconMethod::Prevalence,
            vec![ScoreEntry {
                feature_id: "asv1".to_string(),
                freq: None,
                prev: None,
                p_freq: None,
                p_prev: Some(0.5),
                p: 0.5,
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("'prev'"));
    }

    #[test]
    fn test_na_rows_are_skipped_on_read() {
        let text = "#OTU ID\tprev\tp.prev\tp\nasv1\t3\t0.01\t0.01\nasv2\t0\tNA\tNA\n";
        let table = ScoreTable::from_reader(text.as_bytes()).unwrap();
        assert_eq!(table.method, DeconMethod::Prevalence);
        assert_eq!(table.len(), 1);
        assert!(table.get("asv2").is_none());
    }

    #[test]
    fn test_header_without_scores_rejected() {
        let text = "#OTU ID\tfreq\nasv1\t0.3\n";
        assert!(matches!(
            ScoreTable::from_reader(text.as_bytes()),
            Err(DecontamError::MalformedScoreTable(_))
        ));
    }
}
