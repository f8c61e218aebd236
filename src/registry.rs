//! Catalogue of scoring methods and file formats.
//!
//! The registry is an ordinary value: a front end builds one with
//! [`MethodRegistry::new`] at start-up and passes it by reference to whatever
//! needs to list or look up methods.

use crate::config::DeconMethod;
use crate::data::ScoreColumn;
use crate::error::{DecontamError, Result};
use serde::Serialize;
use std::fmt;

/// Description of one scoring method.
#[derive(Debug, Clone, Serialize)]
pub struct MethodInfo {
    pub method: DeconMethod,
    pub description: &'static str,
    /// Parameters that must be set to run the method.
    pub required_params: Vec<&'static str>,
    /// Score table columns after `#OTU ID`.
    pub columns: Vec<&'static str>,
}

/// A file format read or written by the tool.
#[derive(Debug, Clone, Serialize)]
pub struct FormatInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Registered methods and formats.
#[derive(Debug, Clone, Serialize)]
pub struct MethodRegistry {
    methods: Vec<MethodInfo>,
    formats: Vec<FormatInfo>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    /// Registry with the built-in methods and formats.
    pub fn new() -> Self {
        let methods = DeconMethod::ALL
            .into_iter()
            .map(|method| MethodInfo {
                method,
                description: describe(method),
                required_params: required_params(method),
                columns: ScoreColumn::for_method(method)
                    .iter()
                    .map(|c| c.header())
                    .collect(),
            })
            .collect();

        let formats = vec![
            FormatInfo {
                name: "feature-table",
                description: "TSV, features as rows and samples as columns, '#OTU ID' header",
            },
            FormatInfo {
                name: "sample-metadata",
                description: "TSV, one row per sample, first column is the sample ID",
            },
            FormatInfo {
                name: "score-table",
                description: "TSV, '#OTU ID' then the method's score columns",
            },
            FormatInfo {
                name: "summary",
                description: "Contaminant counts and histogram as text, JSON or YAML",
            },
        ];

        Self { methods, formats }
    }

    /// All methods, in display order.
    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    /// All formats.
    pub fn formats(&self) -> &[FormatInfo] {
        &self.formats
    }

    /// Look up a method by name (case-insensitive).
    pub fn get(&self, name: &str) -> Result<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.method.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = self.methods.iter().map(|m| m.method.name()).collect();
                DecontamError::invalid_parameter(
                    "decon_method",
                    format!("unknown method '{}', expected one of: {}", name, known.join(", ")),
                )
            })
    }
}

fn describe(method: DeconMethod) -> &'static str {
    match method {
        DeconMethod::Frequency => {
            "Relative abundance inversely proportional to DNA concentration"
        }
        DeconMethod::Prevalence => "Presence more frequent in negative controls than in samples",
        DeconMethod::Combined => "Minimum (or Fisher combination) of frequency and prevalence scores",
    }
}

fn required_params(method: DeconMethod) -> Vec<&'static str> {
    let mut params = Vec::new();
    if method.uses_frequency() {
        params.push("freq_concentration_column");
    }
    if method.uses_prevalence() {
        params.push("prev_control_or_exp_sample_column");
    }
    params
}

impl fmt::Display for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Methods:")?;
        for info in &self.methods {
            writeln!(f, "  {:<12} {}", info.method.name(), info.description)?;
            writeln!(f, "  {:<12} requires: {}", "", info.required_params.join(", "))?;
            writeln!(f, "  {:<12} columns:  {}", "", info.columns.join(", "))?;
        }
        writeln!(f)?;
        writeln!(f, "Formats:")?;
        for format in &self.formats {
            writeln!(f, "  {:<16} {}", format.name, format.description)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_methods_registered() {
        let registry = MethodRegistry::new();
        assert_eq!(registry.methods().len(), 3);
        assert_eq!(registry.formats().len(), 4);
    }

    #[test]
    fn test_lookup() {
        let registry = MethodRegistry::new();
        let combined = registry.get("Combined").unwrap();
        assert_eq!(combined.method, DeconMethod::Combined);
        assert_eq!(
            combined.required_params,
            vec!["freq_concentration_column", "prev_control_or_exp_sample_column"]
        );
        assert_eq!(combined.columns, vec!["freq", "prev", "p.freq", "p.prev", "p"]);
    }

    #[test]
    fn test_unknown_method() {
        let registry = MethodRegistry::new();
        let err = registry.get("abundance").unwrap_err();
        assert!(err.is_input_validation());
        assert!(err.to_string().contains("decon_method"));
    }

    #[test]
    fn test_listing() {
        let text = MethodRegistry::new().to_string();
        assert!(text.contains("frequency"));
        assert!(text.contains("score-table"));
    }
}
