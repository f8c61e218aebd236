//! Aligning a feature table with sample metadata.
//!
//! Scorers never touch [`Metadata`] directly: this module resolves the
//! configured columns and produces per-sample vectors in the table's sample
//! order.

use crate::config::{ControlSelector, MethodPlan};
use crate::data::{ColumnRef, CountMatrix, Metadata, Variable};
use crate::error::{DecontamError, Result};
use log::{info, warn};

/// Table plus the per-sample signals a method needs, in table sample order.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    /// The feature table (features × samples).
    pub counts: CountMatrix,
    /// DNA concentration per sample; `None` where the value is missing.
    pub concentrations: Option<Vec<Option<f64>>>,
    /// Control flag per sample; `None` where the label is missing.
    pub controls: Option<Vec<Option<bool>>>,
}

/// Validate inputs and extract the signals required by `plan`.
pub fn prepare(counts: &CountMatrix, metadata: &Metadata, plan: &MethodPlan) -> Result<PreparedInput> {
    if counts.n_features() == 0 {
        return Err(DecontamError::EmptyTable(
            "No features remain in the table; an upstream step may have removed them all"
                .to_string(),
        ));
    }
    if counts.n_samples() == 0 {
        return Err(DecontamError::EmptyTable("No samples in the table".to_string()));
    }

    let missing: Vec<&str> = counts
        .sample_ids()
        .iter()
        .filter(|sid| !metadata.has_sample(sid))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        let shown: Vec<&str> = missing.iter().take(5).copied().collect();
        return Err(DecontamError::SampleMismatch(format!(
            "{} table sample(s) have no metadata row: {}{}",
            missing.len(),
            shown.join(", "),
            if missing.len() > shown.len() { ", ..." } else { "" }
        )));
    }

    let concentrations = plan
        .concentration()
        .map(|column| concentrations_from_metadata(counts, metadata, column))
        .transpose()?;
    let controls = plan
        .controls()
        .map(|selector| control_flags_from_metadata(counts, metadata, selector))
        .transpose()?;

    info!(
        "Prepared {} features x {} samples for {} scoring",
        counts.n_features(),
        counts.n_samples(),
        plan.method()
    );

    Ok(PreparedInput {
        counts: counts.clone(),
        concentrations,
        controls,
    })
}

/// Read the DNA concentration of every table sample.
///
/// Concentrations must be strictly positive. Missing values are kept as
/// `None`; the frequency scorer skips those samples.
pub fn concentrations_from_metadata(
    counts: &CountMatrix,
    metadata: &Metadata,
    column: &ColumnRef,
) -> Result<Vec<Option<f64>>> {
    let name = metadata.resolve(column).map_err(|_| {
        DecontamError::MissingCovariate(format!(
            "freq_concentration_column '{}' is not a metadata column",
            column
        ))
    })?;

    let mut values = Vec::with_capacity(counts.n_samples());
    for sample_id in counts.sample_ids() {
        let value = match metadata.get(sample_id, name) {
            Some(Variable::Continuous(v)) if *v > 0.0 => Some(*v),
            Some(Variable::Continuous(v)) => {
                return Err(DecontamError::invalid_parameter(
                    "freq_concentration_column",
                    format!(
                        "concentrations must be positive, sample '{}' has {}",
                        sample_id, v
                    ),
                ))
            }
            Some(Variable::Categorical(raw)) => {
                return Err(DecontamError::InvalidVariableType {
                    column: name.to_string(),
                    reason: format!("expected numeric concentration, found '{}'", raw),
                })
            }
            Some(Variable::Missing) | None => {
                warn!(
                    "Sample '{}' has no value in '{}'; excluded from frequency scoring",
                    sample_id, name
                );
                None
            }
        };
        values.push(value);
    }

    if values.iter().all(Option::is_none) {
        return Err(DecontamError::MissingCovariate(format!(
            "freq_concentration_column '{}' has no values for the table's samples",
            name
        )));
    }
    Ok(values)
}

/// Classify every table sample as control (`true`) or experimental (`false`).
pub fn control_flags_from_metadata(
    counts: &CountMatrix,
    metadata: &Metadata,
    selector: &ControlSelector,
) -> Result<Vec<Option<bool>>> {
    let name = metadata.resolve(selector.column()).map_err(|_| {
        DecontamError::InvalidControlSpec(format!(
            "prev_control_or_exp_sample_column '{}' is not a metadata column",
            selector.column()
        ))
    })?;

    let flags: Vec<Option<bool>> = match selector {
        ControlSelector::Indicator { value, .. } => {
            let known = metadata
                .column(name)?
                .iter()
                .any(|v| v.matches_label(value));
            if !known {
                return Err(DecontamError::InvalidControlSpec(format!(
                    "prev_control_sample_indicator '{}' does not occur in column '{}' (values: {})",
                    value,
                    name,
                    metadata.levels(name)?.join(", ")
                )));
            }
            counts
                .sample_ids()
                .iter()
                .map(|sid| {
                    metadata
                        .get(sid, name)
                        .filter(|v| !v.is_missing())
                        .map(|v| v.matches_label(value))
                })
                .collect()
        }
        ControlSelector::Column(_) => {
            let mut flags = Vec::with_capacity(counts.n_samples());
            for sid in counts.sample_ids() {
                let flag = match metadata.get(sid, name) {
                    Some(Variable::Missing) | None => None,
                    Some(v) => Some(v.as_bool().ok_or_else(|| {
                        DecontamError::InvalidControlSpec(format!(
                            "column '{}' is not a boolean indicator (sample '{}'); \
                             set prev_control_sample_indicator to select controls by value",
                            name, sid
                        ))
                    })?),
                };
                flags.push(flag);
            }
            flags
        }
    };

    let n_missing = flags.iter().filter(|f| f.is_none()).count();
    if n_missing > 0 {
        warn!(
            "{} sample(s) have no label in '{}'; excluded from prevalence scoring",
            n_missing, name
        );
    }
    if !flags.contains(&Some(true)) {
        return Err(DecontamError::MissingControlLabel(format!(
            "no sample in the table is labelled control by column '{}'",
            name
        )));
    }
    if !flags.contains(&Some(false)) {
        return Err(DecontamError::InvalidControlSpec(format!(
            "every labelled sample is a control in column '{}'; at least one experimental sample is required",
            name
        )));
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrevalenceTest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn counts() -> CountMatrix {
        CountMatrix::from_rows(
            &[vec![1.0, 0.0, 3.0, 4.0], vec![5.0, 6.0, 0.0, 8.0]],
            vec!["asv1".into(), "asv2".into()],
            vec!["S1".into(), "S2".into(), "S3".into(), "S4".into()],
        )
        .unwrap()
    }

    fn metadata(rows: &[&str]) -> Metadata {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample-id\tkind\tconc\tneg").unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        file.flush().unwrap();
        Metadata::from_tsv(file.path()).unwrap()
    }

    fn standard_metadata() -> Metadata {
        metadata(&[
            "S1\tControl\t0.5\ttrue",
            "S2\tSample\t10\tfalse",
            "S3\tControl\tNA\ttrue",
            "S4\tSample\t20\tfalse",
        ])
    }

    fn prevalence_plan(selector: ControlSelector) -> MethodPlan {
        MethodPlan::Prevalence {
            controls: selector,
            test: PrevalenceTest::Fisher,
        }
    }

    #[test]
    fn test_concentrations_with_missing_value() {
        let plan = MethodPlan::Frequency {
            concentration: "conc".into(),
        };
        let prepared = prepare(&counts(), &standard_metadata(), &plan).unwrap();
        assert_eq!(
            prepared.concentrations.unwrap(),
            vec![Some(0.5), Some(10.0), None, Some(20.0)]
        );
        assert!(prepared.controls.is_none());
    }

    #[test]
    fn test_missing_concentration_column() {
        let plan = MethodPlan::Frequency {
            concentration: "dna".into(),
        };
        let err = prepare(&counts(), &standard_metadata(), &plan).unwrap_err();
        assert!(matches!(err, DecontamError::MissingCovariate(_)));
    }

    #[test]
    fn test_nonpositive_concentration_rejected() {
        let meta = metadata(&[
            "S1\tControl\t0\ttrue",
            "S2\tSample\t10\tfalse",
            "S3\tControl\t1\ttrue",
            "S4\tSample\t20\tfalse",
        ]);
        let plan = MethodPlan::Frequency {
            concentration: "conc".into(),
        };
        let err = prepare(&counts(), &meta, &plan).unwrap_err();
        assert!(err.to_string().contains("freq_concentration_column"));
    }

    #[test]
    fn test_indicator_selector() {
        let selector = ControlSelector::Indicator {
            column: ColumnRef::Index(0),
            value: "Control".to_string(),
        };
        let prepared = prepare(&counts(), &standard_metadata(), &prevalence_plan(selector)).unwrap();
        assert_eq!(
            prepared.controls.unwrap(),
            vec![Some(true), Some(false), Some(true), Some(false)]
        );
    }

    #[test]
    fn test_boolean_column_selector() {
        let selector = ControlSelector::Column("neg".into());
        let prepared = prepare(&counts(), &standard_metadata(), &prevalence_plan(selector)).unwrap();
        assert_eq!(
            prepared.controls.unwrap(),
            vec![Some(true), Some(false), Some(true), Some(false)]
        );
    }

    #[test]
    fn test_non_boolean_column_rejected() {
        let selector = ControlSelector::Column("kind".into());
        let err = prepare(&counts(), &standard_metadata(), &prevalence_plan(selector)).unwrap_err();
        assert!(matches!(err, DecontamError::InvalidControlSpec(_)));
    }

    #[test]
    fn test_unknown_indicator_value() {
        let selector = ControlSelector::Indicator {
            column: "kind".into(),
            value: "Blank".to_string(),
        };
        let err = prepare(&counts(), &standard_metadata(), &prevalence_plan(selector)).unwrap_err();
        assert!(matches!(err, DecontamError::InvalidControlSpec(_)));
        assert!(err.to_string().contains("Blank"));
        assert!(err.to_string().contains("Control, Sample"));
    }

    #[test]
    fn test_unknown_control_column() {
        let selector = ControlSelector::Column(ColumnRef::Index(9));
        let err = prepare(&counts(), &standard_metadata(), &prevalence_plan(selector)).unwrap_err();
        assert!(matches!(err, DecontamError::InvalidControlSpec(_)));
    }

    #[test]
    fn test_no_controls() {
        let meta = metadata(&[
            "S1\tSample\t1\tfalse",
            "S2\tSample\t10\tfalse",
            "S3\tSample\t2\tfalse",
            "S4\tSample\t20\tfalse",
        ]);
        let selector = ControlSelector::Column("neg".into());
        let err = prepare(&counts(), &meta, &prevalence_plan(selector)).unwrap_err();
        assert!(matches!(err, DecontamError::MissingControlLabel(_)));
    }

    #[test]
    fn test_sample_without_metadata() {
        let meta = metadata(&[
            "S1\tControl\t0.5\ttrue",
            "S2\tSample\t10\tfalse",
            "S4\tSample\t20\tfalse",
        ]);
        let plan = MethodPlan::Frequency {
            concentration: "conc".into(),
        };
        let err = prepare(&counts(), &meta, &plan).unwrap_err();
        assert!(matches!(err, DecontamError::SampleMismatch(_)));
        assert!(err.to_string().contains("S3"));
    }
}
