//! End-to-end contaminant identification and removal.

use crate::config::{CombineRule, DeconMethod, IdentifyConfig, IdentifyParams, PrevalenceTest};
use crate::data::{ColumnRef, CountMatrix, Metadata, ScoreTable};
use crate::error::{DecontamError, Result};
use crate::filter::{remove, RemovalSummary};
use crate::prepare::prepare;
use crate::score::score_features;
use log::info;

/// Score every feature of `counts` with the configured method.
///
/// Features whose score is undefined are left out of the table. Fails with
/// [`DecontamError::EmptyResult`] if no feature could be scored.
pub fn identify(counts: &CountMatrix, metadata: &Metadata, config: &IdentifyConfig) -> Result<ScoreTable> {
    let input = prepare(counts, metadata, &config.plan)?;
    let scores = score_features(&input, &config.plan)?;

    if scores.is_empty() {
        return Err(DecontamError::EmptyResult(format!(
            "no feature could be scored with the {} method",
            config.plan.method()
        )));
    }

    let n_contaminants = scores
        .iter()
        .filter(|e| config.threshold.is_contaminant(e.p))
        .count();
    info!(
        "Scored {} of {} features; {} at or below threshold {}",
        scores.len(),
        counts.n_features(),
        n_contaminants,
        config.threshold
    );
    Ok(scores)
}

/// Output of [`Decontam::run`].
#[derive(Debug, Clone)]
pub struct DecontamRun {
    pub scores: ScoreTable,
    pub cleaned: CountMatrix,
    pub summary: RemovalSummary,
}

/// Builder for configuring and running contaminant identification.
#[derive(Debug, Clone, Default)]
pub struct Decontam {
    params: IdentifyParams,
}

impl Decontam {
    /// Start from default parameters (prevalence method, threshold 0.1).
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a parameter set.
    pub fn from_params(params: &IdentifyParams) -> Self {
        Self {
            params: params.clone(),
        }
    }

    /// Set the scoring method.
    pub fn method(mut self, method: DeconMethod) -> Self {
        self.params.decon_method = method;
        self
    }

    /// Set the score threshold.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.params.threshold = threshold;
        self
    }

    /// Metadata column holding DNA concentrations.
    pub fn concentration_column(mut self, column: &str) -> Self {
        self.params.freq_concentration_column = Some(ColumnRef::parse(column));
        self
    }

    /// Metadata column marking control samples.
    ///
    /// Without [`Decontam::control_indicator`] the column is read as a boolean.
    pub fn control_column(mut self, column: &str) -> Self {
        self.params.prev_control_or_exp_sample_column = Some(ColumnRef::parse(column));
        self
    }

    /// Value in the control column that marks control samples.
    pub fn control_indicator(mut self, value: &str) -> Self {
        self.params.prev_control_sample_indicator = Some(value.to_string());
        self
    }

    /// Test used by the prevalence scorer.
    pub fn prevalence_test(mut self, test: PrevalenceTest) -> Self {
        self.params.prev_test = test;
        self
    }

    /// Rule merging scores for the combined method.
    pub fn combine_rule(mut self, rule: CombineRule) -> Self {
        self.params.combine_rule = rule;
        self
    }

    /// The parameters collected so far.
    pub fn params(&self) -> &IdentifyParams {
        &self.params
    }

    /// Score features.
    pub fn identify(&self, counts: &CountMatrix, metadata: &Metadata) -> Result<ScoreTable> {
        let config = self.params.validate()?;
        identify(counts, metadata, &config)
    }

    /// Score features, then remove contaminants at the configured threshold.
    pub fn run(&self, counts: &CountMatrix, metadata: &Metadata) -> Result<DecontamRun> {
        let config = self.params.validate()?;
        let scores = identify(counts, metadata, &config)?;
        let (cleaned, summary) = remove(&scores, counts, config.threshold)?;
        Ok(DecontamRun {
            scores,
            cleaned,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// 8 samples, S1-S3 are blanks. `contam` sits in every blank and at
    /// roughly 100/conc reads elsewhere; `real` is spread evenly.
    fn create_test_data() -> (CountMatrix, Metadata) {
        let conc = [0.5, 0.5, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0];
        let contam: Vec<f64> = vec![60.0, 55.0, 70.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let real = vec![0.0, 0.0, 0.0, 500.0, 520.0, 480.0, 510.0, 490.0];
        let other = vec![40.0, 45.0, 30.0, 500.0, 480.0, 520.0, 490.0, 510.0];
        let counts = CountMatrix::from_rows(
            &[contam, real, other],
            vec!["contam".into(), "real".into(), "other".into()],
            (1..=8).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample-id\ttype\tconc").unwrap();
        for (i, c) in conc.iter().enumerate() {
            let kind = if i < 3 { "blank" } else { "sample" };
            writeln!(file, "S{}\t{}\t{}", i + 1, kind, c).unwrap();
        }
        file.flush().unwrap();
        let metadata = Metadata::from_tsv(file.path()).unwrap();
        (counts, metadata)
    }

    #[test]
    fn test_builder_prevalence() {
        let (counts, metadata) = create_test_data();
        let scores = Decontam::new()
            .control_column("type")
            .control_indicator("blank")
            .identify(&counts, &metadata)
            .unwrap();

        assert_eq!(scores.method, DeconMethod::Prevalence);
        assert!(scores.get("contam").unwrap().p < 0.1);
        assert!(scores.get("real").unwrap().p > 0.5);
    }

    #[test]
    fn test_run_removes_contaminant() {
        let (counts, metadata) = create_test_data();
        let run = Decontam::new()
            .control_column("type")
            .control_indicator("blank")
            .threshold(0.1)
            .run(&counts, &metadata)
            .unwrap();

        assert_eq!(run.cleaned.feature_ids(), &["real", "other"]);
        assert_eq!(run.summary.removed_features, vec!["contam"]);
    }

    #[test]
    fn test_builder_chi_squared() {
        let (counts, metadata) = create_test_data();
        let fisher = Decontam::new()
            .control_column("type")
            .control_indicator("blank")
            .identify(&counts, &metadata)
            .unwrap();
        let chi2 = Decontam::new()
            .control_column("type")
            .control_indicator("blank")
            .prevalence_test(PrevalenceTest::ChiSquared)
            .identify(&counts, &metadata)
            .unwrap();

        assert_eq!(chi2.len(), fisher.len());
        assert!(chi2.get("contam").unwrap().p < 0.05);
        assert!(chi2.get("real").unwrap().p > 0.5);
    }

    #[test]
    fn test_combined_requires_concentration() {
        let (counts, metadata) = create_test_data();
        let err = Decontam::new()
            .method(DeconMethod::Combined)
            .control_column("type")
            .control_indicator("blank")
            .identify(&counts, &metadata)
            .unwrap_err();
        assert!(err.is_input_validation());
        assert!(err.to_string().contains("freq_concentration_column"));
    }

    #[test]
    fn test_frequency_without_scorable_features() {
        // Every feature is in a single sample, so no frequency score is defined
        let counts = CountMatrix::from_rows(
            &[
                vec![10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                vec![0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ],
            vec!["a".into(), "b".into()],
            (1..=8).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();
        let (_, metadata) = create_test_data();
        let err = Decontam::new()
            .method(DeconMethod::Frequency)
            .concentration_column("conc")
            .identify(&counts, &metadata)
            .unwrap_err();
        assert!(matches!(err, DecontamError::EmptyResult(_)));
    }

    #[test]
    fn test_params_roundtrip_through_yaml() {
        let builder = Decontam::new()
            .method(DeconMethod::Combined)
            .concentration_column("conc")
            .control_column("type")
            .control_indicator("blank")
            .combine_rule(CombineRule::Fisher);
        let yaml = builder.params().to_yaml().unwrap();
        let parsed = IdentifyParams::from_yaml(&yaml).unwrap();
        assert_eq!(&parsed, builder.params());
    }
}
