//! Typed configuration for contaminant identification.
//!
//! [`IdentifyParams`] is the flat, serializable form accepted from YAML files
//! and the command line. [`IdentifyParams::validate`] turns it into an
//! [`IdentifyConfig`] whose fields can only hold valid values, so scoring code
//! never re-checks parameters.

use crate::data::ColumnRef;
use crate::error::{DecontamError, Result};
use crate::io::write_atomic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Default score threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Scoring method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeconMethod {
    /// Relative abundance vs. DNA concentration.
    Frequency,
    /// Presence in control vs. experimental samples.
    Prevalence,
    /// Both signals merged into one score.
    Combined,
}

impl DeconMethod {
    /// All methods, in display order.
    pub const ALL: [DeconMethod; 3] = [
        DeconMethod::Frequency,
        DeconMethod::Prevalence,
        DeconMethod::Combined,
    ];

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Frequency => "frequency",
            Self::Prevalence => "prevalence",
            Self::Combined => "combined",
        }
    }

    /// Whether this method needs a concentration covariate.
    pub fn uses_frequency(&self) -> bool {
        matches!(self, Self::Frequency | Self::Combined)
    }

    /// Whether this method needs control labels.
    pub fn uses_prevalence(&self) -> bool {
        matches!(self, Self::Prevalence | Self::Combined)
    }
}

impl fmt::Display for DeconMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeconMethod {
    type Err = DecontamError;

    fn from_str(s: &str) -> Result<Self> {
        DeconMethod::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DecontamError::invalid_parameter(
                    "decon_method",
                    format!("'{}' is not one of frequency, prevalence or combined", s),
                )
            })
    }
}

/// Score cutoff in (0, 1]; features with `p <= threshold` are contaminants.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    /// Validate a raw threshold.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(DecontamError::invalid_parameter(
                "threshold",
                format!("must be in (0, 1], got {}", value),
            ))
        }
    }

    /// The raw value.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// The contaminant decision rule.
    #[inline]
    pub fn is_contaminant(&self, p: f64) -> bool {
        p <= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl TryFrom<f64> for Threshold {
    type Error = DecontamError;

    fn try_from(value: f64) -> Result<Self> {
        Threshold::new(value)
    }
}

impl From<Threshold> for f64 {
    fn from(t: Threshold) -> f64 {
        t.0
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How control samples are identified in the metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlSelector {
    /// A column holding a boolean indicator (true = control).
    Column(ColumnRef),
    /// A column where samples equal to `value` are controls.
    Indicator { column: ColumnRef, value: String },
}

impl ControlSelector {
    /// The referenced column.
    pub fn column(&self) -> &ColumnRef {
        match self {
            ControlSelector::Column(column) => column,
            ControlSelector::Indicator { column, .. } => column,
        }
    }
}

/// Statistical test used by the prevalence scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrevalenceTest {
    /// One-sided mid-p Fisher exact test.
    #[default]
    Fisher,
    /// One-sided Pearson chi-squared test.
    ChiSquared,
}

/// Rule merging frequency and prevalence scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineRule {
    /// `p = min(p.freq, p.prev)`.
    #[default]
    Minimum,
    /// Fisher's method: chi-squared with 4 df on `-2 ln(p.freq * p.prev)`.
    Fisher,
}

/// What to score and with which inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodPlan {
    Frequency {
        concentration: ColumnRef,
    },
    Prevalence {
        controls: ControlSelector,
        test: PrevalenceTest,
    },
    Combined {
        concentration: ColumnRef,
        controls: ControlSelector,
        test: PrevalenceTest,
        rule: CombineRule,
    },
}

impl MethodPlan {
    /// The method this plan runs.
    pub fn method(&self) -> DeconMethod {
        match self {
            MethodPlan::Frequency { .. } => DeconMethod::Frequency,
            MethodPlan::Prevalence { .. } => DeconMethod::Prevalence,
            MethodPlan::Combined { .. } => DeconMethod::Combined,
        }
    }

    /// Concentration column, if the plan uses one.
    pub fn concentration(&self) -> Option<&ColumnRef> {
        match self {
            MethodPlan::Frequency { concentration } | MethodPlan::Combined { concentration, .. } => {
                Some(concentration)
            }
            MethodPlan::Prevalence { .. } => None,
        }
    }

    /// Control selector, if the plan uses one.
    pub fn controls(&self) -> Option<&ControlSelector> {
        match self {
            MethodPlan::Prevalence { controls, .. } | MethodPlan::Combined { controls, .. } => {
                Some(controls)
            }
            MethodPlan::Frequency { .. } => None,
        }
    }
}

/// Validated configuration for `identify`.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifyConfig {
    pub plan: MethodPlan,
    pub threshold: Threshold,
}

/// Flat parameter set, as read from YAML or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyParams {
    pub decon_method: DeconMethod,
    pub threshold: f64,
    pub freq_concentration_column: Option<ColumnRef>,
    pub prev_control_or_exp_sample_column: Option<ColumnRef>,
    /// Value marking control samples; when absent the column is read as a boolean.
    pub prev_control_sample_indicator: Option<String>,
    pub prev_test: PrevalenceTest,
    pub combine_rule: CombineRule,
}

impl Default for IdentifyParams {
    fn default() -> Self {
        Self {
            decon_method: DeconMethod::Prevalence,
            threshold: DEFAULT_THRESHOLD,
            freq_concentration_column: None,
            prev_control_or_exp_sample_column: None,
            prev_control_sample_indicator: None,
            prev_test: PrevalenceTest::default(),
            combine_rule: CombineRule::default(),
        }
    }
}

impl IdentifyParams {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(DecontamError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DecontamError::from)
    }

    /// Write as YAML to `path`, replacing the file only once fully written.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        write_atomic(path, |w| {
            w.write_all(yaml.as_bytes())?;
            Ok(())
        })
    }

    /// Check every parameter the chosen method needs and build the typed config.
    pub fn validate(&self) -> Result<IdentifyConfig> {
        let threshold = Threshold::new(self.threshold)?;

        let concentration = || {
            self.freq_concentration_column.clone().ok_or_else(|| {
                DecontamError::invalid_parameter(
                    "freq_concentration_column",
                    format!("required by the '{}' method", self.decon_method),
                )
            })
        };
        let controls = || -> Result<ControlSelector> {
            let column = self.prev_control_or_exp_sample_column.clone().ok_or_else(|| {
                DecontamError::invalid_parameter(
                    "prev_control_or_exp_sample_column",
                    format!("required by the '{}' method", self.decon_method),
                )
            })?;
            Ok(match &self.prev_control_sample_indicator {
                Some(value) if value.trim().is_empty() => {
                    return Err(DecontamError::invalid_parameter(
                        "prev_control_sample_indicator",
                        "must not be empty",
                    ))
                }
                Some(value) => ControlSelector::Indicator {
                    column,
                    value: value.clone(),
                },
                None => ControlSelector::Column(column),
            })
        };

        let plan = match self.decon_method {
            DeconMethod::Frequency => MethodPlan::Frequency {
                concentration: concentration()?,
            },
            DeconMethod::Prevalence => MethodPlan::Prevalence {
                controls: controls()?,
                test: self.prev_test,
            },
            DeconMethod::Combined => MethodPlan::Combined {
                concentration: concentration()?,
                controls: controls()?,
                test: self.prev_test,
                rule: self.combine_rule,
            },
        };

        Ok(IdentifyConfig { plan, threshold })
    }
}
