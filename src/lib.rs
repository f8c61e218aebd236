//! Contaminant identification for microbiome feature tables.
//!
//! Reagent and kit contaminants show up in amplicon data as features whose
//! abundance pattern is explained better by contamination than by the
//! sampled community. This library scores every feature of a table and
//! removes those at or below a score threshold.
//!
//! # Overview
//!
//! - **data**: Core data structures (CountMatrix, Metadata, ScoreTable)
//! - **config**: Typed, validated parameters (method, threshold, columns)
//! - **prepare**: Aligning tables with metadata
//! - **normalize**: Relative abundances (TSS)
//! - **score**: Frequency, prevalence and combined scoring
//! - **filter**: Thresholding and contaminant removal
//! - **summary**: Score counts and threshold-anchored histogram
//! - **registry**: Catalogue of methods and formats
//! - **pipeline**: Identification and removal as one run
//!
//! # Example
//!
//! ```no_run
//! use decontam::prelude::*;
//!
//! let counts = CountMatrix::from_tsv("table.tsv").unwrap();
//! let metadata = Metadata::from_tsv("metadata.tsv").unwrap();
//!
//! let run = Decontam::new()
//!     .method(DeconMethod::Prevalence)
//!     .control_column("sample_type")
//!     .control_indicator("blank")
//!     .threshold(0.1)
//!     .run(&counts, &metadata)
//!     .unwrap();
//!
//! run.scores.to_tsv("scores.tsv").unwrap();
//! run.cleaned.to_tsv("cleaned.tsv").unwrap();
//! println!("{}", run.summary);
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod io;
pub mod normalize;
pub mod pipeline;
pub mod prepare;
pub mod registry;
pub mod score;
pub mod summary;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::config::{
        CombineRule, ControlSelector, DeconMethod, IdentifyConfig, IdentifyParams, MethodPlan,
        PrevalenceTest, Threshold, DEFAULT_THRESHOLD,
    };
    pub use crate::data::{
        ColumnRef, CountMatrix, Metadata, ScoreColumn, ScoreEntry, ScoreTable, Variable,
    };
    pub use crate::error::{DecontamError, ErrorKind, Result};
    pub use crate::filter::{apply_threshold, classify, remove, RemovalSummary, ThresholdDecision};
    pub use crate::normalize::{norm_tss, TssMatrix};
    pub use crate::pipeline::{identify, Decontam, DecontamRun};
    pub use crate::prepare::{prepare, PreparedInput};
    pub use crate::registry::{FormatInfo, MethodInfo, MethodRegistry};
    pub use crate::score::{
        combine, combine_p, score_frequency, score_prevalence, FrequencyScores, PrevalenceScores,
    };
    pub use crate::summary::{summarize, HistogramBin, ScoreSummary};
}
