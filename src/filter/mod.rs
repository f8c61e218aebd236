//! Thresholding and contaminant removal for feature tables.

pub mod contaminant;

pub use contaminant::{apply_threshold, classify, remove, RemovalSummary, ThresholdDecision};
