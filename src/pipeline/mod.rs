//! Contaminant identification and removal as one composed run.

mod runner;

pub use runner::{identify, Decontam, DecontamRun};
