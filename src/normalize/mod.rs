//! Normalization of feature tables.
//!
//! - **TSS**: Total sum scaling / relative abundance

pub mod tss;

pub use tss::{norm_tss, TssMatrix};
