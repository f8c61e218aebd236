//! Data structures: feature tables, sample metadata and score tables.

mod count_matrix;
mod metadata;
mod score_table;

pub use count_matrix::{CountMatrix, FEATURE_ID_HEADER};
pub use metadata::{ColumnRef, Metadata, Variable, VariableType};
pub use score_table::{ScoreColumn, ScoreEntry, ScoreTable};
