//! oblique-forest: oblique random survival forests for Rust.
//!
//! Trees split on linear combinations of predictors fitted per node (Cox
//! regression, penalized Cox, random or user-supplied coefficients). Leaves
//! hold Kaplan–Meier survival and Nelson–Aalen cumulative hazard curves.
//! Training bags rows per tree and reports out-of-bag accuracy, variable
//! importance and partial dependence.
//!
//! # Key Types
//!
//! - [`ObliqueForest`] - High-level model with train/predict/save/load
//! - [`ForestConfig`] - Configuration builder
//! - [`SurvivalDataset`] - Features with right-censored outcome
//! - [`PredType`] - Risk, survival, cumulative hazard or mortality
//!
//! # Training
//!
//! Use `ForestConfig::builder()` to configure, then `ObliqueForest::train()`.
//! See the [`model`] module for details.

pub mod data;
pub mod explainability;
pub mod model;
pub mod persist;
pub mod repr;
pub mod testing;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// High-level model types
pub use model::{ConfigError, ForestConfig, ObliqueForest, PredictError};

// Representation
pub use repr::{Forest, PredType, SurvivalTree};

// Training types
pub use training::{AccuracyScorer, Interrupt, LinearComboSolver, SplitRule, TrainError, Verbosity};

// Explainability
pub use explainability::{PartialDependenceConfig, PdGrid, VariableImportance};

// Data types
pub use data::{DatasetError, SurvivalDataset};

// Shared utilities
pub use utils::{Parallelism, run_with_threads};
