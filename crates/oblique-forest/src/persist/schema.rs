//! Schema types for model serialization.
//!
//! These types provide a stable serialization format independent of runtime
//! types, so the runtime representation can change without breaking saved
//! models and every load goes through validation.
//!
//! Floats are written with shortest round-trip formatting, so a reloaded
//! forest predicts bit-identically. Diagnostic matrices may hold NaN, which
//! JSON cannot represent; those cells are written as `null`.

use serde::{Deserialize, Serialize};

/// Current format version.
pub const FORMAT_VERSION: u64 = 1;

/// Top-level document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEnvelope {
    pub format_version: u64,
    pub model: ObliqueForestSchema,
}

/// Prediction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredTypeSchema {
    Risk,
    Survival,
    CumulativeHazard,
    Mortality,
}

/// Model with its prediction defaults and training diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliqueForestSchema {
    pub pred_type: PredTypeSchema,
    pub pred_horizon: Vec<f64>,
    pub forest: ForestSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_dependence: Option<PartialDependenceSchema>,
    pub oob_eval: MatrixSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oob_predictions: Option<MatrixSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Vec<Option<f64>>>,
}

/// Forest schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestSchema {
    /// Must equal `trees.len()`.
    pub n_tree: usize,
    pub n_features: usize,
    pub n_rows_train: usize,
    /// Distinct training event times, ascending.
    pub unique_event_times: Vec<f64>,
    pub trees: Vec<TreeSchema>,
}

/// Tree schema (SoA layout, one entry per node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSchema {
    /// Out-of-bag training rows, ascending.
    pub rows_oobag: Vec<u32>,
    pub cutpoint: Vec<f64>,
    /// Left child per node; 0 marks a leaf. The right child is `left + 1`.
    pub child_left: Vec<u32>,
    pub coef_values: Vec<Vec<f64>>,
    pub coef_indices: Vec<Vec<u32>>,
    pub leaf_summary: Vec<f64>,
    pub leaf_times: Vec<Vec<f64>>,
    pub leaf_survival: Vec<Vec<f64>>,
    pub leaf_hazard: Vec<Vec<f64>>,
}

/// Row-major matrix whose NaN cells are `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSchema {
    pub n_rows: usize,
    pub n_cols: usize,
    pub values: Vec<Option<f64>>,
}

/// Partial-dependence output form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdKindSchema {
    Summary,
    Individual,
}

/// Partial-dependence request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDependenceSchema {
    pub kind: PdKindSchema,
    pub grids: Vec<PdGridSchema>,
    pub probs: Vec<f64>,
    pub oobag: bool,
}

/// One grid: columns and their joint values, one row per point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdGridSchema {
    pub cols: Vec<usize>,
    pub values: Vec<Vec<f64>>,
}
