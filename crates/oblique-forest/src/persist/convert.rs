//! Conversion between runtime types and schema types.
//!
//! Runtime to schema is infallible (`From`). Schema to runtime is
//! `TryFrom` and validates everything the runtime types assume: array
//! lengths, child indices, coefficient columns, event-time ordering.

use ndarray::Array2;

use super::error::ReadError;
use super::schema::{
    ForestSchema, MatrixSchema, ObliqueForestSchema, PartialDependenceSchema, PdGridSchema,
    PdKindSchema, PredTypeSchema, TreeSchema,
};
use crate::explainability::{FeatureImportance, PartialDependenceConfig, PdGrid, PdKind};
use crate::model::ObliqueForest;
use crate::repr::{Forest, PredType, SurvivalTree, TreeArrays};

// =============================================================================
// Enums
// =============================================================================

impl From<PredType> for PredTypeSchema {
    fn from(p: PredType) -> Self {
        match p {
            PredType::Risk => Self::Risk,
            PredType::Survival => Self::Survival,
            PredType::CumulativeHazard => Self::CumulativeHazard,
            PredType::Mortality => Self::Mortality,
        }
    }
}

impl From<PredTypeSchema> for PredType {
    fn from(p: PredTypeSchema) -> Self {
        match p {
            PredTypeSchema::Risk => Self::Risk,
            PredTypeSchema::Survival => Self::Survival,
            PredTypeSchema::CumulativeHazard => Self::CumulativeHazard,
            PredTypeSchema::Mortality => Self::Mortality,
        }
    }
}

impl From<PdKind> for PdKindSchema {
    fn from(k: PdKind) -> Self {
        match k {
            PdKind::Summary => Self::Summary,
            PdKind::Individual => Self::Individual,
        }
    }
}

impl From<PdKindSchema> for PdKind {
    fn from(k: PdKindSchema) -> Self {
        match k {
            PdKindSchema::Summary => Self::Summary,
            PdKindSchema::Individual => Self::Individual,
        }
    }
}

// =============================================================================
// Matrices
// =============================================================================

fn nan_to_none(v: f64) -> Option<f64> {
    if v.is_nan() { None } else { Some(v) }
}

impl From<&Array2<f64>> for MatrixSchema {
    fn from(m: &Array2<f64>) -> Self {
        Self {
            n_rows: m.nrows(),
            n_cols: m.ncols(),
            values: m.iter().copied().map(nan_to_none).collect(),
        }
    }
}

impl TryFrom<MatrixSchema> for Array2<f64> {
    type Error = ReadError;

    fn try_from(schema: MatrixSchema) -> Result<Self, Self::Error> {
        let values = schema.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        Array2::from_shape_vec((schema.n_rows, schema.n_cols), values).map_err(|e| {
            ReadError::Validation(format!(
                "matrix of shape {}x{}: {e}",
                schema.n_rows, schema.n_cols
            ))
        })
    }
}

// =============================================================================
// Partial dependence
// =============================================================================

impl From<&PartialDependenceConfig> for PartialDependenceSchema {
    fn from(config: &PartialDependenceConfig) -> Self {
        Self {
            kind: config.kind.into(),
            grids: config
                .grids
                .iter()
                .map(|g| PdGridSchema {
                    cols: g.cols.clone(),
                    values: g.values.rows().into_iter().map(|r| r.to_vec()).collect(),
                })
                .collect(),
            probs: config.probs.clone(),
            oobag: config.oobag,
        }
    }
}

impl TryFrom<PartialDependenceSchema> for PartialDependenceConfig {
    type Error = ReadError;

    fn try_from(schema: PartialDependenceSchema) -> Result<Self, Self::Error> {
        let mut grids = Vec::with_capacity(schema.grids.len());
        for (g, grid) in schema.grids.into_iter().enumerate() {
            let width = grid.cols.len();
            if grid.values.iter().any(|row| row.len() != width) {
                return Err(ReadError::Validation(format!(
                    "partial dependence grid {g}: every point needs {width} values"
                )));
            }
            let n_points = grid.values.len();
            let flat = grid.values.into_iter().flatten().collect();
            let values = Array2::from_shape_vec((n_points, width), flat)
                .map_err(|e| ReadError::Validation(format!("partial dependence grid {g}: {e}")))?;
            grids.push(PdGrid {
                cols: grid.cols,
                values,
            });
        }

        let config = PartialDependenceConfig {
            kind: schema.kind.into(),
            grids,
            probs: schema.probs,
            oobag: schema.oobag,
        };
        config
            .validate(usize::MAX)
            .map_err(|e| ReadError::Validation(e.to_string()))?;
        Ok(config)
    }
}

// =============================================================================
// Trees and forests
// =============================================================================

impl From<&SurvivalTree> for TreeSchema {
    fn from(tree: &SurvivalTree) -> Self {
        let a = tree.to_arrays();
        Self {
            rows_oobag: a.rows_oobag,
            cutpoint: a.cutpoint,
            child_left: a.child_left,
            coef_values: a.coef_values,
            coef_indices: a.coef_indices,
            leaf_summary: a.leaf_summary,
            leaf_times: a.leaf_times,
            leaf_survival: a.leaf_survival,
            leaf_hazard: a.leaf_hazard,
        }
    }
}

impl From<TreeSchema> for TreeArrays {
    fn from(s: TreeSchema) -> Self {
        Self {
            cutpoint: s.cutpoint,
            child_left: s.child_left,
            coef_values: s.coef_values,
            coef_indices: s.coef_indices,
            leaf_summary: s.leaf_summary,
            leaf_times: s.leaf_times,
            leaf_survival: s.leaf_survival,
            leaf_hazard: s.leaf_hazard,
            rows_oobag: s.rows_oobag,
        }
    }
}

impl From<&Forest> for ForestSchema {
    fn from(forest: &Forest) -> Self {
        Self {
            n_tree: forest.n_trees(),
            n_features: forest.n_features(),
            n_rows_train: forest.n_rows_train(),
            unique_event_times: forest.unique_event_times().to_vec(),
            trees: forest.trees().iter().map(TreeSchema::from).collect(),
        }
    }
}

impl TryFrom<ForestSchema> for Forest {
    type Error = ReadError;

    fn try_from(schema: ForestSchema) -> Result<Self, Self::Error> {
        if schema.trees.len() != schema.n_tree {
            return Err(ReadError::Validation(format!(
                "n_tree is {} but {} trees are stored",
                schema.n_tree,
                schema.trees.len()
            )));
        }
        let times = &schema.unique_event_times;
        if times.iter().any(|t| !t.is_finite()) || times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ReadError::Validation(
                "unique_event_times must be finite and strictly increasing".into(),
            ));
        }

        let mut forest = Forest::new(schema.unique_event_times, schema.n_features, schema.n_rows_train);
        for (i, tree) in schema.trees.into_iter().enumerate() {
            let tree = SurvivalTree::from_arrays(tree.into(), schema.n_rows_train)
                .map_err(|e| ReadError::Validation(format!("tree {i}: {e}")))?;
            forest.push_tree(tree);
        }

        if let Some(max) = forest.max_feature_index().filter(|&m| m as usize >= schema.n_features) {
            return Err(ReadError::Validation(format!(
                "coefficient column {max} out of range for {} features",
                schema.n_features
            )));
        }
        Ok(forest)
    }
}

// =============================================================================
// Model
// =============================================================================

impl From<&ObliqueForest> for ObliqueForestSchema {
    fn from(model: &ObliqueForest) -> Self {
        Self {
            pred_type: model.pred_type().into(),
            pred_horizon: model.pred_horizon().to_vec(),
            forest: model.forest().into(),
            partial_dependence: model.partial_dependence_config().map(Into::into),
            oob_eval: model.oob_eval().into(),
            oob_predictions: model.oob_predictions().map(Into::into),
            importance: model
                .importance()
                .map(|imp| imp.values().iter().copied().map(nan_to_none).collect()),
        }
    }
}

impl TryFrom<ObliqueForestSchema> for ObliqueForest {
    type Error = ReadError;

    fn try_from(schema: ObliqueForestSchema) -> Result<Self, Self::Error> {
        let forest = Forest::try_from(schema.forest)?;
        let n_features = forest.n_features();
        let n_rows = forest.n_rows_train();

        let horizon = &schema.pred_horizon;
        if horizon.iter().any(|h| !h.is_finite()) || horizon.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ReadError::Validation(
                "pred_horizon must be finite and strictly increasing".into(),
            ));
        }

        let oob_eval = Array2::<f64>::try_from(schema.oob_eval)?;
        let oob_predictions = schema.oob_predictions.map(Array2::<f64>::try_from).transpose()?;
        if let Some(p) = oob_predictions.as_ref().filter(|p| p.nrows() != n_rows) {
            return Err(ReadError::Validation(format!(
                "oob_predictions has {} rows, forest was trained on {n_rows}",
                p.nrows()
            )));
        }

        let importance = schema
            .importance
            .map(|v| FeatureImportance::new(v.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect()));
        if let Some(imp) = importance.as_ref().filter(|imp| imp.len() != n_features) {
            return Err(ReadError::Validation(format!(
                "importance has {} values, forest has {n_features} features",
                imp.len()
            )));
        }

        let mut model = ObliqueForest::from_parts(forest, schema.pred_type.into(), schema.pred_horizon)
            .with_diagnostics(oob_eval, oob_predictions, importance);
        if let Some(pd) = schema.partial_dependence {
            let config = PartialDependenceConfig::try_from(pd)?;
            config
                .validate(n_features)
                .map_err(|e| ReadError::Validation(e.to_string()))?;
            model = model.with_partial_dependence(config);
        }
        Ok(model)
    }
}
