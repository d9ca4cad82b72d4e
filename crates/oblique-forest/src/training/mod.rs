//! Forest growth.
//!
//! ## Components
//!
//! - [`ForestTrainer`], [`ForestParams`]: batch growth, out-of-bag evaluation, importance
//! - [`TreeGrower`], [`GrowerParams`]: one tree from one row sample
//! - [`split`]: admissible cut-points and best-cut search
//! - [`SplitRule`]: log-rank or concordance split statistic
//! - [`LinearComboSolver`]: Cox, penalized Cox, random or custom coefficients
//! - [`AccuracyScorer`]: out-of-bag accuracy, concordance or custom
//! - [`RowSampler`]: bootstrap or subsample bagging
//! - [`TrainingLogger`], [`Verbosity`]: structured logging
//! - [`Interrupt`]: cooperative cancellation

mod grower;
mod interrupt;
pub mod lincomb;
mod logger;
mod metrics;
pub mod sampling;
mod scorer;
pub mod split;
pub mod stats;
mod trainer;

pub use grower::{GrowerParams, GrownTree, TreeGrower};
pub use interrupt::Interrupt;
pub use lincomb::{
    CustomSolver, LinearComboParams, LinearComboSolver, LinearFit, NodeData, SolverError,
    TiesMethod,
};
pub use logger::{TrainingLogger, Verbosity};
pub use metrics::{AccuracyFn, AccuracyScorer, ConcordanceIndex, CustomScorer};
pub use sampling::{RowSample, RowSampler};
pub use scorer::{Concordance, LogRank, SplitRule, SplitScorer};
pub use trainer::{ForestParams, ForestTrainer, TrainedForest};

use crate::data::DatasetError;
use crate::model::ConfigError;

/// Errors that abort training.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The interrupt fired before all trees were grown.
    #[error("training was interrupted")]
    Interrupted,
}
