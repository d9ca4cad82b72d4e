//! High-level model wrapper.
//!
//! - [`ObliqueForest`]: trained forest with prediction defaults and diagnostics
//! - [`ForestConfig`]: validated training configuration (`bon` builder)
//! - [`TreeParams`], [`SamplingParams`]: nested parameter groups
//!
//! # Example
//!
//! ```no_run
//! use oblique_forest::model::{ForestConfig, ObliqueForest};
//! use oblique_forest::testing::synthetic_survival;
//!
//! let data = synthetic_survival(200, 4, 0);
//! let config = ForestConfig::builder().n_tree(50).build().unwrap();
//! let model = ObliqueForest::train(&data, config).unwrap();
//!
//! let risk = model.predict(data.features(), 0).unwrap();
//! model.save_json("forest.json").unwrap();
//! ```

mod config;
mod oblique;
mod params;

pub use config::{ConfigError, ForestConfig};
pub use oblique::{ObliqueForest, PredictError};
pub use params::{ParamValidationError, SamplingParams, TreeParams};
