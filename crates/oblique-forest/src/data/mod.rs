//! Survival data containers.
//!
//! [`SurvivalDataset`] holds a sample-major feature matrix together with the
//! right-censored outcome (time, status) and optional row weights. All
//! training and evaluation components borrow it read-only.

mod dataset;
mod error;

pub use dataset::{OutcomeView, SurvivalDataset};
pub use error::DatasetError;
