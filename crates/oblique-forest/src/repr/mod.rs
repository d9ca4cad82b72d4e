//! Runtime representation of grown (or reloaded) survival forests.
//!
//! - [`LeafCurve`]: Kaplan–Meier / Nelson–Aalen step functions per leaf
//! - [`SurvivalTree`]: one oblique tree in flat node arrays
//! - [`Forest`]: ordered trees plus the global event-time grid
//!
//! Everything here is immutable once built; training lives in
//! [`crate::training`].

mod forest;
mod leaf;
mod tree;

pub use forest::Forest;
pub use leaf::{LeafCurve, PredType};
pub use tree::{LEAF_SENTINEL, SurvivalTree, TreeArrays, TreeValidationError};

pub(crate) use forest::{accumulate_oob, finish_oob};
pub(crate) use tree::complement_rows;

/// Node index within a tree.
pub type NodeId = u32;

/// Prediction width for a prediction type: one column per horizon, or a
/// single column for mortality.
#[inline]
pub fn n_outputs(pred_type: PredType, n_horizons: usize) -> usize {
    if pred_type.uses_horizon() {
        n_horizons
    } else {
        1
    }
}
