//! Flat-array oblique survival tree.
//!
//! Node `i` is a leaf iff `child_left[i] == 0`; otherwise its children are
//! `child_left[i]` and `child_left[i] + 1`. The root is node 0, so 0 can never
//! be a child and doubles as the leaf sentinel.
//!
//! - [`SurvivalTree`]: immutable runtime tree
//! - [`TreeArrays`]: plain node arrays used for persistence and reconstruction
//! - [`TreeValidationError`]: structural validation errors

use ndarray::{ArrayView1, ArrayView2};

use super::NodeId;
use super::leaf::{LeafCurve, PredType};

/// Sentinel stored in `child_left` for leaves.
pub const LEAF_SENTINEL: u32 = 0;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`SurvivalTree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    /// Tree has no nodes.
    #[error("tree has no nodes")]
    EmptyTree,
    /// A per-node array has the wrong length.
    #[error("{field} has length {got}, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    /// A child pointer references an out-of-bounds node.
    #[error("node {node}: child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        child: NodeId,
        n_nodes: usize,
    },
    /// A child does not come after its parent.
    #[error("node {node}: child {child} does not follow its parent")]
    BackwardChild { node: NodeId, child: NodeId },
    /// A node was reached by more than one path.
    #[error("node {node} reached more than once")]
    DuplicateVisit { node: NodeId },
    /// A node exists in storage but is unreachable from the root.
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
    /// Coefficient values and indices disagree in length.
    #[error("node {node}: coefficient values and indices differ in length")]
    CoefficientLengthMismatch { node: NodeId },
    /// Leaf-only or split-only fields are populated on the wrong kind of node.
    #[error("node {node}: fields do not match node kind (leaf = {is_leaf})")]
    FieldPopulation { node: NodeId, is_leaf: bool },
    /// Leaf curve arrays disagree in length, times are not strictly
    /// increasing, survival leaves `[0, 1]` or increases, or hazard decreases.
    #[error("node {node}: malformed leaf curve")]
    MalformedLeafCurve { node: NodeId },
    /// A cutpoint, coefficient or leaf summary is NaN or infinite.
    #[error("node {node}: non-finite split or leaf value")]
    NonFiniteValue { node: NodeId },
    /// An out-of-bag row index is out of range or the set is not strictly increasing.
    #[error("out-of-bag rows must be strictly increasing and < {n_rows}")]
    InvalidOobRows { n_rows: usize },
}

// ============================================================================
// TreeArrays
// ============================================================================

/// Node arrays of one tree in their persisted shape.
///
/// Leaf-only fields are empty (or 0) on internal nodes and split-only fields
/// are empty (or 0) on leaves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeArrays {
    pub cutpoint: Vec<f64>,
    pub child_left: Vec<u32>,
    pub coef_values: Vec<Vec<f64>>,
    pub coef_indices: Vec<Vec<u32>>,
    pub leaf_summary: Vec<f64>,
    pub leaf_times: Vec<Vec<f64>>,
    pub leaf_survival: Vec<Vec<f64>>,
    pub leaf_hazard: Vec<Vec<f64>>,
    pub rows_oobag: Vec<u32>,
}

// ============================================================================
// SurvivalTree
// ============================================================================

/// Immutable oblique survival tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalTree {
    cutpoint: Vec<f64>,
    child_left: Vec<u32>,
    coef_values: Vec<Vec<f64>>,
    coef_indices: Vec<Vec<u32>>,
    leaf_summary: Vec<f64>,
    leaf_curves: Vec<LeafCurve>,
    rows_oobag: Vec<u32>,
    rows_inbag: Vec<u32>,
}

impl SurvivalTree {
    /// Assemble a freshly grown tree.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_grown(
        cutpoint: Vec<f64>,
        child_left: Vec<u32>,
        coef_values: Vec<Vec<f64>>,
        coef_indices: Vec<Vec<u32>>,
        leaf_summary: Vec<f64>,
        leaf_curves: Vec<LeafCurve>,
        rows_oobag: Vec<u32>,
        rows_inbag: Vec<u32>,
    ) -> Self {
        let tree = Self {
            cutpoint,
            child_left,
            coef_values,
            coef_indices,
            leaf_summary,
            leaf_curves,
            rows_oobag,
            rows_inbag,
        };
        debug_assert!(tree.validate().is_ok(), "{:?}", tree.validate());
        tree
    }

    /// Rebuild a tree from persisted node arrays.
    ///
    /// The in-bag rows are recomputed as the complement of `rows_oobag`
    /// within `0..n_rows_train`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeValidationError`] if the arrays are inconsistent.
    pub fn from_arrays(arrays: TreeArrays, n_rows_train: usize) -> Result<Self, TreeValidationError> {
        let n_nodes = arrays.child_left.len();
        let check = |field: &'static str, got: usize| {
            if got == n_nodes {
                Ok(())
            } else {
                Err(TreeValidationError::LengthMismatch {
                    field,
                    expected: n_nodes,
                    got,
                })
            }
        };
        check("cutpoint", arrays.cutpoint.len())?;
        check("coef_values", arrays.coef_values.len())?;
        check("coef_indices", arrays.coef_indices.len())?;
        check("leaf_summary", arrays.leaf_summary.len())?;
        check("leaf_times", arrays.leaf_times.len())?;
        check("leaf_survival", arrays.leaf_survival.len())?;
        check("leaf_hazard", arrays.leaf_hazard.len())?;

        let strictly_increasing = arrays.rows_oobag.windows(2).all(|w| w[0] < w[1]);
        let in_range = arrays
            .rows_oobag
            .last()
            .is_none_or(|&r| (r as usize) < n_rows_train);
        if !strictly_increasing || !in_range {
            return Err(TreeValidationError::InvalidOobRows {
                n_rows: n_rows_train,
            });
        }

        let rows_inbag = complement_rows(&arrays.rows_oobag, n_rows_train);

        let leaf_curves = arrays
            .leaf_times
            .into_iter()
            .zip(arrays.leaf_survival)
            .zip(arrays.leaf_hazard)
            .map(|((t, s), h)| LeafCurve::from_parts(t, s, h))
            .collect();

        let tree = Self {
            cutpoint: arrays.cutpoint,
            child_left: arrays.child_left,
            coef_values: arrays.coef_values,
            coef_indices: arrays.coef_indices,
            leaf_summary: arrays.leaf_summary,
            leaf_curves,
            rows_oobag: arrays.rows_oobag,
            rows_inbag,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Export the node arrays.
    pub fn to_arrays(&self) -> TreeArrays {
        TreeArrays {
            cutpoint: self.cutpoint.clone(),
            child_left: self.child_left.clone(),
            coef_values: self.coef_values.clone(),
            coef_indices: self.coef_indices.clone(),
            leaf_summary: self.leaf_summary.clone(),
            leaf_times: self.leaf_curves.iter().map(|c| c.times().to_vec()).collect(),
            leaf_survival: self.leaf_curves.iter().map(|c| c.survival().to_vec()).collect(),
            leaf_hazard: self.leaf_curves.iter().map(|c| c.hazard().to_vec()).collect(),
            rows_oobag: self.rows_oobag.clone(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.child_left.len()
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.child_left.iter().filter(|&&c| c == LEAF_SENTINEL).count()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.child_left[node as usize] == LEAF_SENTINEL
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.child_left[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.child_left[node as usize] + 1
    }

    #[inline]
    pub fn cutpoint(&self, node: NodeId) -> f64 {
        self.cutpoint[node as usize]
    }

    #[inline]
    pub fn coef_values(&self, node: NodeId) -> &[f64] {
        &self.coef_values[node as usize]
    }

    #[inline]
    pub fn coef_indices(&self, node: NodeId) -> &[u32] {
        &self.coef_indices[node as usize]
    }

    /// Mortality score of a leaf.
    #[inline]
    pub fn leaf_summary(&self, node: NodeId) -> f64 {
        self.leaf_summary[node as usize]
    }

    #[inline]
    pub fn leaf_curve(&self, node: NodeId) -> &LeafCurve {
        &self.leaf_curves[node as usize]
    }

    /// Training rows held out of this tree, ascending.
    #[inline]
    pub fn rows_oobag(&self) -> &[u32] {
        &self.rows_oobag
    }

    /// Training rows used to grow this tree, ascending.
    #[inline]
    pub fn rows_inbag(&self) -> &[u32] {
        &self.rows_inbag
    }

    /// Sorted distinct predictor columns used by any split.
    pub fn features_used(&self) -> Vec<u32> {
        let mut used: Vec<u32> = self.coef_indices.iter().flatten().copied().collect();
        used.sort_unstable();
        used.dedup();
        used
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check structural invariants.
    ///
    /// Verifies array lengths, child bounds and ordering, that every node is
    /// reached exactly once from the root, that leaf-only and split-only
    /// fields are populated on the right kind of node, that split and leaf
    /// values are finite, and that leaf curves are valid step functions.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }
        for (field, got) in [
            ("cutpoint", self.cutpoint.len()),
            ("coef_values", self.coef_values.len()),
            ("coef_indices", self.coef_indices.len()),
            ("leaf_summary", self.leaf_summary.len()),
            ("leaf_curves", self.leaf_curves.len()),
        ] {
            if got != n_nodes {
                return Err(TreeValidationError::LengthMismatch {
                    field,
                    expected: n_nodes,
                    got,
                });
            }
        }

        for node in 0..n_nodes {
            let id = node as NodeId;
            if self.coef_values[node].len() != self.coef_indices[node].len() {
                return Err(TreeValidationError::CoefficientLengthMismatch { node: id });
            }
            let curve = &self.leaf_curves[node];
            let leaf = self.child_left[node] == LEAF_SENTINEL;
            let populated_ok = if leaf {
                self.coef_values[node].is_empty() && !curve.is_empty()
            } else {
                !self.coef_values[node].is_empty() && curve.is_empty()
            };
            if !populated_ok {
                return Err(TreeValidationError::FieldPopulation { node: id, is_leaf: leaf });
            }
            let finite = if leaf {
                self.leaf_summary[node].is_finite()
            } else {
                self.cutpoint[node].is_finite() && self.coef_values[node].iter().all(|c| c.is_finite())
            };
            if !finite {
                return Err(TreeValidationError::NonFiniteValue { node: id });
            }
            if leaf {
                let lengths_ok =
                    curve.survival().len() == curve.len() && curve.hazard().len() == curve.len();
                let increasing = curve.times().iter().all(|t| t.is_finite())
                    && curve.times().windows(2).all(|w| w[0] < w[1]);
                let survival_ok = curve.survival().iter().all(|s| (0.0..=1.0).contains(s))
                    && curve.survival().windows(2).all(|w| w[0] >= w[1]);
                let hazard_ok = curve.hazard().iter().all(|h| h.is_finite() && *h >= 0.0)
                    && curve.hazard().windows(2).all(|w| w[0] <= w[1]);
                if !lengths_ok || !increasing || !survival_ok || !hazard_ok {
                    return Err(TreeValidationError::MalformedLeafCurve { node: id });
                }
            }
        }

        // Children always follow their parent, so a forward DFS cannot cycle.
        let mut visited = vec![false; n_nodes];
        let mut stack: Vec<NodeId> = vec![0];
        while let Some(node) = stack.pop() {
            let node_usize = node as usize;
            if visited[node_usize] {
                return Err(TreeValidationError::DuplicateVisit { node });
            }
            visited[node_usize] = true;

            let left = self.child_left[node_usize];
            if left == LEAF_SENTINEL {
                continue;
            }
            if left <= node {
                return Err(TreeValidationError::BackwardChild { node, child: left });
            }
            let right = left as usize + 1;
            if right >= n_nodes {
                return Err(TreeValidationError::ChildOutOfBounds {
                    node,
                    child: right as NodeId,
                    n_nodes,
                });
            }
            stack.push(right as NodeId);
            stack.push(left);
        }

        if let Some(node) = visited.iter().position(|v| !v) {
            return Err(TreeValidationError::UnreachableNode { node: node as NodeId });
        }

        Ok(())
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Route one row to its leaf.
    ///
    /// At each internal node the row goes left while
    /// `row · coefficients <= cutpoint`. When `negate` names a column, that
    /// column's coefficients are sign-flipped during routing.
    #[inline]
    pub fn leaf_of(&self, row: ArrayView1<'_, f64>, negate: Option<u32>) -> NodeId {
        let mut node: NodeId = 0;
        loop {
            let left = self.child_left[node as usize];
            if left == LEAF_SENTINEL {
                return node;
            }
            let mut score = 0.0;
            for (&c, &j) in self.coef_values[node as usize]
                .iter()
                .zip(&self.coef_indices[node as usize])
            {
                let c = if negate == Some(j) { -c } else { c };
                score += c * row[j as usize];
            }
            node = if score <= self.cutpoint[node as usize] {
                left
            } else {
                left + 1
            };
        }
    }

    /// Predict a batch of rows.
    ///
    /// Rows are grouped by leaf so each leaf curve is interpolated once.
    /// `sink(position, values)` receives the position within `rows` and the
    /// prediction at every horizon (a single value for mortality).
    pub fn predict_rows<F>(
        &self,
        x: ArrayView2<'_, f64>,
        rows: &[usize],
        horizons: &[f64],
        pred_type: PredType,
        negate: Option<u32>,
        mut sink: F,
    ) where
        F: FnMut(usize, &[f64]),
    {
        let mut assigned: Vec<(NodeId, u32)> = rows
            .iter()
            .enumerate()
            .map(|(pos, &r)| (self.leaf_of(x.row(r), negate), pos as u32))
            .collect();
        assigned.sort_unstable();

        let width = super::n_outputs(pred_type, horizons.len());
        let mut values = vec![0.0; width];
        let mut current: Option<NodeId> = None;

        for (leaf, pos) in assigned {
            if current != Some(leaf) {
                if pred_type.uses_horizon() {
                    self.leaf_curves[leaf as usize].values_at_into(horizons, pred_type, &mut values);
                } else {
                    values[0] = self.leaf_summary[leaf as usize];
                }
                current = Some(leaf);
            }
            sink(pos as usize, &values);
        }
    }
}

/// Rows of `0..n_rows` not in the sorted `rows` set.
pub(crate) fn complement_rows(rows: &[u32], n_rows: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(n_rows.saturating_sub(rows.len()));
    let mut k = 0;
    for r in 0..n_rows as u32 {
        if k < rows.len() && rows[k] == r {
            k += 1;
        } else {
            out.push(r);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Root splits on `x0 - x1 <= 0`; left leaf dies early, right leaf late.
    fn stump_arrays() -> TreeArrays {
        TreeArrays {
            cutpoint: vec![0.0, 0.0, 0.0],
            child_left: vec![1, 0, 0],
            coef_values: vec![vec![1.0, -1.0], vec![], vec![]],
            coef_indices: vec![vec![0, 1], vec![], vec![]],
            leaf_summary: vec![0.0, 0.5, 2.0],
            leaf_times: vec![vec![], vec![2.0, 4.0], vec![1.0, 3.0]],
            leaf_survival: vec![vec![], vec![0.8, 0.5], vec![0.5, 0.1]],
            leaf_hazard: vec![vec![], vec![0.2, 0.6], vec![0.5, 1.5]],
            rows_oobag: vec![1, 3],
        }
    }

    #[test]
    fn test_from_arrays_recomputes_inbag() {
        let tree = SurvivalTree::from_arrays(stump_arrays(), 5).unwrap();
        assert_eq!(tree.rows_inbag(), &[0, 2, 4]);
        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.features_used(), vec![0, 1]);
        assert_eq!((tree.left_child(0), tree.right_child(0)), (1, 2));
        assert_eq!(tree.to_arrays(), stump_arrays());
    }

    #[test]
    fn test_leaf_routing_le_goes_left() {
        let tree = SurvivalTree::from_arrays(stump_arrays(), 5).unwrap();
        let x = array![[1.0, 1.0], [2.0, 1.0]];
        assert_eq!(tree.leaf_of(x.row(0), None), 1);
        assert_eq!(tree.leaf_of(x.row(1), None), 2);
        // Negating column 0 flips the second row's score to -3.
        assert_eq!(tree.leaf_of(x.row(1), Some(0)), 1);
    }

    #[test]
    fn test_predict_rows_survival_and_mortality() {
        let tree = SurvivalTree::from_arrays(stump_arrays(), 5).unwrap();
        let x = array![[2.0, 1.0], [0.0, 1.0], [3.0, 0.0]];
        let mut out = vec![vec![]; 3];
        tree.predict_rows(x.view(), &[0, 1, 2], &[3.0], PredType::Survival, None, |pos, v| {
            out[pos] = v.to_vec();
        });
        assert_eq!(out, vec![vec![0.1], vec![0.8], vec![0.1]]);

        let mut mort = vec![0.0; 2];
        tree.predict_rows(x.view(), &[1, 2], &[3.0, 9.0], PredType::Mortality, None, |pos, v| {
            assert_eq!(v.len(), 1);
            mort[pos] = v[0];
        });
        assert_eq!(mort, vec![0.5, 2.0]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut arrays = stump_arrays();
        arrays.cutpoint.pop();
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::LengthMismatch { field: "cutpoint", .. })
        ));
    }

    #[test]
    fn test_child_out_of_bounds_rejected() {
        let mut arrays = stump_arrays();
        arrays.child_left[0] = 2;
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::ChildOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_leaf_with_coefficients_rejected() {
        let mut arrays = stump_arrays();
        arrays.coef_values[1] = vec![1.0];
        arrays.coef_indices[1] = vec![0];
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::FieldPopulation { node: 1, is_leaf: true })
        ));
    }

    #[test]
    fn test_unsorted_leaf_times_rejected() {
        let mut arrays = stump_arrays();
        arrays.leaf_times[2] = vec![3.0, 1.0];
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::MalformedLeafCurve { node: 2 })
        ));
    }

    #[test]
    fn test_out_of_range_survival_rejected() {
        let mut arrays = stump_arrays();
        arrays.leaf_survival[1] = vec![1.2, 0.5];
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::MalformedLeafCurve { node: 1 })
        ));
    }

    #[test]
    fn test_decreasing_hazard_rejected() {
        let mut arrays = stump_arrays();
        arrays.leaf_hazard[2] = vec![0.5, 0.1];
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::MalformedLeafCurve { node: 2 })
        ));
    }

    #[test]
    fn test_non_finite_split_rejected() {
        let mut arrays = stump_arrays();
        arrays.cutpoint[0] = f64::NAN;
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::NonFiniteValue { node: 0 })
        ));

        let mut arrays = stump_arrays();
        arrays.coef_values[0] = vec![1.0, f64::INFINITY];
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::NonFiniteValue { node: 0 })
        ));
    }

    #[test]
    fn test_oob_rows_out_of_range_rejected() {
        assert!(matches!(
            SurvivalTree::from_arrays(stump_arrays(), 3),
            Err(TreeValidationError::InvalidOobRows { n_rows: 3 })
        ));
    }

    #[test]
    fn test_unreachable_node_rejected() {
        let mut arrays = stump_arrays();
        for field in [&mut arrays.cutpoint, &mut arrays.leaf_summary] {
            field.push(0.0);
        }
        arrays.child_left.push(0);
        arrays.coef_values.push(vec![]);
        arrays.coef_indices.push(vec![]);
        arrays.leaf_times.push(vec![1.0]);
        arrays.leaf_survival.push(vec![1.0]);
        arrays.leaf_hazard.push(vec![0.0]);
        assert!(matches!(
            SurvivalTree::from_arrays(arrays, 5),
            Err(TreeValidationError::UnreachableNode { node: 3 })
        ));
    }

    #[test]
    fn test_complement_rows() {
        assert_eq!(complement_rows(&[0, 2], 4), vec![1, 3]);
        assert_eq!(complement_rows(&[], 2), vec![0, 1]);
    }
}
