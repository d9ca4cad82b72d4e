//! Training progress logging.
//!
//! Messages go out as `tracing` events under the `oblique_forest::train`
//! target; the configured [`Verbosity`] decides what is emitted at all.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// How much the trainer reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Nothing.
    #[default]
    Silent,
    /// Degenerate inputs and fallbacks only.
    Warning,
    /// Start, checkpoints, finish.
    Info,
    /// Per-tree detail.
    Debug,
}

/// Structured logger owned by a trainer for the duration of one fit.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    started: Option<Instant>,
    n_trees: usize,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            started: None,
            n_trees: 0,
        }
    }

    #[inline]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[inline]
    pub fn enabled(&self, level: Verbosity) -> bool {
        level != Verbosity::Silent && self.verbosity >= level
    }

    pub fn start_training(&mut self, n_trees: usize, n_rows: usize, n_features: usize) {
        self.started = Some(Instant::now());
        self.n_trees = n_trees;
        if self.enabled(Verbosity::Info) {
            tracing::info!(
                target: "oblique_forest::train",
                n_trees,
                n_rows,
                n_features,
                "growing forest"
            );
        }
    }

    /// One out-of-bag checkpoint: trees grown so far and the score per horizon.
    pub fn log_checkpoint(&self, n_grown: usize, scores: &[f64]) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(
                target: "oblique_forest::train",
                n_grown,
                of = self.n_trees,
                ?scores,
                "oob checkpoint"
            );
        }
    }

    pub fn log_tree(&self, index: usize, n_leaves: usize, n_failed_fits: usize) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(
                target: "oblique_forest::train",
                tree = index,
                n_leaves,
                n_failed_fits,
                "tree grown"
            );
        }
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(target: "oblique_forest::train", "{message}");
        }
    }

    pub fn log_interrupted(&self, n_grown: usize) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(target: "oblique_forest::train", n_grown, "training interrupted");
        }
    }

    pub fn finish_training(&mut self) {
        if self.enabled(Verbosity::Info) {
            let elapsed_ms = self
                .started
                .map(|s| s.elapsed().as_millis() as u64)
                .unwrap_or(0);
            tracing::info!(
                target: "oblique_forest::train",
                n_trees = self.n_trees,
                elapsed_ms,
                "forest complete"
            );
        }
        self.started = None;
    }
}
