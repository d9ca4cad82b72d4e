//! Integration tests for forest training.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use oblique_forest::model::{ConfigError, ForestConfig, ObliqueForest, SamplingParams, TreeParams};
use oblique_forest::testing::synthetic_survival;
use oblique_forest::training::sampling::safe_mtry;
use oblique_forest::training::split::{LeafBounds, find_all_cuts};
use oblique_forest::training::{
    CustomSolver, Interrupt, LinearComboParams, LinearComboSolver, NodeData, TrainError,
};
use oblique_forest::{DatasetError, SurvivalDataset, VariableImportance};

fn threads(n: usize) -> Option<NonZeroUsize> {
    NonZeroUsize::new(n)
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn thread_count_does_not_change_forest() {
    let ds = synthetic_survival(200, 4, 1);
    let build = |n: usize| {
        ForestConfig::builder()
            .n_tree(16)
            .oobag_eval_every(5)
            .maybe_n_threads(threads(n))
            .build()
            .unwrap()
    };

    let seq = ObliqueForest::train(&ds, build(1)).unwrap();
    let par = ObliqueForest::train(&ds, build(4)).unwrap();

    assert_eq!(seq.forest(), par.forest());
    assert_eq!(seq.predict(ds.features(), 1).unwrap(), par.predict(ds.features(), 4).unwrap());
    assert_eq!(seq.oob_eval().dim(), (4, 1));
    for (a, b) in seq.oob_eval().iter().zip(par.oob_eval()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn seed_changes_forest() {
    let ds = synthetic_survival(150, 3, 2);
    let a = ObliqueForest::train(&ds, ForestConfig::builder().n_tree(4).seed(1).build().unwrap()).unwrap();
    let b = ObliqueForest::train(&ds, ForestConfig::builder().n_tree(4).seed(2).build().unwrap()).unwrap();
    assert_ne!(a.forest(), b.forest());
}

#[test]
fn grown_trees_validate() {
    let ds = synthetic_survival(250, 5, 3);
    for solver in [LinearComboSolver::NewtonRaphson, LinearComboSolver::Penalized, LinearComboSolver::Random] {
        let config = ForestConfig::builder()
            .n_tree(5)
            .linear_combo(LinearComboParams {
                solver,
                ..Default::default()
            })
            .build()
            .unwrap();
        let model = ObliqueForest::train(&ds, config).unwrap();
        for tree in model.forest().trees() {
            tree.validate().unwrap();
            assert!(tree.n_leaves() >= 1);
            assert_eq!(tree.rows_inbag().len() + tree.rows_oobag().len(), 250);
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn train_rejects_config_that_does_not_fit_data() {
    let ds = synthetic_survival(50, 2, 4);
    let config = ForestConfig::builder()
        .sampling(SamplingParams {
            mtry: Some(3),
            ..Default::default()
        })
        .build()
        .unwrap();
    assert_eq!(
        ObliqueForest::train(&ds, config),
        Err(TrainError::Config(ConfigError::InvalidMtry {
            mtry: 3,
            n_features: 2
        }))
    );
}

#[test]
fn builder_rejects_invalid_values() {
    assert!(ForestConfig::builder().n_tree(0).build().is_err());
    assert!(ForestConfig::builder()
        .tree(TreeParams {
            leaf_min_obs: -1.0,
            ..Default::default()
        })
        .build()
        .is_err());
    assert!(ForestConfig::builder()
        .sampling(SamplingParams {
            sample_fraction: 0.0,
            ..Default::default()
        })
        .build()
        .is_err());
    assert!(ForestConfig::builder().pred_horizon(vec![]).build().is_err());
    assert!(ForestConfig::builder().oobag_eval_every(0).build().is_err());
}

#[test]
fn dataset_rejects_bad_outcome() {
    let x = Array2::<f64>::zeros((3, 2));
    let err = SurvivalDataset::new(x.clone(), Array1::from(vec![1.0, 2.0]), Array1::from(vec![1.0, 0.0, 1.0]));
    assert!(matches!(err, Err(DatasetError::ShapeMismatch { field: "time", .. })));

    let err = SurvivalDataset::new(x.clone(), Array1::from(vec![1.0, 2.0, 3.0]), Array1::from(vec![1.0, 2.0, 1.0]));
    assert!(matches!(err, Err(DatasetError::InvalidStatus { row: 1, .. })));

    let err = SurvivalDataset::new(x, Array1::from(vec![1.0, 0.0, 3.0]), Array1::from(vec![1.0, 0.0, 1.0]));
    assert!(matches!(err, Err(DatasetError::InvalidTime { row: 1, .. })));
}

// =============================================================================
// Split search and solvers
// =============================================================================

#[test]
fn lower_bound_waits_for_event_count_and_score_change() {
    // Cumulative events 0, 1, 1, 2, 2, 3, 4, 5: the count reaches 2 at p = 3,
    // where the score ties with p = 4.
    let lincomb = [1.0, 2.0, 3.0, 4.0, 4.0, 5.0, 6.0, 7.0];
    let events = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
    let weights = [1.0; 8];
    let bounds = LeafBounds {
        min_events: 2.0,
        min_obs: 1.0,
    };
    let cuts = find_all_cuts(&lincomb, &events, &weights, bounds);

    assert_eq!(cuts.first(), Some(&4));
    for &c in &cuts {
        assert_ne!(lincomb[c], lincomb[c + 1], "cut {c} separates tied scores");
    }
}

#[test]
fn safe_mtry_only_limits_newton_raphson() {
    assert_eq!(safe_mtry(5, 7), 2);
    assert!(LinearComboSolver::NewtonRaphson.needs_safe_mtry());
    assert!(!LinearComboSolver::Penalized.needs_safe_mtry());
    assert!(!LinearComboSolver::Random.needs_safe_mtry());

    // A custom solver sees the full mtry even with only 7 events.
    let ds = synthetic_survival(40, 6, 5);
    let mut status = Array1::zeros(40);
    for r in 0..7 {
        status[r] = 1.0;
    }
    let ds = SurvivalDataset::new(ds.features().to_owned(), ds.time().to_owned(), status).unwrap();

    let widest = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&widest);
    let solver = CustomSolver::new("ones", move |x, _t, _s, _w| {
        seen.fetch_max(x.ncols(), Ordering::Relaxed);
        Ok(vec![1.0; x.ncols()])
    });
    let config = ForestConfig::builder()
        .n_tree(1)
        .linear_combo(LinearComboParams {
            solver: LinearComboSolver::custom(solver),
            ..Default::default()
        })
        .sampling(SamplingParams {
            mtry: Some(5),
            sample_with_replacement: false,
            sample_fraction: 1.0,
        })
        .build()
        .unwrap();
    ObliqueForest::train(&ds, config).unwrap();
    assert_eq!(widest.load(Ordering::Relaxed), 5);
}

/// Training rows sorted by time, as the grower hands them to a solver.
fn sorted_node(ds: &SurvivalDataset) -> (Array2<f64>, Vec<f64>, Vec<f64>) {
    let mut order: Vec<usize> = (0..ds.n_rows()).collect();
    order.sort_by(|&a, &b| ds.time()[a].total_cmp(&ds.time()[b]));
    let x = ds.features().select(Axis(0), &order);
    let time = order.iter().map(|&r| ds.time()[r]).collect();
    let status = order.iter().map(|&r| ds.status()[r]).collect();
    (x, time, status)
}

#[test]
fn solvers_recover_strong_effect_sign() {
    let ds = synthetic_survival(400, 3, 6);
    let (x, time, status) = sorted_node(&ds);
    let weights = vec![1.0; ds.n_rows()];
    let node = NodeData {
        x: x.view(),
        time: &time,
        status: &status,
        weights: &weights,
    };

    for solver in [LinearComboSolver::NewtonRaphson, LinearComboSolver::Penalized] {
        let params = LinearComboParams {
            solver: solver.clone(),
            ..Default::default()
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let fit = params.fit(&node, &mut rng).unwrap();
        assert!(
            fit.coefficients[0] > 0.0,
            "{}: {:?}",
            solver.name(),
            fit.coefficients
        );
        assert!(fit.coefficients[0].abs() > fit.coefficients[2].abs());
    }
}

// =============================================================================
// Importance and interrupts
// =============================================================================

#[test]
fn permutation_importance_ranks_signal_above_noise() {
    let ds = synthetic_survival(300, 3, 7);
    let config = ForestConfig::builder()
        .n_tree(30)
        .importance(VariableImportance::Permute)
        .build()
        .unwrap();
    let model = ObliqueForest::train(&ds, config).unwrap();
    let imp = model.importance().unwrap();

    assert_eq!(imp.len(), 3);
    assert!(imp.values()[0] > imp.values()[2], "{:?}", imp.values());
    assert_eq!(imp.top_k(1), vec![0]);
}

#[test]
fn interrupt_aborts_training() {
    let ds = synthetic_survival(100, 3, 8);
    let interrupt = Interrupt::new();
    let handle = interrupt.clone();
    handle.trigger();
    let config = ForestConfig::builder().n_tree(10).build().unwrap();
    assert_eq!(
        ObliqueForest::train_with_interrupt(&ds, config, &interrupt),
        Err(TrainError::Interrupted)
    );
}
