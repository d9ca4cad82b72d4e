//! Integration tests for the native JSON format.

use std::io::Cursor;

use serde_json::Value;

use oblique_forest::explainability::{PartialDependenceConfig, PdGrid, PdKind};
use oblique_forest::model::{ForestConfig, ObliqueForest};
use oblique_forest::persist::ReadError;
use oblique_forest::testing::{random_features, synthetic_survival};
use oblique_forest::{PredType, VariableImportance};

fn trained() -> ObliqueForest {
    let ds = synthetic_survival(150, 4, 41);
    let config = ForestConfig::builder()
        .n_tree(6)
        .oobag_eval_every(2)
        .pred_horizon(vec![0.5, 2.0, 6.0])
        .importance(VariableImportance::Anova)
        .partial_dependence(PartialDependenceConfig {
            kind: PdKind::Individual,
            grids: vec![PdGrid::single(0, &[-0.5, 0.0, 0.5])],
            ..Default::default()
        })
        .build()
        .unwrap();
    ObliqueForest::train(&ds, config).unwrap()
}

fn to_value(model: &ObliqueForest) -> Value {
    serde_json::from_str(&model.to_json_string().unwrap()).unwrap()
}

fn read_err(v: Value) -> ReadError {
    let bytes = serde_json::to_vec(&v).expect("serialize mutated json");
    ObliqueForest::from_json_reader(Cursor::new(bytes)).expect_err("expected error")
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn round_trip_predicts_bit_identically() {
    let model = trained();
    let json = model.to_json_string().unwrap();
    let loaded = ObliqueForest::from_json_reader(Cursor::new(json.as_bytes())).unwrap();

    let x = random_features(300, 4, 99);
    for pred_type in [PredType::Risk, PredType::Survival, PredType::CumulativeHazard, PredType::Mortality] {
        let a = model.predict_with(x.view(), pred_type, model.pred_horizon(), 1).unwrap();
        let b = loaded.predict_with(x.view(), pred_type, loaded.pred_horizon(), 1).unwrap();
        for (u, v) in a.iter().zip(&b) {
            assert_eq!(u.to_bits(), v.to_bits(), "{pred_type:?}");
        }
    }

    assert_eq!(loaded.pred_type(), model.pred_type());
    assert_eq!(loaded.pred_horizon(), model.pred_horizon());
    assert_eq!(loaded.importance(), model.importance());
    assert_eq!(loaded.partial_dependence_config(), model.partial_dependence_config());
    for (u, v) in loaded.oob_eval().iter().zip(model.oob_eval()) {
        assert!(u == v || (u.is_nan() && v.is_nan()));
    }
}

#[test]
fn round_trip_through_file() {
    let model = trained();
    let path = std::env::temp_dir().join("oblique_forest_persist_integration.json");
    model.save_json(&path).unwrap();
    let loaded = ObliqueForest::load_json(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded.forest(), model.forest());
}

#[test]
fn reloaded_partial_dependence_matches() {
    let model = trained();
    let loaded = ObliqueForest::from_json_reader(Cursor::new(model.to_json_string().unwrap())).unwrap();
    let x = random_features(20, 4, 7);
    assert_eq!(
        model.partial_dependence(x.view(), 1).unwrap(),
        loaded.partial_dependence(x.view(), 1).unwrap()
    );
}

// =============================================================================
// Validation failures
// =============================================================================

#[test]
fn validation_fails_on_cutpoint_length_mismatch() {
    let mut v = to_value(&trained());
    let tree = v.pointer_mut("/model/forest/trees/0").expect("tree exists");
    let cutpoint = tree
        .get_mut("cutpoint")
        .and_then(|x| x.as_array_mut())
        .expect("cutpoint array");
    cutpoint.pop();

    let err = read_err(v);
    assert!(matches!(err, ReadError::Validation(_)), "got: {err:?}");
}

#[test]
fn validation_fails_on_out_of_bounds_child() {
    let mut v = to_value(&trained());
    let tree = v.pointer_mut("/model/forest/trees/0").expect("tree exists");
    let child_left = tree
        .get_mut("child_left")
        .and_then(|x| x.as_array_mut())
        .expect("child_left array");
    child_left[0] = Value::from(9_999_999u64);

    let err = read_err(v);
    assert!(matches!(err, ReadError::Validation(_)), "got: {err:?}");
}

#[test]
fn validation_fails_on_leaf_survival_above_one() {
    let mut v = to_value(&trained());
    let curves = v
        .pointer_mut("/model/forest/trees/0/leaf_survival")
        .and_then(|x| x.as_array_mut())
        .expect("leaf_survival array");
    let leaf = curves
        .iter_mut()
        .find(|c| c.as_array().is_some_and(|a| !a.is_empty()))
        .expect("tree has a leaf");
    leaf[0] = Value::from(1.5);

    let err = read_err(v);
    assert!(matches!(err, ReadError::Validation(_)), "got: {err:?}");
}

#[test]
fn validation_fails_on_tree_count_mismatch() {
    let mut v = to_value(&trained());
    let forest = v.pointer_mut("/model/forest").expect("forest exists");
    forest["n_tree"] = Value::from(7u64);

    let err = read_err(v);
    assert!(matches!(err, ReadError::Validation(_)), "got: {err:?}");
}

#[test]
fn validation_fails_on_oob_row_out_of_range() {
    let mut v = to_value(&trained());
    let rows = v
        .pointer_mut("/model/forest/trees/0/rows_oobag")
        .and_then(|x| x.as_array_mut())
        .expect("rows_oobag array");
    rows.push(Value::from(150u64));

    let err = read_err(v);
    assert!(matches!(err, ReadError::Validation(_)), "got: {err:?}");
}

#[test]
fn validation_fails_on_coefficient_column_out_of_range() {
    let mut v = to_value(&trained());
    let forest = v.pointer_mut("/model/forest").expect("forest exists");
    forest["n_features"] = Value::from(0u64);

    let err = read_err(v);
    assert!(matches!(err, ReadError::Validation(_)), "got: {err:?}");
}

#[test]
fn validation_fails_on_unsorted_horizon() {
    let mut v = to_value(&trained());
    v["model"]["pred_horizon"] = Value::from(vec![6.0, 2.0]);

    let err = read_err(v);
    assert!(matches!(err, ReadError::Validation(_)), "got: {err:?}");
}

#[test]
fn missing_field_is_json_error() {
    let mut v = to_value(&trained());
    v["model"]
        .as_object_mut()
        .expect("model object")
        .remove("forest");

    let err = read_err(v);
    assert!(matches!(err, ReadError::Json(_)), "got: {err:?}");
}
