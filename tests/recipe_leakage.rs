mod support;

use support::fixtures::housing_recipe;
use tabfold::data::{Column, sim};
use tabfold::recipe::{Recipe, Selector, StepSpec};
use tabfold::resample::{SplitOptions, initial_split};

#[test]
fn prepared_recipe_is_unchanged_by_baking_test_rows() {
    let data = sim::sim_housing(800, 21);
    let split = initial_split(&data, &SplitOptions::default()).unwrap();
    let training = split.training(&data).unwrap();
    let testing = split.testing(&data).unwrap();
    let prepared = housing_recipe().prep(&training).unwrap();
    let snapshot = prepared.clone();

    let baked_test = prepared.bake(&testing).unwrap();
    assert_eq!(prepared, snapshot);
    assert_eq!(baked_test.n_rows(), testing.n_rows());
    assert_eq!(
        baked_test.names(),
        prepared.bake(&training).unwrap().names()
    );
}

#[test]
fn baking_twice_gives_identical_output() {
    let data = sim::sim_housing(500, 3);
    let prepared = housing_recipe().prep(&data).unwrap();
    let first = prepared.bake(&data).unwrap();
    let second = prepared.bake(&data).unwrap();
    assert_eq!(first, second);
}

#[test]
fn normalization_uses_training_statistics_only() {
    let data = sim::sim_concrete(400, 6);
    let split = initial_split(&data, &SplitOptions::default()).unwrap();
    let training = split.training(&data).unwrap();
    let recipe = Recipe::new("compressive_strength").step(StepSpec::Normalize {
        columns: Selector::names(["cement"]),
    });
    let prepared = recipe.prep(&training).unwrap();

    let baked_train = prepared.bake(&training).unwrap();
    let train_cement = baked_train.numeric("cement").unwrap();
    let mean: f64 = train_cement.iter().sum::<f64>() / train_cement.len() as f64;
    assert!(mean.abs() < 1e-9);

    // shifting only the new rows must shift their baked values by the same scaled amount
    let testing = split.testing(&data).unwrap();
    let shifted: Vec<f64> = testing
        .numeric("cement")
        .unwrap()
        .iter()
        .map(|v| v + 100.0)
        .collect();
    let shifted = testing
        .with_column("cement", Column::Numeric(shifted))
        .unwrap();
    let base = prepared.bake(&testing).unwrap();
    let moved = prepared.bake(&shifted).unwrap();
    let deltas: Vec<f64> = base
        .numeric("cement")
        .unwrap()
        .iter()
        .zip(moved.numeric("cement").unwrap())
        .map(|(a, b)| b - a)
        .collect();
    let first = deltas[0];
    assert!(first > 0.0);
    assert!(deltas.iter().all(|d| (d - first).abs() < 1e-9));
}

#[test]
fn unseen_levels_do_not_fail_baking() {
    let data = sim::sim_housing(300, 12);
    let prepared = housing_recipe().prep(&data).unwrap();
    let n = data.n_rows();
    let odd = data
        .with_column(
            "neighborhood",
            Column::Nominal(vec!["Atlantis".to_string(); n]),
        )
        .unwrap();
    let baked = prepared.bake(&odd).unwrap();
    assert_eq!(baked.n_rows(), n);
}
