use super::*;
use crate::data::{Column, sim};

fn housing_recipe() -> Recipe {
    Recipe::new("sale_price")
        .step(StepSpec::Log {
            columns: Selector::names(["sale_price", "gr_liv_area"]),
            base: 10.0,
            offset: 0.0,
        })
        .step(StepSpec::Other {
            columns: Selector::names(["neighborhood"]),
            threshold: 0.01,
            other_label: "other".into(),
        })
        .step(StepSpec::Dummy {
            columns: Selector::AllNominalPredictors,
            one_hot: false,
        })
        .step(StepSpec::Interact {
            terms: vec![InteractionTerm {
                left: Selector::names(["gr_liv_area"]),
                right: Selector::StartsWith("bldg_type_".into()),
            }],
        })
        .step(StepSpec::Ns {
            columns: Selector::names(["latitude", "longitude"]),
            deg_free: 20,
        })
}

#[test]
fn prep_then_bake_produces_numeric_design() {
    let data = sim::sim_housing(600, 4);
    let prepared = housing_recipe().prep(&data).unwrap();
    let baked = prepared.bake(&data).unwrap();
    assert_eq!(baked.outcome(), Some("sale_price"));
    assert!(baked.predictor_matrix().is_ok());
    assert!(baked.has_column("latitude_ns_20"));
    assert!(!baked.has_column("latitude"));
    assert!(
        baked
            .names()
            .iter()
            .any(|name| name.starts_with("gr_liv_area_x_bldg_type_"))
    );
    assert_eq!(baked.predictor_names(), prepared.predictors);
}

#[test]
fn baking_new_data_does_not_change_fitted_parameters() {
    let data = sim::sim_housing(600, 4);
    let prepared = housing_recipe().prep(&data.take_rows(&(0..400).collect::<Vec<_>>()).unwrap()).unwrap();
    let before = prepared.clone();
    let other = sim::sim_housing(300, 99);
    prepared.bake(&other).unwrap();
    assert_eq!(prepared, before);
}

#[test]
fn baking_is_idempotent() {
    let data = sim::sim_housing(500, 8);
    let prepared = housing_recipe().prep(&data).unwrap();
    let first = prepared.bake(&data).unwrap();
    let second = prepared.bake(&data).unwrap();
    assert_eq!(first, second);
}

#[test]
fn baked_columns_follow_training_parameters() {
    let data = sim::sim_concrete(300, 3);
    let prepared = Recipe::new("compressive_strength")
        .step(StepSpec::Normalize {
            columns: Selector::AllNumericPredictors,
        })
        .prep(&data)
        .unwrap();
    let FittedStep::Normalize { moments } = &prepared.steps[0] else {
        panic!("expected a normalize step");
    };
    let cement = moments.iter().find(|m| m.column == "cement").unwrap();
    let raw = data.numeric("cement").unwrap();
    assert!((cement.mean - crate::stats::mean(raw)).abs() < 1e-9);

    let shifted = data
        .with_column(
            "cement",
            Column::Numeric(raw.iter().map(|v| v + 1000.0).collect()),
        )
        .unwrap();
    let baked = prepared.bake(&shifted).unwrap();
    let expected = (raw[0] + 1000.0 - cement.mean) / cement.sd;
    assert!((baked.numeric("cement").unwrap()[0] - expected).abs() < 1e-9);
}

#[test]
fn bake_without_outcome_keeps_predictors() {
    let data = sim::sim_housing(400, 1);
    let prepared = housing_recipe().prep(&data).unwrap();
    let new_data = data.without_columns(&["sale_price".to_string()]);
    let baked = prepared.bake(&new_data).unwrap();
    assert_eq!(baked.outcome(), None);
    assert_eq!(baked.names(), prepared.predictors.as_slice());
}

#[test]
fn pca_threshold_and_num_comp() {
    let data = sim::sim_cells(400, 5);
    let base = Recipe::new("class")
        .step(StepSpec::Normalize {
            columns: Selector::AllNumericPredictors,
        })
        .step(StepSpec::Pca {
            columns: Selector::AllNumericPredictors,
            num_comp: 3,
            threshold: None,
        });
    let prepared = base.prep(&data).unwrap();
    assert_eq!(prepared.predictors, vec!["PC1", "PC2", "PC3"]);

    let mut tuned = base.clone();
    tuned.set_param("pca.threshold", 1.0).unwrap();
    let prepared = tuned.prep(&data).unwrap();
    assert_eq!(prepared.n_predictors(), 8);
}

#[test]
fn set_param_rejects_unknown_names() {
    let mut recipe = housing_recipe();
    assert_eq!(recipe.tunable_params(), vec!["threshold", "deg_free"]);
    recipe.set_param("deg_free", 4.0).unwrap();
    assert!(matches!(
        recipe.steps[4],
        StepSpec::Ns { deg_free: 4, .. }
    ));
    assert!(matches!(
        recipe.set_param("num_comp", 2.0),
        Err(RecipeError::UnknownParameter(_))
    ));
}

#[test]
fn shared_parameter_names_must_be_qualified() {
    let mut recipe = Recipe::new("class")
        .step(StepSpec::Other {
            columns: Selector::AllNominalPredictors,
            threshold: 0.05,
            other_label: "other".to_string(),
        })
        .step(StepSpec::Pca {
            columns: Selector::AllNumericPredictors,
            num_comp: 2,
            threshold: None,
        });
    assert_eq!(
        recipe.tunable_params(),
        vec!["other.threshold", "num_comp", "pca.threshold"]
    );
    match recipe.set_param("threshold", 10.0) {
        Err(RecipeError::AmbiguousParameter { candidates, .. }) => {
            assert_eq!(candidates, vec!["other.threshold", "pca.threshold"]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    recipe.set_param("other.threshold", 10.0).unwrap();
    recipe.set_param("pca.threshold", 0.9).unwrap();
    assert!(matches!(recipe.steps[0], StepSpec::Other { threshold, .. } if threshold == 10.0));
    assert!(matches!(recipe.steps[1], StepSpec::Pca { threshold: Some(t), .. } if t == 0.9));
    assert!(recipe.has_param("other.threshold"));
    assert!(!recipe.has_param("ns.deg_free"));
}

#[test]
fn missing_outcome_in_training_is_an_error() {
    let data = sim::sim_regression(50, 1);
    let err = Recipe::new("nope").prep(&data).unwrap_err();
    assert!(matches!(err, RecipeError::MissingColumn(name) if name == "nope"));
}

#[test]
fn degenerate_spline_is_reported() {
    let data = Dataset::new(vec![
        ("x".into(), Column::Numeric(vec![1.0, 1.0, 1.0, 2.0])),
        ("y".into(), Column::Numeric(vec![1.0, 2.0, 3.0, 4.0])),
    ])
    .unwrap();
    let err = Recipe::new("y")
        .step(StepSpec::Ns {
            columns: Selector::names(["x"]),
            deg_free: 3,
        })
        .prep(&data)
        .unwrap_err();
    assert!(matches!(err, RecipeError::DegenerateSpline { .. }));
}

#[test]
fn steps_parse_from_toml() {
    let text = r#"
outcome = "sale_price"

[[steps]]
step = "log"
columns = { names = ["sale_price"] }
base = 10.0

[[steps]]
step = "dummy"
columns = "all_nominal_predictors"

[[steps]]
step = "ns"
columns = { starts_with = "lat" }
"#;
    let recipe: Recipe = toml::from_str(text).unwrap();
    assert_eq!(recipe.steps.len(), 3);
    assert!(matches!(recipe.steps[2], StepSpec::Ns { deg_free: 5, .. }));
}
