mod support;

use support::fixtures::concrete_workflow;
use tabfold::compare::WorkflowSet;
use tabfold::data::sim;
use tabfold::ml::ModelSpec;
use tabfold::ml::metrics::MetricKind;
use tabfold::recipe::{Recipe, Selector, StepSpec};
use tabfold::resample::{VfoldOptions, vfold_cv};
use tabfold::tune::{
    ControlResamples, ParamRange, ParamSet, RaceOptions, finalize_workflow, fit_resamples,
    grid_regular, tune_grid, tune_race_anova,
};
use tabfold::workflow::Workflow;

#[test]
fn fit_resamples_reports_one_value_per_fold_and_metric() {
    let data = sim::sim_concrete(300, 1);
    let folds = vfold_cv(
        &data,
        &VfoldOptions {
            v: 5,
            ..VfoldOptions::default()
        },
    )
    .unwrap();
    let results = fit_resamples(
        &concrete_workflow(ModelSpec::linear_reg()),
        &data,
        &folds,
        &[MetricKind::Rmse, MetricKind::Rsq, MetricKind::Mae],
        &ControlResamples { keep_models: true },
    )
    .unwrap();
    assert_eq!(results.metrics.len(), 15);
    let summary = results.collect_metrics();
    assert_eq!(summary.len(), 3);
    assert!(summary.iter().all(|s| s.n == 5 && s.std_err.is_finite()));
    assert_eq!(results.models.as_ref().map(Vec::len), Some(5));
}

#[test]
fn grid_search_over_neighbors_picks_a_candidate() {
    let data = sim::sim_concrete(250, 2);
    let folds = vfold_cv(
        &data,
        &VfoldOptions {
            v: 4,
            ..VfoldOptions::default()
        },
    )
    .unwrap();
    let workflow = concrete_workflow(ModelSpec::nearest_neighbor());
    let grid = grid_regular(&[ParamRange::integer("neighbors", 1.0, 21.0)], 3).unwrap();
    let results = tune_grid(&workflow, &data, &folds, &grid, &[MetricKind::Rmse]).unwrap();
    assert_eq!(results.candidates.len(), 3);
    assert!(results.candidates.iter().all(|c| c.metrics.len() == 4));

    let best = results.select_best(MetricKind::Rmse).unwrap();
    let shown = results.show_best(MetricKind::Rmse, 1);
    assert_eq!(shown[0].params, best);
    let simple = results
        .select_by_one_std_err(MetricKind::Rmse, "neighbors", true)
        .unwrap();
    assert!(simple["neighbors"] >= best["neighbors"]);

    let finalized = finalize_workflow(&workflow, &best).unwrap();
    assert_eq!(
        finalized.model,
        ModelSpec::NearestNeighbor {
            neighbors: best["neighbors"] as usize,
            weight_func: Default::default(),
        }
    );
}

#[test]
fn racing_drops_a_hopeless_candidate_early() {
    let data = sim::sim_regression(300, 3);
    let folds = vfold_cv(&data, &VfoldOptions::default()).unwrap();
    let workflow = Workflow::new(Recipe::new("outcome"), ModelSpec::linear_reg());
    let grid = vec![
        ParamSet::from([("penalty".to_string(), 0.0)]),
        ParamSet::from([("penalty".to_string(), 1.0e4)]),
    ];
    let results = tune_race_anova(
        &workflow,
        &data,
        &folds,
        &grid,
        &[MetricKind::Rmse],
        &RaceOptions::default(),
    )
    .unwrap();
    assert_eq!(results.candidates[0].eliminated_at, None);
    assert_eq!(results.candidates[0].metrics.len(), 10);
    let dropped = results.candidates[1].eliminated_at.unwrap();
    assert!((3..10).contains(&dropped));
    assert_eq!(results.candidates[1].metrics.len(), dropped);
    assert_eq!(results.select_best(MetricKind::Rmse).unwrap()["penalty"], 0.0);
}

#[test]
fn heavy_penalty_ranks_below_plain_fit() {
    let data = sim::sim_housing(600, 30);
    let folds = vfold_cv(
        &data,
        &VfoldOptions {
            v: 5,
            ..VfoldOptions::default()
        },
    )
    .unwrap();
    let recipe = Recipe::new("sale_price")
        .step(StepSpec::Log {
            columns: Selector::names(["sale_price", "gr_liv_area"]),
            base: 10.0,
            offset: 0.0,
        })
        .step(StepSpec::Dummy {
            columns: Selector::AllNominalPredictors,
            one_hot: false,
        });
    let set = WorkflowSet::cross(
        &[("basic".to_string(), recipe)],
        &[
            ("lm".to_string(), ModelSpec::linear_reg()),
            ("ridge".to_string(), ModelSpec::LinearReg { penalty: 100.0 }),
        ],
    );
    let results = set
        .evaluate_all(&data, &folds, &[MetricKind::Rmse], &ControlResamples::default())
        .unwrap();
    let ranking = results.rank_results(MetricKind::Rmse);
    assert_eq!(ranking[0].wflow_id, "basic_lm");
    assert_eq!(ranking[1].rank, 2);

    let test = results
        .paired_t_test("basic_lm", "basic_ridge", MetricKind::Rmse)
        .unwrap();
    assert_eq!(test.n, 5);
    assert!(test.mean_difference < 0.0);
    assert!(test.p_value < 0.05);
    let contrast = results
        .posterior_contrast("basic_lm", "basic_ridge", MetricKind::Rmse, 0.0, 0.9)
        .unwrap();
    assert!(contrast.prob_a_better > 0.95);
    assert!((contrast.prob_a_better + contrast.prob_b_better - 1.0).abs() < 1e-9);
}
