mod support;

use support::fixtures::{imbalanced, label_counts};
use tabfold::data::sim;
use tabfold::resample::{
    BootstrapOptions, McCvOptions, Split, SplitOptions, ValidationSplitOptions, VfoldOptions,
    bootstraps, initial_split, initial_validation_split, mc_cv, vfold_cv,
};

/// Quartile cut points of `values` restricted to `rows`.
fn quartile_cuts(values: &[f64], rows: &[usize]) -> [f64; 3] {
    let mut sorted: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
    sorted.sort_by(f64::total_cmp);
    let at = |q: usize| sorted[sorted.len() * q / 4];
    [at(1), at(2), at(3)]
}

/// Share of `rows` falling in each quartile given by `cuts`.
fn quartile_shares(values: &[f64], rows: &[usize], cuts: &[f64; 3]) -> [f64; 4] {
    let mut counts = [0usize; 4];
    for &row in rows {
        let quartile = cuts.iter().filter(|&&cut| values[row] >= cut).count();
        counts[quartile] += 1;
    }
    counts.map(|count| count as f64 / rows.len() as f64)
}

/// Analysis and assessment rows are disjoint and together cover every row.
fn assert_holdout_is_complement(split: &Split, n: usize) {
    let mut in_analysis = vec![false; n];
    for &row in split.analysis() {
        in_analysis[row] = true;
    }
    assert!(!split.assessment().is_empty(), "{} has no holdout", split.id());
    assert!(split.assessment().iter().all(|&row| !in_analysis[row]));
    let covered = in_analysis.iter().filter(|&&seen| seen).count() + split.assessment().len();
    assert_eq!(covered, n, "{} does not cover every row", split.id());
}

#[test]
fn vfold_assessment_sets_partition_rows() {
    let data = sim::sim_concrete(503, 9);
    let folds = vfold_cv(
        &data,
        &VfoldOptions {
            v: 7,
            ..VfoldOptions::default()
        },
    )
    .unwrap();
    assert_eq!(folds.len(), 7);
    let mut seen = vec![0usize; data.n_rows()];
    for split in folds.splits() {
        for &row in split.assessment() {
            seen[row] += 1;
        }
        assert_eq!(split.analysis().len() + split.assessment().len(), data.n_rows());
        let sizes = split.assessment().len();
        assert!((71..=72).contains(&sizes), "fold size {sizes}");
    }
    assert!(seen.iter().all(|&count| count == 1));
}

#[test]
fn stratified_split_keeps_rare_class_proportion() {
    let data = imbalanced(400);
    let split = initial_split(
        &data,
        &SplitOptions {
            prop: 0.75,
            strata: Some("class".to_string()),
            ..SplitOptions::default()
        },
    )
    .unwrap();
    let training = split.training(&data).unwrap();
    let testing = split.testing(&data).unwrap();
    assert_eq!(label_counts(&training, "class")["rare"], 30);
    assert_eq!(label_counts(&testing, "class")["rare"], 10);
    let prop = training.n_rows() as f64 / data.n_rows() as f64;
    assert!((prop - 0.75).abs() < 0.01);
}

#[test]
fn numeric_strata_balance_outcome_quartiles() {
    let data = sim::sim_housing(1200, 5);
    let split = initial_split(
        &data,
        &SplitOptions {
            strata: Some("sale_price".to_string()),
            ..SplitOptions::default()
        },
    )
    .unwrap();
    let prices = data.numeric("sale_price").unwrap();
    let cuts = quartile_cuts(prices, split.analysis());
    let training = quartile_shares(prices, split.analysis(), &cuts);
    let testing = quartile_shares(prices, split.assessment(), &cuts);
    for (quartile, (a, b)) in training.iter().zip(&testing).enumerate() {
        assert!((a - b).abs() < 0.04, "quartile {quartile}: {a:.3} vs {b:.3}");
    }
}

#[test]
fn stratified_vfold_partitions_rows_and_balances_quartiles() {
    let data = sim::sim_housing(1000, 12);
    let folds = vfold_cv(
        &data,
        &VfoldOptions {
            v: 5,
            strata: Some("sale_price".to_string()),
            ..VfoldOptions::default()
        },
    )
    .unwrap();
    assert_eq!(folds.strata.as_deref(), Some("sale_price"));
    let prices = data.numeric("sale_price").unwrap();
    let all: Vec<usize> = (0..data.n_rows()).collect();
    let cuts = quartile_cuts(prices, &all);
    let mut seen = vec![0usize; data.n_rows()];
    for split in folds.splits() {
        assert_eq!(split.assessment().len(), 200);
        assert_holdout_is_complement(split, data.n_rows());
        for &row in split.assessment() {
            seen[row] += 1;
        }
        for share in quartile_shares(prices, split.assessment(), &cuts) {
            assert!((share - 0.25).abs() < 0.03, "{}: share {share:.3}", split.id());
        }
    }
    assert!(seen.iter().all(|&count| count == 1));
}

#[test]
fn stratified_bootstraps_keep_class_counts_and_hold_out_undrawn_rows() {
    let data = imbalanced(400);
    let folds = bootstraps(
        &data,
        &BootstrapOptions {
            times: 5,
            strata: Some("class".to_string()),
            ..BootstrapOptions::default()
        },
    )
    .unwrap();
    assert_eq!(folds.len(), 5);
    let classes = data.nominal("class").unwrap();
    for split in folds.splits() {
        assert_eq!(split.analysis().len(), 400);
        let rare = split
            .analysis()
            .iter()
            .filter(|&&row| classes[row] == "rare")
            .count();
        assert_eq!(rare, 40);
        assert_holdout_is_complement(split, data.n_rows());
    }
}

#[test]
fn splits_are_reproducible_from_seed() {
    let data = sim::sim_cells(300, 2);
    let options = SplitOptions {
        strata: Some("class".to_string()),
        seed: 1234,
        ..SplitOptions::default()
    };
    let a = initial_split(&data, &options).unwrap();
    let b = initial_split(&data, &options).unwrap();
    assert_eq!(a, b);
    let other = initial_split(
        &data,
        &SplitOptions {
            seed: 4321,
            ..options
        },
    )
    .unwrap();
    assert_ne!(a.analysis(), other.analysis());
}

#[test]
fn three_way_split_is_disjoint_and_covers_rows() {
    let data = sim::sim_regression(200, 8);
    let three = initial_validation_split(&data, &ValidationSplitOptions::default()).unwrap();
    let mut all: Vec<usize> = three
        .train
        .iter()
        .chain(&three.validation)
        .chain(&three.test)
        .copied()
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..200).collect::<Vec<_>>());
    assert_eq!(three.training(&data).unwrap().n_rows(), three.train.len());
    let final_split = three.final_split().unwrap();
    assert_eq!(
        final_split.analysis().len(),
        three.train.len() + three.validation.len()
    );
    let validation = three.validation_set().unwrap();
    assert_eq!(validation.len(), 1);
}

#[test]
fn monte_carlo_resamples_hold_out_the_remainder() {
    let data = sim::sim_regression(100, 4);
    let folds = mc_cv(
        &data,
        &McCvOptions {
            prop: 0.8,
            times: 6,
            ..McCvOptions::default()
        },
    )
    .unwrap();
    assert_eq!(folds.len(), 6);
    for split in folds.splits() {
        assert_eq!(split.analysis().len(), 80);
        assert_eq!(split.assessment().len(), 20);
    }
    assert_ne!(folds.splits()[0].assessment(), folds.splits()[1].assessment());
}

#[test]
fn stratified_monte_carlo_keeps_class_proportion_in_each_resample() {
    let data = imbalanced(400);
    let folds = mc_cv(
        &data,
        &McCvOptions {
            prop: 0.75,
            times: 4,
            strata: Some("class".to_string()),
            ..McCvOptions::default()
        },
    )
    .unwrap();
    assert_eq!(folds.len(), 4);
    for split in folds.splits() {
        let analysis = split.analysis_data(&data).unwrap();
        let assessment = split.assessment_data(&data).unwrap();
        assert_eq!(label_counts(&analysis, "class")["rare"], 30);
        assert_eq!(label_counts(&assessment, "class")["rare"], 10);
        assert_eq!(analysis.n_rows(), 300);
        assert_holdout_is_complement(split, data.n_rows());
    }
}
