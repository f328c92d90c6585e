use std::collections::BTreeMap;

use tabfold::data::{Column, Dataset};
use tabfold::ml::ModelSpec;
use tabfold::recipe::{Recipe, Selector, StepSpec};
use tabfold::workflow::Workflow;

/// Housing recipe: log outcome, pooled and dummy-coded neighborhoods, splines on location.
pub fn housing_recipe() -> Recipe {
    Recipe::new("sale_price")
        .step(StepSpec::Log {
            columns: Selector::names(["sale_price", "gr_liv_area"]),
            base: 10.0,
            offset: 0.0,
        })
        .step(StepSpec::Other {
            columns: Selector::names(["neighborhood"]),
            threshold: 0.01,
            other_label: "other".to_string(),
        })
        .step(StepSpec::Dummy {
            columns: Selector::AllNominalPredictors,
            one_hot: false,
        })
        .step(StepSpec::Ns {
            columns: Selector::names(["latitude", "longitude"]),
            deg_free: 4,
        })
}

pub fn concrete_workflow(model: ModelSpec) -> Workflow {
    Workflow::new(
        Recipe::new("compressive_strength").step(StepSpec::Normalize {
            columns: Selector::AllNumericPredictors,
        }),
        model,
    )
}

/// Count of each label in a nominal column.
pub fn label_counts(data: &Dataset, column: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for label in data.nominal(column).expect("nominal column") {
        *counts.entry(label.clone()).or_insert(0) += 1;
    }
    counts
}

/// Small dataset with a rare class, for stratification checks.
pub fn imbalanced(n: usize) -> Dataset {
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let class: Vec<String> = (0..n)
        .map(|i| if i % 10 == 0 { "rare" } else { "common" }.to_string())
        .collect();
    Dataset::new(vec![
        ("x".to_string(), Column::Numeric(x)),
        ("class".to_string(), Column::Nominal(class)),
    ])
    .and_then(|data| data.with_outcome("class"))
    .expect("valid dataset")
}
