use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::LogRegModel;
use crate::ml::gbdt_stump::softmax;
use crate::ml::{ModelError, Target, check_training_input, column_scaling, encode_labels};

/// Training options for softmax regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub batch_size: usize,
    pub seed: u64,
    pub balance_classes: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.1,
            l2: 0.0,
            batch_size: 64,
            seed: 42,
            balance_classes: false,
        }
    }
}

pub fn train_logreg(
    x: &Array2<f64>,
    target: &Target,
    options: &TrainOptions,
) -> Result<LogRegModel, ModelError> {
    check_training_input(x, target)?;
    let Target::Labels(labels) = target else {
        return Err(ModelError::ModeMismatch {
            model: "logistic_reg",
            mode: target.kind(),
        });
    };
    if !(options.learning_rate > 0.0) {
        return Err(ModelError::InvalidHyperparameter {
            name: "learning_rate".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    let (classes, y) = encode_labels(labels);
    let n_classes = classes.len();
    if n_classes < 2 {
        return Err(ModelError::TooFewClasses(n_classes));
    }
    let dim = x.ncols();
    let (means, scales) = column_scaling(x);
    let z = (x - &Array1::from(means.clone())) / &Array1::from(scales.clone());
    let class_weights = if options.balance_classes {
        balanced_weights(&y, n_classes)
    } else {
        vec![1.0; n_classes]
    };

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut weights =
        Array2::from_shape_fn((n_classes, dim), |_| (rng.random::<f64>() - 0.5) * 0.01);
    let mut bias = Array1::<f64>::zeros(n_classes);
    let mut indices: Vec<usize> = (0..z.nrows()).collect();
    let batch_size = options.batch_size.max(1);
    let lr = options.learning_rate;
    let l2 = options.l2.max(0.0);

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            let mut grad_w = Array2::<f64>::zeros((n_classes, dim));
            let mut grad_b = Array1::<f64>::zeros(n_classes);
            let mut batch_weight = 0.0f64;
            for &idx in chunk {
                let weight = class_weights[y[idx]];
                if weight == 0.0 {
                    continue;
                }
                let row = z.row(idx);
                let logits = weights.dot(&row) + &bias;
                // d(cross-entropy)/d(logit) = p - onehot
                let mut diff = Array1::from(softmax(&logits.to_vec()));
                diff[y[idx]] -= 1.0;
                diff *= weight;
                for (mut grad, &d) in grad_w.rows_mut().into_iter().zip(&diff) {
                    grad.scaled_add(d, &row);
                }
                grad_b += &diff;
                batch_weight += weight;
            }
            if batch_weight == 0.0 {
                continue;
            }
            let inv = 1.0 / batch_weight;
            weights.zip_mut_with(&grad_w, |w, g| *w -= lr * (g * inv + l2 * *w));
            bias.scaled_add(-lr * inv, &grad_b);
        }
    }

    let model = LogRegModel {
        model_version: 1,
        classes,
        n_features: dim,
        means,
        scales,
        weights: weights.iter().copied().collect(),
        bias: bias.to_vec(),
    };
    model.validate()?;
    Ok(model)
}

/// Inverse class frequency, scaled so a balanced sample weighs 1 per row.
fn balanced_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    counts
        .into_iter()
        .map(|count| match count {
            0 => 0.0,
            count => y.len() as f64 / (n_classes * count) as f64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sim;

    #[test]
    fn separates_two_class_simulation() {
        let data = sim::sim_two_class(400, 3);
        let x = data.predictor_matrix().unwrap();
        let target = Target::from_dataset(&data).unwrap();
        let model = train_logreg(&x, &target, &TrainOptions::default()).unwrap();
        let Target::Labels(labels) = &target else {
            unreachable!()
        };
        let correct = model
            .predict_proba(&x)
            .unwrap()
            .iter()
            .zip(labels)
            .filter(|(probs, label)| {
                let best = crate::ml::argmax(probs);
                &model.classes[best] == *label
            })
            .count();
        assert!(correct as f64 / 400.0 > 0.65);
    }

    #[test]
    fn rejects_numeric_outcome() {
        let x = ndarray::array![[1.0], [2.0]];
        let err = train_logreg(&x, &Target::Numeric(vec![1.0, 2.0]), &TrainOptions::default())
            .unwrap_err();
        assert!(matches!(err, ModelError::ModeMismatch { .. }));
    }

    #[test]
    fn same_seed_same_weights() {
        let data = sim::sim_two_class(100, 1);
        let x = data.predictor_matrix().unwrap();
        let target = Target::from_dataset(&data).unwrap();
        let a = train_logreg(&x, &target, &TrainOptions::default()).unwrap();
        let b = train_logreg(&x, &target, &TrainOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn balanced_weights_upweight_the_rare_class() {
        let weights = balanced_weights(&[0, 0, 0, 1], 3);
        assert!((weights[0] - 4.0 / 9.0).abs() < 1e-12);
        assert!((weights[1] - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(weights[2], 0.0);
    }
}
