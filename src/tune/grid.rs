use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::TuneError;

/// Parameter values for one tuning candidate, keyed by parameter name.
pub type ParamSet = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Linear,
    /// `min` and `max` are exponents: values span `10^min ..= 10^max`.
    Log10,
}

/// Search range of one tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub scale: Scale,
    /// Round values to whole numbers.
    #[serde(default)]
    pub integer: bool,
}

impl ParamRange {
    pub fn linear(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            scale: Scale::Linear,
            integer: false,
        }
    }

    pub fn log10(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            scale: Scale::Log10,
            ..Self::linear(name, min, max)
        }
    }

    pub fn integer(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            integer: true,
            ..Self::linear(name, min, max)
        }
    }

    fn validate(&self) -> Result<(), TuneError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(TuneError::InvalidRange(self.name.clone()));
        }
        Ok(())
    }

    /// Map a position in `[0, 1]` of the (transformed) range to a value.
    fn at(&self, position: f64) -> f64 {
        let raw = self.min + position * (self.max - self.min);
        let value = match self.scale {
            Scale::Linear => raw,
            Scale::Log10 => 10f64.powf(raw),
        };
        if self.integer { value.round() } else { value }
    }
}

/// Every combination of `levels` evenly spaced values per parameter.
///
/// The first parameter varies fastest. Duplicate combinations (from integer
/// rounding) are dropped.
pub fn grid_regular(params: &[ParamRange], levels: usize) -> Result<Vec<ParamSet>, TuneError> {
    if levels == 0 {
        return Err(TuneError::EmptyGrid);
    }
    for param in params {
        param.validate()?;
    }
    let axes: Vec<Vec<f64>> = params
        .iter()
        .map(|param| {
            (0..levels)
                .map(|i| {
                    let position = if levels == 1 {
                        0.5
                    } else {
                        i as f64 / (levels - 1) as f64
                    };
                    param.at(position)
                })
                .collect()
        })
        .collect();
    let total: usize = axes.iter().map(Vec::len).product();
    let mut grid = Vec::with_capacity(total);
    for mut index in 0..total {
        let mut candidate = ParamSet::new();
        for (param, axis) in params.iter().zip(&axes) {
            candidate.insert(param.name.clone(), axis[index % axis.len()]);
            index /= axis.len();
        }
        if !grid.contains(&candidate) {
            grid.push(candidate);
        }
    }
    Ok(grid)
}

/// `size` candidates drawn uniformly over each (transformed) range.
pub fn grid_random(params: &[ParamRange], size: usize, seed: u64) -> Result<Vec<ParamSet>, TuneError> {
    if size == 0 {
        return Err(TuneError::EmptyGrid);
    }
    for param in params {
        param.validate()?;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut grid: Vec<ParamSet> = Vec::with_capacity(size);
    // integer ranges can run out of distinct combinations
    let max_draws = size * 20;
    for _ in 0..max_draws {
        if grid.len() == size {
            break;
        }
        let candidate: ParamSet = params
            .iter()
            .map(|param| (param.name.clone(), param.at(rng.random::<f64>())))
            .collect();
        if !grid.contains(&candidate) {
            grid.push(candidate);
        }
    }
    Ok(grid)
}
