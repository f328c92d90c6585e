use std::path::PathBuf;

pub(super) const MIN_ROWS: usize = 20;

pub(super) fn clamp_prob(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.5, 0.999)
    } else {
        default_prob()
    }
}

pub(super) fn clamp_alpha(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        value
    } else {
        fallback
    }
}

pub(super) fn default_dataset() -> String {
    "sim_concrete".to_string()
}

pub(super) fn default_output_dir() -> PathBuf {
    PathBuf::from("tabfold-output")
}

pub(super) fn default_levels() -> usize {
    3
}

pub(super) fn default_grid_size() -> usize {
    10
}

pub(super) fn default_grid_seed() -> u64 {
    2024
}

pub(super) fn default_prob() -> f64 {
    0.9
}

pub(super) fn default_rope() -> f64 {
    0.0
}
