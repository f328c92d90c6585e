//! Deterministic simulated stand-ins for the curriculum datasets.
//!
//! Each generator is seeded, so a given `(n, seed)` always yields the same rows.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::frame::{Column, Dataset};

const NEIGHBORHOODS: &[(&str, f64, f64)] = &[
    // (name, weight, latitude center)
    ("North_Ames", 0.15, 42.047),
    ("College_Creek", 0.09, 42.022),
    ("Old_Town", 0.08, 42.028),
    ("Edwards", 0.07, 42.020),
    ("Somerset", 0.06, 42.053),
    ("Northridge_Heights", 0.06, 42.058),
    ("Gilbert", 0.06, 42.060),
    ("Sawyer", 0.05, 42.033),
    ("Mitchell", 0.04, 41.993),
    ("Timberland", 0.03, 41.998),
    ("Stone_Brook", 0.02, 42.059),
    ("Blueste", 0.004, 42.010),
    ("Green_Hills", 0.002, 42.000),
    ("Landmark", 0.001, 42.004),
];

const BUILDING_TYPES: &[(&str, f64, f64)] = &[
    // (name, weight, price multiplier per log-area unit)
    ("OneFam", 0.83, 1.00),
    ("TwnhsE", 0.08, 0.92),
    ("Duplex", 0.04, 0.70),
    ("Twnhs", 0.03, 0.85),
    ("TwoFmCon", 0.02, 0.75),
];

const CONCRETE_AGES: &[f64] = &[3.0, 7.0, 14.0, 28.0, 56.0, 90.0, 180.0, 365.0];

/// Housing sale prices with rare neighborhoods and a nonlinear latitude effect.
pub fn sim_housing(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut neighborhood = Vec::with_capacity(n);
    let mut bldg_type = Vec::with_capacity(n);
    let mut gr_liv_area = Vec::with_capacity(n);
    let mut year_built = Vec::with_capacity(n);
    let mut latitude = Vec::with_capacity(n);
    let mut longitude = Vec::with_capacity(n);
    let mut sale_price = Vec::with_capacity(n);

    for _ in 0..n {
        let hood = weighted_pick(&mut rng, NEIGHBORHOODS.iter().map(|h| h.1));
        let (hood_name, _, lat_center) = NEIGHBORHOODS[hood];
        let bt = weighted_pick(&mut rng, BUILDING_TYPES.iter().map(|b| b.1));
        let (bt_name, _, bt_slope) = BUILDING_TYPES[bt];

        let area = (7.25 + 0.32 * normal(&mut rng)).exp().clamp(330.0, 5600.0);
        let year = (1870.0 + rng.random::<f64>() * 140.0).round();
        let lat = lat_center + 0.006 * normal(&mut rng);
        let lon = -93.64 + 0.025 * normal(&mut rng);

        let lat_effect = 0.12 * ((lat - 41.99) / 0.07 * PI).sin();
        let log_price = 4.2
            + 0.55 * bt_slope * (area / 1500.0).ln()
            + 0.0025 * (year - 1970.0)
            + lat_effect
            + 0.05 * normal(&mut rng);

        neighborhood.push(hood_name.to_string());
        bldg_type.push(bt_name.to_string());
        gr_liv_area.push(area.round());
        year_built.push(year);
        latitude.push(lat);
        longitude.push(lon);
        sale_price.push(10f64.powf(log_price + 1.0).round());
    }

    build(
        vec![
            ("neighborhood", Column::Nominal(neighborhood)),
            ("bldg_type", Column::Nominal(bldg_type)),
            ("gr_liv_area", Column::Numeric(gr_liv_area)),
            ("year_built", Column::Numeric(year_built)),
            ("latitude", Column::Numeric(latitude)),
            ("longitude", Column::Numeric(longitude)),
            ("sale_price", Column::Numeric(sale_price)),
        ],
        "sale_price",
    )
}

/// Two-class cell segmentation quality with correlated imaging features.
pub fn sim_cells(n: usize, seed: u64) -> Dataset {
    const FEATURES: &[&str] = &[
        "area_ch_1",
        "avg_inten_ch_1",
        "avg_inten_ch_2",
        "convex_hull_perim_ratio_ch_1",
        "fiber_width_ch_1",
        "shape_p_2_a_ch_1",
        "total_inten_ch_2",
        "var_inten_ch_4",
    ];
    // loadings of each feature on three latent factors
    const LOADINGS: &[[f64; 3]] = &[
        [0.9, 0.1, 0.0],
        [0.2, 0.8, 0.1],
        [0.1, 0.9, 0.2],
        [-0.7, 0.0, 0.3],
        [0.8, 0.2, -0.1],
        [-0.6, 0.1, 0.5],
        [0.3, 0.7, 0.3],
        [0.0, 0.3, 0.9],
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n); FEATURES.len()];
    let mut class = Vec::with_capacity(n);
    for _ in 0..n {
        let well = rng.random::<f64>() < 0.36;
        let shift = if well { [0.9, -0.6, 0.4] } else { [0.0, 0.0, 0.0] };
        let latent = [
            normal(&mut rng) + shift[0],
            normal(&mut rng) + shift[1],
            normal(&mut rng) + shift[2],
        ];
        for (j, load) in LOADINGS.iter().enumerate() {
            let signal: f64 = load.iter().zip(latent.iter()).map(|(l, z)| l * z).sum();
            let scale = 10f64.powi(j as i32 % 3);
            columns[j].push((signal + 0.35 * normal(&mut rng)) * scale + 5.0 * scale);
        }
        class.push(if well { "WS" } else { "PS" }.to_string());
    }
    let mut named: Vec<(&str, Column)> = FEATURES
        .iter()
        .copied()
        .zip(columns.into_iter().map(Column::Numeric))
        .collect();
    named.push(("class", Column::Nominal(class)));
    build(named, "class")
}

/// Concrete compressive strength as a function of mixture and age.
pub fn sim_concrete(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cement = Vec::with_capacity(n);
    let mut slag = Vec::with_capacity(n);
    let mut fly_ash = Vec::with_capacity(n);
    let mut water = Vec::with_capacity(n);
    let mut superplasticizer = Vec::with_capacity(n);
    let mut coarse = Vec::with_capacity(n);
    let mut fine = Vec::with_capacity(n);
    let mut age = Vec::with_capacity(n);
    let mut strength = Vec::with_capacity(n);

    for _ in 0..n {
        let c = uniform(&mut rng, 100.0, 540.0);
        let s = if rng.random::<f64>() < 0.45 { 0.0 } else { uniform(&mut rng, 10.0, 360.0) };
        let f = if rng.random::<f64>() < 0.55 { 0.0 } else { uniform(&mut rng, 20.0, 200.0) };
        let w = uniform(&mut rng, 120.0, 250.0);
        let sp = if rng.random::<f64>() < 0.35 { 0.0 } else { uniform(&mut rng, 1.0, 32.0) };
        let ca = uniform(&mut rng, 800.0, 1150.0);
        let fa = uniform(&mut rng, 590.0, 990.0);
        let a = CONCRETE_AGES[rng.random_range(0..CONCRETE_AGES.len())];

        let binder = c + 0.6 * s + 0.4 * f;
        let ratio = binder / w;
        let maturity = 1.0 - (-a / 20.0).exp();
        let value = 8.0 + 22.0 * ratio * maturity + 0.35 * sp - 0.01 * (ca - 975.0)
            + 3.0 * normal(&mut rng);

        cement.push(c);
        slag.push(s);
        fly_ash.push(f);
        water.push(w);
        superplasticizer.push(sp);
        coarse.push(ca);
        fine.push(fa);
        age.push(a);
        strength.push(value.max(2.0));
    }

    build(
        vec![
            ("cement", Column::Numeric(cement)),
            ("blast_furnace_slag", Column::Numeric(slag)),
            ("fly_ash", Column::Numeric(fly_ash)),
            ("water", Column::Numeric(water)),
            ("superplasticizer", Column::Numeric(superplasticizer)),
            ("coarse_aggregate", Column::Numeric(coarse)),
            ("fine_aggregate", Column::Numeric(fine)),
            ("age", Column::Numeric(age)),
            ("compressive_strength", Column::Numeric(strength)),
        ],
        "compressive_strength",
    )
}

/// Friedman-style regression benchmark on five uniform predictors.
pub fn sim_regression(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut xs: Vec<Vec<f64>> = vec![Vec::with_capacity(n); 5];
    let mut outcome = Vec::with_capacity(n);
    for _ in 0..n {
        let row: Vec<f64> = (0..5).map(|_| rng.random::<f64>()).collect();
        let y = 10.0 * (PI * row[0] * row[1]).sin()
            + 20.0 * (row[2] - 0.5).powi(2)
            + 10.0 * row[3]
            + 5.0 * row[4]
            + normal(&mut rng);
        for (col, v) in xs.iter_mut().zip(row) {
            col.push(v);
        }
        outcome.push(y);
    }
    let names = ["predictor_01", "predictor_02", "predictor_03", "predictor_04", "predictor_05"];
    let mut named: Vec<(&str, Column)> = names
        .iter()
        .copied()
        .zip(xs.into_iter().map(Column::Numeric))
        .collect();
    named.push(("outcome", Column::Numeric(outcome)));
    build(named, "outcome")
}

/// Two predictors with a curved class boundary.
pub fn sim_two_class(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = Vec::with_capacity(n);
    let mut b = Vec::with_capacity(n);
    let mut class = Vec::with_capacity(n);
    for _ in 0..n {
        let x1 = normal(&mut rng);
        let x2 = normal(&mut rng);
        let logit = 1.5 * x1 - 1.0 * x2 + 0.8 * x1 * x1 - 0.5;
        let p = 1.0 / (1.0 + (-logit).exp());
        let label = if rng.random::<f64>() < p { "class_1" } else { "class_2" };
        a.push(x1);
        b.push(x2);
        class.push(label.to_string());
    }
    build(
        vec![
            ("a", Column::Numeric(a)),
            ("b", Column::Numeric(b)),
            ("class", Column::Nominal(class)),
        ],
        "class",
    )
}

fn build(columns: Vec<(&str, Column)>, outcome: &str) -> Dataset {
    let named = columns
        .into_iter()
        .map(|(name, col)| (name.to_string(), col))
        .collect();
    Dataset::new(named)
        .and_then(|data| data.with_outcome(outcome))
        .expect("generator columns are distinct and equal length")
}

fn weighted_pick(rng: &mut StdRng, weights: impl Iterator<Item = f64> + Clone) -> usize {
    let total: f64 = weights.clone().sum();
    let mut target = rng.random::<f64>() * total;
    let mut last = 0;
    for (idx, w) in weights.enumerate() {
        last = idx;
        if target < w {
            return idx;
        }
        target -= w;
    }
    last
}

fn uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    lo + rng.random::<f64>() * (hi - lo)
}

/// Standard normal draw via Box-Muller.
pub(crate) fn normal(rng: &mut StdRng) -> f64 {
    let u1 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
