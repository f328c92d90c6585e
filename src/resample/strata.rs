use std::collections::BTreeMap;

use crate::data::{Column, Dataset};
use crate::stats::quantile;

use super::ResampleError;

/// Minimum rows per numeric bin before the bin count is reduced.
const MIN_ROWS_PER_BIN: usize = 20;

/// Assign each row to a stratum id in `0..k`.
///
/// Nominal columns stratify by class; numeric columns by quantile bin
/// (`breaks = 4` gives quartiles). Strata holding fewer than `pool * n` rows
/// are merged so every stratum has enough rows to split.
pub fn strata_for(
    data: &Dataset,
    column: &str,
    breaks: usize,
    pool: f64,
) -> Result<Vec<usize>, ResampleError> {
    let n = data.n_rows();
    let min_size = (pool.clamp(0.0, 0.5) * n as f64).ceil() as usize;
    let raw = match data.column(column)? {
        Column::Nominal(values) => pool_nominal(class_ids(values), min_size),
        Column::Numeric(values) => {
            let ids = quantile_bins(values, breaks);
            pool_adjacent(ids, min_size)
        }
    };
    Ok(renumber(raw))
}

/// Group row indices by stratum id, ordered by id.
pub fn group_rows(strata: &[usize]) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &id) in strata.iter().enumerate() {
        groups.entry(id).or_default().push(row);
    }
    groups.into_values().collect()
}

fn class_ids(values: &[String]) -> Vec<usize> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        let next = index.len();
        index.entry(v.as_str()).or_insert(next);
    }
    // relabel in sorted level order so ids do not depend on row order
    let sorted: BTreeMap<&str, usize> = index
        .keys()
        .enumerate()
        .map(|(rank, key)| (*key, rank))
        .collect();
    values.iter().map(|v| sorted[v.as_str()]).collect()
}

fn quantile_bins(values: &[f64], breaks: usize) -> Vec<usize> {
    let n = values.len();
    let mut breaks = breaks.max(1);
    if n / breaks < MIN_ROWS_PER_BIN {
        breaks = (n / MIN_ROWS_PER_BIN).max(1);
    }
    if breaks < 2 {
        return vec![0; n];
    }
    let mut cuts: Vec<f64> = (1..breaks)
        .map(|k| quantile(values, k as f64 / breaks as f64))
        .collect();
    cuts.dedup();
    values
        .iter()
        .map(|v| {
            if v.is_nan() {
                // missing values get their own trailing bin
                cuts.len() + 1
            } else {
                cuts.iter().filter(|&&cut| *v > cut).count()
            }
        })
        .collect()
}

fn pool_nominal(ids: Vec<usize>, min_size: usize) -> Vec<usize> {
    let counts = counts_by_id(&ids);
    let small: Vec<usize> = counts
        .iter()
        .filter(|&(_, &count)| count < min_size)
        .map(|(&id, _)| id)
        .collect();
    if small.is_empty() {
        return ids;
    }
    let pooled_id = usize::MAX;
    let mut out: Vec<usize> = ids
        .into_iter()
        .map(|id| if small.contains(&id) { pooled_id } else { id })
        .collect();
    let pooled_count = out.iter().filter(|&&id| id == pooled_id).count();
    if pooled_count < min_size {
        // fold a still-too-small pool into the smallest regular stratum
        let counts = counts_by_id(&out);
        if let Some((&target, _)) = counts
            .iter()
            .filter(|&(&id, _)| id != pooled_id)
            .min_by_key(|&(_, &count)| count)
        {
            for id in &mut out {
                if *id == pooled_id {
                    *id = target;
                }
            }
        }
    }
    out
}

fn pool_adjacent(mut ids: Vec<usize>, min_size: usize) -> Vec<usize> {
    loop {
        let counts = counts_by_id(&ids);
        if counts.len() < 2 {
            return ids;
        }
        let order: Vec<usize> = counts.keys().copied().collect();
        let Some(pos) = order.iter().position(|id| counts[id] < min_size) else {
            return ids;
        };
        let source = order[pos];
        let target = if pos > 0 { order[pos - 1] } else { order[pos + 1] };
        for id in &mut ids {
            if *id == source {
                *id = target;
            }
        }
    }
}

fn counts_by_id(ids: &[usize]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for &id in ids {
        *counts.entry(id).or_insert(0usize) += 1;
    }
    counts
}

fn renumber(ids: Vec<usize>) -> Vec<usize> {
    let mut map: BTreeMap<usize, usize> = BTreeMap::new();
    for &id in &ids {
        let next = map.len();
        map.entry(id).or_insert(next);
    }
    let ranks: BTreeMap<usize, usize> = map
        .keys()
        .enumerate()
        .map(|(rank, &id)| (id, rank))
        .collect();
    ids.into_iter().map(|id| ranks[&id]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;

    fn numeric(values: Vec<f64>) -> Dataset {
        Dataset::new(vec![("y".into(), Column::Numeric(values))]).unwrap()
    }

    #[test]
    fn numeric_outcome_uses_quartiles() {
        let data = numeric((0..200).map(|v| v as f64).collect());
        let strata = strata_for(&data, "y", 4, 0.1).unwrap();
        let groups = group_rows(&strata);
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 50));
        assert!(groups[0].iter().all(|&row| row < 50));
    }

    #[test]
    fn small_numeric_samples_reduce_bins() {
        let data = numeric((0..50).map(|v| v as f64).collect());
        let strata = strata_for(&data, "y", 4, 0.1).unwrap();
        assert_eq!(group_rows(&strata).len(), 2);
    }

    #[test]
    fn rare_classes_are_pooled() {
        let mut labels = vec!["a".to_string(); 60];
        labels.extend(vec!["b".to_string(); 35]);
        labels.extend(vec!["c".to_string(); 3]);
        labels.extend(vec!["d".to_string(); 2]);
        let data = Dataset::new(vec![("y".into(), Column::Nominal(labels))]).unwrap();
        let strata = strata_for(&data, "y", 4, 0.1).unwrap();
        let groups = group_rows(&strata);
        // c and d together are still below 10 rows, so they join the smaller class
        assert_eq!(groups.len(), 2);
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert!(sizes.contains(&60) && sizes.contains(&40));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let data = numeric(vec![1.0, 2.0]);
        assert!(strata_for(&data, "nope", 4, 0.1).is_err());
    }
}
