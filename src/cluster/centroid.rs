//! Per-group mean embeddings.

use super::util;
use crate::error::Result;

/// Computes one centroid per distinct group label.
///
/// Returns the distinct labels in ascending order together with the matching
/// centroid rows: row `i` is the mean embedding of the points whose label
/// equals `labels[i]`. Sentinel labels (e.g. `-1`) are treated like any other
/// label; filter them out beforehand if they should not form a group.
///
/// # Errors
///
/// [`Error::EmptyInput`](crate::Error::EmptyInput) for zero points, and a
/// length or dimension error when the inputs disagree.
pub fn find_cluster_means(
    features: &[Vec<f32>],
    labels: &[i64],
) -> Result<(Vec<i64>, Vec<Vec<f32>>)> {
    let d = util::check_rows(features)?;
    util::check_len("labels", features.len(), labels.len())?;

    let groups = distinct_sorted(labels);
    let mut sums = vec![vec![0.0f32; d]; groups.len()];
    let mut counts = vec![0usize; groups.len()];

    for (x, label) in features.iter().zip(labels) {
        // `groups` is sorted and contains every label.
        if let Ok(k) = groups.binary_search(label) {
            for (s, v) in sums[k].iter_mut().zip(x) {
                *s += v;
            }
            counts[k] += 1;
        }
    }

    for (row, &n) in sums.iter_mut().zip(&counts) {
        let n = n as f32;
        for s in row.iter_mut() {
            *s /= n;
        }
    }

    Ok((groups, sums))
}

/// Distinct values of `labels`, ascending.
pub fn distinct_sorted(labels: &[i64]) -> Vec<i64> {
    let mut out = labels.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Member indices of each group, in the order of `groups`.
pub(crate) fn group_members(labels: &[i64], groups: &[i64]) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); groups.len()];
    for (i, label) in labels.iter().enumerate() {
        if let Ok(k) = groups.binary_search(label) {
            members[k].push(i);
        }
    }
    members
}
