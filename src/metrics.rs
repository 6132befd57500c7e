//! Clustering quality metrics and the per-event evaluation driver.
//!
//! All partition metrics work on any label type that is `Eq + Hash + Copy`,
//! so decoder output (`Option<usize>`, with `None` forming its own group) can
//! be compared directly against ground-truth group ids (`i64`).
//!
//! ## Purity and efficiency
//!
//! With `n_pt` the number of points in predicted cluster `p` and true cluster `t`:
//!
//! ```text
//! purity     = (1/N) Σ_p max_t n_pt
//! efficiency = (1/N) Σ_t max_p n_pt
//! ```
//!
//! Both are point-weighted: a large cluster counts for as many points as it holds.

use std::collections::HashMap;
use std::hash::Hash;
use std::io::Write;

use serde::Serialize;
use tracing::debug;

use crate::cluster::{distinct_sorted, find_cluster_means, group_members, util};
use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use crate::points::{NetworkOutput, PointLabels};

struct Contingency {
    n: usize,
    cells: HashMap<(usize, usize), usize>,
    rows: Vec<usize>,
    cols: Vec<usize>,
}

impl Contingency {
    fn new<P, T>(pred: &[P], truth: &[T]) -> Result<Self>
    where
        P: Eq + Hash + Copy,
        T: Eq + Hash + Copy,
    {
        if pred.is_empty() {
            return Err(Error::EmptyInput);
        }
        util::check_len("truth", pred.len(), truth.len())?;

        let mut pred_ids: HashMap<P, usize> = HashMap::new();
        let mut truth_ids: HashMap<T, usize> = HashMap::new();
        let mut cells: HashMap<(usize, usize), usize> = HashMap::new();
        let mut rows = Vec::new();
        let mut cols = Vec::new();

        for (p, t) in pred.iter().zip(truth) {
            let next = pred_ids.len();
            let i = *pred_ids.entry(*p).or_insert(next);
            let next = truth_ids.len();
            let j = *truth_ids.entry(*t).or_insert(next);
            if i == rows.len() {
                rows.push(0);
            }
            if j == cols.len() {
                cols.push(0);
            }
            rows[i] += 1;
            cols[j] += 1;
            *cells.entry((i, j)).or_insert(0) += 1;
        }

        Ok(Self {
            n: pred.len(),
            cells,
            rows,
            cols,
        })
    }
}

/// Point-weighted purity and efficiency of `pred` against `truth`.
pub fn purity_efficiency<P, T>(pred: &[P], truth: &[T]) -> Result<(f64, f64)>
where
    P: Eq + Hash + Copy,
    T: Eq + Hash + Copy,
{
    let c = Contingency::new(pred, truth)?;
    let mut best_row = vec![0usize; c.rows.len()];
    let mut best_col = vec![0usize; c.cols.len()];
    for (&(i, j), &count) in &c.cells {
        best_row[i] = best_row[i].max(count);
        best_col[j] = best_col[j].max(count);
    }
    let n = c.n as f64;
    let purity = best_row.iter().sum::<usize>() as f64 / n;
    let efficiency = best_col.iter().sum::<usize>() as f64 / n;
    Ok((purity, efficiency))
}

/// Harmonic mean of purity and efficiency; 0 when both are 0.
pub fn f_score(purity: f64, efficiency: f64) -> f64 {
    let denom = purity + efficiency;
    if denom <= 0.0 {
        return 0.0;
    }
    2.0 * purity * efficiency / denom
}

#[inline]
fn comb2(x: usize) -> f64 {
    let x = x as f64;
    x * (x - 1.0) / 2.0
}

/// Adjusted Rand Index between two partitions of the same points.
///
/// Identical trivial partitions (one cluster each, or all singletons) score 1.
pub fn adjusted_rand_index<P, T>(pred: &[P], truth: &[T]) -> Result<f64>
where
    P: Eq + Hash + Copy,
    T: Eq + Hash + Copy,
{
    let c = Contingency::new(pred, truth)?;
    if c.n < 2 {
        return Ok(1.0);
    }
    let index: f64 = c.cells.values().map(|&v| comb2(v)).sum();
    let sum_rows: f64 = c.rows.iter().map(|&v| comb2(v)).sum();
    let sum_cols: f64 = c.cols.iter().map(|&v| comb2(v)).sum();
    let expected = sum_rows * sum_cols / comb2(c.n);
    let max_index = (sum_rows + sum_cols) / 2.0;
    let denom = max_index - expected;
    if denom == 0.0 {
        return Ok(1.0);
    }
    Ok((index - expected) / denom)
}

/// Geometry of one ground-truth cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct TrueCluster {
    /// Ground-truth group id.
    pub group: i64,
    /// Mean predicted margin over member points.
    pub margin: f64,
    /// Standard deviation of member distances to the true centroid.
    pub true_size: f64,
}

/// Mean margin and spread of every true cluster, groups ascending.
pub fn true_clusters(
    coords: &[Vec<f32>],
    margins: &[Vec<f32>],
    truth: &[i64],
) -> Result<Vec<TrueCluster>> {
    util::check_len("margins", coords.len(), margins.len())?;
    let (groups, centroids) = find_cluster_means(coords, truth)?;
    let members = group_members(truth, &groups);

    let mut out = Vec::with_capacity(groups.len());
    for ((&group, centroid), idx) in groups.iter().zip(&centroids).zip(&members) {
        let margin_values: Vec<f64> = idx
            .iter()
            .flat_map(|&i| margins[i].iter().map(|&m| f64::from(m)))
            .collect();
        let dists: Vec<f64> = idx
            .iter()
            .map(|&i| f64::from(util::euclidean(&coords[i], centroid)))
            .collect();
        out.push(TrueCluster {
            group,
            margin: mean(&margin_values),
            true_size: std_dev(&dists),
        });
    }
    Ok(out)
}

fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / v.len() as f64
}

/// Population standard deviation.
fn std_dev(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let m = mean(v);
    (v.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / v.len() as f64).sqrt()
}

/// One evaluation row: a true cluster of one semantic class in one event.
///
/// The slice-level scores repeat on every row of the slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalRow {
    /// Event index.
    #[serde(rename = "Index")]
    pub index: usize,
    /// Semantic class.
    #[serde(rename = "Class")]
    pub class: usize,
    /// Adjusted Rand Index of the slice.
    #[serde(rename = "ARI")]
    pub ari: f64,
    /// Purity of the slice.
    #[serde(rename = "Purity")]
    pub purity: f64,
    /// Efficiency of the slice.
    #[serde(rename = "Efficiency")]
    pub efficiency: f64,
    /// F-score of the slice.
    #[serde(rename = "FScore")]
    pub fscore: f64,
    /// Number of true clusters in the slice.
    pub num_clusters: usize,
    /// Seediness threshold used for the class.
    pub seed_threshold: f32,
    /// Probability threshold used for the class.
    pub prob_threshold: f32,
    /// Mean predicted margin of this true cluster.
    pub margin: f64,
    /// Spread of this true cluster in voxel space.
    pub true_size: f64,
}

/// Decodes every (event, class) slice and scores it against ground truth.
///
/// Each semantic class is decoded with its own thresholds from `cfg`. One row
/// is emitted per true cluster.
pub fn evaluate(
    output: &NetworkOutput,
    labels: &PointLabels,
    cfg: &DecoderConfig,
) -> Result<Vec<EvalRow>> {
    let n = output.embeddings.len();
    if n == 0 {
        return Err(Error::MissingOutput("embeddings"));
    }
    util::check_len("seediness", n, output.seediness.len())?;
    util::check_len("margins", n, output.margins.len())?;
    labels.check(n)?;

    let mut rows = Vec::new();
    for (event, index) in labels.events() {
        for (class, idx) in labels.classes(&index) {
            rows.extend(evaluate_slice(event, class, &idx, output, labels, cfg)?);
        }
    }
    Ok(rows)
}

fn evaluate_slice(
    event: usize,
    class: usize,
    idx: &[usize],
    output: &NetworkOutput,
    labels: &PointLabels,
    cfg: &DecoderConfig,
) -> Result<Vec<EvalRow>> {
    let (s_threshold, p_threshold) = cfg.thresholds(class)?;
    let embeddings = util::gather(&output.embeddings, idx);
    let seediness = util::gather(&output.seediness, idx);
    let margins = util::gather(&output.margins, idx);
    let truth = labels.groups_of(idx);
    let coords = labels.scaled_coords(idx, 1.0);

    let decoded = cfg
        .decoder_for(class)?
        .fit_predict(&embeddings, &seediness, &margins)?;

    let (purity, efficiency) = purity_efficiency(&decoded.labels, &truth)?;
    let fscore = f_score(purity, efficiency);
    let ari = adjusted_rand_index(&decoded.labels, &truth)?;
    let num_clusters = distinct_sorted(&truth).len();

    debug!(
        event,
        class,
        points = idx.len(),
        predicted = decoded.num_clusters(),
        num_clusters,
        ari,
        purity,
        efficiency,
        "evaluated slice"
    );

    Ok(true_clusters(&coords, &margins, &truth)?
        .into_iter()
        .map(|tc| EvalRow {
            index: event,
            class,
            ari,
            purity,
            efficiency,
            fscore,
            num_clusters,
            seed_threshold: s_threshold,
            prob_threshold: p_threshold,
            margin: tc.margin,
            true_size: tc.true_size,
        })
        .collect())
}

/// Writes rows as JSON lines.
pub fn write_json_lines<W: Write>(rows: &[EvalRow], mut out: W) -> Result<()> {
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_agreement_up_to_renaming() {
        let pred = vec![Some(2usize), Some(2), Some(0), Some(0), Some(1)];
        let truth = vec![10i64, 10, 20, 20, 30];
        let (p, e) = purity_efficiency(&pred, &truth).unwrap();
        assert_eq!((p, e), (1.0, 1.0));
        assert_eq!(f_score(p, e), 1.0);
        assert!((adjusted_rand_index(&pred, &truth).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn merged_prediction_loses_purity_not_efficiency() {
        let pred = vec![0, 0, 0, 0];
        let truth = vec![1, 1, 2, 2];
        let (p, e) = purity_efficiency(&pred, &truth).unwrap();
        assert_eq!(p, 0.5);
        assert_eq!(e, 1.0);
        assert!((f_score(p, e) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(adjusted_rand_index(&pred, &truth).unwrap(), 0.0);
    }

    #[test]
    fn split_prediction_loses_efficiency() {
        let pred = vec![0, 1, 2, 3];
        let truth = vec![7, 7, 7, 7];
        let (p, e) = purity_efficiency(&pred, &truth).unwrap();
        assert_eq!(p, 1.0);
        assert_eq!(e, 0.25);
    }

    #[test]
    fn ari_known_value() {
        // sklearn: adjusted_rand_score([0, 0, 1, 1], [0, 0, 1, 2]) == 0.5714285714285715
        let ari = adjusted_rand_index(&[0, 0, 1, 1], &[0, 0, 1, 2]).unwrap();
        assert!((ari - 0.571_428_571_428_571_5).abs() < 1e-12);
    }

    #[test]
    fn fscore_guards_zero() {
        assert_eq!(f_score(0.0, 0.0), 0.0);
        assert_eq!(f_score(0.0, 0.7), 0.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        let empty: [i64; 0] = [];
        assert!(purity_efficiency(&empty, &empty).is_err());
        assert!(adjusted_rand_index(&[0], &[0, 1]).is_err());
    }

    #[test]
    fn true_cluster_spread_and_margin() {
        let coords = vec![
            vec![0.0, 0.0, 0.0],
            vec![2.0, 0.0, 0.0],
            vec![10.0, 0.0, 0.0],
            vec![10.0, 1.0, 0.0],
            vec![10.0, -1.0, 0.0],
        ];
        let margins = vec![vec![0.2], vec![0.4], vec![1.0], vec![1.0], vec![1.0]];
        let truth = vec![0, 0, 5, 5, 5];
        let tcs = true_clusters(&coords, &margins, &truth).unwrap();

        assert_eq!(tcs.len(), 2);
        assert_eq!(tcs[0].group, 0);
        assert!((tcs[0].margin - 0.3).abs() < 1e-6);
        // both members at distance 1: no spread
        assert!(tcs[0].true_size.abs() < 1e-6);
        // distances 0, 1, 1 -> std = sqrt(2/9)
        assert!((tcs[1].true_size - (2.0f64 / 9.0).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn json_lines_use_column_names() {
        let row = EvalRow {
            index: 3,
            class: 1,
            ari: 1.0,
            purity: 1.0,
            efficiency: 1.0,
            fscore: 1.0,
            num_clusters: 2,
            seed_threshold: 0.5,
            prob_threshold: 0.5,
            margin: 0.1,
            true_size: 0.0,
        };
        let mut buf = Vec::new();
        write_json_lines(&[row.clone(), row], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"Index\":3"));
        assert!(text.contains("\"FScore\":1.0"));
        assert!(text.contains("\"true_size\":0.0"));
    }
}
