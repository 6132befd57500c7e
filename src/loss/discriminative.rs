//! Discriminative loss with fixed margins (De Brabandere et al., 2017).
//!
//! For the clusters `C` of one slice with centroids `μ_c`:
//!
//! ```text
//! L_intra = (1/|C|) Σ_c (1/|c|) Σ_{x ∈ c} max(0, ||x - μ_c|| - δ_v)²
//! L_inter = (1/(|C|(|C|-1))) Σ_{a ≠ b} max(0, 2δ_d - ||μ_a - μ_b||)²
//! L_reg   = (1/|C|) Σ_c ||μ_c||
//! ```
//!
//! Every cluster counts equally in `L_intra` regardless of its size, and
//! `L_inter` is zero when fewer than two clusters exist.

use std::collections::BTreeMap;

use super::report::{over_slices, LossReport, SliceLoss, Term};
use super::traits::ClusteringLoss;
use super::LossKind;
use crate::cluster::{distinct_sorted, find_cluster_means, group_members, util};
use crate::config::LossConfig;
use crate::error::{Error, Result};
use crate::metrics::adjusted_rand_index;
use crate::points::{PointLabels, Replica};

/// Mean hinged distance of members to their centroid, averaged over clusters.
///
/// `means[k]` is the centroid of the `k`-th smallest distinct label.
pub fn intra_cluster_loss(
    features: &[Vec<f32>],
    labels: &[i64],
    means: &[Vec<f32>],
    margin: f32,
    norm: f32,
) -> f32 {
    if means.is_empty() {
        return 0.0;
    }
    let groups = distinct_sorted(labels);
    let members = group_members(labels, &groups);
    let mut total = 0.0f64;
    for (idx, mu) in members.iter().zip(means) {
        if idx.is_empty() {
            continue;
        }
        let sum: f64 = idx
            .iter()
            .map(|&i| {
                let hinge = (util::p_distance(&features[i], mu, norm) - margin).max(0.0);
                f64::from(hinge * hinge)
            })
            .sum();
        total += sum / idx.len() as f64;
    }
    (total / means.len() as f64) as f32
}

/// Hinged pairwise centroid separation; 0 with fewer than two centroids.
pub fn inter_cluster_loss(means: &[Vec<f32>], margin: f32, norm: f32) -> f32 {
    let n = means.len();
    if n < 2 {
        return 0.0;
    }
    let mut total = 0.0f64;
    for (i, a) in means.iter().enumerate() {
        for (j, b) in means.iter().enumerate() {
            if i == j {
                continue;
            }
            let hinge = (2.0 * margin - util::p_distance(a, b, norm)).max(0.0);
            total += f64::from(hinge * hinge);
        }
    }
    (total / (n * (n - 1)) as f64) as f32
}

/// Mean centroid norm; 0 without centroids.
pub fn regularization(means: &[Vec<f32>], norm: f32) -> f32 {
    if means.is_empty() {
        return 0.0;
    }
    let total: f64 = means.iter().map(|m| f64::from(util::p_norm(m, norm))).sum();
    (total / means.len() as f64) as f32
}

/// ARI between `labels` and the nearest-true-centroid assignment of `features`.
pub fn heuristic_accuracy(features: &[Vec<f32>], labels: &[i64]) -> Result<f32> {
    let (_, means) = find_cluster_means(features, labels)?;
    let nearest: Vec<usize> = features
        .iter()
        .map(|x| {
            let neg: Vec<f32> = means
                .iter()
                .map(|m| -util::squared_euclidean(x, m))
                .collect();
            util::argmax(&neg).unwrap_or(0)
        })
        .collect();
    Ok(adjusted_rand_index(&nearest, labels)? as f32)
}

/// Fixed-margin discriminative loss.
#[derive(Debug, Clone)]
pub struct DiscriminativeLoss {
    cfg: LossConfig,
}

impl DiscriminativeLoss {
    /// Build from a validated configuration.
    pub fn new(cfg: LossConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Loss of one slice with margins `(δ_v, δ_d)`.
    pub fn slice_loss(
        &self,
        features: &[Vec<f32>],
        labels: &[i64],
        intra_margin: f32,
        inter_margin: f32,
    ) -> Result<SliceLoss> {
        let (_, means) = find_cluster_means(features, labels)?;
        let norm = self.cfg.norm;
        let intra = intra_cluster_loss(features, labels, &means, intra_margin, norm);
        let inter = inter_cluster_loss(&means, inter_margin, norm);
        let reg = regularization(&means, norm);

        let loss = self.cfg.intra_weight * intra
            + self.cfg.inter_weight * inter
            + self.cfg.reg_weight * reg;

        Ok(SliceLoss {
            loss,
            terms: BTreeMap::from([
                (Term::Intra, intra),
                (Term::Inter, inter),
                (Term::Regularization, reg),
            ]),
            accuracy: heuristic_accuracy(features, labels)?,
        })
    }

    /// Loss over every slice of one set of embeddings with the given margins.
    pub(crate) fn report(
        &self,
        embeddings: &[Vec<f32>],
        labels: &PointLabels,
        intra_margin: f32,
        inter_margin: f32,
    ) -> Result<LossReport> {
        if embeddings.is_empty() {
            return Err(Error::MissingOutput("embeddings"));
        }
        util::check_rows(embeddings)?;
        labels.check(embeddings.len())?;

        over_slices(
            labels,
            self.cfg.num_classes,
            self.cfg.segmentation_contingent,
            |idx| {
                let features = util::gather(embeddings, idx);
                let groups = labels.groups_of(idx);
                self.slice_loss(&features, &groups, intra_margin, inter_margin)
            },
        )
    }
}

impl ClusteringLoss for DiscriminativeLoss {
    fn kind(&self) -> LossKind {
        LossKind::Discriminative
    }

    fn num_classes(&self) -> usize {
        self.cfg.num_classes
    }

    fn forward(&self, replica: &Replica) -> Result<LossReport> {
        self.report(
            &replica.output.embeddings,
            &replica.labels,
            self.cfg.intra_margin,
            self.cfg.inter_margin,
        )
    }
}
