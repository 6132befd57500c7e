//! Spatial-embedding losses with learned margins.
//!
//! Each instance `c` of a slice gets a kernel centred at its centroid with
//! bandwidth `σ_c`, the mean margin of its members. The kernel's foreground
//! probability is trained against the instance mask, each member's margin is
//! pulled towards `σ_c`, and each point's seediness regresses onto the
//! probability its own instance assigns to it:
//!
//! ```text
//! L_mask   = (1/|C|) Σ_c BCE(p_c, mask_c)            (or Lovász hinge on 2p_c - 1)
//! L_smooth = (1/|C|) Σ_c Σ_{i ∈ c} ||m_i - σ_c||²
//! L_seed   = mean_i (s_i - p_{c(i)}(x_i))²
//! L        = w_emb L_mask + w_seed L_seed + w_smooth L_smooth
//! ```
//!
//! The variants differ in where centroids come from and in the kernel:
//!
//! | Variant | Centroid | Kernel | Mask loss |
//! |---|---|---|---|
//! | [`LossKind::FixedCentroid`] | mean of normalized voxel coordinates | Gaussian | BCE |
//! | [`LossKind::TrainableCentroid`] | mean embedding | Gaussian | BCE |
//! | [`LossKind::Bivariate`] | mean embedding | ellipsoidal | BCE |
//! | [`LossKind::LovaszHinge`] | mean embedding | Gaussian | Lovász hinge |

use std::collections::BTreeMap;

use super::lovasz::{binary_cross_entropy, lovasz_hinge_flat, mask_iou};
use super::report::{over_slices, LossReport, SliceLoss, Term};
use super::traits::ClusteringLoss;
use super::LossKind;
use crate::cluster::{clamp_margin, distinct_sorted, find_cluster_means, group_members, util, Kernel};
use crate::config::LossConfig;
use crate::error::{Error, Result};
use crate::points::Replica;

/// Where instance centroids come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentroidSource {
    /// Mean voxel coordinates divided by `spatial_size`.
    Coordinates,
    /// Mean embeddings.
    Embeddings,
}

/// Loss applied to each instance's foreground probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskObjective {
    /// Binary cross-entropy.
    Bce,
    /// Lovász hinge on `2p - 1`.
    LovaszHinge,
}

/// Spatial-embedding loss.
#[derive(Debug, Clone)]
pub struct SpatialEmbeddingLoss {
    cfg: LossConfig,
    kind: LossKind,
    centroids: CentroidSource,
    kernel: Kernel,
    objective: MaskObjective,
}

impl SpatialEmbeddingLoss {
    /// Build the spatial-embedding variant named by `kind`.
    pub fn new(kind: LossKind, cfg: LossConfig) -> Result<Self> {
        cfg.validate()?;
        let (centroids, kernel, objective) = match kind {
            LossKind::FixedCentroid => (CentroidSource::Coordinates, Kernel::Gaussian, MaskObjective::Bce),
            LossKind::TrainableCentroid => (CentroidSource::Embeddings, Kernel::Gaussian, MaskObjective::Bce),
            LossKind::Bivariate => (CentroidSource::Embeddings, Kernel::Ellipsoidal, MaskObjective::Bce),
            LossKind::LovaszHinge => (
                CentroidSource::Embeddings,
                Kernel::Gaussian,
                MaskObjective::LovaszHinge,
            ),
            other => {
                return Err(Error::UnknownVariant {
                    kind: "spatial-embedding loss",
                    name: other.to_string(),
                })
            }
        };
        Ok(Self {
            cfg,
            kind,
            centroids,
            kernel,
            objective,
        })
    }

    /// Kernel used for foreground probabilities.
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Loss of one (event, class) slice.
    ///
    /// `coords` are the normalized voxel coordinates and are only read by the
    /// fixed-centroid variant.
    pub fn slice_loss(
        &self,
        embeddings: &[Vec<f32>],
        margins: &[Vec<f32>],
        seediness: &[f32],
        labels: &[i64],
        coords: &[Vec<f32>],
    ) -> Result<SliceLoss> {
        let n = embeddings.len();
        let (_, centroids) = match self.centroids {
            CentroidSource::Coordinates => find_cluster_means(coords, labels)?,
            CentroidSource::Embeddings => find_cluster_means(embeddings, labels)?,
        };
        let groups = distinct_sorted(labels);
        let members = group_members(labels, &groups);
        let n_clusters = centroids.len() as f32;

        let mut probs = vec![0.0f32; n];
        let mut mask_loss = 0.0f32;
        let mut smoothing = 0.0f32;
        let mut accuracy = 0.0f32;

        for (idx, centroid) in members.iter().zip(&centroids) {
            let sigma = mean_margin(margins, idx);
            let bandwidth = clamp_margin(&sigma);

            let p: Vec<f32> = self
                .kernel
                .densities(embeddings, centroid, &bandwidth)
                .into_iter()
                .map(|v| v.clamp(0.0, 1.0))
                .collect();
            let mut mask = vec![0.0f32; n];
            for &i in idx {
                mask[i] = 1.0;
                probs[i] = p[i];
            }

            mask_loss += match self.objective {
                MaskObjective::Bce => binary_cross_entropy(&p, &mask),
                MaskObjective::LovaszHinge => {
                    let logits: Vec<f32> = p.iter().map(|v| 2.0 * v - 1.0).collect();
                    lovasz_hinge_flat(&logits, &mask)
                }
            };
            smoothing += idx
                .iter()
                .map(|&i| util::squared_euclidean(&margins[i], &sigma))
                .sum::<f32>();
            accuracy += mask_iou(&p, &mask);
        }

        mask_loss /= n_clusters;
        smoothing /= n_clusters;
        accuracy /= n_clusters;

        // Regression target is the (constant) probability under the point's own instance.
        let seed_loss = probs
            .iter()
            .zip(seediness)
            .map(|(p, s)| (p - s) * (p - s))
            .sum::<f32>()
            / n as f32;

        let loss = self.cfg.embedding_weight * mask_loss
            + self.cfg.seediness_weight * seed_loss
            + self.cfg.smoothing_weight * smoothing;

        Ok(SliceLoss {
            loss,
            terms: BTreeMap::from([
                (Term::Mask, mask_loss),
                (Term::Seediness, seed_loss),
                (Term::Smoothing, smoothing),
            ]),
            accuracy,
        })
    }
}

/// Component-wise mean margin of the selected points.
fn mean_margin(margins: &[Vec<f32>], idx: &[usize]) -> Vec<f32> {
    let dim = margins[idx[0]].len();
    let mut sigma = vec![0.0f32; dim];
    for &i in idx {
        for (s, m) in sigma.iter_mut().zip(&margins[i]) {
            *s += m;
        }
    }
    let count = idx.len() as f32;
    for s in &mut sigma {
        *s /= count;
    }
    sigma
}

impl ClusteringLoss for SpatialEmbeddingLoss {
    fn kind(&self) -> LossKind {
        self.kind
    }

    fn num_classes(&self) -> usize {
        self.cfg.num_classes
    }

    fn forward(&self, replica: &Replica) -> Result<LossReport> {
        let out = &replica.output;
        let labels = &replica.labels;
        if out.embeddings.is_empty() {
            return Err(Error::MissingOutput("embeddings"));
        }
        if out.seediness.is_empty() {
            return Err(Error::MissingOutput("seediness"));
        }
        if out.margins.is_empty() {
            return Err(Error::MissingOutput("margins"));
        }

        let n = out.embeddings.len();
        let d = util::check_rows(&out.embeddings)?;
        util::check_len("seediness", n, out.seediness.len())?;
        util::check_len("margins", n, out.margins.len())?;
        for m in &out.margins {
            self.kernel.check_bandwidth(d, m.len())?;
        }
        if self.centroids == CentroidSource::Coordinates && d != 3 {
            return Err(Error::DimensionMismatch {
                expected: 3,
                found: d,
            });
        }
        labels.check(n)?;

        over_slices(
            labels,
            self.cfg.num_classes,
            self.cfg.segmentation_contingent,
            |idx| {
                self.slice_loss(
                    &util::gather(&out.embeddings, idx),
                    &util::gather(&out.margins, idx),
                    &util::gather(&out.seediness, idx),
                    &labels.groups_of(idx),
                    &labels.scaled_coords(idx, self.cfg.spatial_size),
                )
            },
        )
    }
}
