//! Training losses for embedding-based instance clustering.
//!
//! Every loss works on one [`Replica`](crate::points::Replica): the network
//! outputs for a minibatch plus the point labels. Points are split into
//! slices by event and, unless the loss is segmentation-contingent, by
//! semantic class. Each slice is scored independently. Slice values are
//! averaged within an event, events within a replica, and replicas with
//! equal weight via [`ClusteringLoss::compute`].
//!
//! | Variant | Type |
//! |---|---|
//! | [`LossKind::Discriminative`] | [`DiscriminativeLoss`] |
//! | [`LossKind::MultiScale`] | [`MultiScaleLoss`] |
//! | [`LossKind::FixedCentroid`], [`LossKind::TrainableCentroid`], [`LossKind::Bivariate`], [`LossKind::LovaszHinge`] | [`SpatialEmbeddingLoss`] |
//!
//! Values are forward scalars only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::LossConfig;
use crate::error::{Error, Result};

mod discriminative;
mod lovasz;
mod multiscale;
mod report;
mod spatial;
mod traits;

pub use discriminative::{
    heuristic_accuracy, inter_cluster_loss, intra_cluster_loss, regularization, DiscriminativeLoss,
};
pub use lovasz::{binary_cross_entropy, lovasz_hinge_flat, mask_iou, softmax_cross_entropy};
pub use multiscale::MultiScaleLoss;
pub use report::{ClassReport, LossReport, SliceLoss, Term};
pub use spatial::{CentroidSource, MaskObjective, SpatialEmbeddingLoss};
pub use traits::ClusteringLoss;

/// Which loss to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LossKind {
    /// Fixed-margin discriminative loss on one resolution.
    #[default]
    #[serde(alias = "single")]
    Discriminative,
    /// Discriminative loss over a resolution pyramid plus segmentation.
    #[serde(alias = "multi")]
    MultiScale,
    /// Mask loss around centroids of normalized voxel coordinates.
    FixedCentroid,
    /// Mask loss around mean embeddings.
    TrainableCentroid,
    /// Trainable centroids with an ellipsoidal kernel.
    Bivariate,
    /// Trainable centroids with a Lovász-hinge mask loss.
    LovaszHinge,
}

impl LossKind {
    /// All variants, in declaration order.
    pub const ALL: [LossKind; 6] = [
        LossKind::Discriminative,
        LossKind::MultiScale,
        LossKind::FixedCentroid,
        LossKind::TrainableCentroid,
        LossKind::Bivariate,
        LossKind::LovaszHinge,
    ];

    fn name(self) -> &'static str {
        match self {
            LossKind::Discriminative => "discriminative",
            LossKind::MultiScale => "multi-scale",
            LossKind::FixedCentroid => "fixed-centroid",
            LossKind::TrainableCentroid => "trainable-centroid",
            LossKind::Bivariate => "bivariate",
            LossKind::LovaszHinge => "lovasz-hinge",
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => return Ok(LossKind::Discriminative),
            "multi" => return Ok(LossKind::MultiScale),
            _ => {}
        }
        LossKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::UnknownVariant {
                kind: "loss",
                name: s.to_string(),
            })
    }
}

/// Builds the loss selected by `cfg.loss`.
pub fn build_loss(cfg: &LossConfig) -> Result<Box<dyn ClusteringLoss>> {
    let cfg = cfg.clone();
    Ok(match cfg.loss {
        LossKind::Discriminative => Box::new(DiscriminativeLoss::new(cfg)?),
        LossKind::MultiScale => Box::new(MultiScaleLoss::new(cfg)?),
        kind => Box::new(SpatialEmbeddingLoss::new(kind, cfg)?),
    })
}
