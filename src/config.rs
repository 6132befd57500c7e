//! Loss and decoder configuration.
//!
//! Both structs deserialize from JSON; every field is optional and falls back
//! to the defaults below. Unknown keys and unknown variant names are rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::{AssignmentPolicy, Kernel, SeedDecoder};
use crate::error::{Error, Result};
use crate::loss::LossKind;

/// Hyperparameters of the clustering losses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LossConfig {
    /// Which loss variant to build.
    pub loss: LossKind,
    /// Number of semantic classes; class ids must be below this.
    pub num_classes: usize,
    /// Hinge radius δ_v of the intra-cluster term.
    pub intra_margin: f32,
    /// Half the minimum centroid separation δ_d of the inter-cluster term.
    pub inter_margin: f32,
    /// Weight of the intra-cluster term.
    pub intra_weight: f32,
    /// Weight of the inter-cluster term.
    pub inter_weight: f32,
    /// Weight of the centroid regularization term.
    pub reg_weight: f32,
    /// Weight of the seediness regression term.
    pub seediness_weight: f32,
    /// Weight of the foreground mask term.
    pub embedding_weight: f32,
    /// Weight of the margin smoothing term.
    pub smoothing_weight: f32,
    /// Weight of the semantic segmentation term (multi-scale only).
    pub segmentation_weight: f32,
    /// Detector size used to normalize voxel coordinates.
    pub spatial_size: f32,
    /// `p` of the p-norm used by the discriminative terms.
    pub norm: f32,
    /// Cluster each event as a whole instead of per semantic class.
    pub segmentation_contingent: bool,
    /// Number of decoder resolutions in the multi-scale loss.
    pub num_strides: usize,
    /// Explicit per-layer δ_v schedule; halves per layer when absent.
    pub intra_margins: Option<Vec<f32>>,
    /// Explicit per-layer δ_d schedule; halves per layer when absent.
    pub inter_margins: Option<Vec<f32>>,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            loss: LossKind::default(),
            num_classes: 5,
            intra_margin: 0.5,
            inter_margin: 1.5,
            intra_weight: 1.0,
            inter_weight: 1.0,
            reg_weight: 0.001,
            seediness_weight: 1.0,
            embedding_weight: 10.0,
            smoothing_weight: 1.0,
            segmentation_weight: 1.0,
            spatial_size: 512.0,
            norm: 2.0,
            segmentation_contingent: false,
            num_strides: 5,
            intra_margins: None,
            inter_margins: None,
        }
    }
}

impl LossConfig {
    /// Parse from a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Checks ranges that the losses rely on.
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(Error::InvalidParameter {
                name: "num_classes",
                message: "must be at least 1",
            });
        }
        if self.spatial_size.is_nan() || self.spatial_size <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "spatial_size",
                message: "must be positive",
            });
        }
        if self.norm.is_nan() || self.norm < 1.0 {
            return Err(Error::InvalidParameter {
                name: "norm",
                message: "must be at least 1",
            });
        }
        if self.intra_margin < 0.0 || self.inter_margin < 0.0 {
            return Err(Error::InvalidParameter {
                name: "margin",
                message: "must be non-negative",
            });
        }
        if self.num_strides == 0 {
            return Err(Error::InvalidParameter {
                name: "num_strides",
                message: "must be at least 1",
            });
        }
        Ok(())
    }

    /// `(δ_v, δ_d)` for each of the `num_strides` layers, finest first.
    pub fn margin_schedule(&self) -> Result<Vec<(f32, f32)>> {
        let halving = |base: f32| -> Vec<f32> {
            (0..self.num_strides)
                .map(|i| base / 2f32.powi(i as i32))
                .collect()
        };
        let intra = self
            .intra_margins
            .clone()
            .unwrap_or_else(|| halving(self.intra_margin));
        let inter = self
            .inter_margins
            .clone()
            .unwrap_or_else(|| halving(self.inter_margin));

        if intra.len() != self.num_strides {
            return Err(Error::LengthMismatch {
                what: "intra_margins",
                expected: self.num_strides,
                found: intra.len(),
            });
        }
        if inter.len() != self.num_strides {
            return Err(Error::LengthMismatch {
                what: "inter_margins",
                expected: self.num_strides,
                found: inter.len(),
            });
        }
        Ok(intra.into_iter().zip(inter).collect())
    }
}

/// Inference-time decoder settings, with per-class thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// Kernel shape.
    pub kernel: Kernel,
    /// Assignment policy.
    pub policy: AssignmentPolicy,
    /// Seediness acceptance threshold, indexed by semantic class.
    pub s_thresholds: Vec<f32>,
    /// Probability acceptance threshold, indexed by semantic class.
    pub p_thresholds: Vec<f32>,
    /// Give every point a label.
    pub cluster_all: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            kernel: Kernel::Gaussian,
            policy: AssignmentPolicy::BestFit,
            s_thresholds: vec![0.88, 0.92, 0.84, 0.84, 0.8],
            p_thresholds: vec![0.5; 5],
            cluster_all: true,
        }
    }
}

impl DecoderConfig {
    /// Parse from a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// `(s_threshold, p_threshold)` for `class`.
    pub fn thresholds(&self, class: usize) -> Result<(f32, f32)> {
        let num_classes = self.s_thresholds.len().min(self.p_thresholds.len());
        match (self.s_thresholds.get(class), self.p_thresholds.get(class)) {
            (Some(&s), Some(&p)) => Ok((s, p)),
            _ => Err(Error::InvalidClass { class, num_classes }),
        }
    }

    /// A decoder configured for `class`.
    pub fn decoder_for(&self, class: usize) -> Result<SeedDecoder> {
        let (s, p) = self.thresholds(class)?;
        Ok(SeedDecoder::new(s, p)
            .with_kernel(self.kernel)
            .with_policy(self.policy)
            .with_cluster_all(self.cluster_all))
    }
}
