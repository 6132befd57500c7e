//! Embedding-based instance clustering for sparse 3D point clouds.
//!
//! `embclust` covers both halves of proposal-free instance segmentation:
//!
//! - [`loss`]: training objectives that pull same-instance embeddings
//!   together and push instances apart (discriminative, spatial-embedding,
//!   Lovász-hinge, multi-scale).
//! - [`cluster`]: the greedy seed decoder that turns per-point embeddings,
//!   seediness and margins into instance labels at inference time.
//! - [`metrics`]: purity, efficiency, F-score and ARI against ground truth,
//!   plus the per-event evaluation driver.
//!
//! Inputs are plain `Vec<Vec<f32>>` rows; nothing here depends on a tensor
//! backend.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod points;

pub use cluster::{cluster_remainder, find_cluster_means, AssignmentPolicy, Decoded, Kernel, SeedDecoder};
pub use config::{DecoderConfig, LossConfig};
pub use error::{Error, Result};
pub use loss::{build_loss, ClusteringLoss, LossKind, LossReport};
pub use metrics::{adjusted_rand_index, evaluate, f_score, purity_efficiency, EvalRow};
pub use points::{NetworkOutput, PointLabels, Replica};
