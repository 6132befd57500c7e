//! Embedding-space clustering primitives.
//!
//! A network maps every occupied voxel to a point in an embedding space, plus
//! two scalars: a *seediness* score and a *margin* (kernel bandwidth). Voxels
//! of the same object are trained to sit close together. This module holds the
//! pieces that turn those outputs into instances.
//!
//! ## Centroids
//!
//! [`find_cluster_means`] averages the embeddings of each group label:
//!
//! ```text
//! μ_c = (1 / |C|) Σ_{x ∈ C} x
//! ```
//!
//! ## Kernels
//!
//! A [`Kernel`] turns a (centroid, bandwidth) pair into a foreground
//! probability over embedded points. The Gaussian kernel is isotropic; the
//! ellipsoidal kernel has one bandwidth per axis.
//!
//! ## Seed decoding
//!
//! [`SeedDecoder`] repeatedly opens a kernel at the most seed-like point that
//! has not been claimed yet and claims everything the kernel covers. See the
//! [`decoder`] module docs for the two assignment policies.
//!
//! ## Usage
//!
//! ```rust
//! use embclust::cluster::{AssignmentPolicy, SeedDecoder};
//!
//! let embeddings = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.0],
//!     vec![5.0, 5.0],
//!     vec![5.1, 5.0],
//! ];
//! let seediness = vec![1.0, 0.9, 1.0, 0.9];
//! let margins = vec![vec![0.5]; 4];
//!
//! let out = SeedDecoder::new(0.0, 0.5)
//!     .with_policy(AssignmentPolicy::BestFit)
//!     .fit_predict(&embeddings, &seediness, &margins)
//!     .unwrap();
//!
//! assert_eq!(out.num_clusters(), 2);
//! assert_eq!(out.labels[0], out.labels[1]);
//! assert_ne!(out.labels[0], out.labels[2]);
//! ```

mod centroid;
pub mod decoder;
mod kernel;
pub(crate) mod util;

pub(crate) use centroid::group_members;
pub use centroid::{distinct_sorted, find_cluster_means};
pub use decoder::{cluster_remainder, AssignmentPolicy, Decoded, SeedDecoder};
pub use kernel::{clamp_margin, Kernel, Sphere, MIN_MARGIN};
