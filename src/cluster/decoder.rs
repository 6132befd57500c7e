//! Greedy seed decoder: turns (embedding, seediness, margin) triples into hard labels.
//!
//! # The Algorithm
//!
//! Repeatedly "peel the highest peak":
//!
//! 1. Among points not yet peeled, pick the one with the highest seediness.
//! 2. Stop if that score is below `s_threshold`.
//! 3. Open a kernel at the seed's embedding with the seed's margin as bandwidth
//!    and evaluate it over *all* points.
//! 4. Every point with probability above `p_threshold` is peeled: it can no
//!    longer become a seed. The seed always peels itself.
//! 5. Repeat until the policy's progress count reaches the number of points,
//!    or no credible seed is left.
//!
//! ## Assignment policies
//!
//! - [`AssignmentPolicy::FirstClaim`]: a point keeps the first cluster that
//!   claims it. Unclaimed points stay unassigned unless `cluster_all` is set, in
//!   which case [`cluster_remainder`] sends them to the nearest predicted centroid.
//! - [`AssignmentPolicy::BestFit`]: every discovered kernel is scored against
//!   every point and each point takes the argmax once discovery has finished. A
//!   point can therefore end up in a cluster other than the one that peeled it.
//!   Points that were never peeled stay unassigned unless `cluster_all` is set.
//!
//! Both policies share seed selection. They differ in the progress count that
//! ends discovery: FirstClaim counts distinct peeled points, while BestFit adds
//! every kernel's full claim, so a point claimed by two kernels counts twice
//! and discovery can stop before every point is peeled.
//!
//! ## Ties
//!
//! Equal seediness scores are resolved towards the lower point index. Callers
//! should treat the winner among equals as unspecified.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::centroid::find_cluster_means;
use super::kernel::{clamp_margin, Kernel, Sphere};
use super::util;
use crate::error::{Error, Result};

/// How points are mapped to the clusters discovered by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentPolicy {
    /// Keep the first cluster that claims the point.
    FirstClaim,
    /// Argmax over all discovered kernels after discovery terminates.
    ///
    /// Discovery stops once the summed claim sizes of all kernels reach the
    /// number of points, overlaps counted again. Points that no kernel peeled
    /// get `None` unless `cluster_all` is set.
    #[default]
    BestFit,
}

impl fmt::Display for AssignmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssignmentPolicy::FirstClaim => "first-claim",
            AssignmentPolicy::BestFit => "best-fit",
        })
    }
}

impl FromStr for AssignmentPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first-claim" => Ok(AssignmentPolicy::FirstClaim),
            "best-fit" | "argmax" => Ok(AssignmentPolicy::BestFit),
            other => Err(Error::UnknownVariant {
                kind: "assignment policy",
                name: other.to_string(),
            }),
        }
    }
}

/// Output of one decode call.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Cluster index per point, `None` when the decoder declined to assign it.
    pub labels: Vec<Option<usize>>,
    /// Discovered kernels, indexed by cluster id.
    pub spheres: Vec<Sphere>,
}

impl Decoded {
    /// Number of discovered clusters.
    pub fn num_clusters(&self) -> usize {
        self.spheres.len()
    }

    /// Labels as signed integers with `-1` for unassigned points.
    pub fn labels_i64(&self) -> Vec<i64> {
        self.labels
            .iter()
            .map(|l| l.map_or(-1, |k| k as i64))
            .collect()
    }
}

/// Greedy seed decoder.
#[derive(Debug, Clone)]
pub struct SeedDecoder {
    kernel: Kernel,
    s_threshold: f32,
    p_threshold: f32,
    policy: AssignmentPolicy,
    cluster_all: bool,
}

impl SeedDecoder {
    /// Create a decoder with the given seediness and probability thresholds.
    ///
    /// Defaults: Gaussian kernel, best-fit assignment, `cluster_all = false`.
    pub fn new(s_threshold: f32, p_threshold: f32) -> Self {
        Self {
            kernel: Kernel::Gaussian,
            s_threshold,
            p_threshold,
            policy: AssignmentPolicy::BestFit,
            cluster_all: false,
        }
    }

    /// Set the kernel shape.
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Set the assignment policy.
    pub fn with_policy(mut self, policy: AssignmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Require every point to receive a label.
    pub fn with_cluster_all(mut self, cluster_all: bool) -> Self {
        self.cluster_all = cluster_all;
        self
    }

    /// Kernel used for membership tests.
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Decode one (batch, class) slice.
    ///
    /// `margins` holds one row per point: a single bandwidth for the Gaussian
    /// kernel, one per embedding dimension for the ellipsoidal kernel.
    pub fn fit_predict(
        &self,
        embeddings: &[Vec<f32>],
        seediness: &[f32],
        margins: &[Vec<f32>],
    ) -> Result<Decoded> {
        let n = embeddings.len();
        let d = util::check_rows(embeddings)?;
        util::check_len("seediness", n, seediness.len())?;
        util::check_len("margins", n, margins.len())?;
        for m in margins {
            self.kernel.check_bandwidth(d, m.len())?;
        }
        if !self.s_threshold.is_finite() {
            return Err(Error::InvalidParameter {
                name: "s_threshold",
                message: "must be finite",
            });
        }
        if !self.p_threshold.is_finite() {
            return Err(Error::InvalidParameter {
                name: "p_threshold",
                message: "must be finite",
            });
        }

        let mut peeled = vec![false; n];
        let mut n_peeled = 0usize;
        // Summed claim sizes, overlaps included.
        let mut tally = 0usize;
        let mut spheres: Vec<Sphere> = Vec::new();

        // FirstClaim: first claimant. BestFit: running argmax over kernels.
        let mut claims: Vec<Option<usize>> = vec![None; n];
        let mut best: Vec<(f32, Option<usize>)> = vec![(f32::NEG_INFINITY, None); n];

        loop {
            let progress = match self.policy {
                AssignmentPolicy::FirstClaim => n_peeled,
                AssignmentPolicy::BestFit => tally,
            };
            if progress >= n {
                break;
            }
            let Some(seed) = next_seed(seediness, &peeled) else {
                break;
            };
            if seediness[seed] < self.s_threshold {
                break;
            }

            let sphere = Sphere {
                centroid: embeddings[seed].clone(),
                sigma: clamp_margin(&margins[seed]),
            };
            let k = spheres.len();
            let mut claimed = 0usize;

            for (j, x) in embeddings.iter().enumerate() {
                let p = sphere.density(self.kernel, x);
                if p > best[j].0 {
                    best[j] = (p, Some(k));
                }
                if p > self.p_threshold || j == seed {
                    tally += 1;
                    if !peeled[j] {
                        peeled[j] = true;
                        n_peeled += 1;
                        claimed += 1;
                    }
                    if claims[j].is_none() {
                        claims[j] = Some(k);
                    }
                }
            }

            trace!(
                cluster = k,
                seed,
                score = seediness[seed],
                claimed,
                n_peeled,
                tally,
                "seed peeled"
            );
            spheres.push(sphere);
        }

        let labels = match self.policy {
            AssignmentPolicy::FirstClaim => {
                if self.cluster_all {
                    cluster_remainder(embeddings, &claims)?
                } else {
                    claims
                }
            }
            AssignmentPolicy::BestFit => best
                .iter()
                .zip(&peeled)
                .map(|(&(_, k), &was_peeled)| {
                    if was_peeled || self.cluster_all {
                        k
                    } else {
                        None
                    }
                })
                .collect(),
        };

        debug!(
            points = n,
            clusters = spheres.len(),
            unassigned = labels.iter().filter(|l| l.is_none()).count(),
            policy = %self.policy,
            kernel = %self.kernel,
            "decoded slice"
        );

        Ok(Decoded { labels, spheres })
    }
}

/// Highest-seediness point that has not been peeled. NaN scores never seed.
fn next_seed(seediness: &[f32], peeled: &[bool]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, (&s, &done)) in seediness.iter().zip(peeled).enumerate() {
        if done || s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

/// Assigns every unassigned point to the nearest predicted centroid.
///
/// Centroids are the mean embeddings of the currently assigned groups. When
/// no point is unassigned, or no point is assigned, the labels are returned
/// unchanged.
pub fn cluster_remainder(
    embeddings: &[Vec<f32>],
    labels: &[Option<usize>],
) -> Result<Vec<Option<usize>>> {
    util::check_len("labels", embeddings.len(), labels.len())?;

    let assigned: Vec<usize> = (0..labels.len()).filter(|&i| labels[i].is_some()).collect();
    if assigned.is_empty() || assigned.len() == labels.len() {
        return Ok(labels.to_vec());
    }

    let features = util::gather(embeddings, &assigned);
    let groups: Vec<i64> = assigned
        .iter()
        .filter_map(|&i| labels[i].map(|k| k as i64))
        .collect();
    let (ids, means) = find_cluster_means(&features, &groups)?;

    let mut out = labels.to_vec();
    for (x, label) in embeddings.iter().zip(out.iter_mut()) {
        if label.is_some() {
            continue;
        }
        let dists: Vec<f32> = means.iter().map(|m| -util::euclidean(x, m)).collect();
        *label = util::argmax(&dists).map(|k| ids[k] as usize);
    }
    Ok(out)
}
