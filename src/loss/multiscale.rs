//! Discriminative loss repeated over a pyramid of decoder resolutions.
//!
//! Layer `l` uses its own margins `(δ_v[l], δ_d[l])`, halving per layer
//! unless configured explicitly. A softmax segmentation term is added on top:
//!
//! ```text
//! L = w_seg L_seg + Σ_l L_disc(layer l; δ_v[l], δ_d[l])
//! ```
//!
//! Reported accuracy is the clustering accuracy of the finest layer only.

use std::collections::BTreeMap;

use tracing::debug;

use super::discriminative::DiscriminativeLoss;
use super::lovasz::softmax_cross_entropy;
use super::report::{ClassReport, LossReport, Term};
use super::traits::ClusteringLoss;
use super::LossKind;
use crate::cluster::util;
use crate::config::LossConfig;
use crate::error::{Error, Result};
use crate::points::{PointLabels, Replica};

/// Multi-scale discriminative loss with a segmentation term.
#[derive(Debug, Clone)]
pub struct MultiScaleLoss {
    cfg: LossConfig,
    layer_loss: DiscriminativeLoss,
    schedule: Vec<(f32, f32)>,
}

impl MultiScaleLoss {
    /// Build from a validated configuration.
    pub fn new(cfg: LossConfig) -> Result<Self> {
        let schedule = cfg.margin_schedule()?;
        let layer_loss = DiscriminativeLoss::new(cfg.clone())?;
        Ok(Self {
            cfg,
            layer_loss,
            schedule,
        })
    }

    /// `(δ_v, δ_d)` per layer, finest first.
    pub fn schedule(&self) -> &[(f32, f32)] {
        &self.schedule
    }

    fn segmentation(&self, scores: &[Vec<f32>], labels: &PointLabels) -> Result<(f32, f32)> {
        if scores.is_empty() {
            return Err(Error::MissingOutput("segmentation"));
        }
        let width = util::check_rows(scores)?;
        util::check_len("segmentation", labels.len(), scores.len())?;
        if let Some(&class) = labels.semantic.iter().find(|&&c| c >= width) {
            return Err(Error::InvalidClass {
                class,
                num_classes: width,
            });
        }
        Ok(softmax_cross_entropy(scores, &labels.semantic))
    }
}

/// Adds `layer`'s per-class losses and components into `total`.
///
/// Accuracy is left alone: a class first seen at a coarse layer reports 0.
fn accumulate_classes(total: &mut LossReport, layer: &LossReport) -> Result<()> {
    for (c, slot) in layer.per_class.iter() {
        let Some(class) = slot else { continue };
        let acc = total
            .per_class
            .get_mut(c)?
            .get_or_insert_with(ClassReport::default);
        acc.loss += class.loss;
        for (term, v) in &class.terms {
            *acc.terms.entry(*term).or_insert(0.0) += v;
        }
    }
    Ok(())
}

impl ClusteringLoss for MultiScaleLoss {
    fn kind(&self) -> LossKind {
        LossKind::MultiScale
    }

    fn num_classes(&self) -> usize {
        self.cfg.num_classes
    }

    fn forward(&self, replica: &Replica) -> Result<LossReport> {
        let out = &replica.output;
        let layers = out.pyramid.len() + 1;
        if layers > self.schedule.len() {
            return Err(Error::LengthMismatch {
                what: "margin schedule",
                expected: layers,
                found: self.schedule.len(),
            });
        }

        let (seg_loss, seg_acc) = self.segmentation(&out.segmentation, &replica.labels)?;

        let mut total = LossReport::empty(self.cfg.num_classes);
        let mut terms: BTreeMap<Term, f32> = BTreeMap::new();
        let inputs = std::iter::once((&out.embeddings, &replica.labels))
            .chain(out.pyramid.iter().map(|l| (&l.embeddings, &l.labels)));

        for (layer, ((embeddings, labels), &(intra, inter))) in
            inputs.zip(&self.schedule).enumerate()
        {
            let r = self.layer_loss.report(embeddings, labels, intra, inter)?;
            debug!(layer, intra, inter, loss = r.loss, "layer loss computed");

            total.loss += r.loss;
            for (term, v) in &r.terms {
                *terms.entry(*term).or_insert(0.0) += v;
            }
            if layer == 0 {
                total.accuracy = r.accuracy;
                total.per_class = r.per_class;
            } else {
                accumulate_classes(&mut total, &r)?;
            }
        }

        total.loss += self.cfg.segmentation_weight * seg_loss;
        terms.insert(Term::Segmentation, seg_loss);
        total.terms = terms;
        total.segmentation_accuracy = Some(seg_acc);
        Ok(total)
    }
}
