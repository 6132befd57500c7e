//! Named loss components and their aggregation over slices, events, and replicas.
//!
//! Aggregation is uniform at every level: a slice is one (event, class) pair,
//! an event's value is the mean over its slices, a replica's value is the mean
//! over its events, and the reported value is the mean over replicas. Empty
//! levels contribute nothing and are never divided into.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::Result;
use crate::points::{ClassTable, PointLabels};

/// A component of a clustering loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    /// Hinged distance of members to their centroid.
    Intra,
    /// Hinged separation between centroids.
    Inter,
    /// Mean centroid norm.
    Regularization,
    /// Foreground-mask loss (BCE or Lovász hinge).
    Mask,
    /// Seediness regression.
    Seediness,
    /// Margin smoothing.
    Smoothing,
    /// Semantic segmentation cross-entropy.
    Segmentation,
}

impl Term {
    /// Key used in the flattened report.
    pub fn key(self) -> &'static str {
        match self {
            Term::Intra => "intra_loss",
            Term::Inter => "inter_loss",
            Term::Regularization => "reg_loss",
            Term::Mask => "mask_loss",
            Term::Seediness => "seed_loss",
            Term::Smoothing => "smoothing_loss",
            Term::Segmentation => "seg_loss",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Loss of a single (event, class) slice.
///
/// `terms` hold unweighted component values; `loss` is their weighted sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceLoss {
    /// Weighted total.
    pub loss: f32,
    /// Unweighted components.
    pub terms: BTreeMap<Term, f32>,
    /// Clustering accuracy of the slice.
    pub accuracy: f32,
}

/// Aggregated values for one semantic class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassReport {
    /// Weighted total.
    pub loss: f32,
    /// Unweighted components.
    pub terms: BTreeMap<Term, f32>,
    /// Clustering accuracy.
    pub accuracy: f32,
}

/// Result of a loss evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct LossReport {
    /// Weighted total loss.
    pub loss: f32,
    /// Mean clustering accuracy.
    pub accuracy: f32,
    /// Unweighted components.
    pub terms: BTreeMap<Term, f32>,
    /// Per-class breakdown; `None` for classes that never occurred.
    pub per_class: ClassTable<Option<ClassReport>>,
    /// Semantic segmentation accuracy, when a segmentation term is present.
    pub segmentation_accuracy: Option<f32>,
}

impl LossReport {
    /// A report where nothing was observed.
    pub fn empty(num_classes: usize) -> Self {
        Self {
            loss: 0.0,
            accuracy: 0.0,
            terms: BTreeMap::new(),
            per_class: ClassTable::new(num_classes, None),
            segmentation_accuracy: None,
        }
    }

    /// Value of one component, 0 when absent.
    pub fn term(&self, term: Term) -> f32 {
        self.terms.get(&term).copied().unwrap_or(0.0)
    }

    /// Flattens the report into named scalars.
    ///
    /// Keys: `loss`, `accuracy`, one key per component (e.g. `mask_loss`),
    /// per-class `loss_<c>`, `<component>_<c>`, `accuracy_<c>`, and `acc_seg`.
    pub fn to_map(&self) -> BTreeMap<String, f32> {
        let mut out = BTreeMap::new();
        out.insert("loss".to_string(), self.loss);
        out.insert("accuracy".to_string(), self.accuracy);
        for (term, v) in &self.terms {
            out.insert(term.key().to_string(), *v);
        }
        for (c, slot) in self.per_class.iter() {
            if let Some(class) = slot {
                out.insert(format!("loss_{c}"), class.loss);
                out.insert(format!("accuracy_{c}"), class.accuracy);
                for (term, v) in &class.terms {
                    out.insert(format!("{}_{c}", term.key()), *v);
                }
            }
        }
        if let Some(acc) = self.segmentation_accuracy {
            out.insert("acc_seg".to_string(), acc);
        }
        out
    }

    /// Equal-weight mean of several reports; empty input yields an empty report.
    pub fn average(reports: &[LossReport], num_classes: usize) -> Result<LossReport> {
        let mut acc = Means::new(num_classes);
        let mut seg = Mean::default();
        for r in reports {
            acc.total.push(r.loss);
            acc.accuracy.push(r.accuracy);
            for (term, v) in &r.terms {
                acc.terms.entry(*term).or_default().push(*v);
            }
            for (c, slot) in r.per_class.iter() {
                if let Some(class) = slot {
                    acc.class_mut(c)?.push(class.loss, &class.terms, class.accuracy);
                }
            }
            if let Some(a) = r.segmentation_accuracy {
                seg.push(a);
            }
        }
        let mut out = acc.finish();
        out.segmentation_accuracy = seg.value();
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub(crate) fn push(&mut self, v: f32) {
        self.sum += f64::from(v);
        self.count += 1;
    }

    pub(crate) fn value(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}

#[derive(Debug, Clone, Default)]
struct ClassMeans {
    loss: Mean,
    terms: BTreeMap<Term, Mean>,
    accuracy: Mean,
}

impl ClassMeans {
    fn push(&mut self, loss: f32, terms: &BTreeMap<Term, f32>, accuracy: f32) {
        self.loss.push(loss);
        self.accuracy.push(accuracy);
        for (term, v) in terms {
            self.terms.entry(*term).or_default().push(*v);
        }
    }

    fn finish(&self) -> Option<ClassReport> {
        Some(ClassReport {
            loss: self.loss.value()?,
            terms: finish_terms(&self.terms),
            accuracy: self.accuracy.value().unwrap_or(0.0),
        })
    }
}

fn finish_terms(terms: &BTreeMap<Term, Mean>) -> BTreeMap<Term, f32> {
    terms
        .iter()
        .filter_map(|(t, m)| m.value().map(|v| (*t, v)))
        .collect()
}

struct Means {
    total: Mean,
    accuracy: Mean,
    terms: BTreeMap<Term, Mean>,
    classes: ClassTable<ClassMeans>,
}

impl Means {
    fn new(num_classes: usize) -> Self {
        Self {
            total: Mean::default(),
            accuracy: Mean::default(),
            terms: BTreeMap::new(),
            classes: ClassTable::new(num_classes, ClassMeans::default()),
        }
    }

    fn class_mut(&mut self, class: usize) -> Result<&mut ClassMeans> {
        self.classes.get_mut(class)
    }

    fn finish(&self) -> LossReport {
        let mut per_class = ClassTable::new(self.classes.len(), None);
        for (c, means) in self.classes.iter() {
            if let Ok(slot) = per_class.get_mut(c) {
                *slot = means.finish();
            }
        }
        LossReport {
            loss: self.total.value().unwrap_or(0.0),
            accuracy: self.accuracy.value().unwrap_or(0.0),
            terms: finish_terms(&self.terms),
            per_class,
            segmentation_accuracy: None,
        }
    }
}

/// Accumulates slice losses event by event into a replica-level report.
pub(crate) struct ReportBuilder {
    means: Means,
}

impl ReportBuilder {
    pub(crate) fn new(num_classes: usize) -> Self {
        Self {
            means: Means::new(num_classes),
        }
    }

    /// Adds one event made of `slices`. A slice without a class (whole-event
    /// clustering) feeds only the event-level values.
    pub(crate) fn add_event(&mut self, slices: &[(Option<usize>, SliceLoss)]) -> Result<()> {
        if slices.is_empty() {
            return Ok(());
        }
        let mut event = ClassMeans::default();
        for (class, s) in slices {
            event.push(s.loss, &s.terms, s.accuracy);
            if let Some(c) = class {
                self.means.class_mut(*c)?.push(s.loss, &s.terms, s.accuracy);
            }
        }
        if let Some(e) = event.finish() {
            self.means.total.push(e.loss);
            self.means.accuracy.push(e.accuracy);
            for (term, v) in &e.terms {
                self.means.terms.entry(*term).or_default().push(*v);
            }
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> LossReport {
        self.means.finish()
    }
}

/// Runs `slice_fn` over every (event, class) slice of `labels` and aggregates
/// the results. With `contingent` set, each event is one slice.
pub(crate) fn over_slices<F>(
    labels: &PointLabels,
    num_classes: usize,
    contingent: bool,
    mut slice_fn: F,
) -> Result<LossReport>
where
    F: FnMut(&[usize]) -> Result<SliceLoss>,
{
    let mut builder = ReportBuilder::new(num_classes);
    for (event, index) in labels.events() {
        let mut slices = Vec::new();
        if contingent {
            slices.push((None, slice_fn(&index)?));
        } else {
            for (class, idx) in labels.classes(&index) {
                slices.push((Some(class), slice_fn(&idx)?));
            }
        }
        debug!(
            event,
            points = index.len(),
            slices = slices.len(),
            "event loss computed"
        );
        builder.add_event(&slices)?;
    }
    Ok(builder.finish())
}
