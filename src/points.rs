//! Point-cloud data model shared by the losses, the decoder, and the metrics.
//!
//! Points arrive as columns: spatial coordinates, the event (batch) index,
//! the semantic class, and the instance (group) id. Group ids are only
//! meaningful inside one (event, class) slice.

use std::collections::BTreeMap;

use crate::cluster::util;
use crate::error::{Error, Result};

/// Group id carried by points that belong to no instance.
pub const UNASSIGNED: i64 = -1;

/// Column index of the batch id in the tabular label layout.
pub const BATCH_COLUMN: usize = 3;

/// Ground-truth labels for a set of points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointLabels {
    /// Voxel coordinates.
    pub coords: Vec<[f32; 3]>,
    /// Event index within the minibatch.
    pub batch: Vec<usize>,
    /// Semantic class per point.
    pub semantic: Vec<usize>,
    /// Instance id per point, scoped to (batch, semantic class).
    pub group: Vec<i64>,
}

impl PointLabels {
    /// Build labels from the tabular layout produced by the data loader.
    ///
    /// Both tables carry `x, y, z, batch` in columns 0 to 3; the last column is
    /// the semantic class in `segment` and the group id in `group`.
    pub fn from_rows(segment: &[Vec<f32>], group: &[Vec<f32>]) -> Result<Self> {
        util::check_len("group rows", segment.len(), group.len())?;
        let mut labels = PointLabels::default();

        for (s, g) in segment.iter().zip(group) {
            if s.len() <= BATCH_COLUMN + 1 || g.is_empty() {
                return Err(Error::DimensionMismatch {
                    expected: BATCH_COLUMN + 2,
                    found: s.len().min(g.len()),
                });
            }
            labels.coords.push([s[0], s[1], s[2]]);
            labels.batch.push(non_negative(s[BATCH_COLUMN], "batch")?);
            labels.semantic.push(non_negative(s[s.len() - 1], "semantic")?);
            labels.group.push(g[g.len() - 1] as i64);
        }
        Ok(labels)
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether there are no points.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Checks that every column has `n` rows.
    pub fn check(&self, n: usize) -> Result<()> {
        util::check_len("coords", n, self.coords.len())?;
        util::check_len("batch", n, self.batch.len())?;
        util::check_len("semantic", n, self.semantic.len())?;
        util::check_len("group", n, self.group.len())
    }

    /// Point indices per event, ordered by batch id.
    pub fn events(&self) -> Vec<(usize, Vec<usize>)> {
        split_by(self.batch.iter().copied())
    }

    /// Point indices per semantic class within `index`, ordered by class.
    pub fn classes(&self, index: &[usize]) -> Vec<(usize, Vec<usize>)> {
        let parts = split_by(index.iter().map(|&i| self.semantic[i]));
        parts
            .into_iter()
            .map(|(c, local)| (c, local.into_iter().map(|j| index[j]).collect()))
            .collect()
    }

    /// Group ids of the selected points.
    pub fn groups_of(&self, index: &[usize]) -> Vec<i64> {
        util::gather(&self.group, index)
    }

    /// Coordinates of the selected points, divided by `scale`.
    pub fn scaled_coords(&self, index: &[usize], scale: f32) -> Vec<Vec<f32>> {
        index
            .iter()
            .map(|&i| self.coords[i].iter().map(|c| c / scale).collect())
            .collect()
    }
}

fn non_negative(v: f32, name: &'static str) -> Result<usize> {
    if v.is_nan() || v < 0.0 || v.fract() != 0.0 {
        return Err(Error::InvalidParameter {
            name,
            message: "must be a non-negative integer",
        });
    }
    Ok(v as usize)
}

/// Groups positions `0..n` by key, keys ascending, positions in input order.
pub(crate) fn split_by<K: Ord>(keys: impl Iterator<Item = K>) -> Vec<(K, Vec<usize>)> {
    let mut parts: BTreeMap<K, Vec<usize>> = BTreeMap::new();
    for (i, k) in keys.enumerate() {
        parts.entry(k).or_default().push(i);
    }
    parts.into_iter().collect()
}

/// One coarser decoder resolution for the multi-scale loss.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    /// Embeddings at this resolution.
    pub embeddings: Vec<Vec<f32>>,
    /// Labels of the points at this resolution.
    pub labels: PointLabels,
}

/// Per-point outputs of the network for one replica.
///
/// Loss variants read only what they need and report
/// [`Error::MissingOutput`] when a required column is empty.
#[derive(Debug, Clone, Default)]
pub struct NetworkOutput {
    /// Embedding per point (N×d).
    pub embeddings: Vec<Vec<f32>>,
    /// Seediness per point.
    pub seediness: Vec<f32>,
    /// Margin per point (N×1 or N×d).
    pub margins: Vec<Vec<f32>>,
    /// Semantic class scores per point (N×C), finest resolution.
    pub segmentation: Vec<Vec<f32>>,
    /// Coarser resolutions, finest first. The finest layer is `embeddings` itself.
    pub pyramid: Vec<Layer>,
}

/// Everything one worker replica contributes to a loss evaluation.
#[derive(Debug, Clone, Default)]
pub struct Replica {
    /// Network outputs.
    pub output: NetworkOutput,
    /// Ground truth aligned with `output.embeddings`.
    pub labels: PointLabels,
}

impl Replica {
    /// Bundle outputs with their labels.
    pub fn new(output: NetworkOutput, labels: PointLabels) -> Self {
        Self { output, labels }
    }
}

/// A fixed-size table with one slot per semantic class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable<T> {
    slots: Vec<T>,
}

impl<T: Clone> ClassTable<T> {
    /// A table for classes `0..num_classes`, every slot set to `init`.
    pub fn new(num_classes: usize, init: T) -> Self {
        Self {
            slots: vec![init; num_classes],
        }
    }
}

impl<T> ClassTable<T> {
    /// Number of classes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table has no classes.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot of `class`.
    pub fn get(&self, class: usize) -> Result<&T> {
        let num_classes = self.slots.len();
        self.slots
            .get(class)
            .ok_or(Error::InvalidClass { class, num_classes })
    }

    /// Mutable slot of `class`.
    pub fn get_mut(&mut self, class: usize) -> Result<&mut T> {
        let num_classes = self.slots.len();
        self.slots
            .get_mut(class)
            .ok_or(Error::InvalidClass { class, num_classes })
    }

    /// `(class, slot)` pairs in class order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> PointLabels {
        PointLabels {
            coords: vec![[0.0; 3]; 6],
            batch: vec![1, 0, 1, 0, 1, 1],
            semantic: vec![2, 0, 0, 0, 2, 0],
            group: vec![0, 1, 3, 1, 0, 4],
        }
    }

    #[test]
    fn events_are_sorted_by_batch_id() {
        let l = labels();
        let events = l.events();
        assert_eq!(events, vec![(0, vec![1, 3]), (1, vec![0, 2, 4, 5])]);
    }

    #[test]
    fn classes_map_back_to_global_indices() {
        let l = labels();
        let classes = l.classes(&[0, 2, 4, 5]);
        assert_eq!(classes, vec![(0, vec![2, 5]), (2, vec![0, 4])]);
        assert_eq!(l.groups_of(&[2, 5]), vec![3, 4]);
    }

    #[test]
    fn parses_tabular_layout() {
        let segment = vec![
            vec![1.0, 2.0, 3.0, 0.0, 4.0],
            vec![4.0, 5.0, 6.0, 1.0, 0.0],
        ];
        let group = vec![
            vec![1.0, 2.0, 3.0, 0.0, 7.0],
            vec![4.0, 5.0, 6.0, 1.0, -1.0],
        ];
        let l = PointLabels::from_rows(&segment, &group).unwrap();
        assert_eq!(l.coords[1], [4.0, 5.0, 6.0]);
        assert_eq!(l.batch, vec![0, 1]);
        assert_eq!(l.semantic, vec![4, 0]);
        assert_eq!(l.group, vec![7, UNASSIGNED]);

        let bad = vec![vec![1.0, 2.0, 3.0, -1.0, 0.0]];
        assert!(PointLabels::from_rows(&bad, &group[..1]).is_err());
    }

    #[test]
    fn class_table_rejects_unknown_class() {
        let mut t = ClassTable::new(3, 0.0f32);
        *t.get_mut(2).unwrap() += 1.5;
        assert_eq!(*t.get(2).unwrap(), 1.5);
        assert!(t.get(3).is_err());
        assert_eq!(t.iter().count(), 3);
    }
}
