use tracing::warn;

use super::report::LossReport;
use super::LossKind;
use crate::error::Result;
use crate::points::Replica;

/// Common interface for the clustering losses.
pub trait ClusteringLoss {
    /// Which variant this is.
    fn kind(&self) -> LossKind;

    /// Number of semantic classes the per-class breakdown covers.
    fn num_classes(&self) -> usize;

    /// Evaluate the loss on one replica's outputs, averaged over its events.
    fn forward(&self, replica: &Replica) -> Result<LossReport>;

    /// Evaluate the loss over several replicas, weighting each one equally.
    ///
    /// Replicas without points are skipped.
    fn compute(&self, replicas: &[Replica]) -> Result<LossReport> {
        let mut reports = Vec::with_capacity(replicas.len());
        for (i, replica) in replicas.iter().enumerate() {
            if replica.labels.is_empty() {
                warn!(replica = i, loss = %self.kind(), "skipping replica without points");
                continue;
            }
            reports.push(self.forward(replica)?);
        }
        LossReport::average(&reports, self.num_classes())
    }
}
