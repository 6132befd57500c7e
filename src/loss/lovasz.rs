//! Per-point binary losses used for foreground masks, and the segmentation loss.
//!
//! The Lovász hinge (Berman et al., 2018) is a convex surrogate of the
//! Jaccard loss: errors are sorted in decreasing order and weighted by the
//! discrete gradient of the Jaccard index along that order.

/// Lower bound applied to `ln(p)` in the binary cross-entropy.
const LOG_FLOOR: f32 = -100.0;

#[inline]
fn clamped_ln(x: f32) -> f32 {
    if x <= 0.0 {
        LOG_FLOOR
    } else {
        x.ln().max(LOG_FLOOR)
    }
}

/// Mean binary cross-entropy of probabilities `p` against `{0, 1}` targets.
///
/// Probabilities are clamped into `[0, 1]` and the logarithms floored, so
/// `p = 0` or `p = 1` never produce infinities. Empty input gives 0.
pub fn binary_cross_entropy(p: &[f32], target: &[f32]) -> f32 {
    debug_assert_eq!(p.len(), target.len());
    if p.is_empty() {
        return 0.0;
    }
    let total: f64 = p
        .iter()
        .zip(target)
        .map(|(&p, &t)| {
            let p = p.clamp(0.0, 1.0);
            let l = -(t * clamped_ln(p) + (1.0 - t) * clamped_ln(1.0 - p));
            f64::from(l)
        })
        .sum();
    (total / p.len() as f64) as f32
}

/// Gradient of the Lovász extension with respect to sorted errors.
fn lovasz_grad(gt_sorted: &[f32]) -> Vec<f32> {
    let gts: f32 = gt_sorted.iter().sum();
    let mut jaccard = Vec::with_capacity(gt_sorted.len());
    let mut cum_gt = 0.0f32;
    let mut cum_neg = 0.0f32;
    for &g in gt_sorted {
        cum_gt += g;
        cum_neg += 1.0 - g;
        let intersection = gts - cum_gt;
        let union = gts + cum_neg;
        jaccard.push(1.0 - intersection / union);
    }
    for i in (1..jaccard.len()).rev() {
        jaccard[i] -= jaccard[i - 1];
    }
    jaccard
}

/// Binary Lovász hinge loss on real-valued `logits` against `{0, 1}` labels.
///
/// Empty input gives 0.
pub fn lovasz_hinge_flat(logits: &[f32], labels: &[f32]) -> f32 {
    debug_assert_eq!(logits.len(), labels.len());
    if logits.is_empty() {
        return 0.0;
    }
    let mut errors: Vec<(f32, f32)> = logits
        .iter()
        .zip(labels)
        .map(|(&x, &y)| (1.0 - x * (2.0 * y - 1.0), y))
        .collect();
    errors.sort_by(|a, b| b.0.total_cmp(&a.0));

    let gt_sorted: Vec<f32> = errors.iter().map(|e| e.1).collect();
    let grad = lovasz_grad(&gt_sorted);
    errors
        .iter()
        .zip(&grad)
        .map(|(e, g)| e.0.max(0.0) * g)
        .sum()
}

/// Intersection over union of `p > 0.5` against a `{0, 1}` mask.
///
/// Returns 1 when both sets are empty.
pub fn mask_iou(p: &[f32], mask: &[f32]) -> f32 {
    let mut inter = 0usize;
    let mut union = 0usize;
    for (&p, &m) in p.iter().zip(mask) {
        let a = p > 0.5;
        let b = m > 0.5;
        if a && b {
            inter += 1;
        }
        if a || b {
            union += 1;
        }
    }
    if union == 0 {
        return 1.0;
    }
    inter as f32 / union as f32
}

/// Mean softmax cross-entropy of class `scores` against `labels`, and the
/// argmax accuracy. Returns `(0, 0)` for empty input.
///
/// Labels must be valid column indices of `scores`.
pub fn softmax_cross_entropy(scores: &[Vec<f32>], labels: &[usize]) -> (f32, f32) {
    debug_assert_eq!(scores.len(), labels.len());
    if scores.is_empty() {
        return (0.0, 0.0);
    }
    let mut loss = 0.0f64;
    let mut correct = 0usize;
    for (row, &y) in scores.iter().zip(labels) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = row.iter().map(|s| (s - max).exp()).sum::<f32>().ln() + max;
        loss += f64::from(log_sum - row[y]);

        let mut best = 0;
        for (k, &s) in row.iter().enumerate() {
            if s > row[best] {
                best = k;
            }
        }
        if best == y {
            correct += 1;
        }
    }
    let n = scores.len() as f64;
    ((loss / n) as f32, (correct as f64 / n) as f32)
}
