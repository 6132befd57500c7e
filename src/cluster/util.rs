use crate::error::{Error, Result};

#[inline]
pub(crate) fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
pub(crate) fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean(a, b).sqrt()
}

/// Minkowski p-norm of `a - b`. `p == 2` takes the Euclidean fast path.
#[inline]
pub(crate) fn p_distance(a: &[f32], b: &[f32], p: f32) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    if p == 2.0 {
        return euclidean(a, b);
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs().powf(p))
        .sum::<f32>()
        .powf(1.0 / p)
}

/// Minkowski p-norm of a single vector.
#[inline]
pub(crate) fn p_norm(a: &[f32], p: f32) -> f32 {
    if p == 2.0 {
        return a.iter().map(|x| x * x).sum::<f32>().sqrt();
    }
    a.iter().map(|x| x.abs().powf(p)).sum::<f32>().powf(1.0 / p)
}

/// Index of the largest value. Ties resolve to the lowest index; NaNs never win.
pub(crate) fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Checks that every row has the dimensionality of the first and returns it.
pub(crate) fn check_rows(rows: &[Vec<f32>]) -> Result<usize> {
    let first = rows.first().ok_or(Error::EmptyInput)?;
    let d = first.len();
    if d == 0 {
        return Err(Error::InvalidParameter {
            name: "dimension",
            message: "must be at least 1",
        });
    }
    for row in rows.iter().skip(1) {
        if row.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: row.len(),
            });
        }
    }
    Ok(d)
}

pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(Error::LengthMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

/// Gathers the rows of `values` selected by `index`.
pub(crate) fn gather<T: Clone>(values: &[T], index: &[usize]) -> Vec<T> {
    index.iter().map(|&i| values[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_distance_matches_euclidean_and_manhattan() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((p_distance(&a, &b, 2.0) - 5.0).abs() < 1e-6);
        assert!((p_distance(&a, &b, 1.0) - 7.0).abs() < 1e-5);
        assert!((p_norm(&b, 1.0) - 7.0).abs() < 1e-5);
    }

    #[test]
    fn argmax_prefers_first_of_ties() {
        assert_eq!(argmax(&[0.1, 0.9, 0.9, 0.2]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.3]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn check_rows_rejects_ragged_input() {
        assert!(check_rows(&[vec![1.0, 2.0], vec![1.0]]).is_err());
        assert!(check_rows(&[]).is_err());
        assert_eq!(check_rows(&[vec![1.0, 2.0, 3.0]]).unwrap(), 3);
    }
}
