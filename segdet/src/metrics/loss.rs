//! Scalar losses reported alongside the metrics.

use crate::{common::*, projection::Projection, utils};

/// Mean binary cross entropy between mask logits and targets in `[0, 1]`.
pub fn bce_with_logits(logits: ArrayView3<'_, f32>, targets: ArrayView3<'_, f32>) -> Result<f64> {
    ensure!(
        logits.dim() == targets.dim(),
        "logits and targets shapes mismatch: {:?} vs {:?}",
        logits.dim(),
        targets.dim()
    );
    if logits.is_empty() {
        return Ok(0.0);
    }

    // max(x, 0) - x * t + log(1 + exp(-|x|))
    let sum: f64 = izip!(logits.iter(), targets.iter())
        .map(|(&logit, &target)| {
            let logit = logit as f64;
            let target = target as f64;
            logit.max(0.0) - logit * target + (-logit.abs()).exp().ln_1p()
        })
        .sum();

    Ok(sum / logits.len() as f64)
}

/// Mean cross entropy of the logits of matched regions against their true classes.
///
/// Returns zero if no region is matched.
pub fn cross_entropy(projection: &Projection, logits: ArrayView2<'_, f32>) -> Result<f64> {
    ensure!(
        logits.nrows() == projection.num_regions(),
        "expect logits for {} regions, but get {} rows",
        projection.num_regions(),
        logits.nrows()
    );

    let losses: Vec<f64> = projection
        .matched()
        .map(|(index, class)| -> Result<_> {
            let row = logits.row(index);
            ensure!(
                class.index() < row.len(),
                "class id {} is out of range of {} logits",
                class,
                row.len()
            );
            Ok(utils::log_sum_exp(row) - row[class.index()] as f64)
        })
        .try_collect()?;

    if losses.is_empty() {
        return Ok(0.0);
    }
    Ok(losses.iter().sum::<f64>() / losses.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bce_at_zero_logit() {
        let logits = Array3::zeros((1, 2, 2));
        let targets = Array3::from_elem((1, 2, 2), 1.0);
        let loss = bce_with_logits(logits.view(), targets.view()).unwrap();
        assert_abs_diff_eq!(loss, 2f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn bce_is_stable_for_large_logits() {
        let logits = Array3::from_elem((1, 1, 2), 1000.0);
        let targets = Array3::from_elem((1, 1, 2), 1.0);
        let loss = bce_with_logits(logits.view(), targets.view()).unwrap();
        assert!(loss.is_finite());
        assert_abs_diff_eq!(loss, 0.0, epsilon = 1e-9);
    }
}
