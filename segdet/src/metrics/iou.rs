//! Thresholded segmentation IoU.

use crate::{batch, common::*};

/// The additive constant avoiding `0 / 0`.
pub const SMOOTH: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    None,
    Mean,
}

/// Smoothed intersection over union of two binary masks.
pub fn smoothed_iou(prediction: ArrayView2<'_, bool>, label: ArrayView2<'_, bool>) -> Result<f64> {
    ensure!(
        prediction.dim() == label.dim(),
        "prediction and label shapes mismatch: {:?} vs {:?}",
        prediction.dim(),
        label.dim()
    );

    let (intersection, union) = izip!(prediction.iter(), label.iter()).fold(
        (0usize, 0usize),
        |(intersection, union), (&pred, &label)| {
            (
                intersection + (pred && label) as usize,
                union + (pred || label) as usize,
            )
        },
    );

    Ok((intersection as f64 + SMOOTH) / (union as f64 + SMOOTH))
}

/// Discretizes IoU into ten levels. IoU at or below 0.5 scores zero.
pub fn bucket_iou(iou: f64) -> f64 {
    (20.0 * (iou - 0.5)).clamp(0.0, 10.0).ceil() / 10.0
}

/// Bucketed IoU of mask logits against ground truth masks, per image or averaged.
///
/// Logits are binarized by `sigmoid(x) > 0.5` and labels by `x > 0.5`.
pub fn iou_score(
    logits: ArrayView3<'_, f32>,
    labels: ArrayView3<'_, f32>,
    reduce: Reduce,
) -> Result<Vec<f64>> {
    ensure!(
        logits.dim() == labels.dim(),
        "logits and labels shapes mismatch: {:?} vs {:?}",
        logits.dim(),
        labels.dim()
    );
    ensure!(logits.len_of(Axis(0)) > 0, "empty batch");

    let predictions = batch::binarize_logits(logits);
    let labels = batch::binarize_probs(labels);

    let scores: Vec<f64> = izip!(predictions.outer_iter(), labels.outer_iter())
        .map(|(prediction, label)| -> Result<_> { Ok(bucket_iou(smoothed_iou(prediction, label)?)) })
        .try_collect()?;

    let scores = match reduce {
        Reduce::None => scores,
        Reduce::Mean => vec![scores.iter().sum::<f64>() / scores.len() as f64],
    };
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn empty_masks_score_one() {
        let logits = Array3::from_elem((1, 4, 4), -1.0);
        let labels = Array3::zeros((1, 4, 4));
        let scores = iou_score(logits.view(), labels.view(), Reduce::None).unwrap();
        assert_eq!(scores, vec![1.0]);
    }

    #[test]
    fn buckets_are_monotonic() {
        let scores: Vec<_> = [0.45, 0.50, 0.55, 0.75, 1.0]
            .iter()
            .map(|&iou| bucket_iou(iou))
            .collect();
        assert!(scores.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(scores[0], 0.0);
        assert_eq!(scores[1], 0.0);
        assert_abs_diff_eq!(scores[3], 0.5);
        assert_abs_diff_eq!(scores[4], 1.0);
    }

    #[test]
    fn per_image_and_mean() {
        let mut logits = Array3::from_elem((2, 4, 4), -1.0);
        let mut labels = Array3::zeros((2, 4, 4));
        // perfect match on the first image
        logits.slice_mut(s![0, 0..2, 0..2]).fill(1.0);
        labels.slice_mut(s![0, 0..2, 0..2]).fill(1.0);
        // disjoint on the second image
        logits.slice_mut(s![1, 0..2, 0..2]).fill(1.0);
        labels.slice_mut(s![1, 2..4, 2..4]).fill(1.0);

        let scores = iou_score(logits.view(), labels.view(), Reduce::None).unwrap();
        assert_abs_diff_eq!(scores[0], 1.0);
        assert_abs_diff_eq!(scores[1], 0.0);

        let mean = iou_score(logits.view(), labels.view(), Reduce::Mean).unwrap();
        assert_abs_diff_eq!(mean[0], 0.5);
    }
}
