//! Evaluation of precomputed segmentation masks.

use crate::{
    common::*,
    data::{BatchSource, MaskDirectory},
};

/// Aggregated extraction and matching statistics over a mask directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskEvaluation {
    pub num_samples: usize,
    /// The mean bucketed IoU score of predicted against ground truth masks.
    pub iou: f64,
    pub num_regions: usize,
    pub num_ground_truth: usize,
    /// Found ground truth regions over all ground truth regions.
    pub found_rate: Option<f64>,
    /// Matched predicted regions over all predicted regions.
    pub matched_fraction: Option<f64>,
}

/// Projects every predicted mask against its class mask, one sample at a time.
pub fn evaluate_masks(
    dataset: &MaskDirectory,
    projector: &BatchProjector,
    filter_masks: bool,
) -> Result<MaskEvaluation> {
    let num_samples = dataset.num_samples();
    ensure!(num_samples > 0, "no samples to evaluate");

    let mut iou_sum = 0.0;
    let mut num_regions = 0;
    let mut num_matched = 0;
    let mut num_ground_truth = 0;
    let mut num_found = 0;

    for index in 0..num_samples {
        let sample = dataset.sample(index)?;
        let predicted = dataset.predicted_mask(index)?;
        ensure!(
            predicted.dim() == sample.image.dim(),
            "predicted mask of '{}' has shape {:?}, but the image is {:?}",
            dataset.file_names()[index],
            predicted.dim(),
            sample.image.dim()
        );

        let label = sample.mask.mapv(|value| value > 0.5);
        iou_sum += metrics::bucket_iou(metrics::smoothed_iou(predicted.view(), label.view())?);

        let images = sample.image.insert_axis(Axis(0));
        let predicted = predicted.insert_axis(Axis(0));
        let projection = projector.project(
            images.view(),
            predicted.view(),
            &[sample.class_mask],
            filter_masks,
        )?;

        debug!(
            "{}: {} regions, {} matched, {}/{} found",
            dataset.file_names()[index],
            projection.num_regions(),
            projection.num_matched(),
            projection.num_found(),
            projection.num_ground_truth()
        );

        num_regions += projection.num_regions();
        num_matched += projection.num_matched();
        num_ground_truth += projection.num_ground_truth();
        num_found += projection.num_found();
    }

    let ratio = |numerator: usize, denominator: usize| {
        (denominator > 0).then(|| numerator as f64 / denominator as f64)
    };

    Ok(MaskEvaluation {
        num_samples,
        iou: iou_sum / num_samples as f64,
        num_regions,
        num_ground_truth,
        found_rate: ratio(num_found, num_ground_truth),
        matched_fraction: ratio(num_matched, num_regions),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::{GrayImage, Luma};

    #[test]
    fn evaluate_mask_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        for kind in [MaskDirectory::IMAGE_DIR, MaskDirectory::CLASS_MASK_DIR, MaskDirectory::PREDICTED_DIR] {
            fs::create_dir_all(dir.join(kind)).unwrap();
        }

        // one object of class 0 that is found and one of class 1 that is missed
        let image = GrayImage::from_pixel(16, 16, Luma([100]));
        let mut class_mask = GrayImage::new(16, 16);
        let mut predicted = GrayImage::new(16, 16);
        for y in 2..6 {
            for x in 2..6 {
                class_mask.put_pixel(x, y, Luma([1]));
                predicted.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 10..14 {
            for x in 10..14 {
                class_mask.put_pixel(x, y, Luma([2]));
            }
        }
        // a false positive
        predicted.put_pixel(0, 15, Luma([255]));

        image.save(dir.join("images/a.png")).unwrap();
        class_mask.save(dir.join("class_masks/a.png")).unwrap();
        predicted.save(dir.join("predicted/a.png")).unwrap();

        let dataset = MaskDirectory::open(dir).unwrap();
        let projector = ProjectorInit::new(HW::try_from_hw([4, 4]).unwrap())
            .build()
            .unwrap();

        let evaluation = evaluate_masks(&dataset, &projector, false).unwrap();
        assert_eq!(evaluation.num_samples, 1);
        assert_eq!(evaluation.num_regions, 2);
        assert_eq!(evaluation.num_ground_truth, 2);
        assert_abs_diff_eq!(evaluation.found_rate.unwrap(), 0.5);
        assert_abs_diff_eq!(evaluation.matched_fraction.unwrap(), 0.5);
        // iou = 16 / 33 falls below the bucketing threshold
        assert_abs_diff_eq!(evaluation.iou, 0.0);

        // the single-pixel region is filtered out
        let evaluation = evaluate_masks(&dataset, &projector, true).unwrap();
        assert_eq!(evaluation.num_regions, 1);
        assert_abs_diff_eq!(evaluation.matched_fraction.unwrap(), 1.0);
    }
}
