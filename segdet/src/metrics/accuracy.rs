//! Classification accuracy and ground truth coverage of a projected batch.

use crate::{common::*, projection::Projection, utils};

/// Fraction of matched regions whose argmax logit is the true class.
///
/// Unmatched regions are excluded. Returns `None` if no region is matched.
pub fn matched_accuracy(projection: &Projection, logits: ArrayView2<'_, f32>) -> Result<Option<f64>> {
    ensure!(
        logits.nrows() == projection.num_regions(),
        "expect logits for {} regions, but get {} rows",
        projection.num_regions(),
        logits.nrows()
    );

    let mut num_matched = 0usize;
    let mut num_correct = 0usize;

    for (index, class) in projection.matched() {
        ensure!(
            class.index() < logits.ncols(),
            "class id {} is out of range of {} logits",
            class,
            logits.ncols()
        );
        let predicted = utils::argmax(logits.row(index));
        num_matched += 1;
        if predicted == Some(class.index()) {
            num_correct += 1;
        }
    }

    Ok((num_matched > 0).then(|| num_correct as f64 / num_matched as f64))
}

/// Fraction of ground truth regions found by some region. `None` without ground truth.
pub fn found_rate(projection: &Projection) -> Option<f64> {
    let num_ground_truth = projection.num_ground_truth();
    (num_ground_truth > 0).then(|| projection.num_found() as f64 / num_ground_truth as f64)
}

/// Fraction of regions matched to some ground truth. `None` without regions.
pub fn matched_fraction(projection: &Projection) -> Option<f64> {
    let num_regions = projection.num_regions();
    (num_regions > 0).then(|| projection.num_matched() as f64 / num_regions as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{matching::GroundTruthRegion, projection::Region, region::Rectangle};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn projection(true_classes: Vec<TrueClass>) -> Projection {
        let rect = Rectangle::try_from_xywh([0, 0, 2, 2]).unwrap();
        let found_map: Vec<_> = true_classes
            .iter()
            .map(|class| class.is_matched().then(|| 0))
            .collect();
        let regions: Vec<_> = true_classes
            .into_iter()
            .map(|true_class| Region {
                rect,
                image_index: 0,
                true_class,
            })
            .collect();
        let num_regions = regions.len();

        Projection {
            patches: Array3::zeros((num_regions, 2, 2)),
            regions,
            found_map,
            ground_truth: vec![vec![
                GroundTruthRegion {
                    rect,
                    class: ClassId(1),
                    area: 4,
                },
                GroundTruthRegion {
                    rect,
                    class: ClassId(0),
                    area: 4,
                },
            ]],
            found: vec![vec![true, false]],
            batch_size: 1,
        }
    }

    #[test]
    fn accuracy_excludes_unmatched_regions() {
        let projection = projection(vec![
            TrueClass::Class(ClassId(1)),
            TrueClass::Unmatched,
            TrueClass::Class(ClassId(0)),
        ]);
        let logits = array![[0.1f32, 0.9], [5.0, 0.0], [0.2, 0.8]];

        let accuracy = matched_accuracy(&projection, logits.view()).unwrap().unwrap();
        assert_abs_diff_eq!(accuracy, 0.5);
        assert_abs_diff_eq!(found_rate(&projection).unwrap(), 0.5);
        assert_abs_diff_eq!(matched_fraction(&projection).unwrap(), 2.0 / 3.0);
    }

    #[test]
    fn accuracy_without_matched_regions() {
        let projection = projection(vec![TrueClass::Unmatched]);
        let logits = array![[0.1f32, 0.9]];
        assert_eq!(matched_accuracy(&projection, logits.view()).unwrap(), None);
    }

    #[test]
    fn class_outside_logits_fails() {
        let projection = projection(vec![TrueClass::Class(ClassId(4))]);
        let logits = array![[0.1f32, 0.9]];
        assert!(matched_accuracy(&projection, logits.view()).is_err());
    }
}
