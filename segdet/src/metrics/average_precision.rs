//! VOC style average precision over accumulated boxes.

use crate::{
    boxes::{create_boxes, BoundingBoxes, BoxRecord},
    common::*,
    projection::Projection,
};

#[derive(Debug, Clone)]
pub struct PrecRec<T>
where
    T: Copy,
{
    pub precision: T,
    pub recall: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntegralMethod {
    /// The area under the precision envelope at every recall change.
    Continuous,
    /// The mean of the envelope sampled at evenly spaced recall points.
    Interpolation { points: usize },
}

impl Default for IntegralMethod {
    fn default() -> Self {
        Self::Continuous
    }
}

#[derive(Debug, Clone)]
pub struct ApCalculator {
    integral_method: IntegralMethod,
}

impl ApCalculator {
    pub fn new(integral_method: IntegralMethod) -> Result<Self> {
        if let IntegralMethod::Interpolation { points } = integral_method {
            ensure!(points >= 1, "invalid number of interpolated points {}", points);
        }

        Ok(Self { integral_method })
    }

    pub fn integral_method(&self) -> IntegralMethod {
        self.integral_method
    }

    /// Compute average precision from a precision/recall curve.
    ///
    /// The input precision/recall list must be ordered by non-decreasing recall.
    pub fn compute_by_prec_rec(&self, sorted_prec_rec: &[impl Borrow<PrecRec<R64>>]) -> R64 {
        if sorted_prec_rec.is_empty() {
            return r64(0.0);
        }

        // precision envelope with sentinels at both ends
        let enveloped: Vec<PrecRec<R64>> = {
            let first = PrecRec {
                precision: r64(0.0),
                recall: r64(0.0),
            };
            let last = PrecRec {
                precision: r64(0.0),
                recall: r64(1.0),
            };
            let iter = iter::once(&first)
                .chain(sorted_prec_rec.iter().map(Borrow::borrow))
                .chain(iter::once(&last));

            let mut list: Vec<PrecRec<R64>> = iter
                .rev()
                .scan(r64(0.0), |max_prec, prec_rec| {
                    let PrecRec { precision, recall } = *prec_rec;
                    *max_prec = (*max_prec).max(precision);
                    Some(PrecRec {
                        recall,
                        precision: *max_prec,
                    })
                })
                .collect();
            list.reverse();
            list
        };

        match self.integral_method {
            IntegralMethod::Interpolation { points } => {
                let recall_points = (0..points).map(|index| {
                    if points > 1 {
                        r64(index as f64 / (points - 1) as f64)
                    } else {
                        r64(0.0)
                    }
                });

                // the envelope is non-increasing in recall, so the first point at or
                // beyond the sample carries the maximum precision
                let sum: R64 = recall_points
                    .map(|point| {
                        enveloped[1..(enveloped.len() - 1)]
                            .iter()
                            .find(|prec_rec| prec_rec.recall >= point)
                            .map(|prec_rec| prec_rec.precision)
                            .unwrap_or_else(|| r64(0.0))
                    })
                    .sum();
                sum / r64(points as f64)
            }
            IntegralMethod::Continuous => enveloped
                .iter()
                .tuple_windows()
                .map(|(former, latter)| (latter.recall - former.recall) * latter.precision)
                .sum(),
        }
    }

    /// Compute average precision from true positive flags in decreasing confidence order.
    pub fn compute_by_flags(&self, is_tp: impl IntoIterator<Item = bool>, num_ground_truth: usize) -> R64 {
        if num_ground_truth == 0 {
            return r64(0.0);
        }

        // ordered by increasing recall automatically
        let prec_rec: Vec<_> = is_tp
            .into_iter()
            .scan((0, 0), |(acc_tp, acc_fp), is_tp| {
                if is_tp {
                    *acc_tp += 1;
                } else {
                    *acc_fp += 1;
                }
                let acc_tp = r64(*acc_tp as f64);
                let acc_fp = r64(*acc_fp as f64);
                Some(PrecRec {
                    precision: acc_tp / (acc_tp + acc_fp),
                    recall: acc_tp / num_ground_truth as f64,
                })
            })
            .collect();

        self.compute_by_prec_rec(&prec_rec)
    }
}

/// Average precision of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAp {
    pub class: ClassId,
    pub ap: f64,
    pub num_ground_truth: usize,
    pub num_detections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanAp {
    /// Classes with at least one ground truth box, in increasing order.
    pub per_class: Vec<ClassAp>,
    /// The mean over `per_class`, zero if it is empty.
    pub map: f64,
}

#[derive(Debug, Clone)]
pub struct MeanApCalculator {
    ap_calculator: ApCalculator,
    iou_threshold: R64,
}

impl MeanApCalculator {
    pub fn new_voc() -> Self {
        Self {
            ap_calculator: ApCalculator {
                integral_method: IntegralMethod::Continuous,
            },
            iou_threshold: r64(0.5),
        }
    }

    pub fn new(integral_method: IntegralMethod, iou_threshold: f64) -> Result<Self> {
        ensure!(
            iou_threshold > 0.0 && iou_threshold <= 1.0,
            "iou threshold must be in (0, 1], but get {}",
            iou_threshold
        );

        Ok(Self {
            ap_calculator: ApCalculator::new(integral_method)?,
            iou_threshold: r64(iou_threshold),
        })
    }

    /// Computes mAP over a corpus of accumulated boxes.
    pub fn from_boxes(&self, boxes: &BoundingBoxes) -> MeanAp {
        let per_class: Vec<ClassAp> = boxes
            .classes()
            .into_iter()
            .filter_map(|class| {
                let (detections, ground_truth) = boxes.by_class(class);
                if ground_truth.is_empty() {
                    return None;
                }

                let is_tp = self.assign(&detections, &ground_truth);
                let ap = self.ap_calculator.compute_by_flags(is_tp, ground_truth.len());

                Some(ClassAp {
                    class,
                    ap: ap.raw(),
                    num_ground_truth: ground_truth.len(),
                    num_detections: detections.len(),
                })
            })
            .collect();

        let map = if per_class.is_empty() {
            0.0
        } else {
            per_class.iter().map(|class_ap| class_ap.ap).sum::<f64>() / per_class.len() as f64
        };

        MeanAp { per_class, map }
    }

    /// Computes mAP from the boxes of a single batch.
    pub fn for_batch(&self, projection: &Projection, logits: ArrayView2<'_, f32>) -> Result<MeanAp> {
        let boxes: BoundingBoxes = create_boxes(projection, Some(logits), 0)?.into_iter().collect();
        Ok(self.from_boxes(&boxes))
    }

    /// Greedily marks detections as true positives in the given order.
    ///
    /// A detection claims the ground truth box of the same image with the
    /// highest IoU if that IoU reaches the threshold and the box is unclaimed.
    fn assign(&self, detections: &[&BoxRecord], ground_truth: &[&BoxRecord]) -> Vec<bool> {
        let mut gt_by_image: HashMap<usize, Vec<(&BoxRecord, bool)>> = HashMap::new();
        ground_truth.iter().for_each(|&record| {
            gt_by_image
                .entry(record.image_id)
                .or_insert_with(Vec::new)
                .push((record, false));
        });
        gt_by_image
            .values_mut()
            .for_each(|records| records.sort_by_key(|(record, _)| record.rect));

        detections
            .iter()
            .map(|detection| {
                let candidates = match gt_by_image.get_mut(&detection.image_id) {
                    Some(candidates) => candidates,
                    None => return false,
                };

                let best = candidates
                    .iter()
                    .enumerate()
                    .map(|(index, (record, _))| (index, r64(detection.rect.iou_with(&record.rect))))
                    .fold(None, |best: Option<(usize, R64)>, (index, iou)| match best {
                        Some((_, best_iou)) if best_iou >= iou => best,
                        _ => Some((index, iou)),
                    });

                match best {
                    Some((index, iou)) if iou >= self.iou_threshold && !candidates[index].1 => {
                        candidates[index].1 = true;
                        true
                    }
                    _ => false,
                }
            })
            .collect()
    }
}

impl Default for MeanApCalculator {
    fn default() -> Self {
        Self::new_voc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{boxes::BoxKind, region::Rectangle};
    use approx::assert_abs_diff_eq;

    fn prec_rec(pairs: &[(f64, f64)]) -> Vec<PrecRec<R64>> {
        pairs
            .iter()
            .map(|&(precision, recall)| PrecRec {
                precision: r64(precision),
                recall: r64(recall),
            })
            .collect()
    }

    #[test]
    fn compute_by_prec_rec() -> Result<()> {
        let ap_cal_11 = ApCalculator::new(IntegralMethod::Interpolation { points: 11 })?;
        let ap_cal = ApCalculator::new(IntegralMethod::Continuous)?;

        let single = prec_rec(&[(1.0, 1.0)]);
        assert_eq!(ap_cal.compute_by_prec_rec(&single), r64(1.0));
        assert_eq!(ap_cal_11.compute_by_prec_rec(&single), r64(1.0));

        let list: Vec<_> = prec_rec(&[
            (0.5, 0.625),
            (0.556, 0.625),
            (0.625, 0.625),
            (0.714, 0.625),
            (0.833, 0.625),
            (0.800, 0.500),
            (0.750, 0.375),
            (1.0, 0.375),
            (1.0, 0.250),
            (1.0, 0.125),
        ])
        .into_iter()
        .rev()
        .collect();

        let res = ap_cal_11.compute_by_prec_rec(&list);
        assert_abs_diff_eq!(res.raw(), 0.5908181818181819, epsilon = 1e-12);

        let res = ap_cal.compute_by_prec_rec(&list);
        assert_abs_diff_eq!(res.raw(), 0.375 + 0.25 * 0.833, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn invalid_interpolation_points() {
        assert!(ApCalculator::new(IntegralMethod::Interpolation { points: 0 }).is_err());
    }

    #[test]
    fn compute_by_flags() {
        let ap_cal = ApCalculator::new(IntegralMethod::Continuous).unwrap();
        // tp, fp, tp with 2 ground truth boxes
        let ap = ap_cal.compute_by_flags(vec![true, false, true], 2);
        assert_abs_diff_eq!(ap.raw(), 0.5 * 1.0 + 0.5 * (2.0 / 3.0), epsilon = 1e-12);
        assert_eq!(ap_cal.compute_by_flags(vec![true], 0), r64(0.0));
        assert_eq!(ap_cal.compute_by_flags(vec![], 3), r64(0.0));
    }

    fn record(image_id: usize, class: usize, confidence: f64, xywh: [i64; 4], kind: BoxKind) -> BoxRecord {
        BoxRecord {
            image_id,
            class: ClassId(class),
            confidence: r64(confidence),
            rect: Rectangle::try_from_xywh(xywh).unwrap(),
            kind,
        }
    }

    #[test]
    fn mean_ap_from_boxes() {
        use BoxKind::*;

        let boxes: BoundingBoxes = vec![
            // class 0: one hit, one duplicate on the same ground truth
            record(0, 0, 1.0, [0, 0, 10, 10], GroundTruth),
            record(0, 0, 0.9, [0, 0, 10, 10], Detection),
            record(0, 0, 0.8, [1, 1, 10, 10], Detection),
            // class 1: a hit on another image and a missed ground truth
            record(1, 1, 1.0, [20, 20, 5, 5], GroundTruth),
            record(2, 1, 1.0, [0, 0, 5, 5], GroundTruth),
            record(1, 1, 0.7, [20, 20, 5, 5], Detection),
            // class 2: detections without ground truth are not scored
            record(0, 2, 0.6, [0, 0, 3, 3], Detection),
        ]
        .into_iter()
        .collect();

        let mean_ap = MeanApCalculator::new_voc().from_boxes(&boxes);
        let classes: Vec<_> = mean_ap.per_class.iter().map(|class_ap| class_ap.class).collect();
        assert_eq!(classes, vec![ClassId(0), ClassId(1)]);

        assert_abs_diff_eq!(mean_ap.per_class[0].ap, 1.0);
        assert_eq!(mean_ap.per_class[0].num_detections, 2);
        assert_abs_diff_eq!(mean_ap.per_class[1].ap, 0.5);
        assert_eq!(mean_ap.per_class[1].num_ground_truth, 2);
        assert_abs_diff_eq!(mean_ap.map, 0.75);
    }

    #[test]
    fn mean_ap_without_ground_truth() {
        let boxes: BoundingBoxes = vec![record(0, 0, 0.5, [0, 0, 2, 2], BoxKind::Detection)]
            .into_iter()
            .collect();
        let mean_ap = MeanApCalculator::new_voc().from_boxes(&boxes);
        assert!(mean_ap.per_class.is_empty());
        assert_eq!(mean_ap.map, 0.0);
    }

    #[test]
    fn low_iou_is_false_positive() {
        let boxes: BoundingBoxes = vec![
            record(0, 0, 1.0, [0, 0, 10, 10], BoxKind::GroundTruth),
            record(0, 0, 0.9, [5, 5, 10, 10], BoxKind::Detection),
        ]
        .into_iter()
        .collect();
        let mean_ap = MeanApCalculator::new(IntegralMethod::Continuous, 0.5)
            .unwrap()
            .from_boxes(&boxes);
        assert_abs_diff_eq!(mean_ap.map, 0.0);
    }
}
