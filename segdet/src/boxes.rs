//! The store of detected and ground truth boxes accumulated over batches.

use crate::{common::*, projection::Projection, region::Rectangle, utils};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxKind {
    GroundTruth,
    Detection,
}

/// A box tagged with its image and class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub image_id: usize,
    pub class: ClassId,
    /// The class probability of a detection. Ground truth boxes have confidence 1.
    pub confidence: R64,
    pub rect: Rectangle,
    pub kind: BoxKind,
}

impl BoxRecord {
    pub fn is_ground_truth(&self) -> bool {
        self.kind == BoxKind::GroundTruth
    }

    pub fn is_detection(&self) -> bool {
        self.kind == BoxKind::Detection
    }
}

/// An append-only collection of boxes.
#[derive(Debug, Clone, Default)]
pub struct BoundingBoxes {
    boxes: Vec<BoxRecord>,
}

impl BoundingBoxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: BoxRecord) {
        self.boxes.push(record);
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoxRecord> {
        self.boxes.iter()
    }

    /// Classes of all boxes, in increasing order.
    pub fn classes(&self) -> Vec<ClassId> {
        self.boxes
            .iter()
            .map(|record| record.class)
            .unique()
            .sorted()
            .collect()
    }

    /// Returns the detections and the ground truth boxes of a class.
    ///
    /// Detections are sorted by decreasing confidence. Equal confidences are
    /// ordered by image id and then by rectangle, so the order does not
    /// depend on insertion order.
    pub fn by_class(&self, class: ClassId) -> (Vec<&BoxRecord>, Vec<&BoxRecord>) {
        let (detections, ground_truth): (Vec<_>, Vec<_>) = self
            .boxes
            .iter()
            .filter(|record| record.class == class)
            .partition(|record| record.is_detection());

        let detections: Vec<_> = detections
            .into_iter()
            .sorted_by(|lhs, rhs| {
                rhs.confidence
                    .cmp(&lhs.confidence)
                    .then_with(|| lhs.image_id.cmp(&rhs.image_id))
                    .then_with(|| lhs.rect.cmp(&rhs.rect))
            })
            .collect();

        (detections, ground_truth)
    }
}

impl Extend<BoxRecord> for BoundingBoxes {
    fn extend<T: IntoIterator<Item = BoxRecord>>(&mut self, iter: T) {
        self.boxes.extend(iter);
    }
}

impl FromIterator<BoxRecord> for BoundingBoxes {
    fn from_iter<T: IntoIterator<Item = BoxRecord>>(iter: T) -> Self {
        Self {
            boxes: iter.into_iter().collect(),
        }
    }
}

/// Builds the boxes of one projected batch.
///
/// Each region with logits becomes a detection of the argmax class with the
/// softmax probability as confidence. Each ground truth region becomes a
/// ground truth box. Image ids are offset by `relative_index`.
pub fn create_boxes(
    projection: &Projection,
    logits: Option<ArrayView2<'_, f32>>,
    relative_index: usize,
) -> Result<Vec<BoxRecord>> {
    let mut records = vec![];

    if let Some(logits) = logits {
        ensure!(
            logits.nrows() == projection.num_regions(),
            "expect logits for {} regions, but get {} rows",
            projection.num_regions(),
            logits.nrows()
        );

        for (region, row) in izip!(&projection.regions, logits.outer_iter()) {
            let (class, prob) =
                utils::softmax_max(row).ok_or_else(|| format_err!("logits must not be empty"))?;
            let confidence = R64::try_new(prob)
                .ok_or_else(|| format_err!("non-finite confidence from logits {}", row))?;
            records.push(BoxRecord {
                image_id: relative_index + region.image_index,
                class: ClassId(class),
                confidence,
                rect: region.rect,
                kind: BoxKind::Detection,
            });
        }
    }

    for (image_index, regions) in projection.ground_truth.iter().enumerate() {
        records.extend(regions.iter().map(|region| BoxRecord {
            image_id: relative_index + image_index,
            class: region.class,
            confidence: r64(1.0),
            rect: region.rect,
            kind: BoxKind::GroundTruth,
        }));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{matching::GroundTruthRegion, projection::Region};
    use ndarray::array;

    fn record(image_id: usize, class: usize, confidence: f64, x: i64, kind: BoxKind) -> BoxRecord {
        BoxRecord {
            image_id,
            class: ClassId(class),
            confidence: r64(confidence),
            rect: Rectangle::try_from_xywh([x, 0, 4, 4]).unwrap(),
            kind,
        }
    }

    #[test]
    fn store_operations() {
        let mut boxes = BoundingBoxes::new();
        assert!(boxes.is_empty());
        boxes.add(record(0, 2, 1.0, 0, BoxKind::GroundTruth));
        boxes.extend(vec![
            record(0, 2, 0.3, 1, BoxKind::Detection),
            record(1, 0, 0.9, 1, BoxKind::Detection),
        ]);
        assert_eq!(boxes.len(), 3);
        assert_eq!(boxes.classes(), vec![ClassId(0), ClassId(2)]);
        boxes.clear();
        assert!(boxes.is_empty());
    }

    #[test]
    fn detections_sorted_with_stable_ties() {
        let boxes: BoundingBoxes = vec![
            record(3, 1, 0.5, 0, BoxKind::Detection),
            record(0, 1, 0.5, 7, BoxKind::Detection),
            record(0, 1, 0.8, 0, BoxKind::Detection),
            record(0, 1, 0.5, 2, BoxKind::Detection),
            record(0, 1, 1.0, 2, BoxKind::GroundTruth),
            record(0, 0, 0.99, 2, BoxKind::Detection),
        ]
        .into_iter()
        .collect();

        let (detections, ground_truth) = boxes.by_class(ClassId(1));
        let order: Vec<_> = detections
            .iter()
            .map(|record| (record.image_id, record.rect.x()))
            .collect();
        assert_eq!(order, vec![(0, 0), (0, 2), (0, 7), (3, 0)]);
        assert_eq!(ground_truth.len(), 1);
    }

    fn single_region_projection() -> Projection {
        let rect = Rectangle::try_from_xywh([1, 1, 2, 2]).unwrap();
        Projection {
            patches: Array3::zeros((1, 2, 2)),
            regions: vec![Region {
                rect,
                image_index: 0,
                true_class: TrueClass::Class(ClassId(0)),
            }],
            found_map: vec![Some(0)],
            ground_truth: vec![vec![GroundTruthRegion {
                rect,
                class: ClassId(0),
                area: 4,
            }]],
            found: vec![vec![true]],
            batch_size: 1,
        }
    }

    #[test]
    fn create_boxes_from_logits() {
        let projection = single_region_projection();
        let records = create_boxes(&projection, Some(array![[2.0f32, 0.0]].view()), 5).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_detection());
        assert_eq!(records[0].image_id, 5);
        assert_eq!(records[0].class, ClassId(0));
        assert!(records[0].confidence.raw() > 0.5);
        assert_eq!(records[1].kind, BoxKind::GroundTruth);
    }

    #[test]
    fn non_finite_logits_fail() {
        let projection = single_region_projection();
        for logits in [array![[f32::INFINITY, 0.0]], array![[f32::NAN, 0.0]]] {
            assert!(create_boxes(&projection, Some(logits.view()), 0).is_err());
        }
    }
}
