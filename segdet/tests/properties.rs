//! Property-based tests of region extraction and mean average precision.

use ndarray::Array2;
use noisy_float::prelude::*;
use proptest::prelude::*;
use segdet::{
    metrics::{IntegralMethod, MeanApCalculator},
    BoundingBoxes, BoxKind, BoxRecord, ClassId, Rectangle, RegionExtractor, RegionFilter,
};

fn mask_strategy() -> impl Strategy<Value = Array2<bool>> {
    (1usize..12, 1usize..12).prop_flat_map(|(height, width)| {
        prop::collection::vec(any::<bool>(), height * width)
            .prop_map(move |values| Array2::from_shape_vec((height, width), values).unwrap())
    })
}

fn box_strategy() -> impl Strategy<Value = BoxRecord> {
    (
        0usize..3,
        0usize..3,
        0.0f64..1.0,
        0i64..20,
        0i64..20,
        1i64..10,
        1i64..10,
        any::<bool>(),
    )
        .prop_map(|(image_id, class, confidence, x, y, w, h, is_gt)| BoxRecord {
            image_id,
            class: ClassId(class),
            confidence: if is_gt { r64(1.0) } else { r64(confidence) },
            rect: Rectangle::try_from_xywh([x, y, w, h]).unwrap(),
            kind: if is_gt {
                BoxKind::GroundTruth
            } else {
                BoxKind::Detection
            },
        })
}

proptest! {
    #[test]
    fn prop_extraction_is_deterministic(mask in mask_strategy(), filter_masks in any::<bool>()) {
        let extractor = RegionExtractor::new(RegionFilter { min_area: 3, min_side: 2 });
        let first = extractor.extract(mask.view(), filter_masks).unwrap();
        let second = extractor.extract(mask.view(), filter_masks).unwrap();
        prop_assert_eq!(&first, &second);

        let (height, width) = mask.dim();
        let num_foreground = mask.iter().filter(|&&value| value).count();
        let total_area: usize = first.iter().map(|region| region.area).sum();
        prop_assert!(total_area <= num_foreground);

        for region in &first {
            let [x, y, w, h] = region.rect.xywh();
            prop_assert!(x >= 0 && y >= 0 && w > 0 && h > 0);
            prop_assert!((x + w) as usize <= width && (y + h) as usize <= height);
        }
    }

    #[test]
    fn prop_unfiltered_extraction_covers_foreground(mask in mask_strategy()) {
        let regions = RegionExtractor::default().extract(mask.view(), false).unwrap();
        let num_foreground = mask.iter().filter(|&&value| value).count();
        let total_area: usize = regions.iter().map(|region| region.area).sum();
        prop_assert_eq!(total_area, num_foreground);
    }

    #[test]
    fn prop_mean_ap_is_order_independent(
        (records, shuffled) in prop::collection::vec(box_strategy(), 0..40)
            .prop_flat_map(|records| (Just(records.clone()), Just(records).prop_shuffle()))
    ) {
        let calculator = MeanApCalculator::new(IntegralMethod::Continuous, 0.5).unwrap();
        let lhs: BoundingBoxes = records.into_iter().collect();
        let rhs: BoundingBoxes = shuffled.into_iter().collect();

        let lhs = calculator.from_boxes(&lhs);
        let rhs = calculator.from_boxes(&rhs);
        prop_assert_eq!(&lhs, &rhs);
        prop_assert!((0.0..=1.0).contains(&lhs.map));
    }
}
