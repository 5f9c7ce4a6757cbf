//! Region extraction from binary masks.

use crate::common::*;
use image::{ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Pixel rectangle `(x, y, w, h)` of a region.
pub type Rectangle = XYWH<i64>;

/// Thresholds applied when masks are filtered during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionFilter {
    /// The minimum number of foreground pixels of a component.
    pub min_area: usize,
    /// The minimum height and width of a component's bounding box.
    pub min_side: usize,
}

impl Default for RegionFilter {
    fn default() -> Self {
        Self {
            min_area: 16,
            min_side: 3,
        }
    }
}

impl RegionFilter {
    pub fn accepts(&self, region: &ExtractedRegion) -> bool {
        let [h, w] = region.rect.hw();
        region.area >= self.min_area && h as usize >= self.min_side && w as usize >= self.min_side
    }
}

/// A connected foreground component found by [RegionExtractor].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRegion {
    pub rect: Rectangle,
    /// The number of foreground pixels.
    pub area: usize,
}

/// Converts binary masks to bounding rectangles of their connected components.
#[derive(Debug, Clone, Default)]
pub struct RegionExtractor {
    filter: RegionFilter,
}

impl RegionExtractor {
    pub fn new(filter: RegionFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &RegionFilter {
        &self.filter
    }

    /// Extracts 8-connected foreground components of the mask.
    ///
    /// Components are ordered by their first pixel in row-major order. If
    /// `filter_masks` is set, components rejected by the [RegionFilter] are
    /// dropped.
    pub fn extract(&self, mask: ArrayView2<'_, bool>, filter_masks: bool) -> Result<Vec<ExtractedRegion>> {
        let codes = mask.mapv(u32::from);
        let LabeledComponents { components, .. } = label_components(codes.view())?;

        let regions = components.into_iter().map(|component| ExtractedRegion {
            rect: component.rect,
            area: component.area,
        });
        let regions: Vec<_> = if filter_masks {
            regions.filter(|region| self.filter.accepts(region)).collect()
        } else {
            regions.collect()
        };

        Ok(regions)
    }
}

/// Statistics of one connected component.
#[derive(Debug, Clone)]
pub(crate) struct Component {
    /// The shared non-zero code of the component's pixels.
    pub code: u32,
    pub rect: Rectangle,
    pub area: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct LabeledComponents {
    /// The component index of each pixel, `None` for background.
    pub indices: Array2<Option<usize>>,
    /// Components in row-major discovery order.
    pub components: Vec<Component>,
}

/// Labels 8-connected components of equal non-zero codes. Zero is background.
pub(crate) fn label_components(codes: ArrayView2<'_, u32>) -> Result<LabeledComponents> {
    let (height, width) = codes.dim();
    let mut indices = Array2::from_elem((height, width), None);

    if codes.iter().all(|&code| code == 0) {
        return Ok(LabeledComponents {
            indices,
            components: vec![],
        });
    }

    // imageproc's union-find fails on a single foreground pixel
    if height * width == 1 {
        indices[[0, 0]] = Some(0);
        return Ok(LabeledComponents {
            indices,
            components: vec![Component {
                code: codes[[0, 0]],
                rect: Rectangle::try_from_xywh([0, 0, 1, 1])?,
                area: 1,
            }],
        });
    }

    let image: ImageBuffer<Luma<u32>, Vec<u32>> =
        ImageBuffer::from_raw(width as u32, height as u32, codes.iter().copied().collect())
            .ok_or_else(|| format_err!("unable to build a {}x{} label image", height, width))?;
    let labels = connected_components(&image, Connectivity::Eight, Luma([0u32]));

    // renumber components in raster order, independent of the labeller's numbering
    let mut label_to_index: HashMap<u32, usize> = HashMap::new();
    let mut bounds: Vec<(u32, [usize; 4], usize)> = vec![];

    for ((row, col), index) in indices.indexed_iter_mut() {
        let label = labels.get_pixel(col as u32, row as u32)[0];
        if label == 0 {
            continue;
        }

        let component_index = *label_to_index.entry(label).or_insert_with(|| {
            bounds.push((codes[[row, col]], [row, col, row, col], 0));
            bounds.len() - 1
        });
        let (_code, [t, l, b, r], area) = &mut bounds[component_index];
        *t = (*t).min(row);
        *l = (*l).min(col);
        *b = (*b).max(row);
        *r = (*r).max(col);
        *area += 1;
        *index = Some(component_index);
    }

    let components: Vec<_> = bounds
        .into_iter()
        .map(|(code, [t, l, b, r], area)| -> Result<_> {
            let rect = Rectangle::try_from_tlbr([t as i64, l as i64, b as i64 + 1, r as i64 + 1])?;
            Ok(Component { code, rect, area })
        })
        .try_collect()?;

    Ok(LabeledComponents {
        indices,
        components,
    })
}
