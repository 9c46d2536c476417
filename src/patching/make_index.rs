//! Indexing driver: slides in, per-slide patch sets out.
//!
//! For every slide the driver renders its annotations at the finder's
//! labels level, zeroes the cells the tissue detector rejects, and runs the
//! finder at the patch level:
//!
//! ```text
//! open ─► render labels ─► detect tissue ─► mask ─► find ─► close
//!              (labels level)                 (patch level)
//! ```

use ndarray::Zip;
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::error::{DatasetError, FinderError, IndexError};
use crate::slide::Slide;
use crate::tissue::TissueDetector;

use super::finder::PatchFinder;
use super::patch_set::PatchSet;
use super::slides_index::SlidesIndex;

/// Index one slide of `dataset`.
///
/// The slide is closed before returning, whether indexing succeeded or not.
pub async fn index_slide(
    dataset: &dyn Dataset,
    slide_index: usize,
    finder: &dyn PatchFinder,
    detector: &dyn TissueDetector,
) -> Result<PatchSet, IndexError> {
    let slide = dataset.open_slide(slide_index).await?;
    let result = index_open_slide(dataset, slide_index, slide.as_ref(), finder, detector).await;

    match (result, slide.close()) {
        (Ok(patch_set), Ok(())) => Ok(patch_set),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!("Failed to close slide {}: {}", slide_index, close_err);
            Err(e)
        }
    }
}

async fn index_open_slide(
    dataset: &dyn Dataset,
    slide_index: usize,
    slide: &dyn Slide,
    finder: &dyn PatchFinder,
    detector: &dyn TissueDetector,
) -> Result<PatchSet, IndexError> {
    let labels_level = finder.labels_level();
    let labels_size = slide.level_dimensions(labels_level)?;
    let patch_size = slide.level_dimensions(finder.patch_level())?;

    let annotations = dataset.load_annotations_for_slide(slide_index)?;
    let factor = 2f64.powi(labels_level as i32);
    let mut labels = annotations
        .render(labels_size.as_shape(), factor)
        .map_err(DatasetError::from)?;

    if labels.dim() != labels_size.as_shape() {
        return Err(FinderError::ShapeMismatch {
            level: labels_level,
            expected: labels_size.as_shape(),
            actual: labels.dim(),
        }
        .into());
    }

    let thumbnail = slide.get_thumbnail(labels_level).await?;
    let tissue = detector.detect(&thumbnail);
    if tissue.dim() != labels.dim() {
        return Err(IndexError::MaskMismatch {
            expected: labels.dim(),
            actual: tissue.dim(),
        });
    }
    Zip::from(&mut labels).and(&tissue).for_each(|label, &is_tissue| {
        if !is_tissue {
            *label = 0;
        }
    });

    let found = finder.find(&labels, patch_size)?;
    debug!(
        "Slide {} of {}: {} patch(es) at level {}",
        slide_index,
        dataset.name(),
        found.rows.len(),
        found.level
    );

    Ok(PatchSet::for_slide(
        found.rows,
        dataset.name(),
        slide_index,
        found.patch_size,
        found.level,
    ))
}

/// Index every slide of `dataset`, in dataset order.
pub async fn make_index(
    dataset: &dyn Dataset,
    finder: &dyn PatchFinder,
    detector: &dyn TissueDetector,
) -> Result<SlidesIndex, IndexError> {
    let total = dataset.len();
    let mut patch_sets = Vec::with_capacity(total);

    for slide_index in 0..total {
        let patch_set = index_slide(dataset, slide_index, finder, detector).await?;
        info!(
            "Indexed slide {}/{} of {}: {} patch(es)",
            slide_index + 1,
            total,
            dataset.name(),
            patch_set.len()
        );
        patch_sets.push(patch_set);
    }

    Ok(SlidesIndex::new(patch_sets))
}
