//! Integration tests for slide indexing.
//!
//! These tests verify:
//! - Annotations are rendered at the labels level and pooled into patches
//! - Non-tissue cells are removed
//! - Every slide is closed, including on errors
//! - Finder configuration errors surface through the driver

use ndarray::array;

use wsi_patcher::error::{FinderError, IndexError, SlideError};
use wsi_patcher::{
    index_slide, make_index, AllTissue, FinderConfig, GridPatchFinder, PatchFinder, Size,
};

use super::test_utils::{pyramid, BrokenTissue, Fixture, LeftHalfTissue, MockOpener, DATASET};

/// Labels at level 2 (16×16), 16px patches at level 0: 4×4 windows.
fn finder() -> GridPatchFinder {
    GridPatchFinder::new(FinderConfig::new(2, 0, 16, 16)).unwrap()
}

fn coords(ps: &wsi_patcher::PatchSet, label: u32) -> Vec<(i64, i64)> {
    ps.rows()
        .iter()
        .filter(|r| r.label == label)
        .map(|r| (r.x, r.y))
        .collect()
}

// =============================================================================
// Patch Finding
// =============================================================================

#[test]
fn test_quadrant_raster_scenario() {
    let labels = array![[0, 0, 1, 1], [0, 0, 1, 1], [2, 2, 0, 0], [2, 2, 0, 0]];
    let config = FinderConfig::new(0, 0, 2, 2).with_remove_background(false);
    let found = GridPatchFinder::new(config)
        .unwrap()
        .find(&labels, Size::new(4, 4))
        .unwrap();

    let rows: Vec<_> = found.rows.iter().map(|r| (r.x, r.y, r.label)).collect();
    assert_eq!(rows, vec![(0, 0, 0), (2, 0, 1), (0, 2, 2), (2, 2, 0)]);
    assert_eq!(found.patch_size, 2);
}

#[tokio::test]
async fn test_make_index_renders_annotations() {
    let fx = Fixture::new();

    let index = make_index(fx.dataset.as_ref(), &finder(), &AllTissue)
        .await
        .unwrap();

    assert_eq!(index.len(), 2);
    let slide_a = index.get(0).unwrap();
    let slide_b = index.get(1).unwrap();

    assert_eq!(
        coords(slide_a, 2),
        vec![(0, 0), (16, 0), (0, 16), (16, 16)]
    );
    assert_eq!(coords(slide_a, 1).len(), 12);
    assert_eq!(coords(slide_b, 1).len(), 16);
    assert!(coords(slide_b, 2).is_empty());

    let defaults = slide_b.defaults();
    assert_eq!(defaults.dataset_name.as_deref(), Some(DATASET));
    assert_eq!(defaults.slide_index, Some(1));
    assert_eq!(defaults.patch_size, Some(16));
    assert_eq!(defaults.level, Some(0));

    assert_eq!(fx.log.open_count(), 2);
    fx.log.assert_one_open_at_a_time();
}

#[tokio::test]
async fn test_non_tissue_is_removed() {
    let fx = Fixture::new();

    let index = make_index(fx.dataset.as_ref(), &finder(), &LeftHalfTissue)
        .await
        .unwrap();

    for patch_set in index.iter() {
        assert_eq!(patch_set.len(), 8);
        assert!(patch_set.rows().iter().all(|r| r.x < 32));
    }
    assert_eq!(coords(index.get(0).unwrap(), 2).len(), 4);
}

#[tokio::test]
async fn test_border_keeps_patches_inside_slide() {
    let fx = Fixture::new();
    let config = FinderConfig::new(2, 0, 16, 16).with_border(8).with_jitter(2);
    let finder = GridPatchFinder::new(config).unwrap();

    let patch_set = index_slide(fx.dataset.as_ref(), 0, &finder, &AllTissue)
        .await
        .unwrap();

    assert_eq!(patch_set.defaults().patch_size, Some(26));
    for row in patch_set.rows() {
        assert!((0..=64 - 26).contains(&row.x), "x = {}", row.x);
        assert!((0..=64 - 26).contains(&row.y), "y = {}", row.y);
    }
}

// =============================================================================
// Error Paths
// =============================================================================

#[tokio::test]
async fn test_missing_labels_level_closes_slide() {
    let fx = Fixture::new();
    let finder = GridPatchFinder::new(FinderConfig::new(4, 0, 16, 16)).unwrap();
    assert_eq!(finder.labels_level(), 4);

    let result = index_slide(fx.dataset.as_ref(), 0, &finder, &AllTissue).await;
    assert!(matches!(
        result,
        Err(IndexError::Slide(SlideError::LevelOutOfRange { level: 4, levels: 3 }))
    ));
    fx.log.assert_one_open_at_a_time();
    assert_eq!(fx.log.open_count(), 1);
}

#[tokio::test]
async fn test_mask_mismatch_closes_slide() {
    let fx = Fixture::new();

    let result = index_slide(fx.dataset.as_ref(), 1, &finder(), &BrokenTissue).await;
    assert!(matches!(
        result,
        Err(IndexError::MaskMismatch {
            expected: (16, 16),
            actual: (1, 1)
        })
    ));
    fx.log.assert_one_open_at_a_time();
}

#[tokio::test]
async fn test_patch_larger_than_slide() {
    let fx = Fixture::with_opener(MockOpener::new(vec![
        Size::new(12, 12),
        Size::new(6, 6),
        Size::new(3, 3),
    ]));

    let result = index_slide(fx.dataset.as_ref(), 0, &finder(), &AllTissue).await;
    assert!(matches!(
        result,
        Err(IndexError::Finder(FinderError::PatchLargerThanSlide { patch_size: 16, .. }))
    ));
    fx.log.assert_one_open_at_a_time();
}

#[tokio::test]
async fn test_open_failure_stops_indexing() {
    let fx = Fixture::with_opener(MockOpener::new(pyramid(64, 64, 3)).failing_on("slide_b"));

    let result = make_index(fx.dataset.as_ref(), &finder(), &AllTissue).await;
    assert!(matches!(result, Err(IndexError::Dataset(_))));
    assert_eq!(fx.log.open_count(), 1);
    fx.log.assert_one_open_at_a_time();
}
