//! Integration tests for patch export.
//!
//! These tests verify:
//! - Rows are grouped by slide so each slide is opened once
//! - The open slide is closed before the next open and on errors
//! - File layout and naming under label directories
//! - PNG and JPEG output

use std::collections::BTreeSet;
use std::path::Path;

use wsi_patcher::error::{DatasetError, PatchSetError};
use wsi_patcher::{ExportEncoder, PatchDefaults, PatchRow, PatchSet};

use super::test_utils::{pyramid, Fixture, MockOpener, DATASET};

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn files_in(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

/// Two patches on slide 0 and one on slide 1, slide 1 listed in between.
fn interleaved() -> PatchSet {
    PatchSet::new(
        vec![
            PatchRow::new(0, 0, 2).with_slide_index(0),
            PatchRow::new(32, 16, 1).with_slide_index(1),
            PatchRow::new(16, 0, 1).with_slide_index(0),
        ],
        PatchDefaults {
            patch_size: Some(16),
            level: Some(0),
            slide_index: None,
            dataset_name: Some(DATASET.to_string()),
        },
    )
}

#[tokio::test]
async fn test_export_opens_each_slide_once() {
    let fx = Fixture::new();
    let out = fx.path("patches");

    let report = interleaved()
        .export(&out, &fx.registry, &ExportEncoder::Png)
        .await
        .unwrap();

    assert_eq!(report.patches_written, 3);
    assert_eq!(report.slides_opened, 2);
    assert_eq!(fx.log.open_count(), 2);
    fx.log.assert_one_open_at_a_time();

    let opened: Vec<_> = fx
        .log
        .opened()
        .iter()
        .map(|p| p.file_stem().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(opened, vec!["slide_a", "slide_b"]);

    assert_eq!(files_in(&out), set(&["normal", "tumor"]));
    assert_eq!(
        files_in(&out.join("normal")),
        set(&["slide_a_16_0_0.png", "slide_b_32_16_0.png"])
    );
    assert_eq!(
        files_in(&out.join("tumor")),
        set(&["slide_a_0_0_0.png"])
    );
    assert_eq!(
        report.labels,
        set(&["normal", "tumor"])
    );
}

#[tokio::test]
async fn test_export_order_does_not_depend_on_row_order() {
    let a = |x| PatchRow::new(x, 0, 1).with_slide_index(0);
    let b = |x| PatchRow::new(x, 16, 1).with_slide_index(1);
    let orderings = [
        vec![b(32), a(0), a(16)],
        vec![a(0), a(16), b(32)],
        vec![a(0), b(32), a(16)],
    ];

    for rows in orderings {
        let fx = Fixture::new();
        let patch_set = PatchSet::new(
            rows,
            PatchDefaults {
                patch_size: Some(16),
                level: Some(0),
                slide_index: None,
                dataset_name: Some(DATASET.to_string()),
            },
        );

        let report = patch_set
            .export(&fx.path("out"), &fx.registry, &ExportEncoder::Png)
            .await
            .unwrap();

        assert_eq!(report.patches_written, 3);
        assert_eq!(fx.log.open_count(), 2);
        fx.log.assert_one_open_at_a_time();
        let opened: Vec<_> = fx
            .log
            .opened()
            .iter()
            .map(|p| p.file_stem().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(opened, vec!["slide_a", "slide_b"]);
    }
}

#[tokio::test]
async fn test_exported_pixels_come_from_region() {
    let fx = Fixture::new();
    let out = fx.path("patches");

    interleaved()
        .export(&out, &fx.registry, &ExportEncoder::Png)
        .await
        .unwrap();

    let patch = image::open(out.join("normal/slide_b_32_16_0.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(patch.dimensions(), (16, 16));
    // Mock slides paint every pixel with the region's x, y and level.
    assert_eq!(patch.get_pixel(5, 5).0, [32, 16, 0]);
}

#[tokio::test]
async fn test_export_jpeg() {
    let fx = Fixture::new();
    let out = fx.path("jpeg");

    let encoder = ExportEncoder::jpeg(90).unwrap();
    interleaved()
        .export(&out, &fx.registry, &encoder)
        .await
        .unwrap();

    let file = out.join("tumor/slide_a_0_0_0.jpg");
    let bytes = std::fs::read(&file).unwrap();
    assert_eq!((bytes[0], bytes[1]), (0xFF, 0xD8));
}

#[tokio::test]
async fn test_export_with_per_row_levels() {
    let fx = Fixture::new();
    let out = fx.path("levels");
    let patch_set = PatchSet::for_slide(
        vec![
            PatchRow::new(0, 0, 1),
            PatchRow::new(8, 8, 1).with_level(1).with_patch_size(8),
        ],
        DATASET,
        1,
        16,
        0,
    );

    patch_set
        .export(&out, &fx.registry, &ExportEncoder::Png)
        .await
        .unwrap();

    let small = image::open(out.join("normal/slide_b_8_8_1.png")).unwrap();
    assert_eq!((small.width(), small.height()), (8, 8));
    assert_eq!(fx.log.open_count(), 1);
}

// =============================================================================
// Error Paths
// =============================================================================

#[tokio::test]
async fn test_unknown_label_closes_slide() {
    let fx = Fixture::new();
    let patch_set = PatchSet::for_slide(
        vec![PatchRow::new(0, 0, 1), PatchRow::new(16, 0, 7)],
        DATASET,
        0,
        16,
        0,
    );

    let result = patch_set
        .export(&fx.path("out"), &fx.registry, &ExportEncoder::Png)
        .await;
    assert!(matches!(
        result,
        Err(PatchSetError::UnknownLabel { label: 7, .. })
    ));
    fx.log.assert_one_open_at_a_time();
}

#[tokio::test]
async fn test_open_failure_after_first_slide() {
    let fx = Fixture::with_opener(MockOpener::new(pyramid(64, 64, 3)).failing_on("slide_b"));

    let result = interleaved()
        .export(&fx.path("out"), &fx.registry, &ExportEncoder::Png)
        .await;
    assert!(matches!(result, Err(PatchSetError::Dataset(_))));
    assert_eq!(fx.log.open_count(), 1);
    fx.log.assert_one_open_at_a_time();
}

#[tokio::test]
async fn test_missing_field_fails_before_opening() {
    let fx = Fixture::new();
    let patch_set = PatchSet::new(
        vec![PatchRow::new(0, 0, 1).with_slide_index(0)],
        PatchDefaults {
            dataset_name: Some(DATASET.to_string()),
            ..PatchDefaults::default()
        },
    );

    let result = patch_set
        .export(&fx.path("out"), &fx.registry, &ExportEncoder::Png)
        .await;
    assert!(matches!(
        result,
        Err(PatchSetError::MissingField { row: 0, field: "patch_size" })
    ));
    assert_eq!(fx.log.open_count(), 0);
}

#[tokio::test]
async fn test_unknown_dataset() {
    let fx = Fixture::new();
    let patch_set = PatchSet::for_slide(vec![PatchRow::new(0, 0, 1)], "nope", 0, 16, 0);

    let result = patch_set
        .export(&fx.path("out"), &fx.registry, &ExportEncoder::Png)
        .await;
    assert!(matches!(
        result,
        Err(PatchSetError::Dataset(DatasetError::UnknownDataset(name))) if name == "nope"
    ));
}
