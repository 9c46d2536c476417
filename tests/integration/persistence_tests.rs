//! Integration tests for patch set and slides index persistence.
//!
//! These tests verify:
//! - Save/load round trips rows, optional columns and defaults
//! - Slides index directory numbering and load order
//! - Unknown datasets and incomplete rows are rejected on load
//! - Saving an index replaces the numbered directories of an earlier save
//! - Summaries list every known label, absent ones as zero

use wsi_patcher::error::{DatasetError, IndexError, PatchSetError};
use wsi_patcher::patching::{FIELDS_FILE, FRAME_FILE};
use wsi_patcher::{
    make_index, AllTissue, FinderConfig, GridPatchFinder, PatchRow, PatchSet, SlidesIndex,
};

use super::test_utils::{Fixture, DATASET};

fn mixed_rows() -> PatchSet {
    PatchSet::for_slide(
        vec![
            PatchRow::new(0, 0, 1),
            PatchRow::new(-4, 12, 2).with_level(1).with_patch_size(32),
            PatchRow::new(96, 64, 1).with_slide_index(1),
        ],
        DATASET,
        0,
        16,
        0,
    )
}

// =============================================================================
// Patch Sets
// =============================================================================

#[test]
fn test_patch_set_round_trip() {
    let fx = Fixture::new();
    let dir = fx.path("patch_set");

    let original = mixed_rows();
    original.save(&dir).unwrap();
    assert!(dir.join(FRAME_FILE).is_file());
    assert!(dir.join(FIELDS_FILE).is_file());

    let loaded = PatchSet::load(&dir, &fx.registry).unwrap();
    assert_eq!(loaded, original);
}

#[test]
fn test_frame_lists_only_present_columns() {
    let fx = Fixture::new();
    let dir = fx.path("patch_set");
    mixed_rows().save(&dir).unwrap();

    let frame = std::fs::read_to_string(dir.join(FRAME_FILE)).unwrap();
    let header = frame.lines().next().unwrap();
    assert_eq!(header, "x,y,label,slide_index,patch_size,level");
}

#[test]
fn test_load_rejects_unknown_dataset() {
    let fx = Fixture::new();
    let dir = fx.path("patch_set");
    PatchSet::for_slide(vec![PatchRow::new(0, 0, 1)], "camelyon17.training", 0, 16, 0)
        .save(&dir)
        .unwrap();

    assert!(matches!(
        PatchSet::load(&dir, &fx.registry),
        Err(PatchSetError::Dataset(DatasetError::UnknownDataset(name))) if name == "camelyon17.training"
    ));
}

#[test]
fn test_load_missing_directory() {
    let fx = Fixture::new();
    assert!(matches!(
        PatchSet::load(&fx.path("nowhere"), &fx.registry),
        Err(PatchSetError::Io { .. })
    ));
}

#[test]
fn test_load_rejects_rows_without_patch_size() {
    let fx = Fixture::new();
    let dir = fx.path("incomplete");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(FRAME_FILE), "x,y,label\n0,0,1\n").unwrap();
    std::fs::write(
        dir.join(FIELDS_FILE),
        format!(
            r#"{{"type": "PatchSet", "version": 1, "fields": {{"dataset_name": "{}"}}}}"#,
            DATASET
        ),
    )
    .unwrap();

    assert!(matches!(
        PatchSet::load(&dir, &fx.registry),
        Err(PatchSetError::MissingField { row: 0, field: "patch_size" })
    ));
}

#[test]
fn test_load_accepts_columns_filling_missing_defaults() {
    let fx = Fixture::new();
    let dir = fx.path("per_row");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(FRAME_FILE),
        "x,y,label,slide_index,patch_size,level\n0,0,1,0,16,0\n8,8,2,1,8,1\n",
    )
    .unwrap();
    std::fs::write(
        dir.join(FIELDS_FILE),
        format!(
            r#"{{"type": "PatchSet", "version": 1, "fields": {{"dataset_name": "{}"}}}}"#,
            DATASET
        ),
    )
    .unwrap();

    let loaded = PatchSet::load(&dir, &fx.registry).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.resolve(1).unwrap().level, 1);
}

#[test]
fn test_save_rejects_empty_dataset_name() {
    let fx = Fixture::new();
    let patch_set = PatchSet::for_slide(
        vec![PatchRow::new(0, 0, 1).with_dataset_name("")],
        DATASET,
        0,
        16,
        0,
    );

    assert!(matches!(
        patch_set.save(&fx.path("empty_name")),
        Err(PatchSetError::EmptyDatasetName { row: 0 })
    ));
}

#[tokio::test]
async fn test_summary_reports_absent_labels() {
    let fx = Fixture::new();
    let patch_set = PatchSet::for_slide(
        vec![PatchRow::new(0, 0, 2), PatchRow::new(16, 0, 2)],
        DATASET,
        0,
        16,
        0,
    );

    let summary = patch_set.summary(&fx.registry).await.unwrap();
    let counts: Vec<_> = summary.iter().collect();
    assert_eq!(counts, vec![("background", 0), ("normal", 0), ("tumor", 2)]);
    assert_eq!(summary.total(), 2);
}

#[tokio::test]
async fn test_summary_unknown_label() {
    let fx = Fixture::new();
    let patch_set = PatchSet::for_slide(vec![PatchRow::new(0, 0, 9)], DATASET, 0, 16, 0);

    assert!(matches!(
        patch_set.summary(&fx.registry).await,
        Err(PatchSetError::UnknownLabel { label: 9, .. })
    ));
}

// =============================================================================
// Slides Index
// =============================================================================

#[test]
fn test_index_directories_are_zero_padded() {
    let fx = Fixture::new();
    let dir = fx.path("index");

    let index: SlidesIndex = (0..12)
        .map(|i| PatchSet::for_slide(vec![PatchRow::new(i, 0, 1)], DATASET, i as usize, 16, 0))
        .collect();
    index.save(&dir).unwrap();

    let mut names: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.first().map(String::as_str), Some("00"));
    assert_eq!(names.last().map(String::as_str), Some("11"));

    let loaded = SlidesIndex::load(&dir, &fx.registry).unwrap();
    assert_eq!(loaded, index);
}

#[test]
fn test_save_over_larger_index_drops_stale_slides() {
    let fx = Fixture::new();
    let dir = fx.path("index");
    let index_of = |slides: usize| -> SlidesIndex {
        (0..slides)
            .map(|i| PatchSet::for_slide(vec![PatchRow::new(0, 0, 1)], DATASET, i, 16, 0))
            .collect()
    };

    index_of(5).save(&dir).unwrap();
    std::fs::write(dir.join("notes.txt"), "kept").unwrap();
    index_of(3).save(&dir).unwrap();

    assert!(!dir.join("03").exists());
    assert!(!dir.join("04").exists());
    assert!(dir.join("notes.txt").is_file());

    let loaded = SlidesIndex::load(&dir, &fx.registry).unwrap();
    assert_eq!(loaded, index_of(3));
}

#[tokio::test]
async fn test_indexed_dataset_round_trip_and_summary() {
    let fx = Fixture::new();
    let dir = fx.path("index");
    let finder = GridPatchFinder::new(FinderConfig::new(2, 0, 16, 16)).unwrap();

    let index = make_index(fx.dataset.as_ref(), &finder, &AllTissue)
        .await
        .unwrap();
    index.save(&dir).unwrap();

    let loaded = SlidesIndex::load(&dir, &fx.registry).unwrap();
    assert_eq!(loaded, index);

    let table = loaded.summary(&fx.registry).await.unwrap();
    assert_eq!(table.labels(), ["background", "normal", "tumor"]);
    assert_eq!(table.rows(), [vec![0, 12, 4], vec![0, 16, 0]]);
    assert_eq!(table.totals(), vec![0, 28, 4]);

    let combined = loaded.combined();
    assert_eq!(combined.len(), 32);
    assert_eq!(combined.defaults().slide_index, None);
    assert_eq!(combined.defaults().patch_size, Some(16));

    let first = loaded.select(&[0]).unwrap();
    assert_eq!(first.patch_count(), 16);
    assert!(matches!(
        loaded.select(&[0, 2]),
        Err(IndexError::SelectOutOfRange { index: 2, len: 2 })
    ));
}

#[test]
fn test_combine_solo_matches_saved_form() {
    let fx = Fixture::new();
    let dir = fx.path("combined");

    let original = mixed_rows();
    let combined = PatchSet::combine([&original]);
    combined.save(&dir).unwrap();

    let loaded = PatchSet::load(&dir, &fx.registry).unwrap();
    assert_eq!(loaded, combined);
    for (a, b) in combined.rows().iter().zip(original.rows()) {
        assert_eq!(combined.effective(a), original.effective(b));
    }
}
