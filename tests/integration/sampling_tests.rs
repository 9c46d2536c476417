//! Integration tests for the index, sample and export pipeline.

use rand::rngs::StdRng;
use rand::SeedableRng;

use wsi_patcher::error::SampleError;
use wsi_patcher::{
    make_index, sample, AllTissue, ExportEncoder, FinderConfig, GridPatchFinder, PatchSet,
    SlidesIndex, Uniform, WeightedBySlide,
};

use super::test_utils::Fixture;

async fn indexed(fx: &Fixture) -> SlidesIndex {
    let finder = GridPatchFinder::new(FinderConfig::new(2, 0, 16, 16)).unwrap();
    make_index(fx.dataset.as_ref(), &finder, &AllTissue)
        .await
        .unwrap()
}

fn count(patch_set: &PatchSet, label: u32) -> usize {
    patch_set.rows().iter().filter(|r| r.label == label).count()
}

#[tokio::test]
async fn test_index_sample_export() {
    let fx = Fixture::new();
    let combined = indexed(&fx).await.combined();

    let mut rng = StdRng::seed_from_u64(7);
    let balanced = sample(&combined, 100, 0, &WeightedBySlide, &mut rng).unwrap();

    // Smallest class is the four tumour patches of the first slide.
    assert_eq!(balanced.len(), 8);
    assert_eq!(count(&balanced, 1), 4);
    assert_eq!(count(&balanced, 2), 4);
    assert_eq!(balanced.defaults(), combined.defaults());

    let out = fx.path("balanced");
    let report = balanced
        .export(&out, &fx.registry, &ExportEncoder::Png)
        .await
        .unwrap();

    assert_eq!(report.patches_written, 8);
    assert!(report.slides_opened <= 2);
    fx.log.assert_one_open_at_a_time();

    let written = std::fs::read_dir(out.join("normal")).unwrap().count()
        + std::fs::read_dir(out.join("tumor")).unwrap().count();
    assert_eq!(written, 8);
}

#[tokio::test]
async fn test_sample_is_reproducible_with_seed() {
    let fx = Fixture::new();
    let combined = indexed(&fx).await.combined();

    let first = sample(
        &combined,
        3,
        0,
        &WeightedBySlide,
        &mut StdRng::seed_from_u64(42),
    )
    .unwrap();
    let second = sample(
        &combined,
        3,
        0,
        &WeightedBySlide,
        &mut StdRng::seed_from_u64(42),
    )
    .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 6);
}

#[tokio::test]
async fn test_floor_above_smallest_class_fails() {
    let fx = Fixture::new();
    let combined = indexed(&fx).await.combined();

    let result = sample(&combined, 100, 10, &Uniform, &mut StdRng::seed_from_u64(0));
    assert_eq!(
        result,
        Err(SampleError::InsufficientRows {
            label: 2,
            available: 4,
            required: 10,
        })
    );
}

#[tokio::test]
async fn test_sampling_selected_slide() {
    let fx = Fixture::new();
    let index = indexed(&fx).await;
    let only_b = index.select(&[1]).unwrap().combined();

    // A single class samples down to the per-class cap.
    let mut rng = StdRng::seed_from_u64(3);
    let sampled = sample(&only_b, 5, 0, &Uniform, &mut rng).unwrap();
    assert_eq!(sampled.len(), 5);
    assert!(sampled.rows().iter().all(|r| r.label == 1));
    assert_eq!(sampled.defaults().slide_index, Some(1));
}
