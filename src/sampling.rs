//! Class-balancing sampler.
//!
//! Every label present in a patch set is sampled down to the same count
//! `n = max(min(smallest class, per-class cap), floor)`. Classes that
//! cannot supply `n` rows are an error; rows are never duplicated.

use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::{debug, info};

use crate::error::SampleError;
use crate::patching::{PatchRow, PatchSet};

// =============================================================================
// Sampling Policies
// =============================================================================

/// Chooses `amount` rows out of one class.
///
/// `rows` have the patch set defaults written in. The returned positions
/// index into `rows` and must be distinct.
pub trait SamplingPolicy: Send + Sync {
    fn choose(
        &self,
        rows: &[PatchRow],
        amount: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<usize>, SampleError>;
}

/// Weights each row by the inverse of its slide's row count in the class,
/// so that slides with many patches do not dominate.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedBySlide;

impl SamplingPolicy for WeightedBySlide {
    fn choose(
        &self,
        rows: &[PatchRow],
        amount: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<usize>, SampleError> {
        let mut per_slide: HashMap<(Option<&str>, Option<usize>), usize> = HashMap::new();
        for row in rows {
            *per_slide.entry(slide_key(row)).or_default() += 1;
        }

        let weighted: Vec<(usize, f64)> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i, 1.0 / per_slide[&slide_key(row)] as f64))
            .collect();

        let chosen = weighted
            .choose_multiple_weighted(rng, amount, |&(_, weight)| weight)
            .map_err(|e| SampleError::InvalidWeights(e.to_string()))?;
        Ok(chosen.map(|&(i, _)| i).collect())
    }
}

fn slide_key(row: &PatchRow) -> (Option<&str>, Option<usize>) {
    (row.dataset_name.as_deref(), row.slide_index)
}

/// Every row equally likely.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl SamplingPolicy for Uniform {
    fn choose(
        &self,
        rows: &[PatchRow],
        amount: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<usize>, SampleError> {
        let positions: Vec<usize> = (0..rows.len()).collect();
        Ok(positions.choose_multiple(rng, amount).copied().collect())
    }
}

// =============================================================================
// Sampler
// =============================================================================

/// Sample `patch_set` to the same number of rows per label.
///
/// Classes are emitted in ascending label order. The result keeps the
/// input's defaults; only the rows change.
pub fn sample(
    patch_set: &PatchSet,
    num_samples_per_class: usize,
    floor_samples: usize,
    policy: &dyn SamplingPolicy,
    rng: &mut dyn RngCore,
) -> Result<PatchSet, SampleError> {
    if patch_set.is_empty() {
        return Ok(patch_set.clone());
    }

    let mut classes: BTreeMap<u32, Vec<&PatchRow>> = BTreeMap::new();
    for row in patch_set.rows() {
        classes.entry(row.label).or_default().push(row);
    }

    let smallest = classes.values().map(Vec::len).min().unwrap_or(0);
    let n = smallest.min(num_samples_per_class).max(floor_samples);

    for (&label, rows) in &classes {
        if rows.len() < n {
            return Err(SampleError::InsufficientRows {
                label,
                available: rows.len(),
                required: n,
            });
        }
    }

    let mut sampled = Vec::with_capacity(n * classes.len());
    for (label, rows) in &classes {
        let effective: Vec<PatchRow> = rows.iter().map(|r| patch_set.effective(r)).collect();
        let chosen = policy.choose(&effective, n, rng)?;
        debug!("Label {}: kept {} of {} row(s)", label, chosen.len(), rows.len());
        sampled.extend(chosen.into_iter().map(|i| rows[i].clone()));
    }

    info!(
        "Sampled {} row(s) per label over {} label(s)",
        n,
        classes.len()
    );
    Ok(patch_set.with_rows(sampled))
}
