//! WSI Patcher - Patch indexing and export for Whole Slide Images.
//!
//! This binary wires the pipeline stages to the command line.

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_patcher::{
    config::{
        Cli, Command, ExportConfig, IndexConfig, PolicyKind, PoolingKind, SampleConfig,
        SummaryConfig, TissueKind,
    },
    dataset::{DatasetContext, DatasetRegistry},
    patching::{make_index, GridPatchFinder, Majority, PatchSet, SlidesIndex, FIELDS_FILE},
    sampling::{sample, SamplingPolicy, Uniform, WeightedBySlide},
    slide::ImageSlideOpener,
    tissue::{AllTissue, OtsuTissueDetector, TissueDetector},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Validate configuration
    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let context = DatasetContext::new(
        &cli.data_root,
        Arc::new(ImageSlideOpener::new(cli.pyramid_levels)),
    );
    let registry = DatasetRegistry::with_builtin(context);

    let result = match cli.command {
        Command::Index(config) => run_index(config, &registry).await,
        Command::Summary(config) => run_summary(config, &registry).await,
        Command::Sample(config) => run_sample(config, &registry),
        Command::Export(config) => run_export(config, &registry).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_patcher=debug"
    } else {
        "wsi_patcher=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Index Command
// =============================================================================

async fn run_index(config: IndexConfig, registry: &DatasetRegistry) -> Result<(), String> {
    let dataset = registry
        .get(&config.dataset)
        .await
        .map_err(|e| e.to_string())?;

    info!("Indexing {} ({} slide(s))", dataset.name(), dataset.len());
    info!(
        "  Labels level {}, patch level {}, patch size {}, stride {}",
        config.labels_level, config.patch_level, config.patch_size, config.stride
    );

    let finder = GridPatchFinder::new(config.finder_config()).map_err(|e| e.to_string())?;
    let finder = match config.pooling {
        PoolingKind::Max => finder,
        PoolingKind::Majority => finder.with_pooling(Majority),
    };
    let detector: Box<dyn TissueDetector> = match config.tissue {
        TissueKind::Otsu => Box::new(OtsuTissueDetector),
        TissueKind::All => Box::new(AllTissue),
    };

    let index = make_index(dataset.as_ref(), &finder, detector.as_ref())
        .await
        .map_err(|e| e.to_string())?;
    index.save(&config.output).map_err(|e| e.to_string())?;

    info!(
        "Found {} patch(es) on {} slide(s)",
        index.patch_count(),
        index.len()
    );
    Ok(())
}

// =============================================================================
// Summary Command
// =============================================================================

async fn run_summary(config: SummaryConfig, registry: &DatasetRegistry) -> Result<(), String> {
    let index = SlidesIndex::load(&config.index, registry).map_err(|e| e.to_string())?;
    let table = index.summary(registry).await.map_err(|e| e.to_string())?;
    print!("{}", table);
    Ok(())
}

// =============================================================================
// Sample Command
// =============================================================================

fn run_sample(config: SampleConfig, registry: &DatasetRegistry) -> Result<(), String> {
    let patches = load_patches(&config.input, config.slides.as_deref(), registry)?;

    let policy: Box<dyn SamplingPolicy> = match config.policy {
        PolicyKind::WeightedBySlide => Box::new(WeightedBySlide),
        PolicyKind::Uniform => Box::new(Uniform),
    };
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let sampled = sample(
        &patches,
        config.per_class,
        config.floor,
        policy.as_ref(),
        &mut rng,
    )
    .map_err(|e| e.to_string())?;
    sampled.save(&config.output).map_err(|e| e.to_string())?;

    info!(
        "Kept {} of {} patch(es), saved to {}",
        sampled.len(),
        patches.len(),
        config.output.display()
    );
    Ok(())
}

// =============================================================================
// Export Command
// =============================================================================

async fn run_export(config: ExportConfig, registry: &DatasetRegistry) -> Result<(), String> {
    let encoder = config.encoder().map_err(|e| e.to_string())?;
    let patches = load_patches(&config.input, None, registry)?;

    let report = patches
        .export(&config.output, registry, &encoder)
        .await
        .map_err(|e| e.to_string())?;

    info!(
        "Wrote {} patch(es) for label(s) {:?}",
        report.patches_written, report.labels
    );
    Ok(())
}

/// Load a saved patch set, or a saved slides index combined into one.
fn load_patches(
    dir: &Path,
    slides: Option<&[usize]>,
    registry: &DatasetRegistry,
) -> Result<PatchSet, String> {
    if dir.join(FIELDS_FILE).is_file() {
        if slides.is_some() {
            return Err(format!(
                "{} is a single patch set; --slides needs a slides index",
                dir.display()
            ));
        }
        return PatchSet::load(dir, registry).map_err(|e| e.to_string());
    }

    let mut index = SlidesIndex::load(dir, registry).map_err(|e| e.to_string())?;
    if let Some(positions) = slides {
        index = index.select(positions).map_err(|e| e.to_string())?;
    }
    Ok(index.combined())
}
