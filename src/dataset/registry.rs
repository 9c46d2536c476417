//! Dataset Registry for name-based dataset lookup.
//!
//! The registry provides:
//! - An explicit name → factory table, filled once at startup
//! - Memoization: every name is constructed at most once per registry
//! - Singleflight pattern so concurrent first lookups share one construction
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wsi_patcher::dataset::{DatasetContext, DatasetRegistry};
//! use wsi_patcher::slide::ImageSlideOpener;
//!
//! let context = DatasetContext::new("/data", Arc::new(ImageSlideOpener::default()));
//! let registry = DatasetRegistry::with_builtin(context);
//!
//! // Constructed on first access, shared afterwards
//! let dataset = registry.get("camelyon16.training").await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info};

use crate::error::DatasetError;
use crate::slide::SlideOpener;

use super::{camelyon16, Dataset};

// =============================================================================
// Context and Factories
// =============================================================================

/// Everything a dataset factory may need to build its catalog.
#[derive(Clone)]
pub struct DatasetContext {
    /// Directory holding every dataset's files
    pub data_root: PathBuf,

    /// Opener handed to constructed datasets
    pub opener: Arc<dyn SlideOpener>,
}

impl DatasetContext {
    pub fn new(data_root: impl Into<PathBuf>, opener: Arc<dyn SlideOpener>) -> Self {
        Self {
            data_root: data_root.into(),
            opener,
        }
    }
}

/// Builds a dataset. Called at most once per name and registry.
pub type DatasetFactory =
    Arc<dyn Fn(&DatasetContext) -> Result<Arc<dyn Dataset>, DatasetError> + Send + Sync>;

// =============================================================================
// DatasetRegistry
// =============================================================================

/// Registry mapping dataset names to lazily constructed, shared instances.
///
/// The registry:
/// - Rejects names with no registered factory
/// - Runs factories on the blocking pool (they usually scan directories)
/// - Caches every constructed dataset for the registry's lifetime
/// - Uses singleflight to prevent duplicate construction for the same name
pub struct DatasetRegistry {
    /// Shared inputs for factories
    context: DatasetContext,

    /// Registered factories indexed by name
    factories: BTreeMap<String, DatasetFactory>,

    /// Constructed datasets indexed by name
    cache: RwLock<HashMap<String, Arc<dyn Dataset>>>,

    /// In-flight constructions for singleflight pattern
    in_flight: Mutex<HashMap<String, Arc<InFlightState>>>,
}

/// State for an in-flight dataset construction.
struct InFlightState {
    /// Notification for waiters
    notify: Notify,
    /// Result of the construction (set when complete)
    result: Mutex<Option<Result<Arc<dyn Dataset>, DatasetError>>>,
}

impl DatasetRegistry {
    /// Create an empty registry.
    pub fn new(context: DatasetContext) -> Self {
        Self {
            context,
            factories: BTreeMap::new(),
            cache: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry with every dataset this crate knows about.
    pub fn with_builtin(context: DatasetContext) -> Self {
        let mut registry = Self::new(context);
        registry.register(camelyon16::TRAINING, |ctx| {
            Ok(Arc::new(camelyon16::training(ctx)?) as Arc<dyn Dataset>)
        });
        registry.register(camelyon16::TRAINING_SMALL, |ctx| {
            Ok(Arc::new(camelyon16::training_small(ctx)?) as Arc<dyn Dataset>)
        });
        registry.register(camelyon16::TESTING, |ctx| {
            Ok(Arc::new(camelyon16::testing(ctx)?) as Arc<dyn Dataset>)
        });
        registry
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&DatasetContext) -> Result<Arc<dyn Dataset>, DatasetError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register an already constructed dataset under its own name.
    pub fn with_dataset(mut self, dataset: Arc<dyn Dataset>) -> Self {
        let name = dataset.name().to_string();
        self.register(name, move |_| Ok(Arc::clone(&dataset)));
        self
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn context(&self) -> &DatasetContext {
        &self.context
    }

    /// Get a dataset, constructing it if not already cached.
    ///
    /// This method:
    /// 1. Checks the cache for an existing dataset
    /// 2. If not cached, runs the registered factory
    /// 3. Uses singleflight so concurrent callers share one construction
    ///
    /// A failed construction is not cached; the next call retries.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Dataset>, DatasetError> {
        let factory = self
            .factories
            .get(name)
            .cloned()
            .ok_or_else(|| DatasetError::UnknownDataset(name.to_string()))?;

        // Fast path: check cache
        {
            let cache = self.cache.read().await;
            if let Some(dataset) = cache.get(name) {
                return Ok(Arc::clone(dataset));
            }
        }

        // Slow path: check in_flight or become leader
        loop {
            let state = {
                let mut in_flight = self.in_flight.lock().await;

                if let Some(state) = in_flight.get(name) {
                    // Another task is constructing this dataset
                    state.clone()
                } else {
                    // A previous leader may have finished between the fast path and here
                    if let Some(dataset) = self.cache.read().await.get(name) {
                        return Ok(Arc::clone(dataset));
                    }

                    // We're the leader for constructing this dataset
                    let state = Arc::new(InFlightState {
                        notify: Notify::new(),
                        result: Mutex::new(None),
                    });
                    in_flight.insert(name.to_string(), state.clone());
                    drop(in_flight);

                    let result = self.construct(name, factory).await;

                    {
                        let mut result_guard = state.result.lock().await;
                        *result_guard = Some(result.clone());
                    }

                    if let Ok(ref dataset) = result {
                        let mut cache = self.cache.write().await;
                        cache.insert(name.to_string(), Arc::clone(dataset));
                    }

                    // Clean up in_flight and notify waiters
                    {
                        let mut in_flight = self.in_flight.lock().await;
                        in_flight.remove(name);
                    }
                    state.notify.notify_waiters();

                    return result;
                }
            };

            // Register interest before checking the result so a notification
            // sent in between is not lost.
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(ref result) = *state.result.lock().await {
                return result.clone();
            }

            notified.await;

            let result_guard = state.result.lock().await;
            if let Some(ref result) = *result_guard {
                return result.clone();
            }
        }
    }

    async fn construct(
        &self,
        name: &str,
        factory: DatasetFactory,
    ) -> Result<Arc<dyn Dataset>, DatasetError> {
        debug!("Constructing dataset {}", name);
        let context = self.context.clone();
        let dataset = tokio::task::spawn_blocking(move || factory(&context))
            .await
            .map_err(|e| DatasetError::Io(format!("dataset factory panicked: {}", e)))??;
        info!("Loaded dataset {} ({} slide(s))", name, dataset.len());
        Ok(dataset)
    }

    /// Get the number of constructed datasets.
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
