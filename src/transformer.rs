//! Orchestrates loaders, the stack executor and the image store
//!
//! [`Transformer`] is the entry point callers use: hand out derivative URLs,
//! pre-compute derivatives, and drop them again.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::artifact::ImageArtifact;
use crate::coalescing::{Coalescer, CoalescingSlot};
use crate::error::TransformError;
use crate::format::ImageFormat;
use crate::loader::ChainLoader;
use crate::metrics::PipelineMetrics;
use crate::stack::StackExecutor;
use crate::store::{DerivedKey, ImageStore};

#[derive(Clone)]
pub struct Transformer {
    loader: ChainLoader,
    executor: StackExecutor,
    store: Arc<dyn ImageStore>,
    coalescer: Coalescer,
}

impl Transformer {
    pub fn new(loader: ChainLoader, executor: StackExecutor, store: Arc<dyn ImageStore>) -> Self {
        Self {
            loader,
            executor,
            store,
            coalescer: Coalescer::new(),
        }
    }

    pub fn executor(&self) -> &StackExecutor {
        &self.executor
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    /// URL of the `stack` derivative of `source_id` in `format`
    ///
    /// Returns straight away when the store creates derivatives on demand
    /// or already holds this one. Otherwise computes and stores it first;
    /// on failure no URL is returned.
    pub async fn transform_to_url(
        &self,
        source_id: &str,
        stack: &str,
        format: ImageFormat,
    ) -> Result<String, TransformError> {
        let metrics = PipelineMetrics::global();
        let key = DerivedKey::new(source_id, stack, format);

        if self.store.supports_on_demand_creation() {
            metrics.store_on_demand.inc();
            return Ok(self.store.url(&key)?);
        }
        if self.store.exists(&key).await? {
            metrics.store_hits.inc();
            return Ok(self.store.url(&key)?);
        }
        metrics.store_misses.inc();

        match self.coalescer.acquire(&key).await {
            CoalescingSlot::Leader(guard) => {
                // A previous leader may have finished since the lookup above
                if self.store.exists(&key).await? {
                    metrics.store_hits.inc();
                    return Ok(self.store.url(&key)?);
                }
                let result = self.compute(&key).await;
                drop(guard);
                result
            }
            CoalescingSlot::Follower => {
                if self.store.exists(&key).await? {
                    debug!(key = %key, "Derivative stored by concurrent request");
                    return Ok(self.store.url(&key)?);
                }
                // The leader failed; try once more on our own
                self.compute(&key).await
            }
        }
    }

    /// Compute and store one derivative, returning its URL
    async fn compute(&self, key: &DerivedKey) -> Result<String, TransformError> {
        let result = self.load_render_store(key).await;
        if let Err(err) = &result {
            error!(
                source_id = %key.source_id,
                stack = %key.stack,
                format = %key.format,
                error = %err,
                "Derivative computation aborted"
            );
        }
        result
    }

    async fn load_render_store(&self, key: &DerivedKey) -> Result<String, TransformError> {
        let source = self.loader.resolve(&key.source_id).await?;
        let stored = self.render_and_store(&source, key).await?;
        match stored.url() {
            Some(url) => Ok(url.to_string()),
            None => Ok(self.store.url(key)?),
        }
    }

    async fn render_and_store(
        &self,
        source: &ImageArtifact,
        key: &DerivedKey,
    ) -> Result<ImageArtifact, TransformError> {
        let derived = self
            .executor
            .apply_with_format(&key.stack, source, Some(key.format))
            .await?;
        let bytes = derived.len();
        let stored = self.store.store(derived, key).await?;
        info!(
            source_id = %key.source_id,
            stack = %key.stack,
            format = %key.format,
            bytes,
            "Stored derivative"
        );
        Ok(stored)
    }

    /// Compute and store every (stack, format) derivative of `source_id`
    ///
    /// The source is loaded once per call. With no formats given, each
    /// stack produces its own default output format. Stops at the first
    /// failure.
    pub async fn warmup_cache(
        &self,
        source_id: &str,
        stacks: &[String],
        formats: &[ImageFormat],
    ) -> Result<Vec<DerivedKey>, TransformError> {
        if stacks.is_empty() {
            return Err(TransformError::NoStacksSpecified);
        }

        let source = self.loader.resolve(source_id).await?;
        let mut warmed = Vec::with_capacity(stacks.len() * formats.len().max(1));

        for stack in stacks {
            let formats = if formats.is_empty() {
                vec![self.executor.output_format(stack, &source)?]
            } else {
                formats.to_vec()
            };

            for format in formats {
                let key = DerivedKey::new(source_id, stack.as_str(), format);
                if let Err(err) = self.render_and_store(&source, &key).await {
                    error!(key = %key, error = %err, "Warmup aborted");
                    return Err(err);
                }
                warmed.push(key);
            }
        }

        debug!(source_id = %source_id, derivatives = warmed.len(), "Warmup complete");
        Ok(warmed)
    }

    /// Delete stored derivatives of `source_id`; every stack when `stacks` is empty
    pub async fn invalidate_cache(
        &self,
        source_id: &str,
        stacks: &[String],
    ) -> Result<usize, TransformError> {
        let removed = self.store.delete(source_id, stacks).await?;
        PipelineMetrics::global()
            .invalidations
            .inc_by(removed as u64);
        info!(
            source_id = %source_id,
            stacks = ?stacks,
            removed,
            "Invalidated derivatives"
        );
        Ok(removed)
    }
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("loaders", &self.loader.names())
            .field("executor", &self.executor)
            .field("on_demand", &self.store.supports_on_demand_creation())
            .finish()
    }
}
