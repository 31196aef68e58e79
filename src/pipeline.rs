// src/pipeline.rs
//! Pipeline capability traits: fetch → parse → normalize, with or without a cache.
//!
//! The reconciler depends on [`ViewSource`] only, so each stage can be tested
//! in isolation and the view cache can be swapped out.

use crate::api::PageSource;
use crate::cache::{CachePolicy, SingleFlightCache};
use crate::error::QueryError;
use crate::model::NormalizedView;
use crate::normalize::normalize;
use crate::parsing;
use crate::types::{Identifier, SlotBounds};
use std::sync::Arc;
use std::time::Duration;

/// Retrieves the normalized view of one identifier's page.
#[async_trait::async_trait]
pub trait ViewSource: Send + Sync {
    async fn view(
        &self,
        identifier: &Identifier,
        policy: CachePolicy,
    ) -> Result<Arc<NormalizedView>, QueryError>;
}

/// Fetches, parses and normalizes a page on every call.
pub struct PagePipeline {
    pages: Arc<dyn PageSource>,
    bounds: SlotBounds,
}

impl PagePipeline {
    pub fn new(pages: Arc<dyn PageSource>, bounds: SlotBounds) -> Self {
        Self { pages, bounds }
    }

    pub async fn load(&self, identifier: &Identifier) -> Result<NormalizedView, QueryError> {
        let markup = self.pages.fetch(identifier).await?;
        let grid = parsing::parse(&markup, identifier)?;
        let view = normalize(&grid, identifier, identifier.kind(), &self.bounds)?;
        log::debug!(
            "Normalized {}: {} fragments in {} slots",
            identifier,
            view.fragment_count(),
            view.slots.len()
        );
        Ok(view)
    }
}

#[async_trait::async_trait]
impl ViewSource for PagePipeline {
    async fn view(
        &self,
        identifier: &Identifier,
        _policy: CachePolicy,
    ) -> Result<Arc<NormalizedView>, QueryError> {
        self.load(identifier).await.map(Arc::new)
    }
}

/// A [`ViewSource`] that keeps normalized views in a single-flight cache,
/// so a teacher shared by many classes is fetched once.
pub struct CachedViewSource {
    pipeline: Arc<PagePipeline>,
    cache: SingleFlightCache<Identifier, NormalizedView>,
}

impl CachedViewSource {
    pub fn new(
        pipeline: Arc<PagePipeline>,
        max_entries: usize,
        freshness: Duration,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            pipeline,
            cache: SingleFlightCache::new("views", max_entries, freshness)?,
        })
    }

    pub fn cache(&self) -> &SingleFlightCache<Identifier, NormalizedView> {
        &self.cache
    }
}

#[async_trait::async_trait]
impl ViewSource for CachedViewSource {
    async fn view(
        &self,
        identifier: &Identifier,
        policy: CachePolicy,
    ) -> Result<Arc<NormalizedView>, QueryError> {
        let pipeline = Arc::clone(&self.pipeline);
        let key = identifier.clone();
        let cached = self
            .cache
            .get_or_load(identifier.clone(), policy, move || async move {
                pipeline.load(&key).await
            })
            .await?;
        Ok(cached.value)
    }
}
