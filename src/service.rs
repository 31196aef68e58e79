// src/service.rs
//! The query facade: validates an identifier, routes it through the
//! schedule cache, and hands back the schedule with its diagnostics.

use crate::api::{PageSource, TimetableHttpClient};
use crate::cache::{CachePolicy, SingleFlightCache};
use crate::config::TimetableConfig;
use crate::error::QueryError;
use crate::model::{NormalizedView, Schedule};
use crate::pipeline::{CachedViewSource, PagePipeline};
use crate::reconcile::Reconciler;
use crate::types::{Identifier, ViewKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A schedule plus when it was built.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResponse {
    #[serde(flatten)]
    pub schedule: Arc<Schedule>,
    pub fetched_at: DateTime<Utc>,
    /// Served past its freshness window while a refresh runs.
    pub stale: bool,
}

/// Answers schedule queries for one timetable site.
pub struct TimetableService {
    pages: Arc<dyn PageSource>,
    reconciler: Arc<Reconciler>,
    views: Arc<CachedViewSource>,
    schedules: SingleFlightCache<Identifier, Schedule>,
}

impl TimetableService {
    /// Builds a service over any page source.
    pub fn new(pages: Arc<dyn PageSource>, config: &TimetableConfig) -> Result<Self, QueryError> {
        config.validate()?;

        let pipeline = Arc::new(PagePipeline::new(Arc::clone(&pages), config.bounds));
        let views = Arc::new(CachedViewSource::new(
            pipeline,
            config.view_cache_max_entries,
            config.freshness_window,
        )?);
        let reconciler = Arc::new(Reconciler::new(views.clone(), config.authority));
        let schedules =
            SingleFlightCache::new("schedules", config.cache_max_entries, config.freshness_window)?;

        Ok(Self {
            pages,
            reconciler,
            views,
            schedules,
        })
    }

    /// Builds a service that fetches from the configured site over HTTP.
    pub fn from_config(config: &TimetableConfig) -> Result<Self, QueryError> {
        let client = TimetableHttpClient::new(config)?;
        Self::new(Arc::new(client), config)
    }

    /// Looks up a schedule from untyped input: `kind` is "class" or "teacher".
    pub async fn get_schedule(
        &self,
        identifier: &str,
        kind: &str,
    ) -> Result<ScheduleResponse, QueryError> {
        let kind: ViewKind = kind.parse()?;
        let identifier = Identifier::parse(identifier, kind)?;
        self.schedule(&identifier, false).await
    }

    /// Returns the schedule for `identifier`.
    ///
    /// Within the freshness window the cached schedule is returned as is.
    /// Past it, the stale schedule is returned and rebuilt in the background.
    /// With `refresh` the caller waits for a rebuild from freshly fetched pages,
    /// and the page source reloads its index first.
    pub async fn schedule(
        &self,
        identifier: &Identifier,
        refresh: bool,
    ) -> Result<ScheduleResponse, QueryError> {
        let (policy, own_view) = if refresh {
            self.pages.refresh_index();
            (CachePolicy::Bypass, CachePolicy::Bypass)
        } else {
            (CachePolicy::AllowStale, CachePolicy::RequireFresh)
        };

        let reconciler = Arc::clone(&self.reconciler);
        let key = identifier.clone();
        let cached = self
            .schedules
            .get_or_load(identifier.clone(), policy, move || async move {
                reconciler
                    .reconcile(&key, own_view, CachePolicy::RequireFresh)
                    .await
            })
            .await?;

        Ok(ScheduleResponse {
            schedule: cached.value,
            fetched_at: cached.fetched_at,
            stale: cached.stale,
        })
    }

    pub fn schedule_cache(&self) -> &SingleFlightCache<Identifier, Schedule> {
        &self.schedules
    }

    pub fn view_cache(&self) -> &SingleFlightCache<Identifier, NormalizedView> {
        self.views.cache()
    }
}
