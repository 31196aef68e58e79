// src/lib.rs
//! school-timetable library: crawls a school's class and teacher timetable
//! pages and reconciles the two views into one queryable schedule.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Query facade**: `TimetableService`, `ScheduleResponse`
//! - **Error handling**: `QueryError`, `FetchError`, `ParseError`, `ValidationError`
//! - **Configuration**: `TimetableConfig`, `CommandLineInput`, `QueryConfig`
//! - **Domain model**: `Schedule`, `ScheduleEntry`, `Contradiction`, `NormalizedView`, `RawGrid`
//! - **Domain types**: `Identifier`, `ClassId`, `TeacherId`, `Slot`, `SlotBounds`, `ViewKind`
//! - **Rendering**: `render_schedule` (Markdown), `render_ics` (iCalendar)
//! - **Pipeline stages**: `PageSource`, `parse`, `normalize`, `Reconciler`, `SingleFlightCache`

pub mod api;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod error_recovery;
pub mod formatting;
pub mod model;
pub mod normalize;
pub mod parsing;
pub mod pipeline;
pub mod reconcile;
pub mod service;
pub mod types;

// --- Query Facade ---
pub use crate::service::{ScheduleResponse, TimetableService};

// --- Error Handling ---
pub use crate::error::{FetchError, ParseError, QueryError};
pub use crate::types::ValidationError;

// --- Configuration ---
pub use crate::config::{CommandLineInput, OutputFormat, QueryConfig, TimetableConfig};
pub use crate::error_recovery::RetryPolicy;

// --- Domain Model ---
pub use crate::model::{
    BreakSession, Contradiction, ContradictionKind, EntryFragment, NormalizedView, PeriodInfo, RawCell, RawGrid,
    Schedule, ScheduleEntry, StandaloneActivity,
};

// --- Domain Types ---
pub use crate::types::{ClassId, Identifier, Slot, SlotBounds, TeacherId, ViewKind};

// --- Pipeline Stages ---
pub use crate::api::{PageSource, TimetableHttpClient};
pub use crate::cache::{CachePolicy, Cached, SingleFlightCache};
pub use crate::normalize::normalize;
pub use crate::parsing::parse;
pub use crate::pipeline::{CachedViewSource, PagePipeline, ViewSource};
pub use crate::reconcile::{AuthorityPolicy, Reconciler};

// --- Formatting ---
pub use crate::formatting::{render_ics, render_schedule, CalendarOptions};
