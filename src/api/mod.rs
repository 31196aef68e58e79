// src/api/mod.rs
//! Page acquisition: the ability to retrieve a timetable page's markup.
//!
//! Everything downstream depends on [`PageSource`], never on HTTP details,
//! so tests and alternative sources can stand in for the school's site.

pub mod client;
pub mod directory;

use crate::error::FetchError;
use crate::types::Identifier;

/// The ability to retrieve the timetable page for an identifier.
///
/// Implementations retry transient failures themselves and surface only
/// exhausted retries or definitive failures.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, identifier: &Identifier) -> Result<String, FetchError>;

    /// Forgets any index used to locate pages, so the next fetch reloads it.
    fn refresh_index(&self) {}
}

pub use client::TimetableHttpClient;
pub use directory::{Directory, DirectoryEntry};
