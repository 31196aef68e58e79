// src/config.rs
use crate::constants::{
    BASE_URL_ENV, CLASS_INDEX_PAGE, DEFAULT_BASE_URL, DEFAULT_FRESHNESS_WINDOW,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCHEDULE_CACHE_ENTRIES, DEFAULT_VIEW_CACHE_ENTRIES,
    TEACHER_INDEX_PAGE,
};
use crate::error_recovery::RetryPolicy;
use crate::reconcile::AuthorityPolicy;
use crate::types::{Identifier, SlotBounds, ValidationError, ViewKind};
use clap::Parser;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Parsed command-line input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    /// Class code (e.g. "101") or teacher name (e.g. "王大明")
    pub target: String,

    /// Identifier kind: "class" or "teacher" (inferred when omitted: all digits is a class)
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Timetable site base URL (overrides $TIMETABLE_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Ignore cached data and fetch fresh pages
    #[arg(short, long, default_value_t = false)]
    pub refresh: bool,

    /// Output format: markdown, json or ics
    #[arg(short, long, default_value = "markdown")]
    pub format: String,

    /// Shorthand for --format json
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Location written on exported calendar events
    #[arg(long)]
    pub location: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Seconds a reconciled schedule is served without revalidation
    #[arg(long, default_value_t = DEFAULT_FRESHNESS_WINDOW.as_secs())]
    pub freshness_secs: u64,

    /// Attempts per page request, counting the first
    #[arg(long, default_value_t = crate::constants::DEFAULT_FETCH_ATTEMPTS)]
    pub retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Maximum reconciled schedules kept in memory
    #[arg(long, default_value_t = DEFAULT_SCHEDULE_CACHE_ENTRIES)]
    pub cache_entries: usize,

    /// Days per week in the published grid
    #[arg(long, default_value_t = crate::constants::DEFAULT_DAYS_PER_WEEK)]
    pub days: u8,

    /// Teaching periods per day in the published grid
    #[arg(long, default_value_t = crate::constants::DEFAULT_PERIODS_PER_DAY)]
    pub periods: u8,

    /// Whose subject is shown when pages disagree: requested, class or teacher
    #[arg(long, default_value = "requested")]
    pub authority: String,
}

/// How the CLI prints a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    /// iCalendar feed of weekly recurring events.
    Ics,
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" | "table" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "ics" | "ical" | "calendar" => Ok(OutputFormat::Ics),
            other => Err(ValidationError::InvalidConfig(format!(
                "unknown output format '{}', expected markdown, json or ics",
                other
            ))),
        }
    }
}

/// Everything the timetable service needs to run.
#[derive(Debug, Clone)]
pub struct TimetableConfig {
    pub base_url: Url,
    pub class_index_page: String,
    pub teacher_index_page: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub freshness_window: Duration,
    pub cache_max_entries: usize,
    pub view_cache_max_entries: usize,
    pub bounds: SlotBounds,
    pub authority: AuthorityPolicy,
    /// Groups of names that refer to the same teacher.
    pub aliases: Vec<Vec<String>>,
}

impl Default for TimetableConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL should be valid"),
            class_index_page: CLASS_INDEX_PAGE.to_string(),
            teacher_index_page: TEACHER_INDEX_PAGE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            cache_max_entries: DEFAULT_SCHEDULE_CACHE_ENTRIES,
            view_cache_max_entries: DEFAULT_VIEW_CACHE_ENTRIES,
            bounds: SlotBounds::default(),
            authority: AuthorityPolicy::default(),
            aliases: vec![vec!["朱蒙".to_string(), "吳銘".to_string()]],
        }
    }
}

impl TimetableConfig {
    /// Rejects settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        SlotBounds::new(self.bounds.days, self.bounds.periods)?;
        if self.retry.max_attempts == 0 {
            return Err(ValidationError::InvalidConfig(
                "at least one fetch attempt is required".to_string(),
            ));
        }
        if self.cache_max_entries == 0 || self.view_cache_max_entries == 0 {
            return Err(ValidationError::InvalidConfig(
                "cache sizes must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ValidationError::InvalidConfig(
                "request timeout must be positive".to_string(),
            ));
        }
        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidConfig(format!(
                "base URL must be http or https: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

/// Resolved CLI request: what to look up, and how.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub identifier: Identifier,
    pub refresh: bool,
    pub format: OutputFormat,
    /// Location for exported calendar events.
    pub location: Option<String>,
    pub verbose: bool,
    pub timetable: TimetableConfig,
}

impl QueryConfig {
    /// Resolves a complete configuration from CLI input and environment.
    pub fn resolve(cli: CommandLineInput) -> Result<Self, ValidationError> {
        let kind = match cli.kind.as_deref() {
            Some(kind) => kind.parse::<ViewKind>()?,
            None => ViewKind::infer(&cli.target),
        };
        let identifier = Identifier::parse(&cli.target, kind)?;
        let format = if cli.json {
            OutputFormat::Json
        } else {
            cli.format.parse()?
        };

        let base_url = match cli.base_url.or_else(|| std::env::var(BASE_URL_ENV).ok()) {
            Some(raw) => Url::parse(raw.trim()).map_err(|e| {
                ValidationError::InvalidConfig(format!("invalid base URL '{}': {}", raw, e))
            })?,
            None => TimetableConfig::default().base_url,
        };

        let defaults = TimetableConfig::default();
        let timetable = TimetableConfig {
            base_url,
            request_timeout: Duration::from_secs(cli.timeout_secs),
            retry: RetryPolicy {
                max_attempts: cli.retries,
                ..defaults.retry
            },
            freshness_window: Duration::from_secs(cli.freshness_secs),
            cache_max_entries: cli.cache_entries,
            bounds: SlotBounds::new(cli.days, cli.periods)?,
            authority: cli.authority.parse()?,
            ..defaults
        };
        timetable.validate()?;

        Ok(QueryConfig {
            identifier,
            refresh: cli.refresh,
            format,
            location: cli.location,
            verbose: cli.verbose,
            timetable,
        })
    }
}
