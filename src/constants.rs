//! Domain constants that define the operational boundaries of the system.
//!
//! Each constant is named for the domain concept it constrains, not its
//! technical role.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Source site
// ---------------------------------------------------------------------------

/// Where the school publishes its timetable pages.
pub const DEFAULT_BASE_URL: &str = "http://w3.tnfsh.tn.edu.tw/deanofstudies/course";

/// Directory page listing every class timetable, grouped by grade.
pub const CLASS_INDEX_PAGE: &str = "_ClassIndex.html";

/// Directory page listing every teacher timetable, grouped by department.
pub const TEACHER_INDEX_PAGE: &str = "_TeachIndex.html";

/// Environment variable that overrides the source base URL.
pub const BASE_URL_ENV: &str = "TIMETABLE_BASE_URL";

/// Identifies the crawler to the school's web server.
pub const USER_AGENT: &str = concat!("school-timetable/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Weekly grid
// ---------------------------------------------------------------------------

/// The source publishes Monday to Friday.
pub const DEFAULT_DAYS_PER_WEEK: u8 = 5;

/// Teaching periods per day, excluding the lunch break.
pub const DEFAULT_PERIODS_PER_DAY: u8 = 8;

/// Label fragment marking the lunch-break row, which is not a numbered period.
pub const LUNCH_BREAK_LABEL: &str = "午休";

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Upper bound on one page request, connect through body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts per page, counting the first.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// First retry delay; doubles per attempt up to [`DEFAULT_MAX_BACKOFF`].
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// How long a reconciled schedule is served without revalidation.
///
/// Timetables change a few times per semester; ten minutes keeps the
/// school's server quiet while still picking up same-day corrections.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(600);

/// Reconciled schedules kept in memory.
pub const DEFAULT_SCHEDULE_CACHE_ENTRIES: usize = 256;

/// Normalized page views kept in memory. Every schedule pulls in several
/// counterpart views, so this is sized larger than the schedule cache.
pub const DEFAULT_VIEW_CACHE_ENTRIES: usize = 1024;

// ---------------------------------------------------------------------------
// Error display
// ---------------------------------------------------------------------------

/// Maximum characters shown when previewing an unexpected response body.
pub const ERROR_BODY_PREVIEW_LENGTH: usize = 200;
