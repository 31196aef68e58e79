//! Turns timetable page markup into a [`RawGrid`](crate::model::RawGrid).
//!
//! The parser knows the page layout and nothing about identifiers beyond
//! using one for error context. Schema rules live in the normalizer.

mod cell;
mod grid;

pub use cell::clean_text;
pub use grid::{parse, parse_time_range};
