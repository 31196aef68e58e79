use super::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// The fixed shape of the weekly grid a school publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBounds {
    pub days: u8,
    pub periods: u8,
}

impl SlotBounds {
    pub fn new(days: u8, periods: u8) -> Result<Self, ValidationError> {
        if days == 0 || days > 7 {
            return Err(ValidationError::InvalidConfig(format!(
                "days per week must be 1..=7, got {}",
                days
            )));
        }
        if periods == 0 {
            return Err(ValidationError::InvalidConfig(
                "periods per day must be at least 1".to_string(),
            ));
        }
        Ok(Self { days, periods })
    }

    /// Validates a weekday on its own, for rows outside the period numbering.
    pub fn weekday(&self, weekday: usize) -> Result<u8, ValidationError> {
        check_range("weekday", weekday, self.days)
    }
}

impl Default for SlotBounds {
    fn default() -> Self {
        Self {
            days: crate::constants::DEFAULT_DAYS_PER_WEEK,
            periods: crate::constants::DEFAULT_PERIODS_PER_DAY,
        }
    }
}

/// A (weekday, period) coordinate, both 1-based.
///
/// Only constructible through [`Slot::new`], so every `Slot` in the system
/// lies inside the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Slot {
    weekday: u8,
    period: u8,
}

impl Slot {
    /// Validates raw grid coordinates against `bounds`.
    ///
    /// Values outside the bounds are rejected, never clamped.
    pub fn new(weekday: usize, period: usize, bounds: &SlotBounds) -> Result<Self, ValidationError> {
        let weekday = bounds.weekday(weekday)?;
        let period = check_range("period", period, bounds.periods)?;
        Ok(Self { weekday, period })
    }

    pub fn weekday(&self) -> u8 {
        self.weekday
    }

    pub fn period(&self) -> u8 {
        self.period
    }

    pub fn weekday_name(&self) -> &'static str {
        weekday_name(self.weekday)
    }
}

/// Three-letter English name of a 1-based weekday.
pub fn weekday_name(weekday: u8) -> &'static str {
    usize::from(weekday)
        .checked_sub(1)
        .and_then(|i| WEEKDAY_NAMES.get(i))
        .copied()
        .unwrap_or("?")
}

fn check_range(field: &'static str, value: usize, max: u8) -> Result<u8, ValidationError> {
    match u8::try_from(value) {
        Ok(v) if (1..=max).contains(&v) => Ok(v),
        _ => Err(ValidationError::OutOfRange {
            field,
            value,
            min: 1,
            max: usize::from(max),
        }),
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.weekday_name(), self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_within_bounds() {
        let bounds = SlotBounds::new(5, 8).unwrap();
        let slot = Slot::new(1, 3, &bounds).unwrap();
        assert_eq!(slot.weekday(), 1);
        assert_eq!(slot.period(), 3);
        assert_eq!(slot.to_string(), "Mon/3");
    }

    #[test]
    fn weekday_past_the_week_is_rejected() {
        let bounds = SlotBounds::new(5, 8).unwrap();
        let err = Slot::new(8, 1, &bounds).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OutOfRange {
                field: "weekday",
                value: 8,
                ..
            }
        ));
    }

    #[test]
    fn zero_coordinates_are_rejected() {
        let bounds = SlotBounds::default();
        assert!(Slot::new(0, 1, &bounds).is_err());
        assert!(Slot::new(1, 0, &bounds).is_err());
        assert!(Slot::new(1, 9, &bounds).is_err());
    }

    #[test]
    fn bounds_check_weekdays_alone() {
        let bounds = SlotBounds::new(5, 2).unwrap();
        assert_eq!(bounds.weekday(5).unwrap(), 5);
        assert!(bounds.weekday(6).is_err());
        assert_eq!(weekday_name(2), "Tue");
        assert!(SlotBounds::new(0, 8).is_err());
        assert!(SlotBounds::new(8, 8).is_err());
    }
}
