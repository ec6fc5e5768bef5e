//! # Clock
//!
//! Expiration checks, forecast windows and alert tiers all depend on "today".
//! Engines read it from a [`Clock`] so that tests can pin the date.

use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Wall clock.
    #[default]
    System,
    /// Always returns the same instant.
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Clock pinned to midnight UTC of the given day.
    pub fn fixed_on(date: NaiveDate) -> Self {
        Clock::Fixed(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    #[inline]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }

    #[inline]
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let clock = Clock::fixed_on(day);
        assert_eq!(clock.today(), day);
        assert_eq!(clock.now(), clock.now());
    }
}
