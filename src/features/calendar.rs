//! Academic calendar state.
//!
//! Terms are either configured explicitly or follow the default fall
//! (Aug 20 - Dec 15) and spring (Jan 15 - May 15) windows. Weeks 15-16 of a
//! term are finals, week 14 is dead week. Finals days remain class days.

use serde::Deserialize;
use thiserror::Error;
use time::macros::format_description;
use time::{Date, Month, Weekday};

pub const MAX_SEMESTER_WEEK: i64 = 16;
pub const DEAD_WEEK: i64 = 14;
pub const FIRST_FINALS_WEEK: i64 = 15;

#[derive(Debug, Clone, Deserialize)]
pub struct TermSpec {
    pub name: String,
    /// `YYYY-MM-DD`
    pub starts_on: String,
    /// `YYYY-MM-DD`, inclusive
    pub ends_on: String,
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("invalid date {value:?}: {source}")]
    Date {
        value: String,
        source: time::error::Parse,
    },
    #[error("term {0} ends before it starts")]
    InvertedTerm(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub name: String,
    pub starts_on: Date,
    pub ends_on: Date,
}

impl Term {
    fn contains(&self, date: Date) -> bool {
        self.starts_on <= date && date <= self.ends_on
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarState {
    pub in_term: bool,
    pub is_class_day: bool,
    pub days_into_term: i64,
    pub semester_week: i64,
    pub is_first_week: bool,
    pub is_dead_week: bool,
    pub is_finals_week: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AcademicCalendar {
    /// Empty means the default fall/spring rule applies.
    terms: Vec<Term>,
    holidays: Vec<Date>,
}

fn parse_date(value: &str) -> Result<Date, CalendarError> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).map_err(|source| {
        CalendarError::Date {
            value: value.to_string(),
            source,
        }
    })
}

impl AcademicCalendar {
    pub fn new(terms: Vec<Term>, holidays: Vec<Date>) -> Self {
        Self { terms, holidays }
    }

    pub fn from_specs(specs: &[TermSpec], holidays: &[String]) -> Result<Self, CalendarError> {
        let mut terms = Vec::with_capacity(specs.len());
        for spec in specs {
            let starts_on = parse_date(&spec.starts_on)?;
            let ends_on = parse_date(&spec.ends_on)?;
            if ends_on < starts_on {
                return Err(CalendarError::InvertedTerm(spec.name.clone()));
            }
            terms.push(Term {
                name: spec.name.clone(),
                starts_on,
                ends_on,
            });
        }
        Self::new(terms, Vec::new()).with_holidays(holidays)
    }

    pub fn with_holidays(mut self, holidays: &[String]) -> Result<Self, CalendarError> {
        for holiday in holidays {
            self.holidays.push(parse_date(holiday)?);
        }
        Ok(self)
    }

    pub fn term_for(&self, date: Date) -> Option<Term> {
        if !self.terms.is_empty() {
            return self.terms.iter().find(|t| t.contains(date)).cloned();
        }
        default_term_for(date)
    }

    pub fn state_on(&self, date: Date) -> CalendarState {
        let Some(term) = self.term_for(date) else {
            return CalendarState::default();
        };

        let days_into_term = (date - term.starts_on).whole_days();
        let semester_week = (days_into_term / 7 + 1).min(MAX_SEMESTER_WEEK);
        let weekday = !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday);
        let holiday = self.holidays.contains(&date);

        CalendarState {
            in_term: true,
            is_class_day: weekday && !holiday,
            days_into_term,
            semester_week,
            is_first_week: semester_week == 1,
            is_dead_week: semester_week == DEAD_WEEK,
            is_finals_week: semester_week >= FIRST_FINALS_WEEK,
        }
    }
}

fn default_term_for(date: Date) -> Option<Term> {
    let year = date.year();
    let fall = Term {
        name: format!("Fall {year}"),
        starts_on: Date::from_calendar_date(year, Month::August, 20).ok()?,
        ends_on: Date::from_calendar_date(year, Month::December, 15).ok()?,
    };
    let spring = Term {
        name: format!("Spring {year}"),
        starts_on: Date::from_calendar_date(year, Month::January, 15).ok()?,
        ends_on: Date::from_calendar_date(year, Month::May, 15).ok()?,
    };
    [fall, spring].into_iter().find(|t| t.contains(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn default_fall_term_first_week() {
        let calendar = AcademicCalendar::default();

        let state = calendar.state_on(date!(2025 - 08 - 21));

        assert!(state.in_term);
        assert!(state.is_class_day);
        assert!(state.is_first_week);
        assert_eq!(state.days_into_term, 1);
        assert_eq!(state.semester_week, 1);
    }

    #[test]
    fn finals_days_remain_class_days() {
        let calendar = AcademicCalendar::default();

        // 2025-12-03 is a Wednesday, 105 days after Aug 20 -> week 16.
        let state = calendar.state_on(date!(2025 - 12 - 03));

        assert!(state.is_finals_week);
        assert!(state.is_class_day);
        assert!(!state.is_dead_week);
    }

    #[test]
    fn summer_is_out_of_term() {
        let calendar = AcademicCalendar::default();

        let state = calendar.state_on(date!(2025 - 07 - 01));

        assert_eq!(state, CalendarState::default());
        assert!(!state.is_class_day);
    }

    #[test]
    fn weekends_and_holidays_are_not_class_days() -> Result<(), CalendarError> {
        let calendar =
            AcademicCalendar::default().with_holidays(&["2025-09-01".to_string()])?;

        assert!(!calendar.state_on(date!(2025 - 09 - 01)).is_class_day);
        assert!(!calendar.state_on(date!(2025 - 09 - 06)).is_class_day);
        assert!(calendar.state_on(date!(2025 - 09 - 02)).is_class_day);
        Ok(())
    }

    #[test]
    fn configured_terms_replace_defaults() -> Result<(), CalendarError> {
        let specs = vec![TermSpec {
            name: "Summer I".to_string(),
            starts_on: "2025-06-02".to_string(),
            ends_on: "2025-07-03".to_string(),
        }];
        let calendar = AcademicCalendar::from_specs(&specs, &[])?;

        assert!(calendar.state_on(date!(2025 - 06 - 10)).in_term);
        assert!(!calendar.state_on(date!(2025 - 09 - 10)).in_term);
        Ok(())
    }

    #[test]
    fn inverted_term_is_rejected() {
        let specs = vec![TermSpec {
            name: "Broken".to_string(),
            starts_on: "2025-06-02".to_string(),
            ends_on: "2025-05-03".to_string(),
        }];

        let result = AcademicCalendar::from_specs(&specs, &[]);

        assert!(matches!(result, Err(CalendarError::InvertedTerm(_))));
    }
}
