use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::catalog::Season;

/// Maps a step index to the active cultivation season.
pub trait SeasonCalendar {
    fn season_for(&self, step: u64) -> Season;
}

/// Aus, Aman, Boro, Aus, ... starting from `first`.
#[derive(Debug, Clone, Copy)]
pub struct RotatingCalendar {
    first: Season,
}

impl RotatingCalendar {
    pub fn new(first: Season) -> Self {
        Self { first }
    }
}

impl Default for RotatingCalendar {
    fn default() -> Self {
        Self::new(Season::Aus)
    }
}

impl SeasonCalendar for RotatingCalendar {
    fn season_for(&self, step: u64) -> Season {
        let offset = Season::ROTATION
            .iter()
            .position(|s| *s == self.first)
            .unwrap_or(0) as u64;
        Season::ROTATION[((step + offset) % 3) as usize]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedCalendar(pub Season);

impl SeasonCalendar for FixedCalendar {
    fn season_for(&self, _step: u64) -> Season {
        self.0
    }
}

/// Cycles through an explicit season list; an empty list behaves like the
/// default rotation.
#[derive(Debug, Clone)]
pub struct ScheduledCalendar {
    seasons: Vec<Season>,
}

impl ScheduledCalendar {
    pub fn new(seasons: Vec<Season>) -> Self {
        Self { seasons }
    }
}

impl SeasonCalendar for ScheduledCalendar {
    fn season_for(&self, step: u64) -> Season {
        if self.seasons.is_empty() {
            return RotatingCalendar::default().season_for(step);
        }
        self.seasons[(step % self.seasons.len() as u64) as usize]
    }
}

/// Scenario-level calendar selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarConfig {
    Rotating {
        #[serde(default = "default_first_season")]
        first: Season,
    },
    Fixed {
        season: Season,
    },
    Scheduled {
        seasons: Vec<Season>,
    },
}

fn default_first_season() -> Season {
    Season::Aus
}

impl Default for CalendarConfig {
    fn default() -> Self {
        CalendarConfig::Rotating {
            first: default_first_season(),
        }
    }
}

impl CalendarConfig {
    pub fn build(&self) -> Box<dyn SeasonCalendar> {
        match self {
            CalendarConfig::Rotating { first } => Box::new(RotatingCalendar::new(*first)),
            CalendarConfig::Fixed { season } => Box::new(FixedCalendar(*season)),
            CalendarConfig::Scheduled { seasons } => {
                Box::new(ScheduledCalendar::new(seasons.clone()))
            }
        }
    }
}

/// Converts step indices to calendar dates.
#[derive(Debug, Clone, Copy)]
pub struct StepClock {
    start: NaiveDate,
    days_per_step: u32,
}

impl StepClock {
    pub fn new(start: NaiveDate, days_per_step: u32) -> Self {
        Self {
            start,
            days_per_step,
        }
    }

    pub fn days_per_step(&self) -> u32 {
        self.days_per_step
    }

    pub fn date_for(&self, step: u64) -> NaiveDate {
        let offset = step.saturating_mul(self.days_per_step as u64);
        self.start
            .checked_add_days(Days::new(offset))
            .unwrap_or(NaiveDate::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_follows_step_modulo_three() {
        let calendar = RotatingCalendar::default();
        let seasons: Vec<_> = (0..6).map(|s| calendar.season_for(s)).collect();
        assert_eq!(
            seasons,
            [
                Season::Aus,
                Season::Aman,
                Season::Boro,
                Season::Aus,
                Season::Aman,
                Season::Boro
            ]
        );
    }

    #[test]
    fn rotation_can_start_mid_cycle() {
        let calendar = RotatingCalendar::new(Season::Boro);
        assert_eq!(calendar.season_for(0), Season::Boro);
        assert_eq!(calendar.season_for(1), Season::Aus);
    }

    #[test]
    fn schedule_repeats() {
        let calendar = ScheduledCalendar::new(vec![Season::Boro, Season::Aman]);
        assert_eq!(calendar.season_for(2), Season::Boro);
        assert_eq!(calendar.season_for(3), Season::Aman);
    }

    #[test]
    fn clock_advances_by_days_per_step() {
        let clock = StepClock::new(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 120);
        assert_eq!(
            clock.date_for(3),
            NaiveDate::from_ymd_opt(2020, 12, 26).unwrap()
        );
    }
}
