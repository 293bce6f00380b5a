//! Monthly model time axis.
//!
//! The model runs on a monthly timestep. A [`DatesTable`] holds one [`DateStep`] per month
//! from the first month of the first spinup year to the last month of the final year. Model
//! years are either calendar years or hydrological (water) years, where water year `Y`
//! runs from 1 October `Y - 1` to 30 September `Y`.

use crate::errors::{GemError, GemResult};
use serde::{Deserialize, Serialize};

/// Definition of a model year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum YearType {
    /// January to December
    Calendar,
    /// October of the previous year to September
    #[default]
    Water,
}

impl YearType {
    /// Calendar month that starts a model year.
    pub fn first_month(&self) -> u32 {
        match self {
            YearType::Calendar => 1,
            YearType::Water => 10,
        }
    }
}

/// Melt season classification of a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Summer,
    Winter,
}

impl Season {
    fn of_month(month: u32) -> Self {
        if (4..=9).contains(&month) {
            Season::Summer
        } else {
            Season::Winter
        }
    }
}

/// A single month of the model run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateStep {
    /// Calendar year
    pub year: i32,
    /// Calendar month (1-12)
    pub month: u32,
    pub days_in_month: u32,
    /// Water year this month belongs to
    pub water_year: i32,
    pub season: Season,
}

impl DateStep {
    fn new(year: i32, month: u32) -> Self {
        let water_year = if month >= 10 { year + 1 } else { year };
        Self {
            year,
            month,
            days_in_month: days_in_month(year, month),
            water_year,
            season: Season::of_month(month),
        }
    }

    /// Start of the month as a fractional year.
    pub fn decimal_year(&self) -> f64 {
        self.year as f64 + (self.month - 1) as f64 / 12.0
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Monthly time axis of a model run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatesTable {
    steps: Vec<DateStep>,
    start_year: i32,
    end_year: i32,
    spinup_years: u32,
    year_type: YearType,
}

impl DatesTable {
    /// Build the monthly dates of a model run.
    ///
    /// # Arguments
    ///
    /// * `start_year` - First model year after spinup
    /// * `end_year` - Last model year (inclusive)
    /// * `spinup_years` - Number of years prepended to the run
    /// * `year_type` - Whether model years are calendar or water years
    pub fn model_run(
        start_year: i32,
        end_year: i32,
        spinup_years: u32,
        year_type: YearType,
    ) -> GemResult<Self> {
        if end_year < start_year {
            return Err(GemError::InvalidInput(format!(
                "end year {} is before start year {}",
                end_year, start_year
            )));
        }

        let first_year = start_year - spinup_years as i32;
        let n_years = (end_year - first_year + 1) as usize;
        let mut steps = Vec::with_capacity(n_years * 12);

        let (mut year, mut month) = match year_type {
            YearType::Calendar => (first_year, 1),
            YearType::Water => (first_year - 1, 10),
        };
        for _ in 0..n_years * 12 {
            steps.push(DateStep::new(year, month));
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }

        Ok(Self {
            steps,
            start_year,
            end_year,
            spinup_years,
            year_type,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn n_years(&self) -> usize {
        self.steps.len() / 12
    }

    pub fn steps(&self) -> &[DateStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&DateStep> {
        self.steps.get(index)
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.end_year
    }

    pub fn spinup_years(&self) -> u32 {
        self.spinup_years
    }

    pub fn spinup_months(&self) -> usize {
        self.spinup_years as usize * 12
    }

    pub fn year_type(&self) -> YearType {
        self.year_type
    }

    /// Start of month `index` as a fractional year.
    ///
    /// Indices past the end of the run extrapolate monthly.
    pub fn decimal_year(&self, index: usize) -> f64 {
        match self.steps.first() {
            Some(first) => first.decimal_year() + index as f64 / 12.0,
            None => f64::NAN,
        }
    }

    /// Index of the first month starting at or after `t` (fractional year).
    ///
    /// Times before the run map to 0 and times after the run map to `len()`.
    pub fn month_index(&self, t: f64) -> usize {
        self.steps
            .iter()
            .position(|step| step.decimal_year() >= t - 1e-9)
            .unwrap_or(self.steps.len())
    }

    /// Label of each model year.
    pub fn year_labels(&self) -> Vec<i32> {
        self.steps
            .iter()
            .step_by(12)
            .map(|step| match self.year_type {
                YearType::Calendar => step.year,
                YearType::Water => step.water_year,
            })
            .collect()
    }

    /// Labels of the model years plus the year following the run.
    ///
    /// Geometry is reported at the start of every year and after the final year.
    pub fn year_labels_plus_one(&self) -> Vec<i32> {
        let mut labels = self.year_labels();
        if let Some(last) = labels.last().copied() {
            labels.push(last + 1);
        }
        labels
    }
}
