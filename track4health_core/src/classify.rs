//! Classification rules applied at the point of data entry.
//!
//! Everything here is a pure function of its arguments:
//! - Age from date of birth (and the inverse)
//! - MUAC-based nutritional status
//! - Name normalization and duplicate detection

use crate::{Error, NutritionStatus, Result};
use chrono::{Datelike, Local, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DOB_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("DOB pattern is valid"));

/// Unit for age computations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgeUnit {
    Years,
    Months,
}

/// MUAC cut points in centimeters, shared by every screening flow
///
/// `muac <= sam_max_cm` is SAM, `muac <= mam_max_cm` is MAM, anything
/// above is Normal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MuacThresholds {
    #[serde(default = "default_sam_max_cm")]
    pub sam_max_cm: f64,
    #[serde(default = "default_mam_max_cm")]
    pub mam_max_cm: f64,
}

fn default_sam_max_cm() -> f64 {
    11.0
}

fn default_mam_max_cm() -> f64 {
    12.5
}

impl Default for MuacThresholds {
    fn default() -> Self {
        Self {
            sam_max_cm: default_sam_max_cm(),
            mam_max_cm: default_mam_max_cm(),
        }
    }
}

impl MuacThresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.sam_max_cm.is_finite() || !self.mam_max_cm.is_finite() {
            return Err(Error::Config("MUAC thresholds must be finite".into()));
        }
        if self.sam_max_cm >= self.mam_max_cm {
            return Err(Error::Config(format!(
                "SAM threshold ({}) must be below MAM threshold ({})",
                self.sam_max_cm, self.mam_max_cm
            )));
        }
        Ok(())
    }

    /// Map a MUAC measurement to a nutritional status
    ///
    /// Non-decreasing in `muac_cm`. NaN falls through to Normal; callers
    /// validate measurements before classifying.
    pub fn classify(&self, muac_cm: f64) -> NutritionStatus {
        if muac_cm <= self.sam_max_cm {
            NutritionStatus::Sam
        } else if muac_cm <= self.mam_max_cm {
            NutritionStatus::Mam
        } else {
            NutritionStatus::Normal
        }
    }
}

/// Classify with the default thresholds
pub fn classify_muac(muac_cm: f64) -> NutritionStatus {
    MuacThresholds::default().classify(muac_cm)
}

/// Today's date in the local timezone
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Whole years or months elapsed between `dob` and `today`
///
/// Uses calendar month/day comparison so an upcoming birthday (or
/// monthly anniversary) is not counted. Dates in the future yield 0.
pub fn age_from_dob(dob: NaiveDate, unit: AgeUnit, today: NaiveDate) -> u32 {
    if dob > today {
        return 0;
    }

    let before_anniversary = (today.month(), today.day()) < (dob.month(), dob.day());

    let age = match unit {
        AgeUnit::Years => {
            let years = today.year() - dob.year();
            if before_anniversary {
                years - 1
            } else {
                years
            }
        }
        AgeUnit::Months => {
            let months = (today.year() - dob.year()) * 12 + today.month() as i32
                - dob.month() as i32;
            if today.day() < dob.day() {
                months - 1
            } else {
                months
            }
        }
    };

    age.max(0) as u32
}

/// Plausible birth date for someone `age` years or months old on `today`
///
/// The day of month is clamped when the target month is shorter.
pub fn dob_from_age(age: u32, unit: AgeUnit, today: NaiveDate) -> NaiveDate {
    let months = match unit {
        AgeUnit::Years => age.saturating_mul(12),
        AgeUnit::Months => age,
    };
    today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// Convenience wrapper evaluated against the local date
pub fn age_from_dob_now(dob: NaiveDate, unit: AgeUnit) -> u32 {
    age_from_dob(dob, unit, today())
}

/// Convenience wrapper evaluated against the local date
pub fn dob_from_age_now(age: u32, unit: AgeUnit) -> NaiveDate {
    dob_from_age(age, unit, today())
}

/// Parse a date of birth, accepting only `YYYY-MM-DD`
pub fn parse_dob(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    if !DOB_FORMAT.is_match(trimmed) {
        return Err(Error::Validation(format!(
            "Date of birth must be YYYY-MM-DD, got '{}'",
            input
        )));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("Not a calendar date: '{}'", input)))
}

/// Normalize a free-text name: single spaces, each word capitalized
pub fn to_title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    let mut upper = first.to_uppercase();
                    // Keep characters whose uppercase form expands (e.g. 'ß')
                    let head = match (upper.next(), upper.next()) {
                        (Some(single), None) => single.to_string(),
                        _ => first.to_string(),
                    };
                    head + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a name/father-name pair already appears among `existing`
///
/// Comparison is on the title-cased forms, so case and spacing differences
/// do not matter.
pub fn is_duplicate<'a, I>(name: &str, father_name: &str, existing: I) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let name = to_title_case(name);
    let father_name = to_title_case(father_name);
    existing
        .into_iter()
        .any(|(n, f)| to_title_case(n) == name && to_title_case(f) == father_name)
}
