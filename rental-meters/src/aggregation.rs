//! Consumption views derived from a reading series.
//!
//! Everything here is a pure function of the readings passed in: series are
//! stored unordered, so each view sorts its own copy and nothing is cached.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize, Serializer};
use time::OffsetDateTime;

use crate::domain::Reading;

/// Calendar month grouping key, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u8,
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month of the timestamp in the offset it was recorded with.
    pub fn of(ts: &OffsetDateTime) -> Self {
        Self {
            year: ts.year(),
            month: u8::from(ts.month()),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{s}'"))?;
        let year: i32 = year.parse().map_err(|e| format!("invalid year '{year}': {e}"))?;
        let month: u8 = month.parse().map_err(|e| format!("invalid month '{month}': {e}"))?;
        Self::new(year, month).ok_or_else(|| format!("month out of range: {month}"))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Optional year and month restriction applied before grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PeriodFilter {
    pub year: Option<i32>,
    pub month: Option<u8>,
}

impl PeriodFilter {
    pub fn matches(&self, ym: YearMonth) -> bool {
        self.year.map_or(true, |y| y == ym.year) && self.month.map_or(true, |m| m == ym.month)
    }
}

/// Consumption attributed to a reading relative to the one before it.
///
/// The oldest reading of a series has nothing to compare against and is
/// `NotApplicable`, which is not the same as measuring zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Consumption {
    Measured { amount: f64, cost: f64 },
    NotApplicable,
}

impl Consumption {
    pub fn amount(&self) -> Option<f64> {
        match self {
            Self::Measured { amount, .. } => Some(*amount),
            Self::NotApplicable => None,
        }
    }

    pub fn cost(&self) -> Option<f64> {
        match self {
            Self::Measured { cost, .. } => Some(*cost),
            Self::NotApplicable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingWithConsumption {
    pub reading: Reading,
    pub consumption: Consumption,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyConsumption {
    pub year_month: YearMonth,
    pub first_reading: Reading,
    pub last_reading: Reading,
    pub reading_count: usize,
    pub consumption: f64,
    pub cost: f64,
}

/// Electricity and water for one month. Either side may be missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedMonth {
    pub year_month: YearMonth,
    pub electricity: Option<MonthlyConsumption>,
    pub water: Option<MonthlyConsumption>,
    pub total_cost: f64,
}

/// Meters only count up; a decrease is treated as no consumption.
pub fn clamped_delta(newer: f64, older: f64) -> f64 {
    (newer - older).max(0.0)
}

fn sorted_ascending(readings: &[Reading]) -> Vec<&Reading> {
    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by(|a, b| a.chronological_cmp(b));
    sorted
}

/// The reading with the latest `reading_date`, if any.
pub fn latest_reading(readings: &[Reading]) -> Option<&Reading> {
    readings.iter().max_by(|a, b| a.chronological_cmp(b))
}

/// Newest-first listing where each reading carries the consumption since the
/// reading immediately before it.
pub fn readings_with_consumption(
    readings: &[Reading],
    unit_price: f64,
) -> Vec<ReadingWithConsumption> {
    let mut sorted = sorted_ascending(readings);
    sorted.reverse();

    sorted
        .iter()
        .enumerate()
        .map(|(i, reading)| {
            let consumption = match sorted.get(i + 1) {
                Some(older) => {
                    let amount = clamped_delta(reading.value, older.value);
                    Consumption::Measured {
                        amount,
                        cost: amount * unit_price,
                    }
                }
                None => Consumption::NotApplicable,
            };
            ReadingWithConsumption {
                reading: (*reading).clone(),
                consumption,
            }
        })
        .collect()
}

/// Per-month consumption between the first and last reading of each month,
/// most recent month first.
///
/// Months without readings are omitted. A month with a single reading yields
/// zero consumption.
pub fn monthly_consumption(
    readings: &[Reading],
    unit_price: f64,
    filter: &PeriodFilter,
) -> Vec<MonthlyConsumption> {
    let mut groups: BTreeMap<YearMonth, Vec<&Reading>> = BTreeMap::new();
    for reading in sorted_ascending(readings) {
        let ym = YearMonth::of(&reading.reading_date);
        if filter.matches(ym) {
            groups.entry(ym).or_default().push(reading);
        }
    }

    groups
        .into_iter()
        .rev()
        .filter_map(|(year_month, group)| {
            let first = *group.first()?;
            let last = *group.last()?;
            let consumption = clamped_delta(last.value, first.value);
            Some(MonthlyConsumption {
                year_month,
                first_reading: first.clone(),
                last_reading: last.clone(),
                reading_count: group.len(),
                consumption,
                cost: consumption * unit_price,
            })
        })
        .collect()
}

/// Joins electricity and water monthly views by month, most recent first.
///
/// `total_cost` sums whichever sides are present.
pub fn combine_monthly(
    electricity: &[MonthlyConsumption],
    water: &[MonthlyConsumption],
) -> Vec<CombinedMonth> {
    type Sides = (Option<MonthlyConsumption>, Option<MonthlyConsumption>);
    let mut months: BTreeMap<YearMonth, Sides> = BTreeMap::new();

    for m in electricity {
        months.entry(m.year_month).or_default().0 = Some(m.clone());
    }
    for m in water {
        months.entry(m.year_month).or_default().1 = Some(m.clone());
    }

    months
        .into_iter()
        .rev()
        .map(|(year_month, (electricity, water))| {
            let total_cost = electricity.iter().chain(water.iter()).map(|m| m.cost).sum();
            CombinedMonth {
                year_month,
                electricity,
                water,
                total_cost,
            }
        })
        .collect()
}
