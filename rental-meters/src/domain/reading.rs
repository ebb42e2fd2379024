use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtilityKind {
    Electricity,
    Water,
}

impl UtilityKind {
    pub const ALL: [UtilityKind; 2] = [UtilityKind::Electricity, UtilityKind::Water];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Water => "water",
        }
    }
}

impl fmt::Display for UtilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UtilityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "electricity" => Ok(Self::Electricity),
            "water" => Ok(Self::Water),
            other => Err(format!("unknown utility '{other}'")),
        }
    }
}

/// One cumulative meter value taken at `reading_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub reading_date: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Reading {
    /// Orders by `reading_date`, falling back to `created_at` for readings
    /// taken at the same instant.
    pub fn chronological_cmp(&self, other: &Reading) -> Ordering {
        self.reading_date
            .cmp(&other.reading_date)
            .then_with(|| self.created_at.cmp(&other.created_at))
    }
}

/// The pair of series owned by one billable unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterReadings {
    #[serde(default)]
    pub electricity: Vec<Reading>,
    #[serde(default)]
    pub water: Vec<Reading>,
}

impl MeterReadings {
    pub fn series(&self, utility: UtilityKind) -> &[Reading] {
        match utility {
            UtilityKind::Electricity => &self.electricity,
            UtilityKind::Water => &self.water,
        }
    }

    pub fn series_mut(&mut self, utility: UtilityKind) -> &mut Vec<Reading> {
        match utility {
            UtilityKind::Electricity => &mut self.electricity,
            UtilityKind::Water => &mut self.water,
        }
    }
}
