use std::fmt;

use serde::{Deserialize, Serialize};

use super::reading::{MeterReadings, Reading, UtilityKind};

/// Unit prices (currency per unit) applied when costing consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilityPrices {
    #[serde(default)]
    pub electricity: f64,
    #[serde(default)]
    pub water: f64,
}

impl UtilityPrices {
    pub fn price(&self, utility: UtilityKind) -> f64 {
        match utility {
            UtilityKind::Electricity => self.electricity,
            UtilityKind::Water => self.water,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub meter_readings: MeterReadings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SpaceLayout {
    Apartment {
        #[serde(default, rename = "meterReadings")]
        meter_readings: MeterReadings,
    },
    BoardingHouse {
        #[serde(default)]
        rooms: Vec<Room>,
    },
}

/// A persisted space: an apartment, or a boarding house whose rooms each
/// carry their own meter readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceDocument {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub prices: UtilityPrices,
    pub layout: SpaceLayout,
}

impl SpaceDocument {
    /// Resolves the meter readings of a billable unit. A room id only
    /// resolves against a boarding house, and a boarding house needs one.
    pub fn meter_readings(&self, room_id: Option<&str>) -> Option<&MeterReadings> {
        match (&self.layout, room_id) {
            (SpaceLayout::Apartment { meter_readings }, None) => Some(meter_readings),
            (SpaceLayout::BoardingHouse { rooms }, Some(room_id)) => rooms
                .iter()
                .find(|room| room.id == room_id)
                .map(|room| &room.meter_readings),
            _ => None,
        }
    }

    pub fn meter_readings_mut(&mut self, room_id: Option<&str>) -> Option<&mut MeterReadings> {
        match (&mut self.layout, room_id) {
            (SpaceLayout::Apartment { meter_readings }, None) => Some(meter_readings),
            (SpaceLayout::BoardingHouse { rooms }, Some(room_id)) => rooms
                .iter_mut()
                .find(|room| room.id == room_id)
                .map(|room| &mut room.meter_readings),
            _ => None,
        }
    }

    pub fn series(&self, room_id: Option<&str>, utility: UtilityKind) -> Option<&[Reading]> {
        self.meter_readings(room_id).map(|m| m.series(utility))
    }

    pub fn series_mut(
        &mut self,
        room_id: Option<&str>,
        utility: UtilityKind,
    ) -> Option<&mut Vec<Reading>> {
        self.meter_readings_mut(room_id).map(|m| m.series_mut(utility))
    }
}

/// Identifies one reading series: a space, an optional room within it, and
/// the utility.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesTarget {
    pub space_id: String,
    pub room_id: Option<String>,
    pub utility: UtilityKind,
}

impl SeriesTarget {
    pub fn apartment(space_id: impl Into<String>, utility: UtilityKind) -> Self {
        Self {
            space_id: space_id.into(),
            room_id: None,
            utility,
        }
    }

    pub fn room(
        space_id: impl Into<String>,
        room_id: impl Into<String>,
        utility: UtilityKind,
    ) -> Self {
        Self {
            space_id: space_id.into(),
            room_id: Some(room_id.into()),
            utility,
        }
    }
}

impl fmt::Display for SeriesTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.room_id {
            Some(room_id) => write!(f, "{}/rooms/{}/{}", self.space_id, room_id, self.utility),
            None => write!(f, "{}/{}", self.space_id, self.utility),
        }
    }
}
