pub mod reading;
pub mod space;

pub use reading::{MeterReadings, Reading, UtilityKind};
pub use space::{Room, SeriesTarget, SpaceDocument, SpaceLayout, UtilityPrices};
