//! Core types for Paddock sensor readings and rollups.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;
use crate::granularity::Granularity;

/// A measured kind.
///
/// The catalogue covers the weather station, soil and tank-level sensors
/// deployed across the farm. Names serialize in PascalCase, matching the
/// calibration pipeline's data point names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Quantity {
    /// Rainfall depth over the past hour.
    RainfallHourly,
    /// Rain gauge running total.
    RainAccumulation,
    AirTemperature,
    AirHumidity,
    BarometricPressure,
    WindSpeed,
    /// Compass bearing the wind blows from.
    WindDirection,
    LightIntensity,
    UvIndex,
    /// Tank volume.
    Volume,
    /// Ultrasonic distance to the water surface.
    Distance,
}

impl Quantity {
    /// Every quantity in the catalogue.
    pub const ALL: [Quantity; 11] = [
        Quantity::RainfallHourly,
        Quantity::RainAccumulation,
        Quantity::AirTemperature,
        Quantity::AirHumidity,
        Quantity::BarometricPressure,
        Quantity::WindSpeed,
        Quantity::WindDirection,
        Quantity::LightIntensity,
        Quantity::UvIndex,
        Quantity::Volume,
        Quantity::Distance,
    ];

    /// The name used in storage and configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantity::RainfallHourly => "RainfallHourly",
            Quantity::RainAccumulation => "RainAccumulation",
            Quantity::AirTemperature => "AirTemperature",
            Quantity::AirHumidity => "AirHumidity",
            Quantity::BarometricPressure => "BarometricPressure",
            Quantity::WindSpeed => "WindSpeed",
            Quantity::WindDirection => "WindDirection",
            Quantity::LightIntensity => "LightIntensity",
            Quantity::UvIndex => "UvIndex",
            Quantity::Volume => "Volume",
            Quantity::Distance => "Distance",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quantity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownQuantity(s.to_string()))
    }
}

/// A unit symbol attached to a reading or rollup.
///
/// Serializes as its symbol (for example `"mm/hr"` or `"℃"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum Unit {
    Millimeter,
    Centimeter,
    Meter,
    Inch,
    MillimeterPerHour,
    InchPerHour,
    Celsius,
    Fahrenheit,
    Kelvin,
    Pascal,
    Hectopascal,
    Kilopascal,
    Millibar,
    InchOfMercury,
    RelativeHumidity,
    MeterPerSecond,
    KilometerPerHour,
    MilePerHour,
    Knot,
    Degree,
    Lux,
    /// Dimensionless index (UV). Its symbol is the empty string.
    Index,
    Liter,
    Milliliter,
    CubicMeter,
}

impl Unit {
    /// The canonical symbol.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Millimeter => "mm",
            Unit::Centimeter => "cm",
            Unit::Meter => "m",
            Unit::Inch => "in",
            Unit::MillimeterPerHour => "mm/hr",
            Unit::InchPerHour => "in/hr",
            Unit::Celsius => "℃",
            Unit::Fahrenheit => "℉",
            Unit::Kelvin => "K",
            Unit::Pascal => "Pa",
            Unit::Hectopascal => "hPa",
            Unit::Kilopascal => "kPa",
            Unit::Millibar => "mbar",
            Unit::InchOfMercury => "inHg",
            Unit::RelativeHumidity => "%RH",
            Unit::MeterPerSecond => "m/s",
            Unit::KilometerPerHour => "km/h",
            Unit::MilePerHour => "mph",
            Unit::Knot => "kn",
            Unit::Degree => "°",
            Unit::Lux => "Lux",
            Unit::Index => "",
            Unit::Liter => "L",
            Unit::Milliliter => "mL",
            Unit::CubicMeter => "m³",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = ParseError;

    /// Parse a unit symbol.
    ///
    /// Symbols are case-sensitive (`m` and `M` differ in SI), but a few
    /// spellings seen from decoders are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim() {
            "mm" => Unit::Millimeter,
            "cm" => Unit::Centimeter,
            "m" => Unit::Meter,
            "in" => Unit::Inch,
            "mm/hr" | "mm/h" => Unit::MillimeterPerHour,
            "in/hr" | "in/h" => Unit::InchPerHour,
            "℃" | "°C" | "C" => Unit::Celsius,
            "℉" | "°F" | "F" => Unit::Fahrenheit,
            "K" => Unit::Kelvin,
            "Pa" => Unit::Pascal,
            "hPa" => Unit::Hectopascal,
            "kPa" => Unit::Kilopascal,
            "mbar" | "mb" => Unit::Millibar,
            "inHg" => Unit::InchOfMercury,
            "%RH" | "%" => Unit::RelativeHumidity,
            "m/s" => Unit::MeterPerSecond,
            "km/h" | "kph" => Unit::KilometerPerHour,
            "mph" => Unit::MilePerHour,
            "kn" | "kt" => Unit::Knot,
            "°" | "deg" => Unit::Degree,
            "Lux" | "lux" | "lx" => Unit::Lux,
            "" => Unit::Index,
            "L" | "l" => Unit::Liter,
            "mL" | "ml" => Unit::Milliliter,
            "m³" | "m3" => Unit::CubicMeter,
            _ => return Err(ParseError::UnknownUnit(s.to_string())),
        };
        Ok(unit)
    }
}

impl TryFrom<String> for Unit {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.symbol().to_string()
    }
}

/// One calibrated measurement of a single quantity.
///
/// Readings are immutable once written. The Reading Store keys them by
/// `(sensor, quantity, timestamp)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Sensor identifier.
    pub sensor: String,
    pub quantity: Quantity,
    /// When the measurement was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub value: f64,
    /// Unit as emitted by the calibration pipeline.
    pub unit: Unit,
}

impl Reading {
    /// Create a reading.
    pub fn new(
        sensor: impl Into<String>,
        quantity: Quantity,
        timestamp: OffsetDateTime,
        value: f64,
        unit: Unit,
    ) -> Self {
        Self {
            sensor: sensor.into(),
            quantity,
            timestamp,
            value,
            unit,
        }
    }
}

/// Merge key of a rollup record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RollupKey {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub bucket_start: OffsetDateTime,
    pub sensor: String,
    pub quantity: Quantity,
    pub granularity: Granularity,
}

impl fmt::Display for RollupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.sensor, self.quantity, self.granularity, self.bucket_start
        )
    }
}

/// The computed summary for one (bucket, sensor, quantity, granularity).
///
/// `unit` is always the canonical unit of `quantity`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AggregateRecord {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub bucket_start: OffsetDateTime,
    pub granularity: Granularity,
    pub sensor: String,
    pub quantity: Quantity,
    pub value: f64,
    pub unit: Unit,
    /// Number of readings that contributed to `value`.
    pub sample_count: u32,
}

impl AggregateRecord {
    /// The record's merge key.
    #[must_use]
    pub fn key(&self) -> RollupKey {
        RollupKey {
            bucket_start: self.bucket_start,
            sensor: self.sensor.clone(),
            quantity: self.quantity,
            granularity: self.granularity,
        }
    }
}
