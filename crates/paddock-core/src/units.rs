//! Unit registry: canonical units per quantity and conversions into them.
//!
//! Every conversion is affine (`canonical = value * scale + offset`), which
//! covers both plain scalings such as cm to mm and temperature scales.
//! Converting between two non-canonical units goes through the canonical
//! unit of the quantity.

use std::collections::BTreeMap;

use paddock_types::{Quantity, Unit};

use crate::error::{Error, Result};

/// An affine map from one unit into the canonical unit of a quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    scale: f64,
    offset: f64,
}

impl Affine {
    const IDENTITY: Affine = Affine::scale(1.0);

    const fn scale(scale: f64) -> Self {
        Self { scale, offset: 0.0 }
    }

    fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }

    fn invert(&self, value: f64) -> f64 {
        (value - self.offset) / self.scale
    }
}

#[derive(Debug, Clone)]
struct QuantityUnits {
    canonical: Unit,
    accepted: BTreeMap<Unit, Affine>,
}

/// Canonical units and accepted source units for each quantity.
///
/// # Example
///
/// ```
/// use paddock_core::UnitRegistry;
/// use paddock_types::{Quantity, Unit};
///
/// let registry = UnitRegistry::standard();
/// assert_eq!(registry.canonical_unit(Quantity::RainfallHourly), Some(Unit::Millimeter));
///
/// let mm = registry.to_canonical(0.5, Unit::Centimeter, Quantity::RainfallHourly)?;
/// assert_eq!(mm, 5.0);
/// # Ok::<(), paddock_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    quantities: BTreeMap<Quantity, QuantityUnits>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl UnitRegistry {
    /// A registry with no quantities.
    pub fn empty() -> Self {
        Self {
            quantities: BTreeMap::new(),
        }
    }

    /// The built-in table for the farm's sensor catalogue.
    pub fn standard() -> Self {
        const MM_PER_IN: f64 = 25.4;
        let fahrenheit = Affine {
            scale: 5.0 / 9.0,
            offset: -32.0 * 5.0 / 9.0,
        };
        let kelvin = Affine {
            scale: 1.0,
            offset: -273.15,
        };

        Self::empty()
            .with_quantity(Quantity::RainfallHourly, Unit::Millimeter)
            // An hourly rate held for one hour is a depth
            .with_linear(Quantity::RainfallHourly, Unit::MillimeterPerHour, 1.0)
            .with_linear(Quantity::RainfallHourly, Unit::Centimeter, 10.0)
            .with_linear(Quantity::RainfallHourly, Unit::Inch, MM_PER_IN)
            .with_linear(Quantity::RainfallHourly, Unit::InchPerHour, MM_PER_IN)
            .with_quantity(Quantity::RainAccumulation, Unit::Millimeter)
            .with_linear(Quantity::RainAccumulation, Unit::Centimeter, 10.0)
            .with_linear(Quantity::RainAccumulation, Unit::Inch, MM_PER_IN)
            .with_quantity(Quantity::AirTemperature, Unit::Celsius)
            .with_affine(Quantity::AirTemperature, Unit::Fahrenheit, fahrenheit)
            .with_affine(Quantity::AirTemperature, Unit::Kelvin, kelvin)
            .with_quantity(Quantity::AirHumidity, Unit::RelativeHumidity)
            .with_quantity(Quantity::BarometricPressure, Unit::Pascal)
            .with_linear(Quantity::BarometricPressure, Unit::Hectopascal, 100.0)
            .with_linear(Quantity::BarometricPressure, Unit::Kilopascal, 1_000.0)
            .with_linear(Quantity::BarometricPressure, Unit::Millibar, 100.0)
            .with_linear(Quantity::BarometricPressure, Unit::InchOfMercury, 3_386.389)
            .with_quantity(Quantity::WindSpeed, Unit::MeterPerSecond)
            .with_linear(Quantity::WindSpeed, Unit::KilometerPerHour, 1.0 / 3.6)
            .with_linear(Quantity::WindSpeed, Unit::MilePerHour, 0.447_04)
            .with_linear(Quantity::WindSpeed, Unit::Knot, 1_852.0 / 3_600.0)
            .with_quantity(Quantity::WindDirection, Unit::Degree)
            .with_quantity(Quantity::LightIntensity, Unit::Lux)
            .with_quantity(Quantity::UvIndex, Unit::Index)
            .with_quantity(Quantity::Volume, Unit::Liter)
            .with_linear(Quantity::Volume, Unit::Milliliter, 0.001)
            .with_linear(Quantity::Volume, Unit::CubicMeter, 1_000.0)
            .with_quantity(Quantity::Distance, Unit::Millimeter)
            .with_linear(Quantity::Distance, Unit::Centimeter, 10.0)
            .with_linear(Quantity::Distance, Unit::Meter, 1_000.0)
            .with_linear(Quantity::Distance, Unit::Inch, MM_PER_IN)
    }

    /// Register a quantity with its canonical unit, replacing any previous
    /// entry for it.
    #[must_use]
    pub fn with_quantity(mut self, quantity: Quantity, canonical: Unit) -> Self {
        let mut accepted = BTreeMap::new();
        accepted.insert(canonical, Affine::IDENTITY);
        self.quantities
            .insert(quantity, QuantityUnits { canonical, accepted });
        self
    }

    /// Accept `unit` for `quantity`, where one `unit` equals `factor`
    /// canonical units.
    ///
    /// Ignored if `quantity` has not been registered.
    #[must_use]
    pub fn with_linear(self, quantity: Quantity, unit: Unit, factor: f64) -> Self {
        self.with_affine(quantity, unit, Affine::scale(factor))
    }

    #[must_use]
    fn with_affine(mut self, quantity: Quantity, unit: Unit, affine: Affine) -> Self {
        if let Some(entry) = self.quantities.get_mut(&quantity)
            && unit != entry.canonical
        {
            entry.accepted.insert(unit, affine);
        }
        self
    }

    /// The canonical unit for a quantity.
    #[must_use]
    pub fn canonical_unit(&self, quantity: Quantity) -> Option<Unit> {
        self.quantities.get(&quantity).map(|q| q.canonical)
    }

    /// Whether `unit` can be converted for `quantity`.
    #[must_use]
    pub fn accepts(&self, quantity: Quantity, unit: Unit) -> bool {
        self.quantities
            .get(&quantity)
            .is_some_and(|q| q.accepted.contains_key(&unit))
    }

    /// Convert `value` from `from` to `to` as a measurement of `quantity`.
    pub fn convert(&self, value: f64, from: Unit, to: Unit, quantity: Quantity) -> Result<f64> {
        let unsupported = || Error::UnsupportedConversion { quantity, from, to };

        let units = self.quantities.get(&quantity).ok_or_else(unsupported)?;
        let into = units.accepted.get(&from).ok_or_else(unsupported)?;
        let out = units.accepted.get(&to).ok_or_else(unsupported)?;

        if from == to {
            return Ok(value);
        }
        Ok(out.invert(into.apply(value)))
    }

    /// Convert `value` from `from` into the canonical unit of `quantity`.
    pub fn to_canonical(&self, value: f64, from: Unit, quantity: Quantity) -> Result<f64> {
        let units = self
            .quantities
            .get(&quantity)
            .ok_or(Error::UnsupportedConversion {
                quantity,
                from,
                to: from,
            })?;
        let affine = units
            .accepted
            .get(&from)
            .ok_or(Error::UnsupportedConversion {
                quantity,
                from,
                to: units.canonical,
            })?;
        Ok(affine.apply(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_every_quantity_has_canonical_unit() {
        let registry = UnitRegistry::standard();
        for quantity in Quantity::ALL {
            let canonical = registry.canonical_unit(quantity).unwrap();
            assert!(registry.accepts(quantity, canonical));
        }
        assert_eq!(
            registry.canonical_unit(Quantity::AirTemperature),
            Some(Unit::Celsius)
        );
        assert_eq!(registry.canonical_unit(Quantity::UvIndex), Some(Unit::Index));
    }

    #[test]
    fn test_hourly_rate_is_depth() {
        let registry = UnitRegistry::standard();
        let mm = registry
            .to_canonical(2.0, Unit::MillimeterPerHour, Quantity::RainfallHourly)
            .unwrap();
        assert_eq!(mm, 2.0);

        let mm = registry
            .to_canonical(0.1, Unit::InchPerHour, Quantity::RainfallHourly)
            .unwrap();
        assert!(close(mm, 2.54));
    }

    #[test]
    fn test_temperature_scales() {
        let registry = UnitRegistry::standard();
        let c = registry
            .to_canonical(212.0, Unit::Fahrenheit, Quantity::AirTemperature)
            .unwrap();
        assert!(close(c, 100.0));

        let c = registry
            .to_canonical(273.15, Unit::Kelvin, Quantity::AirTemperature)
            .unwrap();
        assert!(close(c, 0.0));
    }

    #[test]
    fn test_convert_between_non_canonical_units() {
        let registry = UnitRegistry::standard();
        // 0 °C in Fahrenheit, via Celsius
        let f = registry
            .convert(273.15, Unit::Kelvin, Unit::Fahrenheit, Quantity::AirTemperature)
            .unwrap();
        assert!(close(f, 32.0));

        let kn = registry
            .convert(36.0, Unit::KilometerPerHour, Unit::Knot, Quantity::WindSpeed)
            .unwrap();
        assert!(close(kn, 10.0 * 3_600.0 / 1_852.0));
    }

    #[test]
    fn test_convert_identity() {
        let registry = UnitRegistry::standard();
        let v = registry
            .convert(1013.25, Unit::Hectopascal, Unit::Hectopascal, Quantity::BarometricPressure)
            .unwrap();
        assert_eq!(v, 1013.25);
    }

    #[test]
    fn test_unit_of_wrong_quantity_is_unsupported() {
        let registry = UnitRegistry::standard();
        let err = registry
            .to_canonical(20.0, Unit::Celsius, Quantity::RainfallHourly)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedConversion {
                quantity: Quantity::RainfallHourly,
                from: Unit::Celsius,
                to: Unit::Millimeter,
            }
        ));

        assert!(
            registry
                .convert(1.0, Unit::Liter, Unit::Meter, Quantity::Volume)
                .is_err()
        );
    }

    #[test]
    fn test_unregistered_quantity() {
        let registry = UnitRegistry::empty();
        assert!(registry.canonical_unit(Quantity::Volume).is_none());
        assert!(
            registry
                .to_canonical(1.0, Unit::Liter, Quantity::Volume)
                .is_err()
        );
    }

    #[test]
    fn test_custom_registration() {
        let registry = UnitRegistry::empty()
            .with_quantity(Quantity::Distance, Unit::Meter)
            .with_linear(Quantity::Distance, Unit::Millimeter, 0.001)
            // Ignored: quantity not registered
            .with_linear(Quantity::Volume, Unit::Milliliter, 0.001);

        let m = registry
            .to_canonical(1500.0, Unit::Millimeter, Quantity::Distance)
            .unwrap();
        assert!(close(m, 1.5));
        assert!(!registry.accepts(Quantity::Volume, Unit::Milliliter));
    }
}
