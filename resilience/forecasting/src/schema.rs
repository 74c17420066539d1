use thiserror::Error;

use crate::features::Feature;

/// Semantic type of a user-supplied feature value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Non-negative whole number.
    Count,
    /// Real number within inclusive bounds.
    Fraction {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Boolean stored as 0 or 1.
    Flag,
}

/// Errors raised while reading or validating prediction inputs.
#[derive(Debug, Error)]
pub enum InputError {
    /// Value is not a non-negative whole number.
    #[error("{feature}: expected a whole number >= 0, got '{raw}'")]
    NotACount {
        /// Feature being set.
        feature: Feature,
        /// Raw text.
        raw: String,
    },
    /// Value is not a number inside the declared bounds.
    #[error("{feature}: expected a number in [{min}, {max}], got '{raw}'")]
    OutOfRange {
        /// Feature being set.
        feature: Feature,
        /// Raw text.
        raw: String,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Value is not a recognised boolean.
    #[error("{feature}: expected 0 or 1, got '{raw}'")]
    NotAFlag {
        /// Feature being set.
        feature: Feature,
        /// Raw text.
        raw: String,
    },
    /// Lag and rolling columns come from history, not from the user.
    #[error("{0} is derived from the series history and cannot be supplied")]
    DerivedFeature(Feature),
    /// Name does not match any feature.
    #[error("{0}")]
    UnknownFeature(String),
    /// `--set` argument without `=`.
    #[error("malformed assignment '{0}', expected FEATURE=VALUE")]
    MalformedAssignment(String),
    /// No history row to take lag features from.
    #[error("feature table is empty; nothing to carry lag features from")]
    NoHistory,
    /// A required value was never supplied.
    #[error("no value supplied for {0}")]
    MissingValue(Feature),
    /// Input stream closed while a value was still needed.
    #[error("input ended before a value for {0} was entered")]
    EndOfInput(Feature),
    /// Terminal I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FieldKind {
    /// Declared kind of an observed feature; `None` for derived columns.
    #[must_use]
    pub const fn of(feature: Feature) -> Option<Self> {
        match feature {
            Feature::NumShipments => Some(Self::Count),
            Feature::WeatherRisk | Feature::SupplierReliability => {
                Some(Self::Fraction { min: 0.0, max: 1.0 })
            }
            Feature::PortCongestion | Feature::MaintenanceNeeded => Some(Self::Flag),
            Feature::RiskLag1
            | Feature::RiskLag2
            | Feature::RiskLag3
            | Feature::RiskLag7
            | Feature::RollingAvg7 => None,
        }
    }

    /// Validates `raw` against this kind and returns the model value.
    pub fn coerce(self, feature: Feature, raw: &str) -> Result<f64, InputError> {
        let text = raw.trim();
        match self {
            Self::Count => text
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
                .filter(|v| *v <= f64::from(u32::MAX))
                .ok_or_else(|| InputError::NotACount {
                    feature,
                    raw: text.to_owned(),
                }),
            Self::Fraction { min, max } => text
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && (min..=max).contains(v))
                .ok_or_else(|| InputError::OutOfRange {
                    feature,
                    raw: text.to_owned(),
                    min,
                    max,
                }),
            Self::Flag => match text.to_ascii_lowercase().as_str() {
                "1" | "1.0" | "true" | "yes" | "y" => Ok(1.0),
                "0" | "0.0" | "false" | "no" | "n" => Ok(0.0),
                _ => Err(InputError::NotAFlag {
                    feature,
                    raw: text.to_owned(),
                }),
            },
        }
    }
}

/// Coerces a raw value for `feature`, rejecting derived columns.
pub fn coerce_feature(feature: Feature, raw: &str) -> Result<f64, InputError> {
    FieldKind::of(feature)
        .ok_or(InputError::DerivedFeature(feature))?
        .coerce(feature, raw)
}

/// Parses a `FEATURE=VALUE` assignment.
pub fn parse_assignment(raw: &str) -> Result<(Feature, f64), InputError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| InputError::MalformedAssignment(raw.to_owned()))?;
    let feature = name
        .parse::<Feature>()
        .map_err(InputError::UnknownFeature)?;
    Ok((feature, coerce_feature(feature, value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accept_whole_numbers_only() {
        let kind = FieldKind::Count;
        assert!((kind.coerce(Feature::NumShipments, "48").unwrap() - 48.0).abs() < f64::EPSILON);
        assert!((kind.coerce(Feature::NumShipments, " 50.0 ").unwrap() - 50.0).abs() < f64::EPSILON);
        assert!(matches!(
            kind.coerce(Feature::NumShipments, "49.5"),
            Err(InputError::NotACount { .. })
        ));
        assert!(kind.coerce(Feature::NumShipments, "-3").is_err());
        assert!(kind.coerce(Feature::NumShipments, "many").is_err());
    }

    #[test]
    fn fractions_are_bounded() {
        let kind = FieldKind::of(Feature::WeatherRisk).unwrap();
        assert!((kind.coerce(Feature::WeatherRisk, "1").unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((kind.coerce(Feature::WeatherRisk, ".25").unwrap() - 0.25).abs() < f64::EPSILON);
        assert!(matches!(
            kind.coerce(Feature::WeatherRisk, "1.2"),
            Err(InputError::OutOfRange { .. })
        ));
        assert!(kind.coerce(Feature::WeatherRisk, "NaN").is_err());
    }

    #[test]
    fn flags_accept_words_and_digits() {
        let kind = FieldKind::Flag;
        assert!((kind.coerce(Feature::PortCongestion, "yes").unwrap() - 1.0).abs() < f64::EPSILON);
        assert!(kind.coerce(Feature::PortCongestion, "0").unwrap().abs() < f64::EPSILON);
        assert!(matches!(
            kind.coerce(Feature::PortCongestion, "2"),
            Err(InputError::NotAFlag { .. })
        ));
    }

    #[test]
    fn derived_columns_cannot_be_set() {
        assert!(matches!(
            coerce_feature(Feature::RiskLag1, "0.3"),
            Err(InputError::DerivedFeature(Feature::RiskLag1))
        ));
    }

    #[test]
    fn assignments_parse() {
        let (feature, value) = parse_assignment("maintenance_needed=1").unwrap();
        assert_eq!(feature, Feature::MaintenanceNeeded);
        assert!((value - 1.0).abs() < f64::EPSILON);
        assert!(matches!(
            parse_assignment("weather_risk"),
            Err(InputError::MalformedAssignment(_))
        ));
        assert!(matches!(
            parse_assignment("lead_time=3"),
            Err(InputError::UnknownFeature(_))
        ));
    }
}
