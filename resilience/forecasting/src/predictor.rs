use std::io::{BufRead, Write};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    boosting::{GradientBoostedRegressor, TrainingError},
    features::{Feature, FeatureRow, FeatureTable},
    schema::{coerce_feature, parse_assignment, InputError},
};

/// Predicted risk above which rerouting is advised.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;
/// Predicted risk above which closer monitoring is advised.
pub const MODERATE_RISK_THRESHOLD: f64 = 0.4;

/// Complete next-day feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample {
    values: IndexMap<Feature, f64>,
}

impl Sample {
    /// Value of a feature.
    #[must_use]
    pub fn get(&self, feature: Feature) -> f64 {
        self.values.get(&feature).copied().unwrap_or_default()
    }

    /// True when a 0/1 feature is set.
    #[must_use]
    pub fn flag(&self, feature: Feature) -> bool {
        self.get(feature) >= 0.5
    }

    /// Values in [`Feature::ALL`] order.
    #[must_use]
    pub fn vector(&self) -> Vec<f64> {
        Feature::ALL.iter().map(|f| self.get(*f)).collect()
    }

    /// Feature/value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        self.values.iter().map(|(f, v)| (*f, *v))
    }
}

/// Collects observed features for one prediction, carrying lag features from history.
#[derive(Debug, Clone)]
pub struct SampleBuilder {
    history: FeatureRow,
    provided: IndexMap<Feature, f64>,
}

impl SampleBuilder {
    /// Starts a sample whose lag and rolling columns come from the last table row.
    pub fn new(table: &FeatureTable) -> Result<Self, InputError> {
        let history = table.last().cloned().ok_or(InputError::NoHistory)?;
        Ok(Self {
            history,
            provided: IndexMap::new(),
        })
    }

    /// Sets an observed feature from raw text.
    pub fn provide(&mut self, feature: Feature, raw: &str) -> Result<(), InputError> {
        let value = coerce_feature(feature, raw)?;
        self.provided.insert(feature, value);
        Ok(())
    }

    /// Sets an observed feature from a `FEATURE=VALUE` string.
    pub fn provide_assignment(&mut self, raw: &str) -> Result<(), InputError> {
        let (feature, value) = parse_assignment(raw)?;
        self.provided.insert(feature, value);
        Ok(())
    }

    /// Observed features still without a value.
    #[must_use]
    pub fn missing(&self) -> Vec<Feature> {
        Feature::observed()
            .filter(|f| !self.provided.contains_key(f))
            .collect()
    }

    /// Value shown as an example in the prompt for `feature`.
    #[must_use]
    pub fn example(&self, feature: Feature) -> f64 {
        self.history.value(feature)
    }

    /// Prompts for every missing feature, re-asking until the answer validates.
    pub fn prompt_missing<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<(), InputError>
    where
        R: BufRead,
        W: Write,
    {
        for feature in self.missing() {
            loop {
                write!(output, "{feature} (e.g. {:.3}): ", self.example(feature))?;
                output.flush()?;
                let mut line = String::new();
                if input.read_line(&mut line)? == 0 {
                    return Err(InputError::EndOfInput(feature));
                }
                match self.provide(feature, &line) {
                    Ok(()) => break,
                    Err(err) => writeln!(output, "  invalid input: {err}")?,
                }
            }
        }
        Ok(())
    }

    /// Assembles the full vector; fails if an observed feature is still missing.
    pub fn finish(self) -> Result<Sample, InputError> {
        if let Some(feature) = self.missing().into_iter().next() {
            return Err(InputError::MissingValue(feature));
        }
        let values = Feature::ALL
            .into_iter()
            .map(|feature| {
                let value = if feature.is_derived() {
                    self.history.value(feature)
                } else {
                    self.provided.get(&feature).copied().unwrap_or_default()
                };
                (feature, value)
            })
            .collect();
        Ok(Sample { values })
    }
}

/// Predicts next-day risk for a sample. The result is not clamped.
pub fn predict_next(model: &GradientBoostedRegressor, sample: &Sample) -> Result<f64, TrainingError> {
    model.predict_row(&sample.vector())
}

/// Rule-based advice attached to a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Risk above the high threshold.
    HighRisk,
    /// Risk above the moderate threshold.
    ModerateRisk,
    /// Risk at or below the moderate threshold.
    LowRisk,
    /// Maintenance flag set.
    PreventiveMaintenance,
    /// Port congestion flag set.
    PortCoordination,
}

impl Recommendation {
    /// Text printed for the recommendation.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::HighRisk => "High risk of disruption: consider rerouting shipments or increasing inventory buffers.",
            Self::ModerateRisk => "Moderate risk detected: monitor logistics closely and inspect equipment status.",
            Self::LowRisk => "Low disruption risk: maintain current operations.",
            Self::PreventiveMaintenance => "Schedule preventive maintenance to reduce downtime risk.",
            Self::PortCoordination => "Coordinate with port authorities for alternative processing slots.",
        }
    }
}

/// Risk-band advice followed by flag-specific advisories.
#[must_use]
pub fn recommend(risk: f64, sample: &Sample) -> Vec<Recommendation> {
    let band = if risk > HIGH_RISK_THRESHOLD {
        Recommendation::HighRisk
    } else if risk > MODERATE_RISK_THRESHOLD {
        Recommendation::ModerateRisk
    } else {
        Recommendation::LowRisk
    };
    let mut advice = vec![band];
    if sample.flag(Feature::MaintenanceNeeded) {
        advice.push(Recommendation::PreventiveMaintenance);
    }
    if sample.flag(Feature::PortCongestion) {
        advice.push(Recommendation::PortCoordination);
    }
    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{synthesize, SynthesisSettings};
    use std::io::Cursor;

    fn table() -> FeatureTable {
        FeatureTable::build(
            &synthesize(&SynthesisSettings {
                days: 30,
                ..SynthesisSettings::default()
            })
            .unwrap(),
        )
    }

    fn full_sample(table: &FeatureTable, congestion: &str, maintenance: &str) -> Sample {
        let mut builder = SampleBuilder::new(table).unwrap();
        builder.provide(Feature::NumShipments, "50").unwrap();
        builder.provide(Feature::WeatherRisk, "0.5").unwrap();
        builder.provide(Feature::SupplierReliability, "0.9").unwrap();
        builder.provide(Feature::PortCongestion, congestion).unwrap();
        builder.provide(Feature::MaintenanceNeeded, maintenance).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn lag_features_come_from_last_row() {
        let table = table();
        let sample = full_sample(&table, "0", "0");
        let last = table.last().unwrap();
        for feature in Feature::ALL.into_iter().filter(|f| f.is_derived()) {
            assert_eq!(sample.get(feature).to_bits(), last.value(feature).to_bits());
        }
        assert!((sample.get(Feature::WeatherRisk) - 0.5).abs() < f64::EPSILON);
        assert_eq!(sample.vector().len(), Feature::ALL.len());
    }

    #[test]
    fn sample_serializes_as_flat_feature_map() {
        let table = table();
        let sample = full_sample(&table, "1", "0");
        let json = serde_json::to_value(&sample).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), Feature::ALL.len());
        assert_eq!(object["weather_risk"], serde_json::json!(0.5));
        assert_eq!(object["port_congestion"], serde_json::json!(1.0));
        let back: Sample = serde_json::from_value(json).unwrap();
        assert_eq!(back.iter().count(), Feature::ALL.len());
        assert!(back.flag(Feature::PortCongestion));
    }

    #[test]
    fn prompts_until_valid_then_fills_remaining() {
        let table = table();
        let mut builder = SampleBuilder::new(&table).unwrap();
        builder.provide_assignment("port_congestion=1").unwrap();
        let mut input = Cursor::new("lots\n42\n0.3\n0.95\nmaybe\nno\n");
        let mut output = Vec::new();
        builder.prompt_missing(&mut input, &mut output).unwrap();
        let transcript = String::from_utf8(output).unwrap();
        assert!(transcript.starts_with("num_shipments (e.g. "));
        assert_eq!(transcript.matches("invalid input").count(), 2);
        assert!(!transcript.contains("port_congestion ("));
        let sample = builder.finish().unwrap();
        assert!((sample.get(Feature::NumShipments) - 42.0).abs() < f64::EPSILON);
        assert!(sample.flag(Feature::PortCongestion));
        assert!(!sample.flag(Feature::MaintenanceNeeded));
    }

    #[test]
    fn closed_input_is_an_error() {
        let table = table();
        let mut builder = SampleBuilder::new(&table).unwrap();
        let mut input = Cursor::new("55\n");
        let mut output = Vec::new();
        let err = builder.prompt_missing(&mut input, &mut output).unwrap_err();
        assert!(matches!(err, InputError::EndOfInput(Feature::WeatherRisk)));
    }

    #[test]
    fn finish_requires_every_observed_feature() {
        let table = table();
        let builder = SampleBuilder::new(&table).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(InputError::MissingValue(Feature::NumShipments))
        ));
        assert!(matches!(
            SampleBuilder::new(&FeatureTable::default()),
            Err(InputError::NoHistory)
        ));
    }

    #[test]
    fn recommendations_follow_thresholds_and_flags() {
        let table = table();
        let calm = full_sample(&table, "0", "0");
        assert_eq!(recommend(0.71, &calm), vec![Recommendation::HighRisk]);
        assert_eq!(recommend(0.7, &calm), vec![Recommendation::ModerateRisk]);
        assert_eq!(recommend(0.4, &calm), vec![Recommendation::LowRisk]);

        let busy = full_sample(&table, "1", "1");
        assert_eq!(
            recommend(0.2, &busy),
            vec![
                Recommendation::LowRisk,
                Recommendation::PreventiveMaintenance,
                Recommendation::PortCoordination
            ]
        );
        assert!(Recommendation::HighRisk.message().starts_with("High risk"));
    }
}
