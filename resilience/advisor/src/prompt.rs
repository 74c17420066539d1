use serde::{Deserialize, Serialize};

use crate::scoring::{Assessment, Indicators};

/// Builds the analyst prompt for the given indicators and scores.
#[must_use]
pub fn build_prompt(indicators: &Indicators, assessment: &Assessment) -> String {
    format!(
        "You are an AI supply chain risk analyst.\n\
         Given the following inputs:\n\
         \n\
         - Inventory: {:?}\n\
         - Lead Time: {:?}\n\
         - Supplier Score: {:?}\n\
         - Weather Index: {:?}\n\
         - Predicted Sales: {:.2}\n\
         - Risk Score: {:.2} ({})\n\
         \n\
         Provide:\n\
         1. A mitigation strategy for the identified risk level.\n\
         2. A short professional explanation of why this strategy is suitable.\n",
        indicators.inventory,
        indicators.lead_time,
        indicators.supplier_score,
        indicators.weather_index,
        assessment.predicted_sales,
        assessment.risk_score,
        assessment.risk_level,
    )
}

/// Generated advice split into a headline strategy and its explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    /// First line of the generated text.
    pub strategy: String,
    /// Remaining lines, or the whole text when it is a single line.
    pub explanation: String,
}

impl Advice {
    /// Splits generated text at its first newline.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        match text.split_once('\n') {
            Some((first, rest)) => Self {
                strategy: first.trim().to_owned(),
                explanation: rest.trim().to_owned(),
            },
            None => Self {
                strategy: text.trim().to_owned(),
                explanation: text.to_owned(),
            },
        }
    }
}
