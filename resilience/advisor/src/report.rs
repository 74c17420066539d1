use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::{
    client::{Generation, TextGenerator},
    error::AdvisorError,
    prompt::{build_prompt, Advice},
    scoring::{assess, Assessment, Indicators},
};

/// Scores plus whatever the generator produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorReport {
    /// Inputs the report was computed from.
    pub indicators: Indicators,
    /// Deterministic scores.
    pub assessment: Assessment,
    /// Generated advice, or why there is none.
    pub advice: Result<Advice, String>,
}

/// Scores the indicators and asks the generator for mitigation advice.
pub async fn advise(
    generator: &dyn TextGenerator,
    indicators: Indicators,
) -> Result<AdvisorReport, AdvisorError> {
    indicators.validate()?;
    let assessment = assess(&indicators);
    let prompt = build_prompt(&indicators, &assessment);
    let advice = match generator.generate(&prompt).await? {
        Generation::Text(text) => Ok(Advice::from_text(&text)),
        Generation::NoContent { reason } => Err(reason),
    };
    Ok(AdvisorReport {
        indicators,
        assessment,
        advice,
    })
}

impl AdvisorReport {
    /// Text block printed by the CLI.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("\nPrediction Results\n");
        let _ = writeln!(out, "Predicted Sales: {:.2}", self.assessment.predicted_sales);
        let _ = writeln!(out, "Risk Score: {:.2}", self.assessment.risk_score);
        let _ = writeln!(out, "Risk Level: {}", self.assessment.risk_level);
        match &self.advice {
            Ok(advice) => {
                let _ = writeln!(out, "Mitigation Strategy: {}", advice.strategy);
                let _ = writeln!(out, "\nAI Explanation:");
                let _ = writeln!(out, "{}", advice.explanation);
            }
            Err(reason) => {
                let _ = writeln!(out, "Mitigation Strategy: Not generated");
                let _ = writeln!(out, "\nNo response from AI ({reason}).");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubGenerator {
        reply: Generation,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(&self, prompt: &str) -> Result<Generation, AdvisorError> {
            self.prompts.lock().unwrap().push(prompt.to_owned());
            Ok(self.reply.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<Generation, AdvisorError> {
            Err(AdvisorError::Quota("daily limit".into()))
        }
    }

    fn stub(reply: Generation) -> StubGenerator {
        StubGenerator {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn renders_generated_advice() {
        let generator = stub(Generation::Text(
            "Increase buffer stock.\nSupplier scores are strong.".into(),
        ));
        let indicators = Indicators::new(100.0, 2.0, 0.9, 0.8).unwrap();
        let report = advise(&generator, indicators).await.unwrap();
        let text = report.render();
        assert!(text.contains("Predicted Sales: 110.00\n"));
        assert!(text.contains("Risk Score: 0.15\n"));
        assert!(text.contains("Risk Level: Low\n"));
        assert!(text.contains("Mitigation Strategy: Increase buffer stock.\n"));
        assert!(text.contains("AI Explanation:\nSupplier scores are strong.\n"));
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Risk Score: 0.15 (Low)"));
    }

    #[tokio::test]
    async fn no_content_still_reports_scores() {
        let generator = stub(Generation::NoContent {
            reason: "SAFETY".into(),
        });
        let indicators = Indicators::new(100.0, 2.0, 0.3, 0.2).unwrap();
        let report = advise(&generator, indicators).await.unwrap();
        let text = report.render();
        assert!(text.contains("Risk Level: High\n"));
        assert!(text.contains("Mitigation Strategy: Not generated\n"));
        assert!(text.contains("SAFETY"));
    }

    #[tokio::test]
    async fn generator_errors_propagate() {
        let indicators = Indicators::new(1.0, 1.0, 0.5, 0.5).unwrap();
        let err = advise(&FailingGenerator, indicators).await.unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }
}
