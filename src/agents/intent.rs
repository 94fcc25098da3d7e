//! Intent classification.
//!
//! Primary path is a single closed-label LLM call; if the call fails or the
//! reply does not parse to one of the three labels, keyword rules take over
//! at a fixed 0.4 confidence. The classifier itself never fails a turn.

use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::context::DatabaseContext;
use crate::llm::LlmGateway;
use crate::prompts;

/// Confidence assigned to rule-based fallback classifications
const FALLBACK_CONFIDENCE: f64 = 0.4;

/// The three intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    Specific,
    ExploratoryAnalytical,
    ExploratoryDescriptive,
}

impl IntentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentLabel::Specific => "specific",
            IntentLabel::ExploratoryAnalytical => "exploratory_analytical",
            IntentLabel::ExploratoryDescriptive => "exploratory_descriptive",
        }
    }
}

impl FromStr for IntentLabel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "specific" => Ok(IntentLabel::Specific),
            "exploratory_analytical" => Ok(IntentLabel::ExploratoryAnalytical),
            "exploratory_descriptive" => Ok(IntentLabel::ExploratoryDescriptive),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification outcome
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub label: IntentLabel,
    pub confidence: f64,
    /// True when keyword rules produced this result instead of the LLM
    pub from_fallback: bool,
}

/// Classifies user utterances into one of the three intents
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify an utterance. Never fails: LLM or parse problems fall back
    /// to keyword rules.
    pub async fn classify(
        &self,
        gateway: &LlmGateway,
        session: Option<Uuid>,
        utterance: &str,
        ctx: &DatabaseContext,
    ) -> Classification {
        let prompt = prompts::intent_prompt(utterance, &ctx.render());
        match gateway
            .complete(session, prompts::INTENT_SYSTEM, &prompt)
            .await
        {
            Ok(reply) => match Self::parse_reply(&reply) {
                Some(classification) => classification,
                None => {
                    warn!(reply = %reply, "intent reply did not parse, using keyword fallback");
                    Self::fallback(utterance, ctx)
                }
            },
            Err(e) => {
                warn!(error = %e, "intent llm call failed, using keyword fallback");
                Self::fallback(utterance, ctx)
            }
        }
    }

    /// Parse `<label> <confidence>` case-insensitively; reject anything else.
    fn parse_reply(reply: &str) -> Option<Classification> {
        let mut parts = reply.split_whitespace();
        let label = parts.next()?.parse::<IntentLabel>().ok()?;
        let confidence = parts
            .next()
            .and_then(|c| c.parse::<f64>().ok())
            .unwrap_or(0.9)
            .clamp(0.0, 1.0);
        Some(Classification {
            label,
            confidence,
            from_fallback: false,
        })
    }

    /// Keyword rules used when the LLM path is unavailable.
    pub fn fallback(utterance: &str, ctx: &DatabaseContext) -> Classification {
        let lower = utterance.to_lowercase();
        let label = Self::fallback_label(&lower, ctx);
        Classification {
            label,
            confidence: FALLBACK_CONFIDENCE,
            from_fallback: true,
        }
    }

    fn fallback_label(lower: &str, ctx: &DatabaseContext) -> IntentLabel {
        let value_interrogative = ["how many", "list", "what is the"]
            .iter()
            .any(|phrase| lower.contains(phrase));
        if value_interrogative && Self::mentions_schema_name(lower, ctx) {
            return IntentLabel::Specific;
        }

        if ["explore", "insights", "suggest", "interesting"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            return IntentLabel::ExploratoryAnalytical;
        }

        if ["describe", "overview", "what's in"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            return IntentLabel::ExploratoryDescriptive;
        }

        IntentLabel::Specific
    }

    fn mentions_schema_name(lower: &str, ctx: &DatabaseContext) -> bool {
        let identifiers = ctx.identifiers();
        let word = Regex::new(r"[a-z_][a-z0-9_]*").unwrap();
        let result = word
            .find_iter(lower)
            .any(|token| identifiers.contains(token.as_str()));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextProvider;
    use crate::schema::SchemaFile;
    use crate::store::{DataStore, StaticStore};
    use std::sync::Arc;

    async fn sales_context() -> DatabaseContext {
        let schema = SchemaFile::parse(
            r#"
tables:
  - name: Sales
    table: sales
    columns:
      - name: sale_id
        type: integer
      - name: sale_date
        type: text
"#,
        )
        .unwrap();
        let store: Arc<dyn DataStore> = Arc::new(StaticStore::new());
        ContextProvider::from_schema(schema)
            .build(&store)
            .await
            .unwrap()
    }

    #[test]
    fn test_label_round_trip() {
        for label in [
            IntentLabel::Specific,
            IntentLabel::ExploratoryAnalytical,
            IntentLabel::ExploratoryDescriptive,
        ] {
            assert_eq!(label.as_str().parse::<IntentLabel>(), Ok(label));
        }
        assert!("banana".parse::<IntentLabel>().is_err());
    }

    #[test]
    fn test_parse_reply() {
        let parsed = IntentClassifier::parse_reply("specific 0.92").unwrap();
        assert_eq!(parsed.label, IntentLabel::Specific);
        assert!((parsed.confidence - 0.92).abs() < 1e-9);

        // Case-insensitive, confidence optional
        let parsed = IntentClassifier::parse_reply("EXPLORATORY_ANALYTICAL").unwrap();
        assert_eq!(parsed.label, IntentLabel::ExploratoryAnalytical);

        assert!(IntentClassifier::parse_reply("maybe specific?").is_none());
    }

    #[tokio::test]
    async fn test_fallback_specific_with_schema_token() {
        let ctx = sales_context().await;
        let c = IntentClassifier::fallback("how many sales happened yesterday?", &ctx);
        assert_eq!(c.label, IntentLabel::Specific);
        assert!((c.confidence - FALLBACK_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_analytical() {
        let ctx = sales_context().await;
        let c = IntentClassifier::fallback("give me some interesting insights", &ctx);
        assert_eq!(c.label, IntentLabel::ExploratoryAnalytical);
    }

    #[tokio::test]
    async fn test_fallback_descriptive() {
        let ctx = sales_context().await;
        let c = IntentClassifier::fallback("describe this dataset for me", &ctx);
        assert_eq!(c.label, IntentLabel::ExploratoryDescriptive);
    }

    #[tokio::test]
    async fn test_fallback_default_is_specific() {
        let ctx = sales_context().await;
        let c = IntentClassifier::fallback("total revenue last month", &ctx);
        assert_eq!(c.label, IntentLabel::Specific);
    }
}
