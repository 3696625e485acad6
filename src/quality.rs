//! Quality reviewer: content-rewrite suggestions for listings headed to
//! an editor.
//!
//! Suggestions only ever feed the approval-data merge; nothing here writes
//! to a record directly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{CombinedInfo, Venue};
use crate::error::PipelineResult;
use crate::scoring::ChatModel;

/// Token budget for content review, more generous than scoring.
const REVIEW_MAX_TOKENS: u32 = 500;

const REVIEW_SYSTEM_PROMPT: &str = r#"You are an editor for a venue directory. Given one venue listing, propose cleaned-up content. Respond ONLY with a JSON object:
{"name": "<improved name or empty string>", "description": "<improved description or empty string>", "reasons": ["<short reason per change>"]}
Keep the venue's identity intact: fix casing, remove promotional filler, tighten grammar. Leave a field empty when the original needs no change."#;

/// Rewrite suggestions as parsed from the model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteSuggestions {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl RewriteSuggestions {
    pub fn suggested_name(&self) -> Option<&str> {
        let trimmed = self.name.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub fn suggested_description(&self) -> Option<&str> {
        let trimmed = self.description.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

pub struct QualityReviewer {
    model: Arc<dyn ChatModel>,
}

impl QualityReviewer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Produce rewrite suggestions for one venue. A malformed model
    /// response degrades to empty suggestions rather than an error.
    pub async fn review_content(
        &self,
        venue: &Venue,
        combined: &CombinedInfo,
    ) -> PipelineResult<RewriteSuggestions> {
        let user_prompt = format!(
            "VENUE NAME: {}\nDESCRIPTION: {}\nCATEGORY: {}\nVEGAN STATUS: {}\n\nRespond with the JSON object only.",
            venue.name,
            venue.description.as_deref().unwrap_or("(none)"),
            combined.category,
            combined.vegan_status,
        );

        let output = self
            .model
            .chat_json(REVIEW_SYSTEM_PROMPT, &user_prompt, REVIEW_MAX_TOKENS)
            .await?;

        match serde_json::from_str::<RewriteSuggestions>(&output.content) {
            Ok(suggestions) => Ok(suggestions),
            Err(e) => {
                warn!(venue_id = venue.id, error = %e, "rewrite suggestions unparseable");
                Ok(RewriteSuggestions::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::authority::assess;
    use crate::domain::combined;
    use crate::domain::submitter::test_submitter;
    use crate::domain::venue::test_venue;
    use crate::error::PipelineError;
    use crate::scoring::ChatOutput;
    use async_trait::async_trait;

    struct StubModel(String);

    #[async_trait]
    impl ChatModel for StubModel {
        async fn chat_json(
            &self,
            _system: &str,
            _user: &str,
            _max_tokens: u32,
        ) -> Result<ChatOutput, PipelineError> {
            Ok(ChatOutput {
                content: self.0.clone(),
                usage: None,
            })
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn combined_for(venue: &Venue) -> CombinedInfo {
        let submitter = test_submitter(7);
        let authority = assess(&submitter, &venue.location);
        combined::build(venue, None, &submitter, &authority).unwrap()
    }

    #[tokio::test]
    async fn test_review_parses_suggestions() {
        let reviewer = QualityReviewer::new(Arc::new(StubModel(
            r#"{"name": "Green Leaf Kitchen", "description": "", "reasons": ["title case"]}"#
                .to_string(),
        )));
        let venue = test_venue(1);
        let suggestions = reviewer
            .review_content(&venue, &combined_for(&venue))
            .await
            .unwrap();
        assert_eq!(suggestions.suggested_name(), Some("Green Leaf Kitchen"));
        assert!(suggestions.suggested_description().is_none());
        assert_eq!(suggestions.reasons.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_degrades_to_empty() {
        let reviewer = QualityReviewer::new(Arc::new(StubModel("not json".to_string())));
        let venue = test_venue(1);
        let suggestions = reviewer
            .review_content(&venue, &combined_for(&venue))
            .await
            .unwrap();
        assert!(suggestions.suggested_name().is_none());
        assert!(suggestions.reasons.is_empty());
    }
}
