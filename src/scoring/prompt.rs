//! Versioned prompt library and scoring-prompt assembly.
//!
//! Templates live as YAML files in `PROMPT_DIR` (`version`, `stable`,
//! `weight`, `system`); the built-in default is used when the directory is
//! absent or empty. Selection is weighted but deterministic per venue so a
//! re-validation of the same record lands on the same prompt version.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::PromptConfig;
use crate::domain::{AuthorityAssessment, CombinedInfo, EntryType, Venue};
use crate::enrichment::EnrichmentOutcome;

/// Built-in scoring prompt, always available.
pub const DEFAULT_PROMPT_VERSION: &str = "v1-default";

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an editorial validator for a vegan-friendly venue directory. You receive one submitted venue together with externally looked-up place data and must judge whether the listing is legitimate, complete, and relevant to the directory.

SCORING RULES:
- Respond ONLY with a JSON object of exactly this shape:
  {"score": <int 0-100>, "notes": "<short reasoning>", "breakdown": {"legitimacy": <int 0-35>, "completeness": <int 0-30>, "relevance": <int 0-35>}}
- The total score must not exceed 100; legitimacy <= 35, completeness <= 30, relevance <= 35.
- If the admin notes forbid approval, emit score 0.
- If the looked-up business status is not operational and the submitter trust level is below 0.8, emit score 0.
- If the looked-up place types clearly mismatch the declared venue type, reduce the score substantially.
- Penalize suspicious, promotional, or placeholder content."#;

/// One loadable template.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    pub version: String,
    #[serde(default = "default_stable")]
    pub stable: bool,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub system: String,
}

fn default_stable() -> bool {
    true
}

fn default_weight() -> u32 {
    1
}

impl PromptTemplate {
    fn built_in() -> Self {
        Self {
            version: DEFAULT_PROMPT_VERSION.to_string(),
            stable: true,
            weight: 1,
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Loaded prompt set with deterministic weighted selection.
pub struct PromptLibrary {
    templates: Vec<PromptTemplate>,
}

impl PromptLibrary {
    /// Load templates per the prompt configuration. Malformed files are
    /// skipped with a warning; an empty result falls back to the built-in
    /// template.
    pub fn load(config: &PromptConfig) -> Self {
        let mut templates = Vec::new();

        if let Some(dir) = &config.dir {
            templates = load_dir(dir);
        }
        if config.stable_only {
            templates.retain(|t| t.stable);
        }
        // Operator-configured weights override file weights.
        for template in &mut templates {
            if let Some((_, weight)) = config
                .weights
                .iter()
                .find(|(name, _)| *name == template.version)
            {
                template.weight = *weight;
            }
        }
        templates.retain(|t| t.weight > 0);

        if templates.is_empty() {
            templates.push(PromptTemplate::built_in());
        }
        debug!(count = templates.len(), "prompt library loaded");
        Self { templates }
    }

    pub fn versions(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.version.as_str()).collect()
    }

    /// Weighted pick, deterministic in the venue id.
    pub fn select_for(&self, venue_id: i64) -> &PromptTemplate {
        let total: u32 = self.templates.iter().map(|t| t.weight).sum();
        let mut slot = (venue_id.unsigned_abs() % u64::from(total.max(1))) as u32;
        for template in &self.templates {
            if slot < template.weight {
                return template;
            }
            slot -= template.weight;
        }
        &self.templates[0]
    }
}

fn load_dir(dir: &Path) -> Vec<PromptTemplate> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "prompt directory unreadable, using built-in prompt");
            return Vec::new();
        }
    };

    let mut templates = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_yaml::from_str::<PromptTemplate>(&raw).map_err(Into::into))
        {
            Ok(template) => templates.push(template),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed prompt template"),
        }
    }
    templates.sort_by(|a, b| a.version.cmp(&b.version));
    templates
}

/// Assemble the user prompt for one scoring call: the combined view, the
/// raw submission, admin notes, lookup facts, classification flags, and
/// the submitter's trust level.
pub fn build_user_prompt(
    venue: &Venue,
    combined: &CombinedInfo,
    enrichment: &EnrichmentOutcome,
    authority: &AuthorityAssessment,
) -> String {
    let combined_json =
        serde_json::to_string_pretty(combined).unwrap_or_else(|_| "{}".to_string());
    let submitted_json = serde_json::to_string_pretty(venue).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = format!("COMBINED VENUE DATA:\n{combined_json}\n\nSUBMITTED RAW DATA:\n{submitted_json}\n");

    if let Some(note) = venue.admin_note.as_deref().filter(|n| !n.trim().is_empty()) {
        prompt.push_str(&format!("\nADMIN NOTES:\n{note}\n"));
    }

    match &enrichment.place {
        Some(place) => {
            prompt.push_str(&format!(
                "\nLOOKUP: place found; business status {}; types [{}]\n",
                place.business_status.as_str(),
                place.types.join(", ")
            ));
        }
        None => prompt.push_str("\nLOOKUP: no matching place found\n"),
    }

    prompt.push_str(&format!(
        "\nCLASSIFICATION: type={}, vegan={}, vegetarian_only={}, category={}\n",
        match venue.entry_type {
            EntryType::Eatery => "eatery",
            EntryType::Store => "store",
        },
        venue.vegan,
        venue.vegetarian_only,
        combined.category,
    ));
    if combined.type_mismatch {
        prompt.push_str("NOTE: looked-up place types mismatch the declared venue type.\n");
    }
    prompt.push_str(&format!(
        "\nSUBMITTER TRUST LEVEL: {:.2} ({})\n",
        authority.trust,
        authority.tier.as_str()
    ));
    prompt.push_str("\nRespond with the JSON object only.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::authority::assess;
    use crate::domain::combined;
    use crate::domain::submitter::test_submitter;
    use crate::domain::venue::test_venue;
    use crate::enrichment::EnrichmentOutcome;

    fn library(weights: Vec<(String, u32)>, stable_only: bool) -> PromptLibrary {
        PromptLibrary::load(&PromptConfig {
            dir: None,
            stable_only,
            weights,
        })
    }

    #[test]
    fn test_empty_library_falls_back_to_built_in() {
        let lib = library(Vec::new(), false);
        assert_eq!(lib.versions(), vec![DEFAULT_PROMPT_VERSION]);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let lib = library(Vec::new(), false);
        let a = lib.select_for(42).version.clone();
        let b = lib.select_for(42).version.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn test_user_prompt_carries_trust_and_notes() {
        let mut venue = test_venue(1);
        venue.admin_note = Some("verify the kitchen is fully vegan".to_string());
        let submitter = test_submitter(7);
        let authority = assess(&submitter, &venue.location);
        let merged = combined::build(&venue, None, &submitter, &authority).unwrap();
        let enrichment = EnrichmentOutcome {
            venue: venue.clone(),
            place: None,
            breakdown: Default::default(),
            distance_meters: None,
            conflicts: 0,
            place_found: false,
            reason: None,
            rating: None,
        };

        let prompt = build_user_prompt(&venue, &merged, &enrichment, &authority);
        assert!(prompt.contains("ADMIN NOTES"));
        assert!(prompt.contains("verify the kitchen"));
        assert!(prompt.contains("SUBMITTER TRUST LEVEL: 0.30"));
        assert!(prompt.contains("no matching place"));
    }

    #[test]
    fn test_default_system_prompt_pins_response_shape() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("\"score\""));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("legitimacy"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("<= 35"));
    }
}
