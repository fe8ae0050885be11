//! crates/transcript_insights_core/src/extractor.rs
//!
//! Sends a transcript to the language model together with the fixed extraction
//! instructions and returns the model's raw text. Parsing happens in `validator`.

use std::sync::Arc;

use tracing::{error, info};

use crate::ports::{LanguageModelService, PortResult};
use crate::retry::RetryPolicy;

pub const SYSTEM_INSTRUCTIONS: &str = r#"You are an expert at analysing sales and customer-success meeting transcripts for a developer-tooling company whose products are Nx (a monorepo build system) and Nx Cloud (remote caching and distributed task execution).

Read the transcript and respond with ONE JSON object and nothing else: no markdown, no code fences, no commentary.

The object MUST contain every key below. When the transcript does not say something, use the stated default instead of guessing.

{
  "mainPain": string,                 // the single most important problem the customer described; default "unknown"
  "whyNow": string,                   // why they are looking at this now; default "unknown"
  "callObjective": string,            // what the call was meant to achieve; default "unknown"
  "ciProvider": string,               // e.g. "GitHub Actions", "Jenkins"; default "unknown"
  "problematicTasks": [string],       // tasks that are slow or flaky, most painful first; default []
  "technologiesUsed": [string],       // frameworks, languages, tools; default []
  "nxVersion": string,                // default "unknown"
  "cloudUsage": {"status": "yes" | "no" | "considering" | "unknown", "reason": string | null},
  "yearsUsing": string,               // how long they have used Nx; default "unknown"
  "workspaceSize": string,            // projects, developers, or repo size as stated; default "unknown"
  "adoptionApproach": "greenfield" | "retrofit" | "unknown",
  "satisfaction": {"nx": number, "nxCloud": number},   // 0-10; use 5 when not stated, use 0 ONLY if they explicitly said 0
  "featureRequests": {"nx": [string], "nxCloud": [string]},
  "currentBenefits": [string],
  "favoriteFeatures": [string],
  "advancedFeatureUsage": {"<feature name>": "yes" | "no" | "unknown"},
  "participants": [string],
  "followUps": [{"description": string, "deadline": "YYYY-MM-DD" | "ASAP", "assignee": string | null}],
  "additionalPainPoints": [{"description": string, "urgencyScore": number 0-10, "category": string, "relatedFeatures": [string]}],
  "opportunities": [{"feature": string, "confidenceScore": number 0-1, "suggestedApproach": string, "painPointIndex": number}],
  "executiveSummary": string          // three to five sentences
}

Rules:
- Do not repeat the main pain inside additionalPainPoints.
- painPointIndex is 0 for the main pain, or 1 + the position of the related entry in additionalPainPoints.
- Only include opportunities that a specific Nx or Nx Cloud feature could address.
- Use an explicit date for a follow-up deadline only when one was stated; otherwise write "ASAP".
- Every list must be present, even when empty."#;

/// Builds the user message: optional meeting purpose followed by the transcript.
pub fn build_user_input(transcript: &str, purpose: Option<&str>) -> String {
    match purpose.map(str::trim).filter(|p| !p.is_empty()) {
        Some(purpose) => format!(
            "MEETING PURPOSE: {}\n\nTRANSCRIPT:\n---\n{}\n---",
            purpose, transcript
        ),
        None => format!("TRANSCRIPT:\n---\n{}\n---", transcript),
    }
}

#[derive(Clone)]
pub struct Extractor {
    llm: Arc<dyn LanguageModelService>,
    retry: RetryPolicy,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LanguageModelService>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    /// Returns the raw model output for one transcript.
    ///
    /// Transient failures are retried under the configured policy; the last
    /// error is returned once the budget is spent.
    pub async fn extract(&self, transcript: &str, purpose: Option<&str>) -> PortResult<String> {
        let user_input = build_user_input(transcript, purpose);
        info!(
            transcript_chars = transcript.len(),
            max_attempts = self.retry.max_attempts(),
            "Requesting transcript extraction"
        );

        let result = self
            .retry
            .run("extraction", || self.llm.complete(SYSTEM_INSTRUCTIONS, &user_input))
            .await;

        match &result {
            Ok(raw) => info!(output_chars = raw.len(), "Extraction returned"),
            Err(e) => error!("Extraction failed: {}", e),
        }
        result
    }
}
