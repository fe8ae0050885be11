//! crates/transcript_insights_core/src/pipeline.rs
//!
//! The end-to-end analysis of one submission:
//! extract, validate, embed, persist, aggregate trends, assemble.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::aggregator::{InsightAggregator, DEFAULT_TREND_WINDOW_MONTHS};
use crate::domain::{AnalysisInsights, AnalysisReport, PipelineOutput, TranscriptSubmission};
use crate::embedder::Embedder;
use crate::extractor::Extractor;
use crate::persistence::PersistenceOrchestrator;
use crate::ports::{EmbeddingService, InsightStore, LanguageModelService, PortError};
use crate::retry::RetryPolicy;
use crate::similarity::{SimilarityMatcher, DEFAULT_MAX_RESULTS, DEFAULT_SIMILARITY_THRESHOLD};
use crate::validator::{self, ValidationError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Extraction service unavailable: {0}")]
    ExtractionUnavailable(PortError),

    #[error(transparent)]
    UnrepairableOutput(#[from] ValidationError),

    #[error("Failed to persist analysis: {0}")]
    Persistence(PortError),

    #[error("Meeting {meeting_id} was stored but its follow-ups could not be: {reason}")]
    FollowUpPersistence {
        meeting_id: Uuid,
        reason: PortError,
    },
}

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub extraction_max_attempts: u32,
    pub extraction_timeout: Duration,
    pub embedding_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub similarity_threshold: f32,
    pub similarity_max_results: usize,
    pub trend_window_months: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            extraction_max_attempts: 3,
            extraction_timeout: Duration::from_secs(180),
            embedding_max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            similarity_max_results: DEFAULT_MAX_RESULTS,
            trend_window_months: DEFAULT_TREND_WINDOW_MONTHS,
        }
    }
}

#[derive(Clone)]
pub struct AnalysisPipeline {
    extractor: Extractor,
    embedder: Embedder,
    persistence: PersistenceOrchestrator,
    aggregator: InsightAggregator,
}

impl AnalysisPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModelService>,
        embeddings: Arc<dyn EmbeddingService>,
        store: Arc<dyn InsightStore>,
        settings: PipelineSettings,
    ) -> Self {
        let extraction_retry = RetryPolicy::new(settings.extraction_max_attempts)
            .with_base_delay(settings.retry_base_delay)
            .with_attempt_timeout(settings.extraction_timeout);
        let embedding_retry = RetryPolicy::new(settings.embedding_max_attempts)
            .with_base_delay(settings.retry_base_delay);

        let matcher = SimilarityMatcher::new(store.clone())
            .with_threshold(settings.similarity_threshold)
            .with_max_results(settings.similarity_max_results);
        let aggregator =
            InsightAggregator::new(store.clone()).with_window_months(settings.trend_window_months);

        Self {
            extractor: Extractor::new(llm, extraction_retry),
            embedder: Embedder::new(embeddings, embedding_retry),
            persistence: PersistenceOrchestrator::new(store, matcher, aggregator.clone()),
            aggregator,
        }
    }

    /// Analyses and stores one submission.
    ///
    /// Input is checked before any outbound call. Every run creates a new
    /// meeting, so resubmitting the same transcript is not idempotent.
    #[instrument(
        skip_all,
        fields(company = %submission.company_name, date = %submission.meeting_date)
    )]
    pub async fn run(
        &self,
        submission: TranscriptSubmission,
    ) -> Result<PipelineOutput, PipelineError> {
        validate_submission(&submission)?;

        let raw = self
            .extractor
            .extract(&submission.transcript, submission.meeting_purpose.as_deref())
            .await
            .map_err(PipelineError::ExtractionUnavailable)?;

        let analysis = validator::validate(&raw, submission.meeting_date)?;
        info!(
            additional_pain_points = analysis.additional_pain_points.len(),
            follow_ups = analysis.follow_ups.len(),
            opportunities = analysis.opportunities.len(),
            "Model output validated"
        );

        let embeddings = self.embedder.embed(&analysis.pain_point_texts()).await;

        let outcome = self
            .persistence
            .persist(&analysis, &submission, embeddings)
            .await?;

        let trends = self
            .aggregator
            .aggregate_trends(&analysis, submission.meeting_date)
            .await;

        let skipped_pain_points = outcome.skipped_pain_points();
        Ok(PipelineOutput {
            meeting_id: outcome.meeting.id,
            company_id: outcome.company.id,
            company_name: outcome.company.name,
            analysis_results: AnalysisReport {
                analysis,
                insights: AnalysisInsights {
                    pain_points: outcome.pain_points,
                    recurring_issues: outcome.recurring_issues,
                    trends,
                    skipped_pain_points,
                },
            },
        })
    }
}

/// Rejects submissions with a blank required field.
pub fn validate_submission(submission: &TranscriptSubmission) -> Result<(), PipelineError> {
    let required = [
        ("transcript", &submission.transcript),
        ("userId", &submission.user_id),
        ("companyName", &submission.company_name),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(PipelineError::InvalidInput(format!("{} is required", name)));
        }
    }
    Ok(())
}
