//! crates/transcript_insights_core/src/persistence.rs
//!
//! Writes one validated analysis to the store in dependency order:
//! company, then meeting, then pain points (with their opportunities) running
//! alongside the follow-ups, then recurring issues.
//!
//! Only the company, the meeting and the follow-ups are fatal. Everything that
//! hangs off a single pain point degrades to a logged warning.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::InsightAggregator;
use crate::domain::{
    is_placeholder, AnalysisResult, Company, CompanyProfile, ExtractedOpportunity,
    FollowUpStatus, Meeting, NewFollowUp, NewMeeting, NewOpportunity, NewPainPoint, Occurrence,
    PainPointInsight, RecurringIssue, SearchScope, TranscriptSubmission, MAIN_PAIN_URGENCY,
};
use crate::pipeline::PipelineError;
use crate::ports::{InsightStore, PortResult};
use crate::similarity::SimilarityMatcher;

/// Opportunities below this confidence are not stored.
pub const MIN_OPPORTUNITY_CONFIDENCE: f64 = 0.5;

/// Category stored with the main pain point.
pub const MAIN_PAIN_CATEGORY: &str = "primary";

/// Everything written for one submission.
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub company: Company,
    pub meeting: Meeting,
    pub pain_points: Vec<PainPointInsight>,
    pub recurring_issues: Vec<RecurringIssue>,
    pub follow_ups_saved: usize,
}

impl PersistOutcome {
    pub fn skipped_pain_points(&self) -> usize {
        self.pain_points
            .iter()
            .filter(|p| p.pain_point_id.is_none())
            .count()
    }
}

/// A pain point ready to be written, with the opportunities that point at it.
struct PendingPainPoint<'a> {
    description: String,
    urgency_score: u8,
    category: String,
    related_features: Vec<String>,
    is_main_pain: bool,
    embedding: Option<Vec<f32>>,
    opportunities: Vec<&'a ExtractedOpportunity>,
}

fn opportunities_for(analysis: &AnalysisResult, index: usize) -> Vec<&ExtractedOpportunity> {
    analysis
        .opportunities
        .iter()
        .filter(|o| o.pain_point_index == index)
        .collect()
}

/// Placeholder descriptions keep no embedding, so they are never matched
/// against or folded into recurring issues.
fn pending_pain_points(
    analysis: &AnalysisResult,
    mut embeddings: Vec<Option<Vec<f32>>>,
) -> Vec<PendingPainPoint<'_>> {
    embeddings.resize(analysis.additional_pain_points.len() + 1, None);
    let mut embeddings = embeddings.into_iter();
    let mut embedding_for = |description: &str| {
        embeddings
            .next()
            .flatten()
            .filter(|_| !is_placeholder(description))
    };

    let main_opportunities = opportunities_for(analysis, 0);
    let mut pending = vec![PendingPainPoint {
        description: analysis.main_pain.clone(),
        urgency_score: MAIN_PAIN_URGENCY,
        category: MAIN_PAIN_CATEGORY.to_string(),
        related_features: main_opportunities.iter().map(|o| o.feature.clone()).collect(),
        is_main_pain: true,
        embedding: embedding_for(&analysis.main_pain),
        opportunities: main_opportunities,
    }];

    for (i, extra) in analysis.additional_pain_points.iter().enumerate() {
        pending.push(PendingPainPoint {
            description: extra.description.clone(),
            urgency_score: extra.urgency_score,
            category: extra.category.clone(),
            related_features: extra.related_features.clone(),
            is_main_pain: false,
            embedding: embedding_for(&extra.description),
            opportunities: opportunities_for(analysis, i + 1),
        });
    }
    pending
}

#[derive(Clone)]
pub struct PersistenceOrchestrator {
    store: Arc<dyn InsightStore>,
    matcher: SimilarityMatcher,
    aggregator: InsightAggregator,
}

impl PersistenceOrchestrator {
    pub fn new(
        store: Arc<dyn InsightStore>,
        matcher: SimilarityMatcher,
        aggregator: InsightAggregator,
    ) -> Self {
        Self {
            store,
            matcher,
            aggregator,
        }
    }

    /// Persists `analysis`. `embeddings` follows `AnalysisResult::pain_point_texts`
    /// order; missing entries are treated as "no embedding".
    pub async fn persist(
        &self,
        analysis: &AnalysisResult,
        submission: &TranscriptSubmission,
        embeddings: Vec<Option<Vec<f32>>>,
    ) -> Result<PersistOutcome, PipelineError> {
        // --- Company and meeting (fatal) ---
        let company = self
            .store
            .upsert_company(
                submission.company_name.trim(),
                &CompanyProfile::from_analysis(analysis),
            )
            .await
            .map_err(PipelineError::Persistence)?;

        let meeting = self
            .store
            .insert_meeting(NewMeeting {
                company_id: company.id,
                date: submission.meeting_date,
                title: submission.title(),
                purpose: submission
                    .meeting_purpose
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
                participants: analysis.participants.clone(),
                transcript_raw: submission.transcript.clone(),
                summary: analysis.summary(),
                created_by: submission.user_id.clone(),
            })
            .await
            .map_err(PipelineError::Persistence)?;
        info!(company_id = %company.id, meeting_id = %meeting.id, "Meeting stored");

        // --- Pain points alongside follow-ups ---
        let pending = pending_pain_points(analysis, embeddings);
        let pain_points = join_all(
            pending
                .into_iter()
                .map(|p| self.persist_pain_point(&company, &meeting, p)),
        );
        let follow_ups = self.persist_follow_ups(analysis, submission, meeting.id);
        let (pain_points, follow_ups) = futures::join!(pain_points, follow_ups);

        let follow_ups_saved = follow_ups.map_err(|reason| PipelineError::FollowUpPersistence {
            meeting_id: meeting.id,
            reason,
        })?;

        // --- Recurring issues (sequential, fail-soft) ---
        let mut recurring_issues: Vec<RecurringIssue> = Vec::new();
        for insight in &pain_points {
            let Some(pain_point_id) = insight.pain_point_id else {
                continue;
            };
            if insight.recurring_matches.is_empty() {
                continue;
            }
            let current = Occurrence {
                date: meeting.date,
                meeting_id: meeting.id,
                pain_point_id,
            };
            match self
                .aggregator
                .record_recurring_issue(
                    company.id,
                    &insight.description,
                    insight.urgency_score,
                    &insight.recurring_matches,
                    current,
                )
                .await
            {
                Ok(issue) => {
                    recurring_issues.retain(|i| i.id != issue.id);
                    recurring_issues.push(issue);
                }
                Err(e) => warn!(
                    description = %insight.description,
                    "Failed to record recurring issue, skipping: {}", e
                ),
            }
        }

        let outcome = PersistOutcome {
            company,
            meeting,
            pain_points,
            recurring_issues,
            follow_ups_saved,
        };
        info!(
            meeting_id = %outcome.meeting.id,
            pain_points = outcome.pain_points.len(),
            skipped = outcome.skipped_pain_points(),
            follow_ups = outcome.follow_ups_saved,
            recurring_issues = outcome.recurring_issues.len(),
            "Analysis persisted"
        );
        Ok(outcome)
    }

    /// Searches, inserts, then attaches opportunities for one pain point.
    /// Never fails: an insert error yields an insight without an id.
    async fn persist_pain_point(
        &self,
        company: &Company,
        meeting: &Meeting,
        pending: PendingPainPoint<'_>,
    ) -> PainPointInsight {
        let embedding = pending.embedding.as_deref();
        let (recurring_matches, cross_customer_matches) = futures::join!(
            self.matcher.find_similar(
                embedding,
                SearchScope::Company(company.id),
                meeting.date,
                Some(meeting.id),
            ),
            self.matcher.find_similar(
                embedding,
                SearchScope::Global {
                    window_months: self.aggregator.window_months(),
                },
                meeting.date,
                Some(meeting.id),
            ),
        );

        let mut insight = PainPointInsight {
            description: pending.description.clone(),
            is_main_pain: pending.is_main_pain,
            pain_point_id: None,
            urgency_score: pending.urgency_score,
            embedded: pending.embedding.is_some(),
            opportunities_saved: 0,
            recurring_matches,
            cross_customer_matches,
        };

        let inserted = self
            .store
            .insert_pain_point(NewPainPoint {
                meeting_id: meeting.id,
                description: pending.description,
                urgency_score: pending.urgency_score,
                category: pending.category,
                related_features: pending.related_features,
                is_main_pain: pending.is_main_pain,
                embedding: pending.embedding,
            })
            .await;

        let pain_point_id = match inserted {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    meeting_id = %meeting.id,
                    description = %insight.description,
                    "Failed to store pain point, skipping it and its opportunities: {}", e
                );
                return insight;
            }
        };
        insight.pain_point_id = Some(pain_point_id);

        for opportunity in pending.opportunities {
            if opportunity.confidence_score < MIN_OPPORTUNITY_CONFIDENCE {
                continue;
            }
            let result = self
                .store
                .insert_opportunity(NewOpportunity {
                    meeting_id: meeting.id,
                    pain_point_id,
                    feature: opportunity.feature.clone(),
                    confidence_score: opportunity.confidence_score,
                    suggested_approach: opportunity.suggested_approach.clone(),
                })
                .await;
            match result {
                Ok(_) => insight.opportunities_saved += 1,
                Err(e) => warn!(
                    %pain_point_id,
                    feature = %opportunity.feature,
                    "Failed to store opportunity, skipping: {}", e
                ),
            }
        }
        insight
    }

    async fn persist_follow_ups(
        &self,
        analysis: &AnalysisResult,
        submission: &TranscriptSubmission,
        meeting_id: Uuid,
    ) -> PortResult<usize> {
        for follow_up in &analysis.follow_ups {
            let assigned_to = follow_up
                .assignee
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .unwrap_or(&submission.user_id)
                .to_string();
            self.store
                .insert_follow_up(NewFollowUp {
                    meeting_id,
                    description: follow_up.description.clone(),
                    deadline: follow_up.deadline,
                    assigned_to,
                    status: FollowUpStatus::Pending,
                })
                .await?;
        }
        Ok(analysis.follow_ups.len())
    }
}
