//! crates/transcript_insights_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{
    Company, CompanyProfile, FollowUp, FollowUpStatus, Meeting, MeetingDigest, NewFollowUp,
    NewMeeting, NewOpportunity, NewPainPoint, RecurringIssue, SimilarPainPoint, SimilarityQuery,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A transient failure (timeout, rate limit, connection reset) worth retrying.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl PortError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Unavailable(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait LanguageModelService: Send + Sync {
    /// Runs one completion and returns the model's raw text.
    async fn complete(&self, system_prompt: &str, user_input: &str) -> PortResult<String>;
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Converts a text into a fixed-length vector.
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>>;
}

#[async_trait]
pub trait InsightStore: Send + Sync {
    // --- Companies ---
    /// Creates the company or, when one with the same normalized name exists,
    /// overwrites its display name and profile.
    async fn upsert_company(&self, name: &str, profile: &CompanyProfile) -> PortResult<Company>;

    // --- Meetings ---
    async fn insert_meeting(&self, meeting: NewMeeting) -> PortResult<Meeting>;

    async fn get_meeting(&self, meeting_id: Uuid) -> PortResult<Meeting>;

    /// Meetings dated on or after `since`, across every company.
    async fn list_meetings_since(&self, since: NaiveDate) -> PortResult<Vec<MeetingDigest>>;

    // --- Pain Points and Opportunities ---
    async fn insert_pain_point(&self, pain_point: NewPainPoint) -> PortResult<Uuid>;

    async fn insert_opportunity(&self, opportunity: NewOpportunity) -> PortResult<Uuid>;

    /// Stored pain points whose embedding is at least `query.threshold` similar,
    /// most similar first.
    async fn find_similar_pain_points(
        &self,
        query: &SimilarityQuery,
    ) -> PortResult<Vec<SimilarPainPoint>>;

    // --- Follow-ups ---
    async fn insert_follow_up(&self, follow_up: NewFollowUp) -> PortResult<Uuid>;

    /// Follow-ups with the given status, earliest deadline first.
    async fn list_follow_ups(&self, status: FollowUpStatus) -> PortResult<Vec<FollowUp>>;

    async fn update_follow_up_status(
        &self,
        follow_up_id: Uuid,
        status: FollowUpStatus,
    ) -> PortResult<()>;

    // --- Recurring Issues ---
    /// Recurring issues of one company, highest priority first.
    async fn list_recurring_issues(&self, company_id: Uuid) -> PortResult<Vec<RecurringIssue>>;

    /// Inserts the issue or replaces the row with the same id.
    async fn upsert_recurring_issue(&self, issue: &RecurringIssue) -> PortResult<()>;
}
