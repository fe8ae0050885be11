//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `InsightStore` port from the `core` crate. It handles all interactions
//! with PostgreSQL (with the pgvector extension) using `sqlx`.
//!
//! Expected tables: `companies` (unique `normalized_name`, `profile` jsonb),
//! `meetings` (`transcript_processed` jsonb), `pain_points` (`embedding` vector),
//! `nx_opportunities`, `follow_ups`, and `recurring_issues` (`occurrences` jsonb).

use async_trait::async_trait;
use chrono::NaiveDate;
use pgvector::Vector;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use transcript_insights_core::domain::{
    normalize_company_name, Company, CompanyProfile, FollowUp, FollowUpStatus, Meeting,
    MeetingDigest, MeetingSummary, NewFollowUp, NewMeeting, NewOpportunity, NewPainPoint,
    Occurrence, RecurringIssue, SimilarPainPoint, SimilarityQuery,
};
use transcript_insights_core::ports::{InsightStore, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `InsightStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Connection-level failures are worth retrying; everything else is not.
fn map_db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn not_found_or(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} not found", what)),
        other => map_db_error(other),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CompanyRecord {
    id: Uuid,
    name: String,
    normalized_name: String,
    profile: Json<CompanyProfile>,
}
impl CompanyRecord {
    fn to_domain(self) -> Company {
        Company {
            id: self.id,
            name: self.name,
            normalized_name: self.normalized_name,
            profile: self.profile.0,
        }
    }
}

#[derive(FromRow)]
struct MeetingRecord {
    id: Uuid,
    company_id: Uuid,
    date: NaiveDate,
    title: String,
    purpose: Option<String>,
    participants: Vec<String>,
    transcript_raw: String,
    transcript_processed: Json<MeetingSummary>,
    created_by: String,
}
impl MeetingRecord {
    fn to_domain(self) -> Meeting {
        Meeting {
            id: self.id,
            company_id: self.company_id,
            date: self.date,
            title: self.title,
            purpose: self.purpose,
            participants: self.participants,
            transcript_raw: self.transcript_raw,
            summary: self.transcript_processed.0,
            created_by: self.created_by,
        }
    }
}

#[derive(FromRow)]
struct DigestRecord {
    meeting_id: Uuid,
    company_id: Uuid,
    company_name: String,
    date: NaiveDate,
    transcript_processed: Json<MeetingSummary>,
}
impl DigestRecord {
    fn to_domain(self) -> MeetingDigest {
        let summary = self.transcript_processed.0;
        MeetingDigest {
            meeting_id: self.meeting_id,
            company_id: self.company_id,
            company_name: self.company_name,
            date: self.date,
            main_pain: summary.main_pain,
            feature_requests: summary.feature_requests,
        }
    }
}

#[derive(FromRow)]
struct SimilarRecord {
    pain_point_id: Uuid,
    description: String,
    source_meeting_id: Uuid,
    meeting_date: NaiveDate,
    company_id: Uuid,
    company_name: Option<String>,
    similarity: f64,
}
impl SimilarRecord {
    fn to_domain(self) -> SimilarPainPoint {
        SimilarPainPoint {
            pain_point_id: self.pain_point_id,
            description: self.description,
            source_meeting_id: self.source_meeting_id,
            meeting_date: self.meeting_date,
            company_id: self.company_id,
            company_name: self.company_name,
            similarity: self.similarity as f32,
        }
    }
}

#[derive(FromRow)]
struct FollowUpRecord {
    id: Uuid,
    meeting_id: Uuid,
    description: String,
    deadline: NaiveDate,
    assigned_to: String,
    status: String,
    meeting_title: String,
    meeting_date: NaiveDate,
    company_name: String,
}
impl FollowUpRecord {
    fn to_domain(self) -> PortResult<FollowUp> {
        let status = self
            .status
            .parse::<FollowUpStatus>()
            .map_err(PortError::Unexpected)?;
        Ok(FollowUp {
            id: self.id,
            meeting_id: self.meeting_id,
            description: self.description,
            deadline: self.deadline,
            assigned_to: self.assigned_to,
            status,
            meeting_title: self.meeting_title,
            meeting_date: self.meeting_date,
            company_name: self.company_name,
        })
    }
}

#[derive(FromRow)]
struct RecurringIssueRecord {
    id: Uuid,
    company_id: Uuid,
    description: String,
    occurrences: Json<Vec<Occurrence>>,
    priority: i32,
    status: String,
}
impl RecurringIssueRecord {
    fn to_domain(self) -> RecurringIssue {
        RecurringIssue {
            id: self.id,
            company_id: self.company_id,
            description: self.description,
            occurrences: self.occurrences.0,
            priority: self.priority.max(0) as u32,
            status: self.status,
        }
    }
}

//=========================================================================================
// `InsightStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl InsightStore for DbAdapter {
    async fn upsert_company(&self, name: &str, profile: &CompanyProfile) -> PortResult<Company> {
        let normalized_name = normalize_company_name(name);
        let record = sqlx::query_as::<_, CompanyRecord>(
            "INSERT INTO companies (id, name, normalized_name, profile) VALUES ($1, $2, $3, $4)
             ON CONFLICT (normalized_name) DO UPDATE SET name = EXCLUDED.name, profile = EXCLUDED.profile
             RETURNING id, name, normalized_name, profile",
        )
        .bind(Uuid::new_v4())
        .bind(name.trim())
        .bind(&normalized_name)
        .bind(Json(profile))
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn insert_meeting(&self, meeting: NewMeeting) -> PortResult<Meeting> {
        let record = sqlx::query_as::<_, MeetingRecord>(
            "INSERT INTO meetings (id, company_id, date, title, purpose, participants, transcript_raw, transcript_processed, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id, company_id, date, title, purpose, participants, transcript_raw, transcript_processed, created_by",
        )
        .bind(Uuid::new_v4())
        .bind(meeting.company_id)
        .bind(meeting.date)
        .bind(&meeting.title)
        .bind(&meeting.purpose)
        .bind(&meeting.participants)
        .bind(&meeting.transcript_raw)
        .bind(Json(&meeting.summary))
        .bind(&meeting.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn get_meeting(&self, meeting_id: Uuid) -> PortResult<Meeting> {
        let record = sqlx::query_as::<_, MeetingRecord>(
            "SELECT id, company_id, date, title, purpose, participants, transcript_raw, transcript_processed, created_by
             FROM meetings WHERE id = $1",
        )
        .bind(meeting_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(format!("Meeting {}", meeting_id)))?;
        Ok(record.to_domain())
    }

    async fn list_meetings_since(&self, since: NaiveDate) -> PortResult<Vec<MeetingDigest>> {
        let records = sqlx::query_as::<_, DigestRecord>(
            "SELECT m.id AS meeting_id, m.company_id, c.name AS company_name, m.date, m.transcript_processed
             FROM meetings m JOIN companies c ON c.id = m.company_id
             WHERE m.date >= $1 ORDER BY m.date ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_pain_point(&self, pain_point: NewPainPoint) -> PortResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO pain_points (id, meeting_id, description, urgency_score, category, related_nx_features, is_main_pain, embedding)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(pain_point.meeting_id)
        .bind(&pain_point.description)
        .bind(i32::from(pain_point.urgency_score))
        .bind(&pain_point.category)
        .bind(&pain_point.related_features)
        .bind(pain_point.is_main_pain)
        .bind(pain_point.embedding.map(Vector::from))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(id)
    }

    async fn insert_opportunity(&self, opportunity: NewOpportunity) -> PortResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO nx_opportunities (id, meeting_id, pain_point_id, nx_feature, confidence_score, suggested_approach)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(opportunity.meeting_id)
        .bind(opportunity.pain_point_id)
        .bind(&opportunity.feature)
        .bind(opportunity.confidence_score)
        .bind(&opportunity.suggested_approach)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(id)
    }

    async fn find_similar_pain_points(
        &self,
        query: &SimilarityQuery,
    ) -> PortResult<Vec<SimilarPainPoint>> {
        let records = sqlx::query_as::<_, SimilarRecord>(
            "SELECT p.id AS pain_point_id, p.description, m.id AS source_meeting_id, m.date AS meeting_date,
                    c.id AS company_id, c.name AS company_name,
                    (1.0 - (p.embedding <=> $1::vector))::float8 AS similarity
             FROM pain_points p
             JOIN meetings m ON m.id = p.meeting_id
             JOIN companies c ON c.id = m.company_id
             WHERE p.embedding IS NOT NULL
               AND ($2::uuid IS NULL OR m.company_id = $2)
               AND ($3::date IS NULL OR m.date >= $3)
               AND ($4::uuid IS NULL OR m.id <> $4)
               AND 1.0 - (p.embedding <=> $1::vector) >= $5
             ORDER BY p.embedding <=> $1::vector
             LIMIT $6",
        )
        .bind(Vector::from(query.embedding.clone()))
        .bind(query.company_id)
        .bind(query.since)
        .bind(query.exclude_meeting_id)
        .bind(f64::from(query.threshold))
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_follow_up(&self, follow_up: NewFollowUp) -> PortResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO follow_ups (id, meeting_id, description, deadline, assigned_to, status)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(follow_up.meeting_id)
        .bind(&follow_up.description)
        .bind(follow_up.deadline)
        .bind(&follow_up.assigned_to)
        .bind(follow_up.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(id)
    }

    async fn list_follow_ups(&self, status: FollowUpStatus) -> PortResult<Vec<FollowUp>> {
        let records = sqlx::query_as::<_, FollowUpRecord>(
            "SELECT f.id, f.meeting_id, f.description, f.deadline, f.assigned_to, f.status,
                    m.title AS meeting_title, m.date AS meeting_date, c.name AS company_name
             FROM follow_ups f
             JOIN meetings m ON m.id = f.meeting_id
             JOIN companies c ON c.id = m.company_id
             WHERE f.status = $1
             ORDER BY f.deadline ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_follow_up_status(
        &self,
        follow_up_id: Uuid,
        status: FollowUpStatus,
    ) -> PortResult<()> {
        let result = sqlx::query("UPDATE follow_ups SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(follow_up_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Follow-up {} not found", follow_up_id)));
        }
        Ok(())
    }

    async fn list_recurring_issues(&self, company_id: Uuid) -> PortResult<Vec<RecurringIssue>> {
        let records = sqlx::query_as::<_, RecurringIssueRecord>(
            "SELECT id, company_id, description, occurrences, priority, status
             FROM recurring_issues WHERE company_id = $1 ORDER BY priority DESC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn upsert_recurring_issue(&self, issue: &RecurringIssue) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO recurring_issues (id, company_id, description, occurrences, priority, status)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET occurrences = EXCLUDED.occurrences,
                 priority = EXCLUDED.priority, status = EXCLUDED.status",
        )
        .bind(issue.id)
        .bind(issue.company_id)
        .bind(&issue.description)
        .bind(Json(&issue.occurrences))
        .bind(i32::try_from(issue.priority).unwrap_or(i32::MAX))
        .bind(&issue.status)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }
}
