//! crates/transcript_insights_core/src/memory.rs
//!
//! An `InsightStore` kept entirely in process memory, used by the test suites.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    normalize_company_name, Company, CompanyProfile, FollowUp, FollowUpStatus, Meeting,
    MeetingDigest, NewFollowUp, NewMeeting, NewOpportunity, NewPainPoint, RecurringIssue,
    SimilarPainPoint, SimilarityQuery,
};
use crate::ports::{InsightStore, PortError, PortResult};
use crate::similarity::cosine_similarity;

/// A stored row: the generated id plus what was inserted.
#[derive(Debug, Clone)]
pub struct Stored<T> {
    pub id: Uuid,
    pub record: T,
}

#[derive(Default)]
struct State {
    companies: HashMap<Uuid, Company>,
    meetings: HashMap<Uuid, Meeting>,
    pain_points: Vec<Stored<NewPainPoint>>,
    opportunities: Vec<Stored<NewOpportunity>>,
    follow_ups: Vec<Stored<NewFollowUp>>,
    recurring_issues: HashMap<Uuid, RecurringIssue>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn companies(&self) -> Vec<Company> {
        self.state.lock().await.companies.values().cloned().collect()
    }

    pub async fn pain_points(&self, meeting_id: Uuid) -> Vec<Stored<NewPainPoint>> {
        self.state
            .lock()
            .await
            .pain_points
            .iter()
            .filter(|p| p.record.meeting_id == meeting_id)
            .cloned()
            .collect()
    }

    pub async fn opportunities(&self, meeting_id: Uuid) -> Vec<Stored<NewOpportunity>> {
        self.state
            .lock()
            .await
            .opportunities
            .iter()
            .filter(|o| o.record.meeting_id == meeting_id)
            .cloned()
            .collect()
    }

    pub async fn follow_ups(&self, meeting_id: Uuid) -> Vec<Stored<NewFollowUp>> {
        self.state
            .lock()
            .await
            .follow_ups
            .iter()
            .filter(|f| f.record.meeting_id == meeting_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InsightStore for InMemoryStore {
    async fn upsert_company(&self, name: &str, profile: &CompanyProfile) -> PortResult<Company> {
        let normalized_name = normalize_company_name(name);
        let mut state = self.state.lock().await;

        if let Some(company) = state
            .companies
            .values_mut()
            .find(|c| c.normalized_name == normalized_name)
        {
            company.name = name.trim().to_string();
            company.profile = profile.clone();
            return Ok(company.clone());
        }

        let company = Company {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            normalized_name,
            profile: profile.clone(),
        };
        state.companies.insert(company.id, company.clone());
        Ok(company)
    }

    async fn insert_meeting(&self, meeting: NewMeeting) -> PortResult<Meeting> {
        let mut state = self.state.lock().await;
        if !state.companies.contains_key(&meeting.company_id) {
            return Err(PortError::NotFound(format!("company {}", meeting.company_id)));
        }
        let stored = Meeting {
            id: Uuid::new_v4(),
            company_id: meeting.company_id,
            date: meeting.date,
            title: meeting.title,
            purpose: meeting.purpose,
            participants: meeting.participants,
            transcript_raw: meeting.transcript_raw,
            summary: meeting.summary,
            created_by: meeting.created_by,
        };
        state.meetings.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_meeting(&self, meeting_id: Uuid) -> PortResult<Meeting> {
        self.state
            .lock()
            .await
            .meetings
            .get(&meeting_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("meeting {}", meeting_id)))
    }

    async fn list_meetings_since(&self, since: NaiveDate) -> PortResult<Vec<MeetingDigest>> {
        let state = self.state.lock().await;
        let mut digests: Vec<MeetingDigest> = state
            .meetings
            .values()
            .filter(|m| m.date >= since)
            .map(|m| MeetingDigest {
                meeting_id: m.id,
                company_id: m.company_id,
                company_name: state
                    .companies
                    .get(&m.company_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_default(),
                date: m.date,
                main_pain: m.summary.main_pain.clone(),
                feature_requests: m.summary.feature_requests.clone(),
            })
            .collect();
        digests.sort_by_key(|d| d.date);
        Ok(digests)
    }

    async fn insert_pain_point(&self, pain_point: NewPainPoint) -> PortResult<Uuid> {
        let mut state = self.state.lock().await;
        if !state.meetings.contains_key(&pain_point.meeting_id) {
            return Err(PortError::NotFound(format!("meeting {}", pain_point.meeting_id)));
        }
        let id = Uuid::new_v4();
        state.pain_points.push(Stored { id, record: pain_point });
        Ok(id)
    }

    async fn insert_opportunity(&self, opportunity: NewOpportunity) -> PortResult<Uuid> {
        let mut state = self.state.lock().await;
        if !state.pain_points.iter().any(|p| p.id == opportunity.pain_point_id) {
            return Err(PortError::NotFound(format!(
                "pain point {}",
                opportunity.pain_point_id
            )));
        }
        let id = Uuid::new_v4();
        state.opportunities.push(Stored { id, record: opportunity });
        Ok(id)
    }

    async fn find_similar_pain_points(
        &self,
        query: &SimilarityQuery,
    ) -> PortResult<Vec<SimilarPainPoint>> {
        let state = self.state.lock().await;
        let mut matches: Vec<SimilarPainPoint> = state
            .pain_points
            .iter()
            .filter(|p| Some(p.record.meeting_id) != query.exclude_meeting_id)
            .filter_map(|p| {
                let embedding = p.record.embedding.as_deref()?;
                let meeting = state.meetings.get(&p.record.meeting_id)?;
                if query.company_id.is_some_and(|id| id != meeting.company_id) {
                    return None;
                }
                if query.since.is_some_and(|since| meeting.date < since) {
                    return None;
                }
                let similarity = cosine_similarity(&query.embedding, embedding);
                (similarity >= query.threshold).then(|| SimilarPainPoint {
                    pain_point_id: p.id,
                    description: p.record.description.clone(),
                    source_meeting_id: meeting.id,
                    meeting_date: meeting.date,
                    company_id: meeting.company_id,
                    company_name: state.companies.get(&meeting.company_id).map(|c| c.name.clone()),
                    similarity,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(query.limit);
        Ok(matches)
    }

    async fn insert_follow_up(&self, follow_up: NewFollowUp) -> PortResult<Uuid> {
        let mut state = self.state.lock().await;
        if !state.meetings.contains_key(&follow_up.meeting_id) {
            return Err(PortError::NotFound(format!("meeting {}", follow_up.meeting_id)));
        }
        let id = Uuid::new_v4();
        state.follow_ups.push(Stored { id, record: follow_up });
        Ok(id)
    }

    async fn list_follow_ups(&self, status: FollowUpStatus) -> PortResult<Vec<FollowUp>> {
        let state = self.state.lock().await;
        let mut follow_ups: Vec<FollowUp> = state
            .follow_ups
            .iter()
            .filter(|f| f.record.status == status)
            .filter_map(|f| {
                let meeting = state.meetings.get(&f.record.meeting_id)?;
                Some(FollowUp {
                    id: f.id,
                    meeting_id: meeting.id,
                    description: f.record.description.clone(),
                    deadline: f.record.deadline,
                    assigned_to: f.record.assigned_to.clone(),
                    status: f.record.status,
                    meeting_title: meeting.title.clone(),
                    meeting_date: meeting.date,
                    company_name: state
                        .companies
                        .get(&meeting.company_id)
                        .map(|c| c.name.clone())
                        .unwrap_or_default(),
                })
            })
            .collect();
        follow_ups.sort_by_key(|f| f.deadline);
        Ok(follow_ups)
    }

    async fn update_follow_up_status(
        &self,
        follow_up_id: Uuid,
        status: FollowUpStatus,
    ) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let follow_up = state
            .follow_ups
            .iter_mut()
            .find(|f| f.id == follow_up_id)
            .ok_or_else(|| PortError::NotFound(format!("follow-up {}", follow_up_id)))?;
        follow_up.record.status = status;
        Ok(())
    }

    async fn list_recurring_issues(&self, company_id: Uuid) -> PortResult<Vec<RecurringIssue>> {
        let state = self.state.lock().await;
        let mut issues: Vec<RecurringIssue> = state
            .recurring_issues
            .values()
            .filter(|i| i.company_id == company_id)
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(issues)
    }

    async fn upsert_recurring_issue(&self, issue: &RecurringIssue) -> PortResult<()> {
        self.state
            .lock()
            .await
            .recurring_issues
            .insert(issue.id, issue.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisResult, FollowUpStatus};

    fn profile() -> CompanyProfile {
        CompanyProfile::from_analysis(&AnalysisResult::default())
    }

    fn new_meeting(company_id: Uuid, date: NaiveDate) -> NewMeeting {
        NewMeeting {
            company_id,
            date,
            title: "Sync".to_string(),
            purpose: None,
            participants: vec![],
            transcript_raw: "...".to_string(),
            summary: AnalysisResult::default().summary(),
            created_by: "user-1".to_string(),
        }
    }

    fn pain(meeting_id: Uuid, embedding: Vec<f32>) -> NewPainPoint {
        NewPainPoint {
            meeting_id,
            description: "slow builds".to_string(),
            urgency_score: 7,
            category: "performance".to_string(),
            related_features: vec![],
            is_main_pain: false,
            embedding: Some(embedding),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_normalized_name() {
        let store = InMemoryStore::new();
        let first = store.upsert_company("Acme Inc", &profile()).await.unwrap();
        let second = store.upsert_company("  ACME   inc ", &profile()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "ACME   inc");
        assert_eq!(store.companies().await.len(), 1);
    }

    #[tokio::test]
    async fn similarity_search_respects_scope_and_exclusion() {
        let store = InMemoryStore::new();
        let acme = store.upsert_company("Acme", &profile()).await.unwrap();
        let globex = store.upsert_company("Globex", &profile()).await.unwrap();

        let old = store.insert_meeting(new_meeting(acme.id, day(2))).await.unwrap();
        let other = store.insert_meeting(new_meeting(globex.id, day(3))).await.unwrap();
        let current = store.insert_meeting(new_meeting(acme.id, day(20))).await.unwrap();

        store.insert_pain_point(pain(old.id, vec![1.0, 0.0])).await.unwrap();
        store.insert_pain_point(pain(other.id, vec![0.9, 0.1])).await.unwrap();
        store.insert_pain_point(pain(current.id, vec![1.0, 0.0])).await.unwrap();

        let mut query = SimilarityQuery {
            embedding: vec![1.0, 0.0],
            company_id: Some(acme.id),
            since: None,
            exclude_meeting_id: Some(current.id),
            threshold: 0.85,
            limit: 10,
        };
        let company_matches = store.find_similar_pain_points(&query).await.unwrap();
        assert_eq!(company_matches.len(), 1);
        assert_eq!(company_matches[0].source_meeting_id, old.id);

        query.company_id = None;
        let global = store.find_similar_pain_points(&query).await.unwrap();
        assert_eq!(global.len(), 2);
        assert!(global[0].similarity >= global[1].similarity);

        query.since = Some(day(3));
        let windowed = store.find_similar_pain_points(&query).await.unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].company_name.as_deref(), Some("Globex"));
    }

    #[tokio::test]
    async fn follow_up_status_can_be_completed() {
        let store = InMemoryStore::new();
        let acme = store.upsert_company("Acme", &profile()).await.unwrap();
        let meeting = store.insert_meeting(new_meeting(acme.id, day(5))).await.unwrap();
        let id = store
            .insert_follow_up(NewFollowUp {
                meeting_id: meeting.id,
                description: "Send pricing".to_string(),
                deadline: day(6),
                assigned_to: "user-1".to_string(),
                status: FollowUpStatus::Pending,
            })
            .await
            .unwrap();

        store.update_follow_up_status(id, FollowUpStatus::Completed).await.unwrap();

        assert!(store.list_follow_ups(FollowUpStatus::Pending).await.unwrap().is_empty());
        let done = store.list_follow_ups(FollowUpStatus::Completed).await.unwrap();
        assert_eq!(done[0].company_name, "Acme");
        assert!(matches!(
            store.update_follow_up_status(Uuid::new_v4(), FollowUpStatus::Completed).await,
            Err(PortError::NotFound(_))
        ));
    }
}
