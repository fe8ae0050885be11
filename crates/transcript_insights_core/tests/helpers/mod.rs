//! Test doubles for the pipeline integration tests.
//!
//! Provides a scripted language model, deterministic embedders, and a store
//! wrapper that fails selected writes.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use uuid::Uuid;

use transcript_insights_core::domain::{
    Company, CompanyProfile, FollowUp, FollowUpStatus, Meeting, MeetingDigest, NewFollowUp,
    NewMeeting, NewOpportunity, NewPainPoint, RecurringIssue, SimilarPainPoint, SimilarityQuery,
    TranscriptSubmission,
};
use transcript_insights_core::{
    AnalysisPipeline, EmbeddingService, InMemoryStore, InsightStore, LanguageModelService,
    PipelineSettings, PortError, PortResult,
};

pub const EMBEDDING_DIMENSION: usize = 256;

//=========================================================================================
// Language Model
//=========================================================================================

/// Replays canned responses in order; the last one repeats once the script runs out.
pub struct ScriptedModel {
    script: Mutex<Vec<PortResult<String>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(script: Vec<PortResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(response: Value) -> Arc<Self> {
        Self::new(vec![Ok(response.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModelService for ScriptedModel {
    async fn complete(&self, _system_prompt: &str, _user_input: &str) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script
                .first()
                .cloned()
                .unwrap_or_else(|| Err(PortError::Unexpected("empty script".to_string())))
        }
    }
}

//=========================================================================================
// Embeddings
//=========================================================================================

/// Bag-of-words hashing embedder: identical texts embed identically and texts
/// without shared words are close to orthogonal.
pub struct HashingEmbedder;

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; EMBEDDING_DIMENSION];
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        let token = token.to_lowercase();
        if token.is_empty() {
            continue;
        }
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();
        let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
        vector[(hash as usize) % EMBEDDING_DIMENSION] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        Ok(hash_embed(text))
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingService for FailingEmbedder {
    async fn embed(&self, _text: &str) -> PortResult<Vec<f32>> {
        Err(PortError::Unavailable("embedding backend down".to_string()))
    }
}

//=========================================================================================
// Store
//=========================================================================================

/// Delegates to an `InMemoryStore`, failing the writes it is told to fail.
pub struct FlakyStore {
    pub inner: Arc<InMemoryStore>,
    fail_pain_point: Option<String>,
    fail_follow_ups: bool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_pain_point: None,
            fail_follow_ups: false,
        }
    }

    /// Fails inserting any pain point with exactly this description.
    pub fn failing_pain_point(mut self, description: &str) -> Self {
        self.fail_pain_point = Some(description.to_string());
        self
    }

    pub fn failing_follow_ups(mut self) -> Self {
        self.fail_follow_ups = true;
        self
    }
}

#[async_trait]
impl InsightStore for FlakyStore {
    async fn upsert_company(&self, name: &str, profile: &CompanyProfile) -> PortResult<Company> {
        self.inner.upsert_company(name, profile).await
    }

    async fn insert_meeting(&self, meeting: NewMeeting) -> PortResult<Meeting> {
        self.inner.insert_meeting(meeting).await
    }

    async fn get_meeting(&self, meeting_id: Uuid) -> PortResult<Meeting> {
        self.inner.get_meeting(meeting_id).await
    }

    async fn list_meetings_since(&self, since: NaiveDate) -> PortResult<Vec<MeetingDigest>> {
        self.inner.list_meetings_since(since).await
    }

    async fn insert_pain_point(&self, pain_point: NewPainPoint) -> PortResult<Uuid> {
        if self.fail_pain_point.as_deref() == Some(pain_point.description.as_str()) {
            return Err(PortError::Unexpected("constraint violation".to_string()));
        }
        self.inner.insert_pain_point(pain_point).await
    }

    async fn insert_opportunity(&self, opportunity: NewOpportunity) -> PortResult<Uuid> {
        self.inner.insert_opportunity(opportunity).await
    }

    async fn find_similar_pain_points(
        &self,
        query: &SimilarityQuery,
    ) -> PortResult<Vec<SimilarPainPoint>> {
        self.inner.find_similar_pain_points(query).await
    }

    async fn insert_follow_up(&self, follow_up: NewFollowUp) -> PortResult<Uuid> {
        if self.fail_follow_ups {
            return Err(PortError::Unavailable("connection reset".to_string()));
        }
        self.inner.insert_follow_up(follow_up).await
    }

    async fn list_follow_ups(&self, status: FollowUpStatus) -> PortResult<Vec<FollowUp>> {
        self.inner.list_follow_ups(status).await
    }

    async fn update_follow_up_status(
        &self,
        follow_up_id: Uuid,
        status: FollowUpStatus,
    ) -> PortResult<()> {
        self.inner.update_follow_up_status(follow_up_id, status).await
    }

    async fn list_recurring_issues(&self, company_id: Uuid) -> PortResult<Vec<RecurringIssue>> {
        self.inner.list_recurring_issues(company_id).await
    }

    async fn upsert_recurring_issue(&self, issue: &RecurringIssue) -> PortResult<()> {
        self.inner.upsert_recurring_issue(issue).await
    }
}

//=========================================================================================
// Fixtures
//=========================================================================================

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        retry_base_delay: Duration::ZERO,
        extraction_timeout: Duration::from_secs(5),
        ..PipelineSettings::default()
    }
}

pub fn pipeline(
    llm: Arc<dyn LanguageModelService>,
    embeddings: Arc<dyn EmbeddingService>,
    store: Arc<dyn InsightStore>,
) -> AnalysisPipeline {
    AnalysisPipeline::new(llm, embeddings, store, fast_settings())
}

pub fn submission(company: &str, meeting_date: NaiveDate) -> TranscriptSubmission {
    TranscriptSubmission {
        transcript: "Dana: our CI on GitHub Actions takes forty minutes per PR.".to_string(),
        meeting_date,
        meeting_title: None,
        meeting_purpose: Some("Discovery call".to_string()),
        user_id: "user-42".to_string(),
        company_name: company.to_string(),
    }
}

/// A well-formed model response with the given pain points.
pub fn analysis_json(main_pain: &str, additional: &[&str]) -> Value {
    let additional: Vec<Value> = additional
        .iter()
        .map(|d| json!({"description": d, "urgencyScore": 6, "category": "ci", "relatedFeatures": []}))
        .collect();
    json!({
        "mainPain": main_pain,
        "whyNow": "Release cadence is slipping",
        "callObjective": "Evaluate remote caching",
        "ciProvider": "GitHub Actions",
        "problematicTasks": ["build", "e2e"],
        "technologiesUsed": ["Angular", "Node"],
        "nxVersion": "17.2",
        "cloudUsage": {"status": "unknown", "reason": null},
        "yearsUsing": "2 years",
        "workspaceSize": "120 projects",
        "adoptionApproach": "retrofit",
        "satisfaction": {"nx": 8, "nxCloud": 5},
        "featureRequests": {"nx": ["Better Gradle support"], "nxCloud": ["Self-hosted agents"]},
        "currentBenefits": ["Affected commands"],
        "favoriteFeatures": ["Project graph"],
        "advancedFeatureUsage": {"distributedTaskExecution": "no"},
        "participants": ["Dana", "Lee"],
        "followUps": [{"description": "Send Nx Cloud trial link", "deadline": "ASAP", "assignee": null}],
        "additionalPainPoints": additional,
        "opportunities": [
            {"feature": "Nx Agents", "confidenceScore": 0.9, "suggestedApproach": "Run a DTE pilot", "painPointIndex": 0},
            {"feature": "Nx Replay", "confidenceScore": 0.3, "suggestedApproach": "Mention caching", "painPointIndex": 0}
        ],
        "executiveSummary": "Acme is blocked by slow CI."
    })
}
