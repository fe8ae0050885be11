//! crates/transcript_insights_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport. The ones that
//! travel back to callers derive `Serialize` with camelCase field names.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Placeholder used for any free-text field the model did not supply.
pub const UNKNOWN: &str = "unknown";

/// True for text that carries no information: blank or the `UNKNOWN` placeholder.
pub fn is_placeholder(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.eq_ignore_ascii_case(UNKNOWN)
}

/// Satisfaction score used when the transcript does not state one.
pub const DEFAULT_SATISFACTION: f64 = 5.0;

/// Urgency assigned to the main pain point of every meeting.
pub const MAIN_PAIN_URGENCY: u8 = 10;

//=========================================================================================
// Input
//=========================================================================================

/// A transcript as submitted by a user. Never stored as-is; it seeds a `Meeting`.
#[derive(Debug, Clone)]
pub struct TranscriptSubmission {
    pub transcript: String,
    pub meeting_date: NaiveDate,
    pub meeting_title: Option<String>,
    pub meeting_purpose: Option<String>,
    pub user_id: String,
    pub company_name: String,
}

impl TranscriptSubmission {
    /// The stored meeting title, falling back to "Meeting with <company>".
    pub fn title(&self) -> String {
        match self.meeting_title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Meeting with {}", self.company_name.trim()),
        }
    }
}

//=========================================================================================
// Validated Extraction Output
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudUsageStatus {
    Yes,
    No,
    Considering,
    Unknown,
}

impl CloudUsageStatus {
    /// Lenient parse; anything unrecognised is `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Self::Yes,
            "no" | "false" => Self::No,
            "considering" => Self::Considering,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudUsage {
    pub status: CloudUsageStatus,
    pub reason: Option<String>,
}

impl Default for CloudUsage {
    fn default() -> Self {
        Self {
            status: CloudUsageStatus::Unknown,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdoptionApproach {
    Greenfield,
    Retrofit,
    Unknown,
}

impl AdoptionApproach {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "greenfield" => Self::Greenfield,
            "retrofit" => Self::Retrofit,
            _ => Self::Unknown,
        }
    }
}

/// Whether an advanced feature is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureUsage {
    Yes,
    No,
    Unknown,
}

impl FeatureUsage {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Self::Yes,
            "no" | "false" => Self::No,
            _ => Self::Unknown,
        }
    }
}

/// Satisfaction scores on a 0–10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Satisfaction {
    pub nx: f64,
    pub nx_cloud: f64,
}

impl Default for Satisfaction {
    fn default() -> Self {
        Self {
            nx: DEFAULT_SATISFACTION,
            nx_cloud: DEFAULT_SATISFACTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequests {
    pub nx: Vec<String>,
    pub nx_cloud: Vec<String>,
}

impl FeatureRequests {
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.nx.iter().chain(self.nx_cloud.iter())
    }
}

/// A follow-up commitment with its deadline already resolved to a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFollowUp {
    pub description: String,
    pub deadline: NaiveDate,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPainPoint {
    pub description: String,
    pub urgency_score: u8,
    pub category: String,
    pub related_features: Vec<String>,
}

/// A product opportunity suggested by the model.
///
/// `pain_point_index` 0 refers to the main pain; `k >= 1` refers to
/// `additional_pain_points[k - 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedOpportunity {
    pub feature: String,
    pub confidence_score: f64,
    pub suggested_approach: String,
    pub pain_point_index: usize,
}

/// The validated, fully-defaulted record extracted from one transcript.
///
/// Every list is always present and every enum holds one of its declared values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub main_pain: String,
    pub why_now: String,
    pub call_objective: String,
    pub ci_provider: String,
    pub problematic_tasks: Vec<String>,
    pub technologies_used: Vec<String>,
    pub nx_version: String,
    pub cloud_usage: CloudUsage,
    pub years_using: String,
    pub workspace_size: String,
    pub adoption_approach: AdoptionApproach,
    pub satisfaction: Satisfaction,
    pub feature_requests: FeatureRequests,
    pub current_benefits: Vec<String>,
    pub favorite_features: Vec<String>,
    pub advanced_feature_usage: BTreeMap<String, FeatureUsage>,
    pub participants: Vec<String>,
    pub follow_ups: Vec<ExtractedFollowUp>,
    pub additional_pain_points: Vec<ExtractedPainPoint>,
    pub opportunities: Vec<ExtractedOpportunity>,
    pub executive_summary: String,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            main_pain: UNKNOWN.to_string(),
            why_now: UNKNOWN.to_string(),
            call_objective: UNKNOWN.to_string(),
            ci_provider: UNKNOWN.to_string(),
            problematic_tasks: Vec::new(),
            technologies_used: Vec::new(),
            nx_version: UNKNOWN.to_string(),
            cloud_usage: CloudUsage::default(),
            years_using: UNKNOWN.to_string(),
            workspace_size: UNKNOWN.to_string(),
            adoption_approach: AdoptionApproach::Unknown,
            satisfaction: Satisfaction::default(),
            feature_requests: FeatureRequests::default(),
            current_benefits: Vec::new(),
            favorite_features: Vec::new(),
            advanced_feature_usage: BTreeMap::new(),
            participants: Vec::new(),
            follow_ups: Vec::new(),
            additional_pain_points: Vec::new(),
            opportunities: Vec::new(),
            executive_summary: UNKNOWN.to_string(),
        }
    }
}

impl AnalysisResult {
    /// Pain-point descriptions in persistence order: main pain first.
    pub fn pain_point_texts(&self) -> Vec<String> {
        std::iter::once(self.main_pain.clone())
            .chain(self.additional_pain_points.iter().map(|p| p.description.clone()))
            .collect()
    }

    /// The subset of the analysis stored on the meeting row.
    pub fn summary(&self) -> MeetingSummary {
        MeetingSummary {
            main_pain: self.main_pain.clone(),
            why_now: self.why_now.clone(),
            call_objective: self.call_objective.clone(),
            problematic_tasks: self.problematic_tasks.clone(),
            current_benefits: self.current_benefits.clone(),
            favorite_features: self.favorite_features.clone(),
            feature_requests: self.feature_requests.clone(),
            executive_summary: self.executive_summary.clone(),
        }
    }
}

//=========================================================================================
// Stored Entities
//=========================================================================================

/// Folds case and whitespace so "  Acme   Inc " and "acme inc" share one company.
pub fn normalize_company_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Company attributes overwritten by every new meeting (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub ci_provider: String,
    pub nx_version: String,
    pub cloud_usage: CloudUsage,
    pub years_using: String,
    pub workspace_size: String,
    pub adoption_approach: AdoptionApproach,
    pub technologies_used: Vec<String>,
    pub satisfaction: Satisfaction,
}

impl CompanyProfile {
    pub fn from_analysis(analysis: &AnalysisResult) -> Self {
        Self {
            ci_provider: analysis.ci_provider.clone(),
            nx_version: analysis.nx_version.clone(),
            cloud_usage: analysis.cloud_usage.clone(),
            years_using: analysis.years_using.clone(),
            workspace_size: analysis.workspace_size.clone(),
            adoption_approach: analysis.adoption_approach,
            technologies_used: analysis.technologies_used.clone(),
            satisfaction: analysis.satisfaction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub profile: CompanyProfile,
}

/// The structured subset of an analysis kept with the meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSummary {
    pub main_pain: String,
    pub why_now: String,
    pub call_objective: String,
    pub problematic_tasks: Vec<String>,
    pub current_benefits: Vec<String>,
    pub favorite_features: Vec<String>,
    pub feature_requests: FeatureRequests,
    pub executive_summary: String,
}

#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub company_id: Uuid,
    pub date: NaiveDate,
    pub title: String,
    pub purpose: Option<String>,
    pub participants: Vec<String>,
    pub transcript_raw: String,
    pub summary: MeetingSummary,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: Uuid,
    pub company_id: Uuid,
    pub date: NaiveDate,
    pub title: String,
    pub purpose: Option<String>,
    pub participants: Vec<String>,
    pub transcript_raw: String,
    pub summary: MeetingSummary,
    pub created_by: String,
}

/// Just enough of a historical meeting to compute trends.
#[derive(Debug, Clone)]
pub struct MeetingDigest {
    pub meeting_id: Uuid,
    pub company_id: Uuid,
    pub company_name: String,
    pub date: NaiveDate,
    pub main_pain: String,
    pub feature_requests: FeatureRequests,
}

#[derive(Debug, Clone)]
pub struct NewPainPoint {
    pub meeting_id: Uuid,
    pub description: String,
    pub urgency_score: u8,
    pub category: String,
    pub related_features: Vec<String>,
    pub is_main_pain: bool,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct NewOpportunity {
    pub meeting_id: Uuid,
    pub pain_point_id: Uuid,
    pub feature: String,
    pub confidence_score: f64,
    pub suggested_approach: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpStatus {
    Pending,
    Completed,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for FollowUpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(format!("'{}' is not a follow-up status", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewFollowUp {
    pub meeting_id: Uuid,
    pub description: String,
    pub deadline: NaiveDate,
    pub assigned_to: String,
    pub status: FollowUpStatus,
}

/// A stored follow-up together with the meeting and company it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub description: String,
    pub deadline: NaiveDate,
    pub assigned_to: String,
    pub status: FollowUpStatus,
    pub meeting_title: String,
    pub meeting_date: NaiveDate,
    pub company_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub date: NaiveDate,
    pub meeting_id: Uuid,
    /// The stored pain point this occurrence was recorded from.
    pub pain_point_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringIssue {
    pub id: Uuid,
    pub company_id: Uuid,
    pub description: String,
    pub occurrences: Vec<Occurrence>,
    pub priority: u32,
    pub status: String,
}

//=========================================================================================
// Similarity Search
//=========================================================================================

/// Where to look for similar pain points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Prior pain points of one company (recurring-issue detection).
    Company(Uuid),
    /// Pain points of every company within a trailing window (cross-customer trends).
    Global { window_months: u32 },
}

/// First day of a trailing window of `months` ending at `reference_date`.
pub fn window_start(reference_date: NaiveDate, months: u32) -> NaiveDate {
    reference_date
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// A similarity query as the store sees it, with the scope already resolved.
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    pub embedding: Vec<f32>,
    pub company_id: Option<Uuid>,
    pub since: Option<NaiveDate>,
    pub exclude_meeting_id: Option<Uuid>,
    pub threshold: f32,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarPainPoint {
    pub pain_point_id: Uuid,
    pub description: String,
    pub source_meeting_id: Uuid,
    pub meeting_date: NaiveDate,
    pub company_id: Uuid,
    pub company_name: Option<String>,
    pub similarity: f32,
}

//=========================================================================================
// Trends and Pipeline Output
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequestTrend {
    pub feature: String,
    pub request_count: usize,
    pub companies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PainPointTrend {
    pub pain: String,
    pub is_common: bool,
    pub frequency: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub common_feature_requests: Vec<FeatureRequestTrend>,
    pub common_pain_points: Vec<PainPointTrend>,
}

/// What happened to one pain point during persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PainPointInsight {
    pub description: String,
    pub is_main_pain: bool,
    pub pain_point_id: Option<Uuid>,
    pub urgency_score: u8,
    pub embedded: bool,
    pub opportunities_saved: usize,
    pub recurring_matches: Vec<SimilarPainPoint>,
    pub cross_customer_matches: Vec<SimilarPainPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInsights {
    pub pain_points: Vec<PainPointInsight>,
    pub recurring_issues: Vec<RecurringIssue>,
    pub trends: TrendReport,
    pub skipped_pain_points: usize,
}

/// The extracted fields merged with everything the pipeline learned about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    pub insights: AnalysisInsights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub meeting_id: Uuid,
    pub company_id: Uuid,
    pub company_name: String,
    pub analysis_results: AnalysisReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_names_fold_case_and_whitespace() {
        assert_eq!(normalize_company_name("  Acme   Inc "), "acme inc");
        assert_eq!(normalize_company_name("ACME\tInc"), "acme inc");
    }

    #[test]
    fn blank_title_falls_back_to_company() {
        let submission = TranscriptSubmission {
            transcript: "hello".to_string(),
            meeting_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            meeting_title: Some("   ".to_string()),
            meeting_purpose: None,
            user_id: "user-1".to_string(),
            company_name: "Acme".to_string(),
        };
        assert_eq!(submission.title(), "Meeting with Acme");
    }

    #[test]
    fn default_analysis_uses_documented_placeholders() {
        let analysis = AnalysisResult::default();
        assert_eq!(analysis.main_pain, UNKNOWN);
        assert_eq!(analysis.satisfaction.nx, 5.0);
        assert_eq!(analysis.cloud_usage.status, CloudUsageStatus::Unknown);
        assert!(analysis.follow_ups.is_empty());
    }

    #[test]
    fn window_start_is_calendar_months_back() {
        let reference = NaiveDate::from_ymd_opt(2025, 8, 31).unwrap();
        assert_eq!(window_start(reference, 6), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn follow_up_status_parses_any_case() {
        assert_eq!("Completed".parse::<FollowUpStatus>(), Ok(FollowUpStatus::Completed));
        assert!("done".parse::<FollowUpStatus>().is_err());
    }
}
