//! crates/transcript_insights_core/src/aggregator.rs
//!
//! Folds similarity matches into per-company recurring issues and scans the
//! trailing window of meetings for feature-request and main-pain frequency.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    is_placeholder, window_start, AnalysisResult, FeatureRequestTrend, MeetingDigest,
    Occurrence, PainPointTrend, RecurringIssue, SimilarPainPoint, TrendReport,
};
use crate::ports::{InsightStore, PortResult};

pub const DEFAULT_TREND_WINDOW_MONTHS: u32 = 6;
pub const TOP_FEATURE_REQUESTS: usize = 10;
pub const OPEN_ISSUE_STATUS: &str = "open";

//=========================================================================================
// Pure Folds
//=========================================================================================

/// Merges a new matching pain point into the company's recurring issues.
///
/// The issue already tracking the most of the matched pain points is extended;
/// otherwise a new issue is started from the matches. Occurrences are unique
/// per meeting and the priority is `urgency × occurrences`.
pub fn fold_recurring_issue(
    existing: &[RecurringIssue],
    company_id: Uuid,
    description: &str,
    urgency: u8,
    matches: &[SimilarPainPoint],
    current: Occurrence,
) -> RecurringIssue {
    let matched_pain_points: HashSet<Uuid> = matches.iter().map(|m| m.pain_point_id).collect();
    let overlap = |issue: &RecurringIssue| {
        issue
            .occurrences
            .iter()
            .filter(|o| matched_pain_points.contains(&o.pain_point_id))
            .count()
    };

    let mut issue = existing
        .iter()
        .filter(|issue| overlap(*issue) > 0)
        .max_by_key(|issue| overlap(*issue))
        .cloned()
        .unwrap_or_else(|| RecurringIssue {
            id: Uuid::new_v4(),
            company_id,
            description: description.to_string(),
            occurrences: Vec::new(),
            priority: 0,
            status: OPEN_ISSUE_STATUS.to_string(),
        });

    let candidates = matches
        .iter()
        .map(|m| Occurrence {
            date: m.meeting_date,
            meeting_id: m.source_meeting_id,
            pain_point_id: m.pain_point_id,
        })
        .chain(std::iter::once(current));
    for occurrence in candidates {
        if !issue
            .occurrences
            .iter()
            .any(|o| o.meeting_id == occurrence.meeting_id)
        {
            issue.occurrences.push(occurrence);
        }
    }
    issue.occurrences.sort_by_key(|o| o.date);
    issue.priority = u32::from(urgency) * issue.occurrences.len() as u32;
    issue
}

struct Tally {
    feature: String,
    count: usize,
    companies: Vec<String>,
}

/// Feature-request frequency and main-pain recurrence across `meetings`.
pub fn fold_trends(meetings: &[MeetingDigest], main_pain: &str) -> TrendReport {
    let mut tallies: HashMap<String, Tally> = HashMap::new();
    for meeting in meetings {
        for request in meeting.feature_requests.iter() {
            let feature = request.trim();
            if feature.is_empty() {
                continue;
            }
            let tally = tallies
                .entry(feature.to_lowercase())
                .or_insert_with(|| Tally {
                    feature: feature.to_string(),
                    count: 0,
                    companies: Vec::new(),
                });
            tally.count += 1;
            if !tally.companies.contains(&meeting.company_name) {
                tally.companies.push(meeting.company_name.clone());
            }
        }
    }

    let mut common_feature_requests: Vec<FeatureRequestTrend> = tallies
        .into_iter()
        .map(|(_, t)| FeatureRequestTrend {
            feature: t.feature,
            request_count: t.count,
            companies: t.companies,
        })
        .collect();
    common_feature_requests.sort_by(|a, b| {
        b.request_count
            .cmp(&a.request_count)
            .then_with(|| a.feature.to_lowercase().cmp(&b.feature.to_lowercase()))
    });
    common_feature_requests.truncate(TOP_FEATURE_REQUESTS);

    let pain = main_pain.trim();
    let frequency = if is_placeholder(pain) {
        0
    } else {
        let key = pain.to_lowercase();
        meetings
            .iter()
            .filter(|m| m.main_pain.trim().to_lowercase() == key)
            .count()
    };

    TrendReport {
        common_feature_requests,
        common_pain_points: vec![PainPointTrend {
            pain: pain.to_string(),
            is_common: frequency > 1,
            frequency,
        }],
    }
}

//=========================================================================================
// Store-backed Aggregator
//=========================================================================================

#[derive(Clone)]
pub struct InsightAggregator {
    store: Arc<dyn InsightStore>,
    window_months: u32,
}

impl InsightAggregator {
    pub fn new(store: Arc<dyn InsightStore>) -> Self {
        Self {
            store,
            window_months: DEFAULT_TREND_WINDOW_MONTHS,
        }
    }

    pub fn with_window_months(mut self, window_months: u32) -> Self {
        self.window_months = window_months;
        self
    }

    pub fn window_months(&self) -> u32 {
        self.window_months
    }

    /// Reads the company's issues, folds the matches in, and writes the result back.
    pub async fn record_recurring_issue(
        &self,
        company_id: Uuid,
        description: &str,
        urgency: u8,
        matches: &[SimilarPainPoint],
        current: Occurrence,
    ) -> PortResult<RecurringIssue> {
        let existing = self.store.list_recurring_issues(company_id).await?;
        let issue =
            fold_recurring_issue(&existing, company_id, description, urgency, matches, current);
        self.store.upsert_recurring_issue(&issue).await?;
        info!(
            issue_id = %issue.id,
            occurrences = issue.occurrences.len(),
            priority = issue.priority,
            "Recurring issue recorded"
        );
        Ok(issue)
    }

    /// Trends over the window ending at `reference_date`; empty on any read failure.
    pub async fn aggregate_trends(
        &self,
        analysis: &AnalysisResult,
        reference_date: NaiveDate,
    ) -> TrendReport {
        let since = window_start(reference_date, self.window_months);
        match self.store.list_meetings_since(since).await {
            Ok(meetings) => fold_trends(&meetings, &analysis.main_pain),
            Err(e) => {
                warn!(%since, "Trend aggregation failed, returning no trends: {}", e);
                TrendReport::default()
            }
        }
    }
}
