//! End-to-end runs of the analysis pipeline against the in-memory store.

mod helpers;

use std::sync::Arc;

use chrono::Days;
use serde_json::json;

use helpers::*;
use transcript_insights_core::domain::{CloudUsageStatus, FollowUpStatus};
use transcript_insights_core::{InMemoryStore, InsightStore, PipelineError, PortError};

#[tokio::test]
async fn github_actions_without_cloud_is_analysed_and_stored() {
    let store = Arc::new(InMemoryStore::new());
    let model =
        ScriptedModel::always(analysis_json("CI takes forty minutes per pull request", &[]));
    let pipeline = pipeline(model.clone(), Arc::new(HashingEmbedder), store.clone());
    let meeting_date = date(2025, 3, 14);

    let output = pipeline.run(submission("Acme", meeting_date)).await.unwrap();

    assert_eq!(model.calls(), 1);
    assert_eq!(output.company_name, "Acme");
    let analysis = &output.analysis_results.analysis;
    assert_eq!(analysis.ci_provider, "GitHub Actions");
    assert_eq!(analysis.cloud_usage.status, CloudUsageStatus::Unknown);
    assert_eq!(analysis.satisfaction.nx_cloud, 5.0);

    let meeting = store.get_meeting(output.meeting_id).await.unwrap();
    assert_eq!(meeting.title, "Meeting with Acme");
    assert_eq!(meeting.created_by, "user-42");
    assert_eq!(meeting.participants, vec!["Dana", "Lee"]);

    let pain_points = store.pain_points(output.meeting_id).await;
    assert_eq!(pain_points.len(), 1);
    assert!(pain_points[0].record.is_main_pain);
    assert_eq!(pain_points[0].record.urgency_score, 10);
    assert!(pain_points[0].record.embedding.is_some());

    // Only the opportunity at or above 0.5 confidence is kept.
    let opportunities = store.opportunities(output.meeting_id).await;
    assert_eq!(opportunities.len(), 1);
    assert_eq!(opportunities[0].record.feature, "Nx Agents");
    assert_eq!(opportunities[0].record.pain_point_id, pain_points[0].id);

    let follow_ups = store.follow_ups(output.meeting_id).await;
    assert_eq!(follow_ups.len(), 1);
    assert_eq!(follow_ups[0].record.deadline, meeting_date.checked_add_days(Days::new(1)).unwrap());
    assert_eq!(follow_ups[0].record.assigned_to, "user-42");
    assert_eq!(follow_ups[0].record.status, FollowUpStatus::Pending);
}

#[tokio::test]
async fn repeated_pain_becomes_a_recurring_issue() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::always(analysis_json("Monorepo builds are too slow", &[]));
    let pipeline = pipeline(model, Arc::new(HashingEmbedder), store.clone());

    let first = pipeline.run(submission("Acme", date(2025, 1, 10))).await.unwrap();
    assert!(first.analysis_results.insights.recurring_issues.is_empty());

    let second = pipeline.run(submission("acme ", date(2025, 2, 10))).await.unwrap();
    assert_eq!(second.company_id, first.company_id);

    let insights = &second.analysis_results.insights;
    assert_eq!(insights.pain_points[0].recurring_matches.len(), 1);
    assert_eq!(insights.pain_points[0].recurring_matches[0].source_meeting_id, first.meeting_id);

    assert_eq!(insights.recurring_issues.len(), 1);
    let issue = &insights.recurring_issues[0];
    assert_eq!(issue.occurrences.len(), 2);
    assert_eq!(issue.priority, 20);

    let stored = store.list_recurring_issues(second.company_id).await.unwrap();
    assert_eq!(stored, vec![issue.clone()]);

    let pain_trend = &insights.trends.common_pain_points[0];
    assert_eq!(pain_trend.frequency, 2);
    assert!(pain_trend.is_common);
}

#[tokio::test]
async fn distinct_pains_from_the_same_meetings_recur_separately() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::always(analysis_json(
        "Monorepo builds are too slow",
        &["Flaky e2e suite on Cypress"],
    ));
    let pipeline = pipeline(model, Arc::new(HashingEmbedder), store.clone());

    let first = pipeline.run(submission("Acme", date(2025, 1, 10))).await.unwrap();
    assert!(first.analysis_results.insights.recurring_issues.is_empty());

    let second = pipeline.run(submission("Acme", date(2025, 2, 10))).await.unwrap();
    let issues = &second.analysis_results.insights.recurring_issues;
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].description, "Monorepo builds are too slow");
    assert_eq!(issues[0].priority, 20);
    assert_eq!(issues[1].description, "Flaky e2e suite on Cypress");
    assert_eq!(issues[1].priority, 12);

    let third = pipeline.run(submission("Acme", date(2025, 3, 10))).await.unwrap();
    assert_eq!(third.analysis_results.insights.recurring_issues.len(), 2);

    let stored = store.list_recurring_issues(third.company_id).await.unwrap();
    let summary: Vec<(&str, usize, u32)> = stored
        .iter()
        .map(|i| (i.description.as_str(), i.occurrences.len(), i.priority))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Monorepo builds are too slow", 3, 30),
            ("Flaky e2e suite on Cypress", 3, 18),
        ]
    );
    let meetings: Vec<_> = stored[1].occurrences.iter().map(|o| o.meeting_id).collect();
    assert_eq!(meetings, vec![first.meeting_id, second.meeting_id, third.meeting_id]);
}

#[tokio::test]
async fn missing_main_pain_never_recurs() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::always(json!({"ciProvider": "Jenkins"}));
    let pipeline = pipeline(model, Arc::new(HashingEmbedder), store.clone());

    pipeline.run(submission("Acme", date(2025, 1, 10))).await.unwrap();
    let second = pipeline.run(submission("Acme", date(2025, 2, 10))).await.unwrap();

    let insights = &second.analysis_results.insights;
    assert_eq!(second.analysis_results.analysis.main_pain, "unknown");
    assert!(insights.pain_points[0].recurring_matches.is_empty());
    assert!(!insights.pain_points[0].embedded);
    assert!(insights.recurring_issues.is_empty());
    assert!(store.list_recurring_issues(second.company_id).await.unwrap().is_empty());
    assert_eq!(insights.trends.common_pain_points[0].frequency, 0);

    let stored = store.pain_points(second.meeting_id).await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].record.embedding.is_none());
}

#[tokio::test]
async fn missing_company_is_rejected_before_extraction() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::always(analysis_json("anything", &[]));
    let pipeline = pipeline(model.clone(), Arc::new(HashingEmbedder), store.clone());

    let result = pipeline.run(submission("   ", date(2025, 3, 1))).await;

    assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    assert_eq!(model.calls(), 0);
    assert!(store.companies().await.is_empty());
}

#[tokio::test]
async fn one_failed_pain_point_does_not_sink_the_rest() {
    let inner = Arc::new(InMemoryStore::new());
    let store = Arc::new(FlakyStore::new(inner.clone()).failing_pain_point("Flaky e2e suite"));
    let model = ScriptedModel::always(analysis_json(
        "CI is slow",
        &["Flaky e2e suite", "Cache misses on main"],
    ));
    let pipeline = pipeline(model, Arc::new(HashingEmbedder), store);

    let output = pipeline.run(submission("Acme", date(2025, 4, 2))).await.unwrap();

    let insights = &output.analysis_results.insights;
    assert_eq!(insights.skipped_pain_points, 1);
    assert_eq!(insights.pain_points.len(), 3);
    assert!(insights.pain_points[0].pain_point_id.is_some());
    assert!(insights.pain_points[1].pain_point_id.is_none());
    assert!(insights.pain_points[2].pain_point_id.is_some());

    let stored = inner.pain_points(output.meeting_id).await;
    assert_eq!(stored.len(), 2);
    assert_eq!(inner.follow_ups(output.meeting_id).await.len(), 1);
}

#[tokio::test]
async fn follow_up_failure_names_the_stored_meeting() {
    let inner = Arc::new(InMemoryStore::new());
    let store = Arc::new(FlakyStore::new(inner.clone()).failing_follow_ups());
    let model = ScriptedModel::always(analysis_json("CI is slow", &[]));
    let pipeline = pipeline(model, Arc::new(HashingEmbedder), store);

    let result = pipeline.run(submission("Acme", date(2025, 4, 2))).await;

    let Err(PipelineError::FollowUpPersistence { meeting_id, reason }) = result else {
        panic!("expected a follow-up persistence error");
    };
    assert!(matches!(reason, PortError::Unavailable(_)));
    let meeting = inner.get_meeting(meeting_id).await.unwrap();
    assert_eq!(meeting.id, meeting_id);
}

#[tokio::test]
async fn unrelated_pain_points_do_not_match_across_customers() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(HashingEmbedder);

    let slow = ScriptedModel::always(analysis_json("CI is slow", &[]));
    pipeline(slow.clone(), embedder.clone(), store.clone())
        .run(submission("Globex", date(2025, 5, 1)))
        .await
        .unwrap();

    let happy = ScriptedModel::always(analysis_json("we love the dashboard", &[]));
    let unrelated = pipeline(happy, embedder.clone(), store.clone())
        .run(submission("Acme", date(2025, 5, 2)))
        .await
        .unwrap();
    assert!(unrelated.analysis_results.insights.pain_points[0]
        .cross_customer_matches
        .is_empty());

    let related = pipeline(slow, embedder, store.clone())
        .run(submission("Initech", date(2025, 5, 3)))
        .await
        .unwrap();
    let matches = &related.analysis_results.insights.pain_points[0].cross_customer_matches;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].company_name.as_deref(), Some("Globex"));
    assert!(matches[0].similarity > 0.99);
    assert!(related.analysis_results.insights.recurring_issues.is_empty());
}

#[tokio::test]
async fn embedding_outage_still_stores_everything() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::always(analysis_json("CI is slow", &["Flaky tests"]));
    let pipeline = pipeline(model, Arc::new(FailingEmbedder), store.clone());

    let output = pipeline.run(submission("Acme", date(2025, 6, 1))).await.unwrap();

    let insights = &output.analysis_results.insights;
    assert!(insights.pain_points.iter().all(|p| !p.embedded));
    assert!(insights.pain_points.iter().all(|p| p.recurring_matches.is_empty()));
    let stored = store.pain_points(output.meeting_id).await;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|p| p.record.embedding.is_none()));
}

#[tokio::test]
async fn extraction_gives_up_after_the_retry_budget() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::new(vec![Err(PortError::Unavailable("429".to_string()))]);
    let pipeline = pipeline(model.clone(), Arc::new(HashingEmbedder), store.clone());

    let result = pipeline.run(submission("Acme", date(2025, 6, 1))).await;

    assert!(matches!(result, Err(PipelineError::ExtractionUnavailable(_))));
    assert_eq!(model.calls(), fast_settings().extraction_max_attempts as usize);
    assert!(store.companies().await.is_empty());
}

#[tokio::test]
async fn transient_extraction_failure_recovers() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::new(vec![
        Err(PortError::Unavailable("timeout".to_string())),
        Ok(analysis_json("CI is slow", &[]).to_string()),
    ]);
    let pipeline = pipeline(model.clone(), Arc::new(HashingEmbedder), store);

    assert!(pipeline.run(submission("Acme", date(2025, 6, 1))).await.is_ok());
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn prose_instead_of_json_is_unrepairable() {
    let store = Arc::new(InMemoryStore::new());
    let model = ScriptedModel::new(vec![Ok("I could not analyse this call.".to_string())]);
    let pipeline = pipeline(model, Arc::new(HashingEmbedder), store.clone());

    let result = pipeline.run(submission("Acme", date(2025, 6, 1))).await;

    assert!(matches!(result, Err(PipelineError::UnrepairableOutput(_))));
    assert!(store.companies().await.is_empty());
}

#[tokio::test]
async fn truncated_output_is_repaired_and_defaulted() {
    let store = Arc::new(InMemoryStore::new());
    let raw = r#"```json
{"mainPain": "Nightly builds time out", "ciProvider": "Jenkins", "satisfaction": {"nx": 0"#;
    let model = ScriptedModel::new(vec![Ok(raw.to_string())]);
    let pipeline = pipeline(model, Arc::new(HashingEmbedder), store);

    let output = pipeline.run(submission("Acme", date(2025, 6, 1))).await.unwrap();

    let analysis = &output.analysis_results.analysis;
    assert_eq!(analysis.main_pain, "Nightly builds time out");
    assert_eq!(analysis.satisfaction.nx, 0.0);
    assert_eq!(analysis.satisfaction.nx_cloud, 5.0);
    assert!(analysis.follow_ups.is_empty());
    assert_eq!(analysis.why_now, "unknown");
}

#[tokio::test]
async fn feature_request_trends_span_companies() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(HashingEmbedder);

    let mut first = analysis_json("CI is slow", &[]);
    first["featureRequests"] = json!({"nx": ["Gradle support"], "nxCloud": []});
    pipeline(ScriptedModel::always(first), embedder.clone(), store.clone())
        .run(submission("Globex", date(2025, 1, 5)))
        .await
        .unwrap();

    let mut second = analysis_json("Docs are thin", &[]);
    second["featureRequests"] = json!({"nx": ["gradle support", "Bun support"], "nxCloud": []});
    let output = pipeline(ScriptedModel::always(second), embedder, store)
        .run(submission("Acme", date(2025, 3, 5)))
        .await
        .unwrap();

    let trends = &output.analysis_results.insights.trends;
    assert_eq!(trends.common_feature_requests[0].feature, "Gradle support");
    assert_eq!(trends.common_feature_requests[0].request_count, 2);
    assert_eq!(trends.common_feature_requests[0].companies, vec!["Globex", "Acme"]);
    assert_eq!(trends.common_feature_requests[1].feature, "Bun support");
    assert!(!trends.common_pain_points[0].is_common);
}
