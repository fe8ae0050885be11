//! crates/transcript_insights_core/src/validator.rs
//!
//! Turns raw language-model output into an `AnalysisResult`.
//!
//! All coercion of model output lives here. The rest of the crate only ever
//! sees a fully-defaulted record: lists are always present, enums always hold
//! a declared value, and follow-up deadlines are concrete dates.

use chrono::{DateTime, Days, Months, NaiveDate};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::domain::{
    AdoptionApproach, AnalysisResult, CloudUsage, CloudUsageStatus, ExtractedFollowUp,
    ExtractedOpportunity, ExtractedPainPoint, FeatureRequests, FeatureUsage, Satisfaction,
    DEFAULT_SATISFACTION, UNKNOWN,
};

/// Urgency given to an additional pain point whose score is missing.
const DEFAULT_URGENCY: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Model output is unrepairable: {0}")]
    Unrepairable(String),
}

/// Parses, repairs if needed, and coerces raw model output.
///
/// `reference_date` is the meeting date; relative follow-up deadlines are
/// resolved against it.
pub fn validate(raw: &str, reference_date: NaiveDate) -> Result<AnalysisResult, ValidationError> {
    match parse_with_repair(raw)? {
        Value::Object(object) => Ok(coerce_analysis(&object, reference_date)),
        other => Err(ValidationError::Unrepairable(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

//=========================================================================================
// Parsing and Repair
//=========================================================================================

/// Parses the first JSON value in `raw`, repairing known truncation damage once.
pub fn parse_with_repair(raw: &str) -> Result<Value, ValidationError> {
    let cleaned = strip_control_characters(raw);
    let start = cleaned
        .find('{')
        .ok_or_else(|| ValidationError::Unrepairable("no JSON object in output".to_string()))?;
    let region = &cleaned[start..];

    let first_error = match parse_first_value(region) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    debug!(error = %first_error, "Direct parse failed, attempting repair");

    let repaired = repair(region);
    match parse_first_value(&repaired) {
        Ok(value) => {
            warn!(
                original_len = region.len(),
                repaired_len = repaired.len(),
                "Model output was malformed and has been repaired"
            );
            Ok(value)
        }
        Err(e) => Err(ValidationError::Unrepairable(format!(
            "{} (after repair: {})",
            first_error, e
        ))),
    }
}

fn strip_control_characters(raw: &str) -> String {
    raw.chars()
        .filter(|c| (!c.is_control() || matches!(c, '\n' | '\r' | '\t')) && *c != '\u{feff}')
        .collect()
}

/// Reads one value and ignores whatever follows it (closing code fences, prose).
fn parse_first_value(text: &str) -> Result<Value, serde_json::Error> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(result) => result,
        None => serde_json::from_str(text),
    }
}

/// Applies the bounded set of textual repairs in a single pass.
///
/// Outside of strings: commas before a closer are dropped, mismatched closers
/// close the inner structures first, stray closers are ignored, and anything
/// after the outermost object is cut. At the end of truncated input: an open
/// string is closed, a dangling comma is dropped, a dangling key or colon gets a
/// `null` value, a partial literal is completed, and missing closers are appended.
pub fn repair(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' | '[' => {
                stack.push(c);
                out.push(c);
            }
            '}' | ']' => {
                let opener = if c == '}' { '{' } else { '[' };
                if !stack.contains(&opener) {
                    continue;
                }
                while let Some(open) = stack.pop() {
                    finish_open_value(&mut out, open);
                    out.push(closer_for(open));
                    if open == opener {
                        break;
                    }
                }
                if stack.is_empty() {
                    return out;
                }
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(open) = stack.pop() {
        finish_open_value(&mut out, open);
        out.push(closer_for(open));
    }
    out
}

fn closer_for(open: char) -> char {
    if open == '{' {
        '}'
    } else {
        ']'
    }
}

/// Makes the tail of `out` a complete member of the structure opened by `open`.
fn finish_open_value(out: &mut String, open: char) {
    loop {
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        if out.ends_with(',') {
            out.pop();
        } else {
            break;
        }
    }

    complete_partial_literal(out);

    if out.ends_with(':') {
        out.push_str(" null");
    } else if open == '{' && ends_with_bare_key(out) {
        out.push_str(": null");
    }
}

/// True when `out` ends with a string that sits in key position (after `{` or `,`).
fn ends_with_bare_key(out: &str) -> bool {
    let bytes = out.as_bytes();
    if bytes.len() < 2 || bytes[bytes.len() - 1] != b'"' {
        return false;
    }

    let mut i = bytes.len() - 1;
    loop {
        if i == 0 {
            return false;
        }
        i -= 1;
        if bytes[i] == b'"' {
            let backslashes = bytes[..i].iter().rev().take_while(|b| **b == b'\\').count();
            if backslashes % 2 == 0 {
                break;
            }
        }
    }

    out[..i].trim_end().ends_with(['{', ','])
}

/// Completes a bare literal cut short by truncation (`tr` -> `true`, `12.` -> `12`).
fn complete_partial_literal(out: &mut String) {
    let is_literal_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+');
    let token_start = out
        .char_indices()
        .rev()
        .find(|(_, c)| !is_literal_char(*c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);

    let token = &out[token_start..];
    if token.is_empty() {
        return;
    }
    let preceding = out[..token_start].trim_end().chars().last();
    if !matches!(preceding, Some(':') | Some(',') | Some('[')) {
        return;
    }

    let replacement = if "true".starts_with(token) {
        "true".to_string()
    } else if "false".starts_with(token) {
        "false".to_string()
    } else if "null".starts_with(token) {
        "null".to_string()
    } else {
        let number = token.trim_end_matches(['.', '-', '+', 'e', 'E']);
        if !number.is_empty() && number.parse::<f64>().is_ok() {
            number.to_string()
        } else {
            "null".to_string()
        }
    };

    if replacement != token {
        out.truncate(token_start);
        out.push_str(&replacement);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//=========================================================================================
// Field Coercion
//=========================================================================================

fn coerce_analysis(object: &Map<String, Value>, reference_date: NaiveDate) -> AnalysisResult {
    let additional_pain_points = pain_points(field(object, "additionalPainPoints"));
    let opportunities = opportunities(
        field(object, "opportunities").or_else(|| field(object, "nxOpportunities")),
        additional_pain_points.len(),
    );

    AnalysisResult {
        main_pain: text(field(object, "mainPain")),
        why_now: text(field(object, "whyNow")),
        call_objective: text(field(object, "callObjective")),
        ci_provider: text(field(object, "ciProvider")),
        problematic_tasks: string_list(field(object, "problematicTasks")),
        technologies_used: string_list(field(object, "technologiesUsed")),
        nx_version: text(field(object, "nxVersion")),
        cloud_usage: cloud_usage(field(object, "cloudUsage")),
        years_using: text(field(object, "yearsUsing")),
        workspace_size: text(field(object, "workspaceSize")),
        adoption_approach: match field(object, "adoptionApproach") {
            Some(Value::String(s)) => AdoptionApproach::parse(s),
            _ => AdoptionApproach::Unknown,
        },
        satisfaction: satisfaction(field(object, "satisfaction")),
        feature_requests: feature_requests(field(object, "featureRequests")),
        current_benefits: string_list(field(object, "currentBenefits")),
        favorite_features: string_list(field(object, "favoriteFeatures")),
        advanced_feature_usage: feature_usage(field(object, "advancedFeatureUsage")),
        participants: string_list(field(object, "participants")),
        follow_ups: follow_ups(field(object, "followUps"), reference_date),
        additional_pain_points,
        opportunities,
        executive_summary: text(field(object, "executiveSummary")),
    }
}

/// Looks a key up by its camelCase name, then by its snake_case spelling.
fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| object.get(&to_snake_case(key)))
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Scalars become trimmed text; blanks and structures are not text.
fn optional_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn text(value: Option<&Value>) -> String {
    optional_text(value).unwrap_or_else(|| UNKNOWN.to_string())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| optional_text(Some(v))).collect(),
        _ => Vec::new(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            let s = s.split('/').next().unwrap_or(s).trim();
            s.parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// 0–10; an absent or unreadable score is 5, an explicit 0 stays 0.
fn score(value: Option<&Value>) -> f64 {
    number(value)
        .map(|n| n.clamp(0.0, 10.0))
        .unwrap_or(DEFAULT_SATISFACTION)
}

fn urgency(value: Option<&Value>) -> u8 {
    number(value)
        .map(|n| n.round().clamp(0.0, 10.0) as u8)
        .unwrap_or(DEFAULT_URGENCY)
}

/// [0, 1]; values in (1, 100] are read as percentages.
fn confidence(value: Option<&Value>) -> f64 {
    match number(value) {
        Some(n) if n > 1.0 && n <= 100.0 => n / 100.0,
        Some(n) => n.clamp(0.0, 1.0),
        None => 0.0,
    }
}

fn satisfaction(value: Option<&Value>) -> Satisfaction {
    match value {
        Some(Value::Object(scores)) => Satisfaction {
            nx: score(field(scores, "nx")),
            nx_cloud: score(field(scores, "nxCloud")),
        },
        _ => Satisfaction::default(),
    }
}

fn cloud_usage(value: Option<&Value>) -> CloudUsage {
    match value {
        Some(Value::Object(usage)) => CloudUsage {
            status: match usage.get("status") {
                Some(Value::String(s)) => CloudUsageStatus::parse(s),
                Some(Value::Bool(true)) => CloudUsageStatus::Yes,
                Some(Value::Bool(false)) => CloudUsageStatus::No,
                _ => CloudUsageStatus::Unknown,
            },
            reason: optional_text(usage.get("reason")),
        },
        Some(Value::String(s)) => CloudUsage {
            status: CloudUsageStatus::parse(s),
            reason: None,
        },
        _ => CloudUsage::default(),
    }
}

fn feature_requests(value: Option<&Value>) -> FeatureRequests {
    match value {
        Some(Value::Object(requests)) => FeatureRequests {
            nx: string_list(field(requests, "nx")),
            nx_cloud: string_list(field(requests, "nxCloud")),
        },
        _ => FeatureRequests::default(),
    }
}

fn feature_usage(value: Option<&Value>) -> BTreeMap<String, FeatureUsage> {
    let Some(Value::Object(usage)) = value else {
        return BTreeMap::new();
    };
    usage
        .iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, v)| {
            let usage = match v {
                Value::Bool(true) => FeatureUsage::Yes,
                Value::Bool(false) => FeatureUsage::No,
                Value::String(s) => FeatureUsage::parse(s),
                _ => FeatureUsage::Unknown,
            };
            (name.trim().to_string(), usage)
        })
        .collect()
}

fn objects(value: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    let items: &[Value] = match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    };
    items.iter().filter_map(Value::as_object)
}

fn follow_ups(value: Option<&Value>, reference_date: NaiveDate) -> Vec<ExtractedFollowUp> {
    objects(value)
        .filter_map(|item| {
            let description = optional_text(item.get("description"))?;
            let deadline = match item.get("deadline") {
                Some(Value::String(s)) => resolve_deadline(Some(s), reference_date),
                _ => resolve_deadline(None, reference_date),
            };
            let assignee = optional_text(item.get("assignee").or_else(|| item.get("assignedTo")))
                .filter(|a| !a.eq_ignore_ascii_case(UNKNOWN));
            Some(ExtractedFollowUp {
                description,
                deadline,
                assignee,
            })
        })
        .collect()
}

fn pain_points(value: Option<&Value>) -> Vec<ExtractedPainPoint> {
    objects(value)
        .filter_map(|item| {
            Some(ExtractedPainPoint {
                description: optional_text(item.get("description"))?,
                urgency_score: urgency(field(item, "urgencyScore")),
                category: text(item.get("category")),
                related_features: string_list(
                    field(item, "relatedFeatures").or_else(|| field(item, "relatedNxFeatures")),
                ),
            })
        })
        .collect()
}

fn opportunities(value: Option<&Value>, additional_count: usize) -> Vec<ExtractedOpportunity> {
    objects(value)
        .filter_map(|item| {
            let feature = optional_text(item.get("feature").or_else(|| field(item, "nxFeature")))?;
            let pain_point_index = match field(item, "painPointIndex").and_then(Value::as_u64) {
                Some(index) if index as usize <= additional_count => index as usize,
                _ => 0,
            };
            Some(ExtractedOpportunity {
                feature,
                confidence_score: confidence(field(item, "confidenceScore")),
                suggested_approach: text(field(item, "suggestedApproach")),
                pain_point_index,
            })
        })
        .collect()
}

//=========================================================================================
// Deadlines
//=========================================================================================

/// Resolves a follow-up deadline to a concrete date.
///
/// ISO dates and RFC 3339 timestamps pass through. "next week" and "next month"
/// are honoured; every other token ("ASAP", "today", "tomorrow", free text) and a
/// missing deadline resolve to the day after `reference_date`.
pub fn resolve_deadline(raw: Option<&str>, reference_date: NaiveDate) -> NaiveDate {
    let next_day = reference_date.succ_opt().unwrap_or(reference_date);
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return next_day;
    };

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date;
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return timestamp.date_naive();
    }

    match raw.to_ascii_lowercase().as_str() {
        "next week" | "in a week" | "within a week" => reference_date
            .checked_add_days(Days::new(7))
            .unwrap_or(next_day),
        "next month" | "in a month" | "within a month" => reference_date
            .checked_add_months(Months::new(1))
            .unwrap_or(next_day),
        _ => next_day,
    }
}
