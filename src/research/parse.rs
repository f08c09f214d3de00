//! Best-effort decoding of model answers into typed records

use crate::company::{CompanyRecord, OwnershipCategory, PeFirmProfile, PortfolioCompany, PublicPrivate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Trailing citation markers such as " [1, 2]"
static TRAILING_CITATIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*\[[\d,\s]+\]\s*$").expect("citation pattern is valid")
});

const INCONSISTENT_OWNERS_REASON: &str =
    "Inconsistency: PE owner(s) were identified, but the category is not PE-related.";

/// Placeholders the model uses when it has no answer
const NOT_FOUND_MARKERS: &[&str] = &["information not found", "not found", "n/a", "unknown", ""];

/// Extract the JSON object from a model answer.
///
/// Strips markdown code fences and falls back to the outermost `{...}` span
/// when the object is surrounded by prose.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = strip_code_fences(text);

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.strip_prefix("json").or_else(|| rest.strip_prefix("JSON")).unwrap_or(rest);
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Remove trailing citation markers from a summary.
pub fn clean_summary(summary: &str) -> String {
    TRAILING_CITATIONS.replace(summary, "").trim().to_string()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !NOT_FOUND_MARKERS.contains(&s.to_lowercase().as_str()))
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !NOT_FOUND_MARKERS.contains(&s.trim().to_lowercase().as_str()) => {
            vec![s.trim().to_string()]
        }
        _ => Vec::new(),
    }
}

fn bool_field(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "yes" | "true"),
        _ => false,
    }
}

/// Fill `record` from a decoded company answer and run the review rules:
/// reported uncertainties and PE owners under a non-PE category both mark
/// the record for review.
pub fn apply_company_answer(record: &mut CompanyRecord, answer: &Value) {
    let category = string_field(answer, "ownership_category")
        .map(|c| OwnershipCategory::from_label(&c))
        .unwrap_or_default();
    let owners = string_list(answer, "pe_owner_names");
    let uncertainties = string_list(answer, "uncertainties");

    record.public_private = string_field(answer, "public_private")
        .map(|p| PublicPrivate::from_label(&p))
        .unwrap_or_default();
    record.ownership_category = category;
    record.is_itself_pe = bool_field(answer, "is_itself_pe");
    record.nation = string_field(answer, "nation")
        .filter(|n| !NOT_FOUND_MARKERS.contains(&n.to_lowercase().as_str()))
        .unwrap_or_else(|| "Unknown".to_string());
    record.ownership_summary = string_field(answer, "ownership_summary")
        .map(|s| clean_summary(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "N/A".to_string());

    if category.is_pe_related() {
        record.is_pe_owned = true;
        record.flagged_as_pe_account = true;
    }

    if !uncertainties.is_empty() {
        record.add_review_reason(&format!("AI was uncertain: {}", uncertainties.join("; ")));
    }

    if !owners.is_empty() && !category.is_pe_related() {
        record.add_review_reason(INCONSISTENT_OWNERS_REASON);
    }

    record.pe_owner_names = owners;
}

/// Fill `profile` from a decoded portfolio answer. Entries without a name are dropped.
pub fn apply_portfolio_answer(profile: &mut PeFirmProfile, answer: &Value) {
    if let Some(summary) = string_field(answer, "profile_summary") {
        profile.profile_summary = clean_summary(&summary);
    }

    profile.portfolio_companies = answer
        .get("portfolio_companies")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = string_field(item, "name")?;
                    Some(PortfolioCompany {
                        name,
                        headquarters: string_field(item, "headquarters").unwrap_or_default(),
                        industry: string_field(item, "industry").unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
}
