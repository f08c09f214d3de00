//! Cross-reference reconciliation
//!
//! Portfolio listings from PE firm research are a second, independent source
//! of ownership evidence. A company that a researched firm lists as a
//! current holding, but whose own analysis missed the PE link, is corrected
//! here and marked for review.

use crate::company::{CompanyRecord, OwnershipCategory, PeFirmProfile};
use crate::org_normalizer::normalize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Map of normalized portfolio company name to the firms listing it, in
/// firm name order.
pub fn portfolio_index(pe_insights: &BTreeMap<String, PeFirmProfile>) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    for (firm, profile) in pe_insights {
        for company in &profile.portfolio_companies {
            let key = normalize(&company.name);
            if key.is_empty() {
                continue;
            }
            let owners = index.entry(key).or_default();
            if !owners.contains(firm) {
                owners.push(firm.clone());
            }
        }
    }
    index
}

/// Correct records that a portfolio lists but that are not yet categorized
/// as PE-Owned or Public (PE-Backed). Records whose research failed are
/// skipped; they already reach the reviewer through their `error` cell.
///
/// Pure and idempotent: corrected records carry a PE category afterwards
/// and are excluded from a second pass. Returns the number of corrections.
pub fn cross_reference(companies: &mut [CompanyRecord], pe_insights: &BTreeMap<String, PeFirmProfile>) -> usize {
    let index = portfolio_index(pe_insights);
    if index.is_empty() {
        return 0;
    }

    let mut corrected = 0;
    for record in companies.iter_mut() {
        if record.error.is_some() || record.ownership_category.is_pe_related() {
            continue;
        }
        let Some(firms) = index.get(&normalize(&record.name)) else {
            continue;
        };

        let firm_list = firms.join(", ");
        debug!("'{}' appears in the portfolio of {}", record.name, firm_list);

        record.add_review_reason(&format!(
            "Auto-corrected: listed as a current portfolio company of {}.",
            firm_list
        ));
        record.is_pe_owned = true;
        record.flagged_as_pe_account = true;
        record.ownership_category = OwnershipCategory::pe_category_for(record.public_private);
        record.pe_owner_names = merged_owner_names(&record.pe_owner_names, firms);
        record.append_summary_note(&format!(
            "Cross-reference: {} lists this company among its current holdings.",
            firm_list
        ));
        corrected += 1;
    }

    if corrected > 0 {
        info!("Cross-referencing corrected {} compan{}", corrected, if corrected == 1 { "y" } else { "ies" });
    }
    corrected
}

/// Sorted union without case-insensitive duplicates. Existing spellings win.
fn merged_owner_names(existing: &[String], discovered: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged: Vec<String> = existing
        .iter()
        .chain(discovered.iter())
        .filter(|name| seen.insert(name.trim().to_lowercase()))
        .cloned()
        .collect();
    merged.sort();
    merged
}
