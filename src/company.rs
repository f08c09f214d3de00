use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PublicPrivate {
    Public,
    Private,
    #[default]
    Unknown,
}

impl PublicPrivate {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicPrivate::Public => "Public",
            PublicPrivate::Private => "Private",
            PublicPrivate::Unknown => "Unknown",
        }
    }

    /// Lenient parse of a model-supplied label. Anything unrecognized is Unknown.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "public" | "publicly traded" => PublicPrivate::Public,
            "private" | "privately held" | "privately owned" => PublicPrivate::Private,
            _ => PublicPrivate::Unknown,
        }
    }
}

impl std::fmt::Display for PublicPrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OwnershipCategory {
    #[serde(rename = "PE-Owned")]
    PeOwned,
    #[serde(rename = "Public (PE-Backed)")]
    PublicPeBacked,
    #[serde(rename = "Public (Institutional)")]
    PublicInstitutional,
    #[serde(rename = "Private (Founder/Family)")]
    PrivateFounderFamily,
    #[serde(rename = "Private (Other)")]
    PrivateOther,
    #[default]
    Unknown,
}

impl OwnershipCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnershipCategory::PeOwned => "PE-Owned",
            OwnershipCategory::PublicPeBacked => "Public (PE-Backed)",
            OwnershipCategory::PublicInstitutional => "Public (Institutional)",
            OwnershipCategory::PrivateFounderFamily => "Private (Founder/Family)",
            OwnershipCategory::PrivateOther => "Private (Other)",
            OwnershipCategory::Unknown => "Unknown",
        }
    }

    /// Lenient parse: case, spaces and brackets are ignored, so
    /// "Public(PE-Backed)" and "public (pe-backed)" are both accepted.
    pub fn from_label(label: &str) -> Self {
        let key: String = label
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '/')
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "peowned" => OwnershipCategory::PeOwned,
            "publicpebacked" => OwnershipCategory::PublicPeBacked,
            "publicinstitutional" => OwnershipCategory::PublicInstitutional,
            "privatefounder/family" | "privatefounderfamily" => OwnershipCategory::PrivateFounderFamily,
            "privateother" => OwnershipCategory::PrivateOther,
            _ => OwnershipCategory::Unknown,
        }
    }

    /// PE-Owned and Public (PE-Backed) are the categories that mark a PE relationship.
    pub fn is_pe_related(&self) -> bool {
        matches!(self, OwnershipCategory::PeOwned | OwnershipCategory::PublicPeBacked)
    }

    /// The PE category matching a listing status.
    pub fn pe_category_for(public_private: PublicPrivate) -> Self {
        if public_private == PublicPrivate::Public {
            OwnershipCategory::PublicPeBacked
        } else {
            OwnershipCategory::PeOwned
        }
    }
}

impl std::fmt::Display for OwnershipCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance fragment from search grounding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSnippet {
    pub snippet: String,
    pub url: String,
    pub title: String,
}

/// Separator between review reasons accumulated on one record
pub const REVIEW_REASON_SEPARATOR: &str = " | ";

const ITSELF_PE_PUBLIC_REASON: &str =
    "Contradiction: the company is identified as a PE firm but reported as Public.";

/// One researched company
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompanyRecord {
    pub name: String,
    pub public_private: PublicPrivate,
    pub ownership_category: OwnershipCategory,
    pub is_pe_owned: bool,
    /// Discovery order
    pub pe_owner_names: Vec<String>,
    pub is_itself_pe: bool,
    pub flagged_as_pe_account: bool,
    pub nation: String,
    pub ownership_summary: String,
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub source_snippets: Vec<SourceSnippet>,
    pub error: Option<String>,
}

impl Default for CompanyRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            public_private: PublicPrivate::Unknown,
            ownership_category: OwnershipCategory::Unknown,
            is_pe_owned: false,
            pe_owner_names: Vec::new(),
            is_itself_pe: false,
            flagged_as_pe_account: false,
            nation: "Unknown".to_string(),
            ownership_summary: "N/A".to_string(),
            needs_review: false,
            review_reason: None,
            source_snippets: Vec::new(),
            error: None,
        }
    }
}

impl CompanyRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A record for a failed research call: only `name` and `error` are set.
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Mark for review, appending `reason` unless it is already recorded.
    pub fn add_review_reason(&mut self, reason: &str) {
        self.needs_review = true;
        match &mut self.review_reason {
            Some(existing) if existing.split(REVIEW_REASON_SEPARATOR).any(|r| r == reason) => {}
            Some(existing) => {
                existing.push_str(REVIEW_REASON_SEPARATOR);
                existing.push_str(reason);
            }
            None => self.review_reason = Some(reason.to_string()),
        }
    }

    /// Append a sentence to the ownership summary, replacing the "N/A" placeholder.
    pub fn append_summary_note(&mut self, note: &str) {
        let current = self.ownership_summary.trim();
        if current.is_empty() || current == "N/A" {
            self.ownership_summary = note.to_string();
        } else {
            self.ownership_summary = format!("{} {}", current, note);
        }
    }

    /// Heal contradictions between the PE flags, the category and the
    /// listing status before the record enters a report. Failed records are
    /// left untouched. Running it twice changes nothing.
    pub fn heal(&mut self) {
        if self.error.is_some() {
            return;
        }

        if self.ownership_category.is_pe_related() {
            self.is_pe_owned = true;
        } else if self.is_pe_owned {
            self.ownership_category = OwnershipCategory::pe_category_for(self.public_private);
        }

        if self.ownership_category.is_pe_related() {
            match (self.ownership_category, self.public_private) {
                (OwnershipCategory::PeOwned, PublicPrivate::Public) => {
                    self.ownership_category = OwnershipCategory::PublicPeBacked;
                }
                (OwnershipCategory::PublicPeBacked, PublicPrivate::Private) => {
                    self.ownership_category = OwnershipCategory::PeOwned;
                }
                (OwnershipCategory::PeOwned, PublicPrivate::Unknown) => {
                    self.public_private = PublicPrivate::Private;
                }
                (OwnershipCategory::PublicPeBacked, PublicPrivate::Unknown) => {
                    self.public_private = PublicPrivate::Public;
                }
                _ => {}
            }
        }

        if self.is_pe_owned {
            self.flagged_as_pe_account = true;
        }

        if self.is_itself_pe && self.public_private == PublicPrivate::Public {
            self.add_review_reason(ITSELF_PE_PUBLIC_REASON);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortfolioCompany {
    pub name: String,
    #[serde(default)]
    pub headquarters: String,
    #[serde(default)]
    pub industry: String,
}

/// Research output for one PE firm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeFirmProfile {
    pub name: String,
    #[serde(default = "not_available")]
    pub profile_summary: String,
    #[serde(default)]
    pub portfolio_companies: Vec<PortfolioCompany>,
    #[serde(default)]
    pub error: Option<String>,
}

fn not_available() -> String {
    "N/A".to_string()
}

impl PeFirmProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile_summary: not_available(),
            portfolio_companies: Vec::new(),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(name)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Completed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "Pending",
            BatchStatus::Completed => "Completed",
            BatchStatus::Cancelled => "Cancelled",
        }
    }
}

/// One completed batch, persisted as a JSON document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub report_id: Uuid,
    pub report_name: String,
    pub status: BatchStatus,
    pub companies: Vec<CompanyRecord>,
    #[serde(default)]
    pub pe_insights: BTreeMap<String, PeFirmProfile>,
    /// Uploaded spreadsheet the batch was read from, if any
    #[serde(default)]
    pub source_file: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Lightweight pointer to a batch, kept in the history log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub name: String,
    pub date: DateTime<Utc>,
    pub status: BatchStatus,
    pub num_companies: usize,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "analysis_duration_seconds")]
    pub duration_seconds: Option<f64>,
}

impl HistoryEntry {
    pub fn pending(id: Uuid, name: &str, num_companies: usize, source_file: Option<String>) -> Self {
        Self {
            id,
            name: name.to_string(),
            date: Utc::now(),
            status: BatchStatus::Pending,
            num_companies,
            file_path: None,
            source_file,
            completed_at: None,
            duration_seconds: None,
        }
    }
}

/// Human readable batch name, e.g. "Analysis Report - 2024-05-01 14:03:22"
pub fn report_name_for(at: DateTime<chrono::Local>) -> String {
    format!("Analysis Report - {}", at.format("%Y-%m-%d %H:%M:%S"))
}
