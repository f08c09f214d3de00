//! Shared harness for integration tests: a scripted research client, a
//! store wrapper that cancels batches mid-flight, and orchestrator wiring
//! over a temporary directory.

#![allow(dead_code)]

pub mod wiremock_helpers;

use async_trait::async_trait;
use peownerfinder::company::{
    CompanyRecord, HistoryEntry, OwnershipCategory, PeFirmProfile, PortfolioCompany, PublicPrivate, Report,
};
use peownerfinder::config::{AnalysisConfig, StorageConfig};
use peownerfinder::orchestrator::Orchestrator;
use peownerfinder::research::{ClientFactory, ResearchClient, ResearchError};
use peownerfinder::store::{JsonStore, Settings, StateStore, StoreError};
use peownerfinder::task_registry::TaskRegistry;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Research client answering from fixed tables and recording every call
#[derive(Default)]
pub struct ScriptedResearch {
    companies: HashMap<String, CompanyRecord>,
    portfolios: HashMap<String, PeFirmProfile>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    company_calls: Mutex<Vec<String>>,
    firm_calls: Mutex<Vec<String>>,
}

impl ScriptedResearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn company(mut self, record: CompanyRecord) -> Self {
        self.companies.insert(record.name.clone(), record);
        self
    }

    pub fn portfolio(mut self, firm: &str, holdings: &[&str]) -> Self {
        let mut profile = PeFirmProfile::new(firm);
        profile.profile_summary = format!("{} is an investment firm.", firm);
        profile.portfolio_companies = holdings
            .iter()
            .map(|name| PortfolioCompany {
                name: name.to_string(),
                headquarters: String::new(),
                industry: String::new(),
            })
            .collect();
        self.portfolios.insert(firm.to_string(), profile);
        self
    }

    /// Calls for `name` fail with a server error
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Company research for `name` panics
    pub fn panicking(mut self, name: &str) -> Self {
        self.panicking.insert(name.to_string());
        self
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn company_calls(&self) -> Vec<String> {
        self.company_calls.lock().unwrap().clone()
    }

    pub fn firm_calls(&self) -> Vec<String> {
        self.firm_calls.lock().unwrap().clone()
    }

    /// Most company calls ever running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn factory(self: &Arc<Self>) -> ClientFactory {
        let client = self.clone();
        Arc::new(move |_api_key: &str| Ok(client.clone() as Arc<dyn ResearchClient>))
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ResearchClient for ScriptedResearch {
    async fn analyze_company(&self, name: &str) -> Result<CompanyRecord, ResearchError> {
        self.company_calls.lock().unwrap().push(name.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        self.pause().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(name) {
            panic!("scripted research failure for {}", name);
        }
        if self.failing.contains(name) {
            return Err(ResearchError::Api {
                status: 500,
                body: "backend unavailable".to_string(),
            });
        }
        Ok(self.companies.get(name).cloned().unwrap_or_else(|| CompanyRecord::new(name)))
    }

    async fn research_pe_firm(&self, name: &str) -> Result<PeFirmProfile, ResearchError> {
        self.firm_calls.lock().unwrap().push(name.to_string());
        self.pause().await;
        if self.failing.contains(name) {
            return Err(ResearchError::Api {
                status: 500,
                body: "backend unavailable".to_string(),
            });
        }
        Ok(self.portfolios.get(name).cloned().unwrap_or_else(|| PeFirmProfile::new(name)))
    }
}

/// JsonStore that cancels every running batch right after the registry merge,
/// i.e. after Stage 1 and before Stage 2
pub struct CancelAfterMerge {
    pub inner: JsonStore,
    pub tasks: TaskRegistry,
    pub merges: Mutex<usize>,
}

impl StateStore for CancelAfterMerge {
    fn load_settings(&self) -> Settings {
        self.inner.load_settings()
    }
    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.inner.save_settings(settings)
    }
    fn load_known_firms(&self) -> Vec<String> {
        self.inner.load_known_firms()
    }
    fn save_known_firms(&self, firms: &[String]) -> Result<(), StoreError> {
        self.inner.save_known_firms(firms)
    }
    fn merge_known_firms(&self, additions: &[String]) -> Result<usize, StoreError> {
        *self.merges.lock().unwrap() += 1;
        let added = self.inner.merge_known_firms(additions)?;
        self.tasks.cancel_all();
        Ok(added)
    }
    fn load_history(&self) -> Vec<HistoryEntry> {
        self.inner.load_history()
    }
    fn update_history(&self, update: &mut dyn FnMut(&mut Vec<HistoryEntry>)) -> Result<(), StoreError> {
        self.inner.update_history(update)
    }
    fn save_report(&self, report: &Report) -> Result<PathBuf, StoreError> {
        self.inner.save_report(report)
    }
    fn load_report(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        self.inner.load_report(id)
    }
    fn remove_batch(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.remove_batch(id)
    }
}

pub fn fast_analysis() -> AnalysisConfig {
    AnalysisConfig {
        concurrency: 5,
        submit_delay_ms: 0,
        cancel_grace_ms: 50,
    }
}

pub fn temp_json_store() -> (TempDir, JsonStore) {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::new(&StorageConfig::rooted_at(dir.path()));
    store.ensure_dirs().unwrap();
    (dir, store)
}

pub fn temp_store() -> (TempDir, Arc<JsonStore>) {
    let (dir, store) = temp_json_store();
    (dir, Arc::new(store))
}

pub fn orchestrator(store: Arc<dyn StateStore>, research: &Arc<ScriptedResearch>) -> Orchestrator {
    Orchestrator::new(store, research.factory(), TaskRegistry::new(), fast_analysis())
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Private company owned by the given PE firms
pub fn pe_owned(name: &str, owners: &[&str]) -> CompanyRecord {
    let mut record = CompanyRecord::new(name);
    record.public_private = PublicPrivate::Private;
    record.ownership_category = OwnershipCategory::PeOwned;
    record.pe_owner_names = names(owners);
    record.nation = "United States".to_string();
    record
}
