pub mod cli;
pub mod company;
pub mod config;
pub mod input;
pub mod known_firms;
pub mod logger;
pub mod orchestrator;
pub mod org_normalizer;
pub mod rate_limit;
pub mod reconcile;
pub mod report;
pub mod research;
pub mod server;
pub mod store;
pub mod task_registry;

pub use company::{CompanyRecord, PeFirmProfile, Report};
pub use orchestrator::{BatchOutcome, BatchTicket, Orchestrator, SubmitError};
pub use research::{ResearchClient, ResearchError};
pub use store::{JsonStore, StateStore};
