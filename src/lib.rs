//! casewise - Clinical Case Analysis Pipeline
//!
//! Turns a free-text clinical case plus optional images into a sectioned analysis
//! report with a numbered, enriched reference list, and keeps every run as an
//! immutable version that clinician edits survive.
//!
//! ## Core Features
//!
//! - **Four run modes**: simple, full (research + references), relaunch, deep
//! - **Tolerant section parsing**: markers, headings, then placeholders
//! - **Bounded image pool**: per-image failures degrade, never abort
//! - **Versioning**: relaunch/deep reruns keep manually edited sections
//! - **Credit ledger**: debit committed with the run's version in one transaction
//!
//! ## Quick Start
//!
//! ```ignore
//! use casewise::{CaseInput, CaseService, Config, Database, Orchestrator, RunMode};
//!
//! let config = Config::default();
//! let db = Arc::new(Database::open(".casewise/cases.db")?);
//! db.initialize()?;
//! let service = CaseService::new(db.clone(), db, config.credits.clone());
//! let orchestrator = Orchestrator::from_config(&config, RunMode::Full)?;
//! let outcome = service
//!     .analyze(&orchestrator, CaseInput::new(text), None, RunMode::Full, &cancel)
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: model endpoint traits and clients, prompts, call guard
//! - [`pipeline`]: section parser, references, images, orchestrator
//! - [`versioning`]: version history, merge engine, case service
//! - [`storage`]: SQLite persistence and the credit ledger
//! - [`config`]: layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod storage;
pub mod types;
pub mod versioning;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};

pub use types::{
    AnalysisResult, CanonicalSectionId, CaseError, CaseImage, CaseInput, ImageDomain, Reference,
    Result, RunMode, Version, VersionKind,
};

pub use storage::{CaseStore, CreditLedger, Database, PoolConfig, SharedDatabase};

pub use pipeline::{Orchestrator, PipelineRun, PipelineWarning, RunContext};

pub use versioning::{CaseHistory, CaseService, RunOutcome};

pub use ai::{TimeoutConfig, guarded_call};
