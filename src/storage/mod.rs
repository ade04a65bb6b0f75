//! Case persistence and the credit ledger.
//!
//! The pipeline only sees the two traits; [`Database`] implements both over a
//! pooled SQLite connection.

pub mod database;

pub use database::{Database, PoolConfig, SharedDatabase};

use chrono::{DateTime, Utc};

use crate::types::{CaseImage, CaseInput, ModificationRecord, Result, Version};

/// Stored case: its input snapshot and current-version pointer
#[derive(Debug, Clone)]
pub struct CaseRecord {
    pub id: String,
    pub title: Option<String>,
    pub case_text: String,
    pub images: Vec<CaseImage>,
    pub current_version: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl CaseRecord {
    pub fn new(input: &CaseInput, title: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            case_text: input.case_text.clone(),
            images: input.images.clone(),
            current_version: None,
            created_at: Utc::now(),
        }
    }

    pub fn input(&self) -> CaseInput {
        CaseInput {
            case_text: self.case_text.clone(),
            images: self.images.clone(),
        }
    }
}

/// Listing row for `casewise show` without a case id
#[derive(Debug, Clone)]
pub struct CaseSummary {
    pub id: String,
    pub title: Option<String>,
    pub current_version: Option<u32>,
    pub version_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Where a committed version lands
#[derive(Debug, Clone, Copy)]
pub enum CommitTarget<'a> {
    /// First version of a case that is not stored yet
    NewCase(&'a CaseRecord),
    /// Existing case; `new_images` are appended after the stored ones
    Existing {
        case_id: &'a str,
        new_images: &'a [CaseImage],
    },
}

impl CommitTarget<'_> {
    pub fn case_id(&self) -> &str {
        match self {
            Self::NewCase(record) => &record.id,
            Self::Existing { case_id, .. } => case_id,
        }
    }
}

/// Credits taken from the ledger as part of a commit
#[derive(Debug, Clone, Copy)]
pub struct Charge<'a> {
    pub user_id: &'a str,
    pub amount: u32,
}

/// Everything one new version writes. Applied all-or-nothing.
#[derive(Debug, Clone, Copy)]
pub struct VersionCommit<'a> {
    pub target: CommitTarget<'a>,
    /// Modification logged together with the version (manual edits)
    pub modification: Option<&'a ModificationRecord>,
    /// Stored under the next free number; `version.number` is ignored
    pub version: &'a Version,
    pub charge: Option<Charge<'a>>,
}

/// Case, version and modification persistence
pub trait CaseStore: Send + Sync {
    /// `NotFound` when the case does not exist
    fn load_case(&self, case_id: &str) -> Result<CaseRecord>;

    fn list_cases(&self) -> Result<Vec<CaseSummary>>;

    /// Atomically debit the charge, create the case or append its images, log
    /// the modification, insert the version as `MAX(number) + 1` and point the
    /// case at it. Returns the version as stored.
    ///
    /// A refused debit is `CreditExhausted`; on any error nothing is written.
    fn commit_version(&self, commit: VersionCommit<'_>) -> Result<Version>;

    /// Versions ordered by number
    fn load_versions(&self, case_id: &str) -> Result<Vec<Version>>;

    fn set_current_version(&self, case_id: &str, number: u32) -> Result<()>;

    fn append_modification(&self, case_id: &str, record: &ModificationRecord) -> Result<()>;

    fn update_modification(&self, case_id: &str, record: &ModificationRecord) -> Result<()>;

    /// Records in creation order
    fn load_modifications(&self, case_id: &str) -> Result<Vec<ModificationRecord>>;
}

/// Per-user credit balance with an atomic debit
pub trait CreditLedger: Send + Sync {
    fn balance(&self, user_id: &str) -> Result<u32>;

    /// Pre-flight check; not a reservation
    fn has_at_least(&self, user_id: &str, amount: u32) -> Result<bool> {
        Ok(self.balance(user_id)? >= amount)
    }

    /// Compare-and-decrement. `false` when the balance is below `amount`, in
    /// which case nothing is debited.
    fn debit(&self, user_id: &str, amount: u32) -> Result<bool>;

    /// Add `amount` and return the new balance
    fn grant(&self, user_id: &str, amount: u32) -> Result<u32>;
}
