//! Case service: runs, credits and persistence around [`CaseHistory`].
//!
//! Every run follows the same contract:
//!
//! 1. pre-flight `has_at_least(cost)`, else `CreditExhausted` and no call is made
//! 2. orchestrator run on an immutable input snapshot
//! 3. one store transaction: debit, case or image rows, the version numbered
//!    after the highest stored one, and the current pointer
//!
//! A refused debit or a failed write rolls the whole transaction back, so the
//! stored case and the balance stay exactly as they were.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::CaseHistory;
use crate::config::CreditsConfig;
use crate::pipeline::{Orchestrator, PipelineRun, PipelineWarning, RunContext};
use crate::storage::{
    CaseRecord, CaseStore, CaseSummary, Charge, CommitTarget, CreditLedger, VersionCommit,
};
use crate::types::{
    CanonicalSectionId, CaseError, CaseImage, CaseInput, ModificationRecord, PriorState, Result,
    RunMode, ValidationError, ValidationErrorKind, Version, VersionKind,
};

/// Committed version of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub case_id: String,
    pub version: Version,
    pub context: RunContext,
    pub credits_charged: u32,
}

impl RunOutcome {
    pub fn warnings(&self) -> &[PipelineWarning] {
        &self.context.warnings
    }
}

/// Runs take the [`Orchestrator`] per call, so commands that never reach a model
/// endpoint (edits, restore, history) need no endpoint configuration.
pub struct CaseService {
    store: Arc<dyn CaseStore>,
    ledger: Arc<dyn CreditLedger>,
    credits: CreditsConfig,
}

impl CaseService {
    pub fn new(
        store: Arc<dyn CaseStore>,
        ledger: Arc<dyn CreditLedger>,
        credits: CreditsConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            credits,
        }
    }

    /// First analysis of a new case (Simple or Full), stored as version 1
    #[instrument(skip_all, fields(mode = %mode, images = input.images.len()))]
    pub async fn analyze(
        &self,
        orchestrator: &Orchestrator,
        input: CaseInput,
        title: Option<String>,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        if mode.requires_prior() {
            return Err(mode_error(mode, "creates a new case; use simple or full"));
        }
        input.validate()?;

        let run = self
            .checked_run(orchestrator, &input, mode, None, cancel)
            .await?;

        let record = CaseRecord::new(&input, title);
        let mut history = CaseHistory::new();
        let fresh = history.commit(VersionKind::for_mode(mode), run.pipeline.result);
        let version = self.store.commit_version(VersionCommit {
            target: CommitTarget::NewCase(&record),
            modification: None,
            version: fresh,
            charge: Some(self.charge(run.cost)),
        })
        .inspect_err(|e| warn!(error = %e, "Run result discarded, nothing committed"))?;

        info!(case_id = %record.id, version = version.number, "Case analyzed");
        Ok(RunOutcome {
            case_id: record.id,
            version,
            context: run.pipeline.context,
            credits_charged: run.cost,
        })
    }

    /// Relaunch or deep rerun of an existing case. `new_images` are appended to
    /// the stored ones only when the run commits.
    #[instrument(skip_all, fields(case_id = %case_id, mode = %mode, new_images = new_images.len()))]
    pub async fn rerun(
        &self,
        orchestrator: &Orchestrator,
        case_id: &str,
        mode: RunMode,
        new_images: Vec<CaseImage>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        if !mode.requires_prior() {
            return Err(mode_error(mode, "cannot rerun a case; use relaunch or deep"));
        }

        let (record, mut history) = self.load(case_id)?;
        let prior = history.prior_state().ok_or_else(|| {
            CaseError::validation("version", format!("case {} has no version to rerun", case_id))
        })?;
        let mut input = record.input();
        input.images.extend(new_images.iter().cloned());

        let run = self
            .checked_run(orchestrator, &input, mode, Some(&prior), cancel)
            .await?;

        let merged = history.commit(VersionKind::for_mode(mode), run.pipeline.result);
        let version = self.store.commit_version(VersionCommit {
            target: CommitTarget::Existing {
                case_id,
                new_images: &new_images,
            },
            modification: None,
            version: merged,
            charge: Some(self.charge(run.cost)),
        })
        .inspect_err(|e| warn!(error = %e, "Run result discarded, nothing committed"))?;

        info!(case_id, version = version.number, "Case rerun committed");
        Ok(RunOutcome {
            case_id: case_id.to_string(),
            version,
            context: run.pipeline.context,
            credits_charged: run.cost,
        })
    }

    /// Log a clinician addendum; it takes effect on the next rerun
    pub fn record_edit(
        &self,
        case_id: &str,
        section: CanonicalSectionId,
        text: &str,
    ) -> Result<ModificationRecord> {
        let (_, mut history) = self.load(case_id)?;
        let record = history.record_manual_edit(section, text)?;
        self.store.append_modification(case_id, &record)?;
        Ok(record)
    }

    pub fn update_edit(&self, case_id: &str, id: &str, text: &str) -> Result<ModificationRecord> {
        let (_, mut history) = self.load(case_id)?;
        let record = history.update_modification(id, text)?.clone();
        self.store.update_modification(case_id, &record)?;
        Ok(record)
    }

    /// Log an addendum and commit it right away as a manual-edit version
    pub fn apply_edit(
        &self,
        case_id: &str,
        section: CanonicalSectionId,
        text: &str,
    ) -> Result<Version> {
        let (_, mut history) = self.load(case_id)?;
        let version = history.apply_manual_edit(section, text)?.clone();
        self.store.commit_version(VersionCommit {
            target: CommitTarget::Existing {
                case_id,
                new_images: &[],
            },
            modification: history.modifications().last(),
            version: &version,
            charge: None,
        })
    }

    pub fn restore(&self, case_id: &str, number: u32) -> Result<Version> {
        let (_, mut history) = self.load(case_id)?;
        let version = history.restore(number)?.clone();
        self.store.set_current_version(case_id, number)?;
        Ok(version)
    }

    pub fn history(&self, case_id: &str) -> Result<CaseHistory> {
        self.load(case_id).map(|(_, history)| history)
    }

    pub fn case(&self, case_id: &str) -> Result<CaseRecord> {
        self.store.load_case(case_id)
    }

    pub fn list_cases(&self) -> Result<Vec<CaseSummary>> {
        self.store.list_cases()
    }

    pub fn balance(&self) -> Result<u32> {
        self.ledger.balance(&self.credits.user_id)
    }

    fn load(&self, case_id: &str) -> Result<(CaseRecord, CaseHistory)> {
        let record = self.store.load_case(case_id)?;
        let history = CaseHistory::from_parts(
            self.store.load_versions(case_id)?,
            record.current_version,
            self.store.load_modifications(case_id)?,
        );
        Ok((record, history))
    }

    /// Pre-flight check and run; the debit happens when the version commits
    async fn checked_run(
        &self,
        orchestrator: &Orchestrator,
        input: &CaseInput,
        mode: RunMode,
        prior: Option<&PriorState>,
        cancel: &CancellationToken,
    ) -> Result<CheckedRun> {
        let user_id = &self.credits.user_id;
        let cost = self.credits.cost(mode);
        if !self.ledger.has_at_least(user_id, cost)? {
            return Err(CaseError::CreditExhausted {
                user_id: user_id.clone(),
                required: cost,
            });
        }

        let pipeline = orchestrator.run(input, mode, prior, cancel).await?;
        Ok(CheckedRun { pipeline, cost })
    }

    fn charge(&self, amount: u32) -> Charge<'_> {
        Charge {
            user_id: &self.credits.user_id,
            amount,
        }
    }
}

struct CheckedRun {
    pipeline: PipelineRun,
    cost: u32,
}

fn mode_error(mode: RunMode, message: &str) -> CaseError {
    ValidationError::new(ValidationErrorKind::Consistency, format!("{} mode {}", mode, message))
        .with_field("mode")
        .into()
}
