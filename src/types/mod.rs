pub mod analysis;
pub mod case;
pub mod error;
pub mod utils;
pub mod version;

pub use analysis::{
    AnalysisResult, CanonicalSectionId, PipelineStage, Reference, ResearchReport, RunMode,
    Section, SourceEntry,
};
pub use case::{CaseImage, CaseInput, ImageDomain, PriorState};
pub use error::{
    CaseError, ErrorCategory, ErrorClassifier, ModelError, Result, ResultExt, ValidationError,
    ValidationErrorKind,
};
pub use utils::{
    ParseWithDefault, json_i64, json_string, json_string_array,
    log_filter_error, truncate_chars,
};
pub use version::{ModificationRecord, Version, VersionKind};
