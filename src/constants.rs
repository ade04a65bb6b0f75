//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Network constants for model endpoints
pub mod network {
    /// Default request timeout for whole-case model calls (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Default per-image vision timeout (seconds)
    pub const IMAGE_TIMEOUT_SECS: u64 = 90;

    /// Default enrichment timeout (seconds)
    pub const ENRICHMENT_TIMEOUT_SECS: u64 = 30;

    /// Connection establishment timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}

/// Pipeline tuning constants
pub mod pipeline {
    /// Concurrent image analyses per run (upstream rate limits)
    pub const DEFAULT_IMAGE_CONCURRENCY: usize = 3;

    /// Hard ceiling for the image worker pool
    pub const MAX_IMAGE_CONCURRENCY: usize = 16;

    /// Placeholder stored in an image slot whose analysis failed
    pub const IMAGE_PLACEHOLDER: &str = "Image analysis unavailable.";

    /// Placeholder content for a section no matcher could locate
    pub const SECTION_PLACEHOLDER: &str = "Section unavailable.";

    /// Maximum characters of prior section content carried into a seeded prompt
    pub const MAX_SEED_SECTION_CHARS: usize = 4_000;
}

/// Credit costs per run mode
pub mod credits {
    pub const SIMPLE_COST: u32 = 1;
    pub const FULL_COST: u32 = 2;
    pub const RELAUNCH_COST: u32 = 1;
    pub const DEEP_COST: u32 = 3;
}

/// Storage constants
pub mod storage {
    /// Project data directory
    pub const DATA_DIR: &str = ".casewise";

    /// Database file name inside the data directory
    pub const DATABASE_FILE: &str = "cases.db";
}
