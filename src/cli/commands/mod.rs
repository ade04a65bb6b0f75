pub mod analyze;
pub mod config;
pub mod credits;
pub mod edit;
pub mod init;
pub mod rerun;
pub mod show;
pub mod versions;
