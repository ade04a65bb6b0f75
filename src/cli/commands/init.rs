//! Init Command
//!
//! Initialize casewise in the current directory.

use crate::cli::ui::Output;
use crate::cli::util::{is_initialized, open_database};
use crate::config::ConfigLoader;
use crate::storage::CreditLedger;
use crate::types::{CaseError, Result};

pub fn run(force: bool) -> Result<()> {
    if is_initialized() && !force {
        return Err(CaseError::Config(
            "Already initialized. Use --force to overwrite the config.".to_string(),
        ));
    }

    let dir = ConfigLoader::init_project(force)?;
    let config = ConfigLoader::load()?;
    let db = open_database(&config)?;

    // A re-init never tops up an account that already holds credits
    let user_id = &config.credits.user_id;
    let mut balance = db.balance(user_id)?;
    if balance == 0 {
        balance = db.grant(user_id, config.credits.initial_grant)?;
    }

    let out = Output::new();
    out.success(&format!("Initialized casewise in {}/", dir.display()));
    println!("  Database: {}", config.storage.resolved_path().display());
    println!("  Credits:  {} ({})", balance, user_id);
    println!();
    println!("Next steps:");
    println!("  1. Export OPENAI_API_KEY (and PERPLEXITY_API_KEY for full/deep runs)");
    println!("  2. Run 'casewise analyze --file case.txt' to analyze a first case");

    Ok(())
}
