//! Credits Command
//!
//! Inspect and top up the local credit ledger.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::storage::CreditLedger;
use crate::types::{CaseError, Result, RunMode};

pub fn show() -> Result<()> {
    let ctx = CommandContext::load()?;
    let credits = &ctx.config.credits;
    let balance = ctx.db.balance(&credits.user_id)?;

    let out = Output::new();
    out.header(&format!("Credits for {}", credits.user_id));
    println!("  Balance: {}", balance);
    println!();
    println!("  Cost per run:");
    for mode in [RunMode::Simple, RunMode::Full, RunMode::Relaunch, RunMode::Deep] {
        println!("    {:<9} {}", mode, credits.cost(mode));
    }
    Ok(())
}

pub fn grant(amount: u32) -> Result<()> {
    if amount == 0 {
        return Err(CaseError::validation("amount", "grant must be greater than 0"));
    }
    let ctx = CommandContext::load()?;
    let balance = ctx.db.grant(&ctx.config.credits.user_id, amount)?;
    Output::new().success(&format!("Granted {} credits; balance is now {}", amount, balance));
    Ok(())
}
