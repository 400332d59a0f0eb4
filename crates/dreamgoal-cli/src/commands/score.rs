use clap::Subcommand;
use serde_json::json;

use crate::context::{manager, print_json, CliResult};

#[derive(Subcommand)]
pub enum ScoreAction {
    /// Print this year's total and entries
    Show,
}

pub async fn run(action: ScoreAction) -> CliResult {
    let manager = manager().await?;

    match action {
        ScoreAction::Show => {
            let snapshot = manager.snapshot();
            print_json(&json!({
                "totalScore": snapshot.total_score,
                "entries": snapshot.scoring_entries,
            }))?;
        }
    }
    Ok(())
}
