use clap::Subcommand;
use serde_json::json;

use crate::context::{manager, print_json, CliResult};

#[derive(Subcommand)]
pub enum WeekAction {
    /// Print this week's instances as JSON
    Show,
    /// Add a one-off weekly goal for this week
    Add {
        title: String,
        #[arg(long)]
        dream: Option<String>,
    },
}

pub async fn run(action: WeekAction) -> CliResult {
    let manager = manager().await?;

    match action {
        WeekAction::Show => {
            let (week_id, instances) = manager.current_week_instances().await?;
            print_json(&json!({ "weekId": week_id, "goals": instances }))?;
        }
        WeekAction::Add { title, dream } => {
            let instance = manager.add_weekly_goal(&title, dream.as_deref()).await?;
            print_json(&instance)?;
        }
    }
    Ok(())
}
