//! Dream management commands for CLI.

use clap::Subcommand;
use dreamgoal_core::{DreamPatch, DreamSpec};

use crate::context::{manager, print_json, CliResult};

#[derive(Subcommand)]
pub enum DreamAction {
    /// Create a new dream
    Add {
        /// Dream title
        title: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List all dreams with their goals
    List,
    /// Edit a dream's title, category, or description
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Mark a dream completed
    Complete { id: String },
    /// Delete a dream with its templates and this week's instances
    Delete { id: String },
}

pub async fn run(action: DreamAction) -> CliResult {
    let manager = manager().await?;

    match action {
        DreamAction::Add {
            title,
            category,
            description,
        } => {
            let dream = manager
                .add_dream(DreamSpec {
                    title,
                    category,
                    description,
                })
                .await?;
            eprintln!("Dream created: {}", dream.id);
            print_json(&dream)?;
        }
        DreamAction::List => {
            print_json(&manager.snapshot().dreams)?;
        }
        DreamAction::Update {
            id,
            title,
            category,
            description,
        } => {
            let patch = DreamPatch {
                title,
                category,
                description,
            };
            print_json(&manager.update_dream(&id, patch).await?)?;
        }
        DreamAction::Complete { id } => {
            print_json(&manager.complete_dream(&id).await?)?;
        }
        DreamAction::Delete { id } => {
            print_json(&manager.delete_dream(&id).await?)?;
        }
    }
    Ok(())
}
