//! Builds a loaded [`GoalManager`] from the user's config.

use std::sync::Arc;

use chrono::NaiveDate;
use dreamgoal_core::{open_store, Clock, Config, FixedClock, GoalManager, SystemClock};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Pins "today" for replays and tests, e.g. `DREAMGOAL_TODAY=2025-10-22`.
const TODAY_ENV: &str = "DREAMGOAL_TODAY";

fn clock() -> CliResult<Arc<dyn Clock>> {
    match std::env::var(TODAY_ENV) {
        Ok(value) => {
            let date: NaiveDate = value
                .parse()
                .map_err(|e| format!("invalid {TODAY_ENV} '{value}': {e}"))?;
            Ok(Arc::new(FixedClock::at_date(date)))
        }
        Err(_) => Ok(Arc::new(SystemClock)),
    }
}

pub async fn manager() -> CliResult<GoalManager> {
    let config = Config::load()?;
    tracing::debug!(user_id = %config.user_id, backend = ?config.store.backend, "config loaded");
    let store = open_store(&config.store)?;
    let manager = GoalManager::new(config.user_id.as_str(), store, clock()?)?
        .with_rules(config.scoring);
    manager.load().await?;
    Ok(manager)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
