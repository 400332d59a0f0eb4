//! In-process item store.
//!
//! Used by tests and local runs. Counts every call per operation and can be
//! told to fail specific operations, which is how the persist-first
//! guarantees are exercised.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{CurrentWeek, DreamCollection, ItemStore, ScoreBook, ScoreTotal};
use crate::calendar::WeekId;
use crate::error::StoreError;
use crate::goal::{Dream, WeeklyGoalInstance, WeeklyGoalTemplate};
use crate::scoring::{total_points, ScoringEntry};

/// Store operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    LoadDreams,
    SaveDreams,
    GetCurrentWeek,
    SaveCurrentWeek,
    AddScoringEntry,
    LoadScoring,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::LoadDreams => "load_dreams",
            StoreOp::SaveDreams => "save_dreams",
            StoreOp::GetCurrentWeek => "get_current_week",
            StoreOp::SaveCurrentWeek => "save_current_week",
            StoreOp::AddScoringEntry => "add_scoring_entry",
            StoreOp::LoadScoring => "load_scoring",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StoreOp::SaveDreams | StoreOp::SaveCurrentWeek | StoreOp::AddScoringEntry
        )
    }
}

#[derive(Default)]
struct MemoryData {
    collections: HashMap<String, DreamCollection>,
    weeks: HashMap<(String, WeekId), Vec<WeeklyGoalInstance>>,
    scoring: HashMap<(String, i32), Vec<ScoringEntry>>,
    calls: HashMap<StoreOp, usize>,
    failing: HashSet<StoreOp>,
}

/// Item store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail until [`recover`](Self::recover).
    pub fn fail(&self, op: StoreOp) {
        self.with_data(|data| {
            data.failing.insert(op);
        });
    }

    pub fn recover(&self, op: StoreOp) {
        self.with_data(|data| {
            data.failing.remove(&op);
        });
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.with_data(|data| data.calls.get(&op).copied().unwrap_or(0))
    }

    /// Total write calls across all operations, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.with_data(|data| {
            data.calls
                .iter()
                .filter(|(op, _)| op.is_write())
                .map(|(_, n)| *n)
                .sum()
        })
    }

    /// Entries stored for `user_id` in `year`.
    pub fn scoring_entries(&self, user_id: &str, year: i32) -> Vec<ScoringEntry> {
        self.with_data(|data| {
            data.scoring
                .get(&(user_id.to_string(), year))
                .cloned()
                .unwrap_or_default()
        })
    }

    pub fn stored_collection(&self, user_id: &str) -> DreamCollection {
        self.with_data(|data| data.collections.get(user_id).cloned().unwrap_or_default())
    }

    pub fn stored_week(&self, user_id: &str, week_id: WeekId) -> Vec<WeeklyGoalInstance> {
        self.with_data(|data| {
            data.weeks
                .get(&(user_id.to_string(), week_id))
                .cloned()
                .unwrap_or_default()
        })
    }

    fn with_data<T>(&self, f: impl FnOnce(&mut MemoryData) -> T) -> T {
        let mut guard = match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Count the call, yield once so concurrent callers interleave, then
    /// fail if `op` is marked failing.
    async fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        let failing = self.with_data(|data| {
            *data.calls.entry(op).or_insert(0) += 1;
            data.failing.contains(&op)
        });
        tokio::task::yield_now().await;
        if failing {
            return Err(StoreError::Rejected {
                operation: op.as_str().to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_dreams(&self, user_id: &str) -> Result<DreamCollection, StoreError> {
        self.enter(StoreOp::LoadDreams).await?;
        Ok(self.stored_collection(user_id))
    }

    async fn save_dreams(
        &self,
        user_id: &str,
        dreams: &[Dream],
        templates: &[WeeklyGoalTemplate],
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::SaveDreams).await?;
        self.with_data(|data| {
            data.collections.insert(
                user_id.to_string(),
                DreamCollection {
                    dreams: dreams.to_vec(),
                    templates: templates.to_vec(),
                },
            );
        });
        Ok(())
    }

    async fn get_current_week(
        &self,
        user_id: &str,
        week_id: WeekId,
    ) -> Result<CurrentWeek, StoreError> {
        self.enter(StoreOp::GetCurrentWeek).await?;
        Ok(CurrentWeek {
            week_id,
            goals: self.stored_week(user_id, week_id),
        })
    }

    async fn save_current_week(
        &self,
        user_id: &str,
        week_id: WeekId,
        goals: &[WeeklyGoalInstance],
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::SaveCurrentWeek).await?;
        self.with_data(|data| {
            data.weeks
                .insert((user_id.to_string(), week_id), goals.to_vec());
        });
        Ok(())
    }

    async fn add_scoring_entry(
        &self,
        user_id: &str,
        year: i32,
        entry: &ScoringEntry,
    ) -> Result<ScoreTotal, StoreError> {
        self.enter(StoreOp::AddScoringEntry).await?;
        let total_score = self.with_data(|data| {
            let entries = data.scoring.entry((user_id.to_string(), year)).or_default();
            entries.push(entry.clone());
            total_points(entries)
        });
        Ok(ScoreTotal { total_score })
    }

    async fn load_scoring(&self, user_id: &str, year: i32) -> Result<ScoreBook, StoreError> {
        self.enter(StoreOp::LoadScoring).await?;
        let entries = self.scoring_entries(user_id, year);
        Ok(ScoreBook {
            total_score: total_points(&entries),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{create_scoring_entry, ScoringSource};
    use chrono::Utc;

    #[tokio::test]
    async fn scoring_totals_accumulate_per_year() {
        let store = MemoryStore::new();
        for points in [3, 15] {
            let entry = create_scoring_entry(
                uuid::Uuid::new_v4().to_string(),
                ScoringSource::Week,
                points,
                "test",
                Default::default(),
                Utc::now(),
            );
            store.add_scoring_entry("u1", 2025, &entry).await.unwrap();
        }
        let book = store.load_scoring("u1", 2025).await.unwrap();
        assert_eq!(book.total_score, 18);
        assert_eq!(store.load_scoring("u1", 2024).await.unwrap().total_score, 0);
    }

    #[tokio::test]
    async fn injected_failures_are_counted_and_recoverable() {
        let store = MemoryStore::new();
        store.fail(StoreOp::SaveDreams);
        assert!(store.save_dreams("u1", &[], &[]).await.is_err());
        assert_eq!(store.calls(StoreOp::SaveDreams), 1);
        assert_eq!(store.write_calls(), 1);

        store.recover(StoreOp::SaveDreams);
        assert!(store.save_dreams("u1", &[], &[]).await.is_ok());
        assert_eq!(store.calls(StoreOp::SaveDreams), 2);
    }
}
