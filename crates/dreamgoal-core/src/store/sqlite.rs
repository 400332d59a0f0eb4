//! SQLite-backed item store.
//!
//! Every record is one row of the `items` table, keyed by id and user, with
//! its JSON body in `{id, userId, type, ...}` form. Whole-collection writes
//! replace the rows of the affected types inside a single transaction, so a
//! reader never sees a half-written collection.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::traits::{CurrentWeek, DreamCollection, ItemStore, ItemType, ScoreBook, ScoreTotal};
use crate::calendar::WeekId;
use crate::config::data_dir;
use crate::error::StoreError;
use crate::goal::{Dream, WeeklyGoalInstance, WeeklyGoalTemplate};
use crate::scoring::ScoringEntry;

/// SQLite database holding a user's items.
pub struct SqliteItemStore {
    conn: Mutex<Connection>,
}

impl SqliteItemStore {
    /// Open the database at `<data dir>/dreamgoal.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::OpenFailed {
            path: "dreamgoal.db".into(),
            message: e.to_string(),
        })?;
        Self::open_at(&dir.join("dreamgoal.db"))
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS items (
            id          TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            item_type   TEXT NOT NULL,
            week_id     TEXT,
            year        INTEGER,
            position    INTEGER NOT NULL DEFAULT 0,
            body        TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, item_type, id)
        );

        CREATE INDEX IF NOT EXISTS idx_items_user_type ON items(user_id, item_type);
        CREATE INDEX IF NOT EXISTS idx_items_user_week ON items(user_id, item_type, week_id);
        CREATE INDEX IF NOT EXISTS idx_items_user_year ON items(user_id, item_type, year);",
    )
}

fn map_sqlite(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::DatabaseBusy
                || code.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            StoreError::Locked
        }
        _ => StoreError::Database(err),
    }
}

/// Serialize `value` and stamp it with the item envelope fields.
fn item_body<T: Serialize>(
    value: &T,
    user_id: &str,
    item_type: ItemType,
) -> Result<String, StoreError> {
    let mut json = serde_json::to_value(value)?;
    if let Some(obj) = json.as_object_mut() {
        obj.insert("userId".into(), user_id.into());
        obj.insert("type".into(), item_type.as_str().into());
    }
    Ok(serde_json::to_string(&json)?)
}

/// Parse a stored body back, dropping the envelope fields the domain type
/// does not carry.
fn parse_body<T: DeserializeOwned>(body: &str, item_type: ItemType) -> Result<T, StoreError> {
    let mut json: serde_json::Value = serde_json::from_str(body)?;
    if let Some(obj) = json.as_object_mut() {
        obj.remove("userId");
        // Goals carry their own `type` field; only strip the envelope one.
        if obj.get("type").and_then(|v| v.as_str()) == Some(item_type.as_str()) {
            obj.remove("type");
        }
    }
    Ok(serde_json::from_value(json)?)
}

struct ItemRow<'a> {
    id: &'a str,
    week_id: Option<String>,
    year: Option<i32>,
    position: usize,
    body: String,
}

fn insert_item(
    tx: &Transaction<'_>,
    user_id: &str,
    item_type: ItemType,
    row: ItemRow<'_>,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT OR REPLACE INTO items (id, user_id, item_type, week_id, year, position, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.id,
            user_id,
            item_type.as_str(),
            row.week_id,
            row.year,
            row.position as i64,
            row.body,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn select_bodies(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqlite)?;
    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .map_err(map_sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(map_sqlite)
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load_dreams(&self, user_id: &str) -> Result<DreamCollection, StoreError> {
        let conn = self.conn();
        let sql = "SELECT body FROM items WHERE user_id = ?1 AND item_type = ?2 ORDER BY position";

        let dreams = select_bodies(&conn, sql, &[&user_id, &ItemType::Dream.as_str()])?
            .iter()
            .map(|body| parse_body::<Dream>(body, ItemType::Dream))
            .collect::<Result<Vec<_>, _>>()?;
        let templates = select_bodies(
            &conn,
            sql,
            &[&user_id, &ItemType::WeeklyGoalTemplate.as_str()],
        )?
        .iter()
        .map(|body| parse_body::<WeeklyGoalTemplate>(body, ItemType::WeeklyGoalTemplate))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(DreamCollection { dreams, templates })
    }

    async fn save_dreams(
        &self,
        user_id: &str,
        dreams: &[Dream],
        templates: &[WeeklyGoalTemplate],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(map_sqlite)?;
        tx.execute(
            "DELETE FROM items WHERE user_id = ?1 AND item_type IN (?2, ?3)",
            params![
                user_id,
                ItemType::Dream.as_str(),
                ItemType::WeeklyGoalTemplate.as_str()
            ],
        )
        .map_err(map_sqlite)?;

        for (position, dream) in dreams.iter().enumerate() {
            let row = ItemRow {
                id: &dream.id,
                week_id: None,
                year: None,
                position,
                body: item_body(dream, user_id, ItemType::Dream)?,
            };
            insert_item(&tx, user_id, ItemType::Dream, row).map_err(map_sqlite)?;
        }
        for (position, template) in templates.iter().enumerate() {
            let row = ItemRow {
                id: &template.id,
                week_id: None,
                year: None,
                position,
                body: item_body(template, user_id, ItemType::WeeklyGoalTemplate)?,
            };
            insert_item(&tx, user_id, ItemType::WeeklyGoalTemplate, row).map_err(map_sqlite)?;
        }

        tx.commit().map_err(map_sqlite)?;
        Ok(())
    }

    async fn get_current_week(
        &self,
        user_id: &str,
        week_id: WeekId,
    ) -> Result<CurrentWeek, StoreError> {
        let conn = self.conn();
        let week = week_id.to_string();
        let goals = select_bodies(
            &conn,
            "SELECT body FROM items
             WHERE user_id = ?1 AND item_type = ?2 AND week_id = ?3
             ORDER BY position",
            &[&user_id, &ItemType::WeeklyGoal.as_str(), &week],
        )?
        .iter()
        .map(|body| parse_body::<WeeklyGoalInstance>(body, ItemType::WeeklyGoal))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(CurrentWeek { week_id, goals })
    }

    async fn save_current_week(
        &self,
        user_id: &str,
        week_id: WeekId,
        goals: &[WeeklyGoalInstance],
    ) -> Result<(), StoreError> {
        let week = week_id.to_string();
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(map_sqlite)?;
        tx.execute(
            "DELETE FROM items WHERE user_id = ?1 AND item_type = ?2 AND week_id = ?3",
            params![user_id, ItemType::WeeklyGoal.as_str(), week],
        )
        .map_err(map_sqlite)?;

        for (position, instance) in goals.iter().enumerate() {
            let row = ItemRow {
                id: &instance.id,
                week_id: Some(week.clone()),
                year: None,
                position,
                body: item_body(instance, user_id, ItemType::WeeklyGoal)?,
            };
            insert_item(&tx, user_id, ItemType::WeeklyGoal, row).map_err(map_sqlite)?;
        }

        tx.commit().map_err(map_sqlite)?;
        Ok(())
    }

    async fn add_scoring_entry(
        &self,
        user_id: &str,
        year: i32,
        entry: &ScoringEntry,
    ) -> Result<ScoreTotal, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(map_sqlite)?;
        let position: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM items WHERE user_id = ?1 AND item_type = ?2 AND year = ?3",
                params![user_id, ItemType::ScoringEntry.as_str(), year],
                |row| row.get(0),
            )
            .map_err(map_sqlite)?;
        let row = ItemRow {
            id: &entry.id,
            week_id: entry.week_id.map(|w| w.to_string()),
            year: Some(year),
            position: position as usize,
            body: item_body(entry, user_id, ItemType::ScoringEntry)?,
        };
        insert_item(&tx, user_id, ItemType::ScoringEntry, row).map_err(map_sqlite)?;
        tx.commit().map_err(map_sqlite)?;

        let entries = load_entries(&conn, user_id, year)?;
        Ok(ScoreTotal {
            total_score: crate::scoring::total_points(&entries),
        })
    }

    async fn load_scoring(&self, user_id: &str, year: i32) -> Result<ScoreBook, StoreError> {
        let entries = load_entries(&self.conn(), user_id, year)?;
        Ok(ScoreBook {
            total_score: crate::scoring::total_points(&entries),
            entries,
        })
    }
}

fn load_entries(conn: &Connection, user_id: &str, year: i32) -> Result<Vec<ScoringEntry>, StoreError> {
    select_bodies(
        conn,
        "SELECT body FROM items
         WHERE user_id = ?1 AND item_type = ?2 AND year = ?3
         ORDER BY position",
        &[&user_id, &ItemType::ScoringEntry.as_str(), &year],
    )?
    .iter()
    .map(|body| parse_body::<ScoringEntry>(body, ItemType::ScoringEntry))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::{DreamSpec, GoalSpec};
    use crate::scoring::{create_scoring_entry, ScoringSource};
    use chrono::NaiveDate;

    fn week() -> WeekId {
        "2025-W43".parse().unwrap()
    }

    fn dream_with_goal() -> (Dream, WeeklyGoalTemplate) {
        let now = Utc::now();
        let today = NaiveDate::from_ymd_opt(2025, 10, 22).unwrap();
        let mut dream = DreamSpec::new("Marathon").into_dream("d1".into(), now).unwrap();
        let goal = GoalSpec::weekly("Run", 3)
            .into_goal("g1".into(), week(), today, now)
            .unwrap();
        let template = WeeklyGoalTemplate::for_goal("d1", &goal, "t1".into()).unwrap();
        dream.goals.push(goal);
        (dream, template)
    }

    #[tokio::test]
    async fn save_dreams_replaces_collections() {
        let store = SqliteItemStore::open_memory().unwrap();
        let (dream, template) = dream_with_goal();

        store
            .save_dreams("u1", &[dream.clone()], &[template.clone()])
            .await
            .unwrap();
        let loaded = store.load_dreams("u1").await.unwrap();
        assert_eq!(loaded.dreams, vec![dream.clone()]);
        assert_eq!(loaded.templates, vec![template]);

        store.save_dreams("u1", &[dream], &[]).await.unwrap();
        let loaded = store.load_dreams("u1").await.unwrap();
        assert_eq!(loaded.dreams.len(), 1);
        assert!(loaded.templates.is_empty());
        assert!(store.load_dreams("u2").await.unwrap().dreams.is_empty());
    }

    #[tokio::test]
    async fn stored_bodies_carry_item_envelope() {
        let store = SqliteItemStore::open_memory().unwrap();
        let (dream, template) = dream_with_goal();
        store.save_dreams("u1", &[dream], &[template]).await.unwrap();

        let body: String = store
            .conn()
            .query_row(
                "SELECT body FROM items WHERE item_type = 'weekly_goal_template'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["type"], "weekly_goal_template");
        assert_eq!(json["goalId"], "g1");
    }

    #[tokio::test]
    async fn weeks_are_isolated() {
        let store = SqliteItemStore::open_memory().unwrap();
        let (_, template) = dream_with_goal();
        let now = Utc::now();
        let instance = WeeklyGoalInstance::from_template(&template, week(), "i1".into(), now);

        store
            .save_current_week("u1", week(), &[instance.clone()])
            .await
            .unwrap();
        let current = store.get_current_week("u1", week()).await.unwrap();
        assert_eq!(current.goals, vec![instance]);

        let next = store.get_current_week("u1", week().succ()).await.unwrap();
        assert!(next.goals.is_empty());
    }

    #[tokio::test]
    async fn scoring_total_is_per_year() {
        let store = SqliteItemStore::open_memory().unwrap();
        let date = "2025-10-22T12:00:00Z".parse().unwrap();
        let first = create_scoring_entry(
            "e1".into(),
            ScoringSource::Week,
            3,
            "week",
            Default::default(),
            date,
        );
        let second = create_scoring_entry(
            "e2".into(),
            ScoringSource::Milestone,
            15,
            "milestone",
            Default::default(),
            date,
        );
        assert_eq!(store.add_scoring_entry("u1", 2025, &first).await.unwrap().total_score, 3);
        assert_eq!(store.add_scoring_entry("u1", 2025, &second).await.unwrap().total_score, 18);

        let book = store.load_scoring("u1", 2025).await.unwrap();
        assert_eq!(book.entries, vec![first, second]);
        assert_eq!(store.load_scoring("u1", 2026).await.unwrap().total_score, 0);
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.db");
        let (dream, template) = dream_with_goal();
        {
            let store = SqliteItemStore::open_at(&path).unwrap();
            store.save_dreams("u1", &[dream.clone()], &[template]).await.unwrap();
        }
        let reopened = SqliteItemStore::open_at(&path).unwrap();
        assert_eq!(reopened.load_dreams("u1").await.unwrap().dreams, vec![dream]);
    }
}
